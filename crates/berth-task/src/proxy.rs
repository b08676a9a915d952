use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::TaskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRegistration {
    pub name: String,
    pub address: String,
    pub protocol: ProxyProtocol,
}

#[async_trait]
pub trait ProxyRegistrar: Send + Sync + 'static {
    async fn register(&self, registration: ProxyRegistration) -> TaskResult<()>;
    async fn unregister(&self, name: &str) -> TaskResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryProxyRegistry {
    routes: RwLock<HashMap<String, ProxyRegistration>>,
}

impl MemoryProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<ProxyRegistration> {
        self.routes.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names = self.routes.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

#[async_trait]
impl ProxyRegistrar for MemoryProxyRegistry {
    async fn register(&self, registration: ProxyRegistration) -> TaskResult<()> {
        self.routes
            .write()
            .await
            .insert(registration.name.clone(), registration);
        Ok(())
    }

    async fn unregister(&self, name: &str) -> TaskResult<()> {
        self.routes.write().await.remove(name);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RouteBook {
    names: BTreeSet<String>,
    retracted: bool,
}

/// The proxy routes registered on behalf of one task.
///
/// Registrations run in background tasks, so a registration may still be
/// in flight when the task terminates. Once the routes are retracted,
/// later registrations are skipped so that no route outlives the task.
#[derive(Clone)]
pub(crate) struct ProxyRoutes {
    registrar: Arc<dyn ProxyRegistrar>,
    book: Arc<Mutex<RouteBook>>,
}

impl ProxyRoutes {
    pub(crate) fn new(registrar: Arc<dyn ProxyRegistrar>) -> Self {
        Self {
            registrar,
            book: Arc::new(Mutex::new(RouteBook::default())),
        }
    }

    pub(crate) async fn register(&self, registration: ProxyRegistration) -> TaskResult<()> {
        let mut book = self.book.lock().await;
        if book.retracted {
            debug!(
                "skipping proxy registration {} for a terminated task",
                registration.name
            );
            return Ok(());
        }
        let name = registration.name.clone();
        self.registrar.register(registration).await?;
        book.names.insert(name);
        Ok(())
    }

    /// Unregisters every route and rejects later registrations.
    pub(crate) async fn retract(&self) {
        let mut book = self.book.lock().await;
        book.retracted = true;
        for name in std::mem::take(&mut book.names) {
            if let Err(e) = self.registrar.unregister(&name).await {
                warn!("failed to unregister proxy route {name}: {e}");
            }
        }
    }
}

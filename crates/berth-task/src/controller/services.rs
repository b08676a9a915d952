use std::sync::Arc;

use crate::checkpoint::CheckpointStore;
use crate::proxy::ProxyRegistrar;
use crate::resource_manager::ResourceManager;
use crate::session::SessionStore;

/// The collaborators shared by all task controllers.
#[derive(Clone)]
pub struct TaskServices {
    pub resource_manager: Arc<dyn ResourceManager>,
    pub sessions: Arc<dyn SessionStore>,
    pub proxy: Arc<dyn ProxyRegistrar>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

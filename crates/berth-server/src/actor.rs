use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use berth_telemetry::common::SpanAssociation;
use fastrace::collector::SpanContext;
use fastrace::Span;
use log::{error, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinSet};

const ACTOR_CHANNEL_SIZE: usize = 8;

/// An actor processes its messages one at a time, in arrival order.
/// [`Actor::receive`] is synchronous, so any work that needs to wait on
/// something else must be spawned via the [`ActorContext`] and report back
/// to the actor as a message.
#[async_trait]
pub trait Actor: Sized + Send + 'static {
    type Message: SpanAssociation + Send + 'static;
    type Options: Send + 'static;

    fn new(options: Self::Options) -> Self;

    async fn start(&mut self, _ctx: &mut ActorContext<Self>) {}

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: Self::Message) -> ActorAction;

    async fn stop(self, _ctx: &mut ActorContext<Self>) {}
}

#[derive(Debug)]
pub enum ActorAction {
    Continue,
    Warn(String),
    Fail(String),
    Stop,
}

impl ActorAction {
    pub fn warn(message: impl ToString) -> Self {
        ActorAction::Warn(message.to_string())
    }

    pub fn fail(message: impl ToString) -> Self {
        ActorAction::Fail(message.to_string())
    }
}

pub struct ActorContext<T: Actor> {
    handle: ActorHandle<T>,
    /// Background tasks owned by the actor.
    /// They are aborted when the context is dropped after the actor stops.
    tasks: JoinSet<()>,
}

impl<T: Actor> ActorContext<T> {
    fn new(handle: ActorHandle<T>) -> Self {
        Self {
            handle,
            tasks: JoinSet::new(),
        }
    }

    pub fn handle(&self) -> &ActorHandle<T> {
        &self.handle
    }

    /// Runs a future in the background without blocking the actor mailbox.
    pub fn spawn<F>(&mut self, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task)
    }

    /// Sends a message to the actor itself.
    pub fn send(&mut self, message: T::Message) {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            let _ = handle.send(message).await;
        });
    }

    /// Sends a message to the actor itself after the delay.
    /// The returned handle can be used to cancel the delivery.
    pub fn send_with_delay(&mut self, message: T::Message, delay: Duration) -> AbortHandle {
        let handle = self.handle.clone();
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = handle.send(message).await;
        })
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    error!("actor background task panicked: {e}");
                }
            }
        }
    }
}

pub struct ActorHandle<T: Actor> {
    sender: mpsc::Sender<T::Message>,
    stopped: watch::Receiver<bool>,
}

impl<T: Actor> Clone for ActorHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T: Actor> ActorHandle<T> {
    pub async fn send(&self, message: T::Message) -> Result<(), mpsc::error::SendError<T::Message>> {
        self.sender.send(message).await
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    pub async fn wait_for_stop(mut self) {
        // We ignore the receiver error since the sender must have been dropped in this case,
        // which means the actor has stopped.
        let _ = self.stopped.wait_for(|x| *x).await;
    }
}

struct ActorRunner<T: Actor> {
    actor: T,
    ctx: ActorContext<T>,
    receiver: mpsc::Receiver<T::Message>,
    stopped: watch::Sender<bool>,
}

impl<T: Actor> ActorRunner<T> {
    async fn run(mut self) {
        self.actor.start(&mut self.ctx).await;
        while let Some(message) = self.receiver.recv().await {
            self.ctx.reap();
            let span = Span::root(message.name(), SpanContext::random())
                .with_properties(|| message.properties());
            let _guard = span.set_local_parent();
            match self.actor.receive(&mut self.ctx, message) {
                ActorAction::Continue => {}
                ActorAction::Warn(message) => {
                    warn!("{message}");
                }
                ActorAction::Fail(message) => {
                    error!("{message}");
                    break;
                }
                ActorAction::Stop => {
                    break;
                }
            }
        }
        self.receiver.close();
        let Self {
            actor,
            mut ctx,
            stopped,
            ..
        } = self;
        actor.stop(&mut ctx).await;
        drop(ctx);
        let _ = stopped.send(true);
    }
}

/// Owns the actors spawned in it.
/// Dropping the system aborts every actor that is still running.
#[derive(Default)]
pub struct ActorSystem {
    actors: JoinSet<()>,
}

impl ActorSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<T: Actor>(&mut self, options: T::Options) -> ActorHandle<T> {
        let (tx, rx) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let handle = ActorHandle {
            sender: tx,
            stopped: stopped_rx,
        };
        let runner = ActorRunner {
            actor: T::new(options),
            ctx: ActorContext::new(handle.clone()),
            receiver: rx,
            stopped: stopped_tx,
        };
        self.actors.spawn(runner.run());
        handle
    }

    /// Waits for all actors to stop.
    pub async fn join(&mut self) {
        while self.actors.join_next().await.is_some() {}
    }
}

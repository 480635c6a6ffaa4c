//! Event dispatcher: the single consumer that owns the session.
//!
//! ```text
//! bus listener ──┐
//! kiosk panel  ──┼──► mpsc queue ──► Worker loop ──► SessionMachine.decide()
//! SessionTimer ──┘                        │
//!                                         ├─► timer start/stop
//!                                         ├─► watch<SessionSnapshot>
//!                                         ├─► RenderSink
//!                                         └─► CommandSink (bus)
//! ```
//!
//! Exactly one event is in flight at a time. A transition's timer
//! directive, snapshot, renders and commands are all carried out before
//! the next event is dequeued, so a tick already queued when the session
//! leaves Active reaches a machine that ignores it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::command::BusCommand;
use crate::config::ControllerConfig;
use crate::envelope;
use crate::error::{KioskError, Result};
use crate::event::SessionEvent;
use crate::machine::{SessionMachine, TimerDirective, Transition};
use crate::password::{PasswordVerifier, SaltedSha256Verifier};
use crate::render::{RenderSink, TracingRenderSink};
use crate::session::SessionSnapshot;
use crate::timer::SessionTimer;

/// Items on the dispatcher queue.
#[derive(Debug)]
pub(crate) enum Inbound {
    Event(SessionEvent),
    Shutdown,
}

/// Outbound bus collaborator.
///
/// Awaited on the dispatcher context, so a slow bus delays the next event.
#[async_trait]
pub trait CommandSink: Send + Sync + 'static {
    async fn send(&self, command: BusCommand) -> anyhow::Result<()>;
}

/// Command sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCommandSink;

#[async_trait]
impl CommandSink for TracingCommandSink {
    async fn send(&self, command: BusCommand) -> anyhow::Result<()> {
        tracing::info!(frame = ?command.to_frame(), "bus command");
        Ok(())
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Wires the controller to its collaborators.
pub struct ControllerBuilder {
    config: ControllerConfig,
    verifier: Arc<dyn PasswordVerifier>,
    commands: Arc<dyn CommandSink>,
    renderer: Arc<dyn RenderSink>,
}

impl ControllerBuilder {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            verifier: Arc::new(SaltedSha256Verifier),
            commands: Arc::new(TracingCommandSink),
            renderer: Arc::new(TracingRenderSink),
        }
    }

    pub fn with_verifier(mut self, verifier: impl PasswordVerifier) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn with_command_sink(mut self, sink: impl CommandSink) -> Self {
        self.commands = Arc::new(sink);
        self
    }

    pub fn with_render_sink(mut self, sink: impl RenderSink) -> Self {
        self.renderer = Arc::new(sink);
        self
    }

    pub fn build(self) -> Result<Controller> {
        self.config.validate()?;

        let (queue, inbox) = mpsc::channel(self.config.queue_capacity);
        let (snapshots, snapshot_rx) = watch::channel(Arc::new(SessionSnapshot::idle()));

        let worker = Worker {
            machine: SessionMachine::new(&self.config, self.verifier),
            timer: SessionTimer::new(self.config.tick_interval(), queue.downgrade()),
            inbox,
            commands: self.commands,
            renderer: self.renderer,
            snapshots,
        };

        Ok(Controller {
            handle: ControllerHandle {
                queue,
                snapshots: snapshot_rx,
            },
            worker,
        })
    }
}

// ============================================================================
// Controller
// ============================================================================

/// A built controller that has not started processing yet.
pub struct Controller {
    handle: ControllerHandle,
    worker: Worker,
}

impl Controller {
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Spawn the dispatcher loop on the current runtime.
    ///
    /// The join handle resolves to the final snapshot after
    /// [`ControllerHandle::shutdown`], or to the fault that stopped the loop.
    pub fn start(self) -> Result<(ControllerHandle, JoinHandle<Result<SessionSnapshot>>)> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| KioskError::NoRuntime)?;
        let Controller { handle, worker } = self;
        let task = runtime.spawn(worker.run());
        Ok((handle, task))
    }

    /// Run the dispatcher loop on the calling task.
    ///
    /// Returns once shut down or once every [`ControllerHandle`] is dropped.
    pub async fn run(self) -> Result<SessionSnapshot> {
        let Controller { handle, worker } = self;
        drop(handle);
        worker.run().await
    }
}

/// Cloneable producer side of the dispatcher.
#[derive(Clone)]
pub struct ControllerHandle {
    queue: mpsc::Sender<Inbound>,
    snapshots: watch::Receiver<Arc<SessionSnapshot>>,
}

impl ControllerHandle {
    /// Enqueue an event, waiting for queue space.
    pub async fn post(&self, event: SessionEvent) -> Result<()> {
        self.queue
            .send(Inbound::Event(event))
            .await
            .map_err(|_| KioskError::QueueClosed)
    }

    /// Enqueue an event without waiting.
    pub fn try_post(&self, event: SessionEvent) -> Result<()> {
        self.queue
            .try_send(Inbound::Event(event))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => KioskError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => KioskError::QueueClosed,
            })
    }

    /// Enqueue from a plain OS thread, e.g. a blocking bus reader.
    ///
    /// Panics if called from within an async runtime.
    pub fn blocking_post(&self, event: SessionEvent) -> Result<()> {
        self.queue
            .blocking_send(Inbound::Event(event))
            .map_err(|_| KioskError::QueueClosed)
    }

    /// Decode a raw bus frame and enqueue the result.
    pub async fn post_frame<S: AsRef<str>>(&self, frame: &[S]) -> Result<()> {
        self.post(envelope::decode_frame(frame)).await
    }

    /// Latest committed snapshot.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that observes every committed snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.snapshots.clone()
    }

    /// Ask the loop to stop after the events already queued.
    pub async fn shutdown(&self) -> Result<()> {
        self.queue
            .send(Inbound::Shutdown)
            .await
            .map_err(|_| KioskError::ControllerStopped)
    }
}

/// Feed a stream of raw bus frames into the controller on its own task.
///
/// Ends when the stream ends; fails if the controller goes away.
pub fn spawn_bus_listener<St>(
    handle: ControllerHandle,
    frames: St,
) -> Result<JoinHandle<Result<()>>>
where
    St: Stream<Item = Vec<String>> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| KioskError::NoRuntime)?;
    Ok(runtime.spawn(async move {
        let mut frames = std::pin::pin!(frames);
        while let Some(frame) = frames.next().await {
            handle.post_frame(frame.as_slice()).await?;
        }
        tracing::debug!("bus stream ended");
        Ok(())
    }))
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    machine: SessionMachine,
    timer: SessionTimer,
    inbox: mpsc::Receiver<Inbound>,
    commands: Arc<dyn CommandSink>,
    renderer: Arc<dyn RenderSink>,
    snapshots: watch::Sender<Arc<SessionSnapshot>>,
}

impl Worker {
    async fn run(mut self) -> Result<SessionSnapshot> {
        tracing::info!("kiosk controller started");

        while let Some(inbound) = self.inbox.recv().await {
            let event = match inbound {
                Inbound::Event(event) => event,
                Inbound::Shutdown => {
                    tracing::info!("kiosk controller shutting down");
                    break;
                }
            };

            let span = tracing::debug_span!(
                "session_event",
                kind = event.kind(),
                session_id = ?self.machine.session_id(),
                timer_epoch = ?self.timer.armed_epoch(),
            );
            if let Err(error) = self.process(event).instrument(span).await {
                tracing::error!(%error, "kiosk controller fault");
                self.timer.stop();
                return Err(error);
            }
        }

        self.timer.stop();
        Ok(self.machine.snapshot())
    }

    async fn process(&mut self, event: SessionEvent) -> Result<()> {
        let transition = self.machine.decide(event);
        if transition.is_noop() {
            return Ok(());
        }

        self.apply_timer(&transition)?;
        let snapshot = self.commit(&transition);

        for notification in &transition.renders {
            self.renderer.render(notification, &snapshot);
        }

        for command in transition.commands {
            let tag = command.tag();
            if let Err(error) = self.commands.send(command).await {
                tracing::error!(%error, command = tag, "failed to send bus command");
            }
        }

        Ok(())
    }

    /// Timer changes happen before anything else is observable, so a
    /// session leaving Active has no armed timer by the time readers see it.
    fn apply_timer(&mut self, transition: &Transition) -> Result<()> {
        match transition.timer {
            Some(TimerDirective::Start { epoch }) => self.timer.start(epoch),
            Some(TimerDirective::Stop) => {
                self.timer.stop();
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn commit(&self, transition: &Transition) -> Arc<SessionSnapshot> {
        if transition.mutated() {
            let snapshot = Arc::new(self.machine.snapshot());
            self.snapshots.send_replace(snapshot.clone());
            snapshot
        } else {
            let current = self.snapshots.borrow();
            current.clone()
        }
    }
}

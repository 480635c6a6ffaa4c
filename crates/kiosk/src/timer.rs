//! Session countdown timer.
//!
//! Emits one `Tick { epoch }` into the dispatcher queue per period while
//! armed. It holds no policy: what a tick means is decided by the state
//! machine.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatch::Inbound;
use crate::error::{KioskError, Result};
use crate::event::SessionEvent;

pub(crate) struct SessionTimer {
    period: Duration,
    queue: mpsc::WeakSender<Inbound>,
    running: Option<(u64, JoinHandle<()>)>,
}

impl SessionTimer {
    /// The timer only holds a weak sender so that it never keeps the
    /// dispatcher alive on its own.
    pub(crate) fn new(period: Duration, queue: mpsc::WeakSender<Inbound>) -> Self {
        Self {
            period,
            queue,
            running: None,
        }
    }

    /// Arm the timer, replacing any previous arming. The first tick fires
    /// one full period from now.
    pub(crate) fn start(&mut self, epoch: u64) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| KioskError::NoRuntime)?;
        self.stop();

        let period = self.period;
        let queue = self.queue.clone();
        let task = runtime.spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(sender) = queue.upgrade() else {
                    break;
                };
                if sender
                    .send(Inbound::Event(SessionEvent::Tick { epoch }))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        tracing::debug!(epoch, period_ms = period.as_millis() as u64, "timer armed");
        self.running = Some((epoch, task));
        Ok(())
    }

    /// Disarm. Safe to call when already stopped.
    pub(crate) fn stop(&mut self) {
        if let Some((epoch, task)) = self.running.take() {
            task.abort();
            tracing::debug!(epoch, "timer stopped");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.running.is_some()
    }

    pub(crate) fn armed_epoch(&self) -> Option<u64> {
        self.running.as_ref().map(|(epoch, _)| *epoch)
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

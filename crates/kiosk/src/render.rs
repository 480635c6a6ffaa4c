//! Render notifications and the display seam.

use crate::session::SessionSnapshot;

/// What the display should show after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderNotification {
    EnterIdle,
    EnterAwaitingLogin,
    EnterAwaitingPassword {
        user: String,
    },
    EnterActive {
        user: String,
        balance: String,
        remaining_seconds: u32,
    },
    Tick {
        remaining_seconds: u32,
    },
    Purchase {
        item: String,
        balance: String,
    },
}

/// Display collaborator.
///
/// Called on the dispatcher context after the transition is committed and
/// the snapshot published. Implementations must not block; a GUI would
/// forward the notification to its own event loop.
pub trait RenderSink: Send + Sync + 'static {
    fn render(&self, notification: &RenderNotification, snapshot: &SessionSnapshot);
}

/// Render sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRenderSink;

impl RenderSink for TracingRenderSink {
    fn render(&self, notification: &RenderNotification, snapshot: &SessionSnapshot) {
        tracing::debug!(
            ?notification,
            state = ?snapshot.state,
            revision = snapshot.revision,
            "render"
        );
    }
}

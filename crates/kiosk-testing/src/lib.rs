//! Testing utilities for the kiosk controller.
//!
//! - [`Recorder`] captures outbound commands and render notifications in
//!   the order the dispatcher produced them.
//! - [`events`] builds the common backend messages with test defaults.
//! - [`matching_hash`] is a verifier that accepts a candidate only when it
//!   equals the challenge hash, which keeps scenarios readable.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kiosk_core::{
    BusCommand, CommandSink, ControllerBuilder, ControllerConfig, RenderNotification, RenderSink,
    SessionSnapshot,
};

/// Records everything the controller emits.
#[derive(Clone, Default)]
pub struct Recorder {
    commands: Arc<Mutex<Vec<BusCommand>>>,
    renders: Arc<Mutex<Vec<RenderNotification>>>,
    snapshots: Arc<Mutex<Vec<SessionSnapshot>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<BusCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn renders(&self) -> Vec<RenderNotification> {
        self.renders.lock().unwrap().clone()
    }

    /// Snapshot passed alongside each render notification.
    pub fn rendered_snapshots(&self) -> Vec<SessionSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn ticks(&self) -> Vec<u32> {
        self.renders
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                RenderNotification::Tick { remaining_seconds } => Some(*remaining_seconds),
                _ => None,
            })
            .collect()
    }

    /// Builder wired to this recorder and [`matching_hash`].
    pub fn builder(&self, config: ControllerConfig) -> ControllerBuilder {
        ControllerBuilder::new(config)
            .with_verifier(matching_hash)
            .with_command_sink(self.clone())
            .with_render_sink(self.clone())
    }
}

#[async_trait]
impl CommandSink for Recorder {
    async fn send(&self, command: BusCommand) -> anyhow::Result<()> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

impl RenderSink for Recorder {
    fn render(&self, notification: &RenderNotification, snapshot: &SessionSnapshot) {
        self.renders.lock().unwrap().push(notification.clone());
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

/// Accepts the candidate iff it equals the hash.
pub fn matching_hash(candidate: &str, hash: &str) -> bool {
    candidate == hash
}

/// Event builders with test defaults.
pub mod events {
    use kiosk_core::{LogoutReason, SessionEvent};

    pub fn login_succeeded(user: &str, balance: &str, ttl: u32) -> SessionEvent {
        SessionEvent::LoginSucceeded {
            user: user.into(),
            balance: balance.into(),
            ttl,
        }
    }

    pub fn password_challenge(user: &str, balance: &str, hash: &str, ttl: u32) -> SessionEvent {
        SessionEvent::PasswordChallenge {
            user: user.into(),
            balance: balance.into(),
            hash: hash.into(),
            ttl,
        }
    }

    pub fn password(candidate: &str) -> SessionEvent {
        SessionEvent::PasswordSubmitted {
            candidate: candidate.into(),
        }
    }

    pub fn purchase(item: &str, balance: &str, ttl: u32) -> SessionEvent {
        SessionEvent::PurchaseNotified {
            item: item.into(),
            balance: balance.into(),
            ttl,
        }
    }

    pub fn remote_logout(reason: LogoutReason) -> SessionEvent {
        SessionEvent::RemoteLogout { reason }
    }

    /// A `UI-OPEN` frame carrying `query` as the URL's query string.
    pub fn ui_open(query: &str) -> Vec<String> {
        vec![
            "UI-OPEN".to_string(),
            format!("http://soda/index.php?{query}"),
        ]
    }
}

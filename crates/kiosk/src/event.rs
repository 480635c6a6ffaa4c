//! Session events (facts).
//!
//! Events come from three producers: the bus listener (backend messages),
//! the kiosk panel (user actions) and the session timer (ticks). All of
//! them reach the state machine through the dispatcher queue.

use crate::error::EnvelopeError;

/// Why the backend ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// `LOGGEDOUT`
    LoggedOut,
    /// `AUTOLOGGEDOUT`
    AutoLoggedOut,
    /// `TIMEOUT`
    Timeout,
    /// `LOGOUT` sent by the backend
    Logout,
}

impl LogoutReason {
    pub fn tag(self) -> &'static str {
        match self {
            LogoutReason::LoggedOut => "LOGGEDOUT",
            LogoutReason::AutoLoggedOut => "AUTOLOGGEDOUT",
            LogoutReason::Timeout => "TIMEOUT",
            LogoutReason::Logout => "LOGOUT",
        }
    }
}

/// A single input to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user pressed "Login" on the idle panel.
    UserRequestsLogin,

    /// The user typed a login name on the keypad and submitted it.
    LoginSubmitted { user: String },

    /// Backend accepted the user without a password (`LOGGEDIN`).
    LoginSucceeded {
        user: String,
        balance: String,
        ttl: u32,
    },

    /// Backend requires a password (`PASSWORD`).
    PasswordChallenge {
        user: String,
        balance: String,
        hash: String,
        ttl: u32,
    },

    /// The user submitted a password candidate.
    PasswordSubmitted { candidate: String },

    /// One timer period elapsed. `epoch` identifies the arming that
    /// produced it.
    Tick { epoch: u64 },

    /// Backend reported a purchase (`BOUGHT`).
    PurchaseNotified {
        item: String,
        balance: String,
        ttl: u32,
    },

    /// The user pressed "Logout".
    UserRequestsLogout,

    /// Backend ended the session.
    RemoteLogout { reason: LogoutReason },

    /// A bus message that could not be decoded.
    Unrecognized { error: EnvelopeError },
}

impl SessionEvent {
    /// Short name used in logs and spans.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::UserRequestsLogin => "user_requests_login",
            SessionEvent::LoginSubmitted { .. } => "login_submitted",
            SessionEvent::LoginSucceeded { .. } => "login_succeeded",
            SessionEvent::PasswordChallenge { .. } => "password_challenge",
            SessionEvent::PasswordSubmitted { .. } => "password_submitted",
            SessionEvent::Tick { .. } => "tick",
            SessionEvent::PurchaseNotified { .. } => "purchase_notified",
            SessionEvent::UserRequestsLogout => "user_requests_logout",
            SessionEvent::RemoteLogout { .. } => "remote_logout",
            SessionEvent::Unrecognized { .. } => "unrecognized",
        }
    }
}

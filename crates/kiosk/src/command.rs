//! Outbound bus commands (intent).
//!
//! Commands serialize as the flat string lists the bus expects, e.g.
//! `["LOGIN", "alice", "10.00"]`.

use serde::ser::{Serialize, SerializeSeq, Serializer};

/// A command the controller sends to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusCommand {
    /// Ask the backend to check a login name: `["LOGIN", user]`.
    Login { user: String },

    /// Confirm a local password match: `["LOGIN", user, balance]`.
    LoginConfirmed { user: String, balance: String },

    /// Password attempts exhausted: `["LOGIN-DENIED", user]`.
    LoginDenied { user: String },

    /// The user logged out at the kiosk: `["LOGOUT"]`.
    Logout,
}

impl BusCommand {
    /// Bus tag of this command.
    pub fn tag(&self) -> &'static str {
        match self {
            BusCommand::Login { .. } | BusCommand::LoginConfirmed { .. } => "LOGIN",
            BusCommand::LoginDenied { .. } => "LOGIN-DENIED",
            BusCommand::Logout => "LOGOUT",
        }
    }

    /// Flatten into the frame sent on the bus.
    pub fn to_frame(&self) -> Vec<String> {
        let mut frame = vec![self.tag().to_string()];
        match self {
            BusCommand::Login { user } | BusCommand::LoginDenied { user } => {
                frame.push(user.clone());
            }
            BusCommand::LoginConfirmed { user, balance } => {
                frame.push(user.clone());
                frame.push(balance.clone());
            }
            BusCommand::Logout => {}
        }
        frame
    }
}

impl Serialize for BusCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let frame = self.to_frame();
        let mut seq = serializer.serialize_seq(Some(frame.len()))?;
        for part in &frame {
            seq.serialize_element(part)?;
        }
        seq.end()
    }
}

//! Inbound bus message decoding.
//!
//! The backend talks to the kiosk in query-string style URLs carried in a
//! few frame types:
//!
//! ```text
//! ["UI-OPEN",  "http://soda/index.php?msg=LOGGEDIN&login=alice&balance=10.00&TTL=60"]
//! ["MOZ-OPEN", "<url>"]
//! ["SYS-SET",  "MOZ-KIOSK", "real_location", _, "<url>"]
//! ```
//!
//! Decoding is fail-closed. Anything unexpected becomes
//! [`SessionEvent::Unrecognized`] and never an error returned to the
//! dispatcher.

use std::collections::BTreeMap;

use crate::error::EnvelopeError;
use crate::event::{LogoutReason, SessionEvent};

/// A decoded bus message: a tag and its key/value fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    tag: String,
    fields: BTreeMap<String, String>,
}

impl BusMessage {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Parse the query part of a URL. The tag is taken from `msg`, or from
    /// `message` when `msg` is absent. Pairs without `=` are skipped; values
    /// are taken verbatim.
    pub fn from_query(url: &str) -> Result<Self, EnvelopeError> {
        let query = url.split_once('?').map_or(url, |(_, q)| q);

        let fields: BTreeMap<String, String> = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let tag = fields
            .get("msg")
            .or_else(|| fields.get("message"))
            .cloned()
            .ok_or(EnvelopeError::MissingTag)?;

        Ok(Self { tag, fields })
    }

    /// Route an outer bus frame to its embedded URL and parse it.
    pub fn from_frame<S: AsRef<str>>(frame: &[S]) -> Result<Self, EnvelopeError> {
        let part = |i: usize| frame.get(i).map(AsRef::<str>::as_ref);

        match part(0) {
            Some("UI-OPEN") | Some("MOZ-OPEN") => match part(1) {
                Some(url) => Self::from_query(url),
                None => Err(EnvelopeError::MissingTag),
            },
            Some("SYS-SET") if part(1) == Some("MOZ-KIOSK") && part(2) == Some("real_location") => {
                match part(4) {
                    Some(url) => Self::from_query(url),
                    None => Err(EnvelopeError::MissingTag),
                }
            }
            other => Err(EnvelopeError::UnroutedFrame(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    fn require(&self, field: &'static str) -> Result<String, EnvelopeError> {
        match self.field(field) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(EnvelopeError::MissingField {
                tag: self.tag.clone(),
                field,
            }),
        }
    }

    fn require_ttl(&self) -> Result<u32, EnvelopeError> {
        let raw = self.require("TTL")?;
        raw.trim()
            .parse()
            .map_err(|_| EnvelopeError::InvalidField {
                tag: self.tag.clone(),
                field: "TTL",
                value: raw,
            })
    }
}

/// Decode a message into a typed event, reporting why it failed.
pub fn try_decode(message: &BusMessage) -> Result<SessionEvent, EnvelopeError> {
    let event = match message.tag() {
        "LOGGEDIN" => SessionEvent::LoginSucceeded {
            user: message.require("login")?,
            balance: message.require("balance")?,
            ttl: message.require_ttl()?,
        },
        "PASSWORD" => SessionEvent::PasswordChallenge {
            user: message.require("login")?,
            balance: message.require("balance")?,
            hash: message.require("hash")?,
            ttl: message.require_ttl()?,
        },
        "BOUGHT" => {
            // The buyer is named but the session already knows who it is.
            message.require("login")?;
            SessionEvent::PurchaseNotified {
                item: message.require("item")?,
                balance: message.require("balance")?,
                ttl: message.require_ttl()?,
            }
        }
        "LOGGEDOUT" => SessionEvent::RemoteLogout {
            reason: LogoutReason::LoggedOut,
        },
        "AUTOLOGGEDOUT" => SessionEvent::RemoteLogout {
            reason: LogoutReason::AutoLoggedOut,
        },
        "TIMEOUT" => SessionEvent::RemoteLogout {
            reason: LogoutReason::Timeout,
        },
        "LOGOUT" => SessionEvent::RemoteLogout {
            reason: LogoutReason::Logout,
        },
        other => return Err(EnvelopeError::UnknownTag(other.to_string())),
    };

    Ok(event)
}

/// Decode a message; failures become [`SessionEvent::Unrecognized`].
pub fn decode(message: &BusMessage) -> SessionEvent {
    try_decode(message).unwrap_or_else(unrecognized)
}

/// Decode a raw bus frame; failures become [`SessionEvent::Unrecognized`].
pub fn decode_frame<S: AsRef<str>>(frame: &[S]) -> SessionEvent {
    BusMessage::from_frame(frame)
        .and_then(|message| try_decode(&message))
        .unwrap_or_else(unrecognized)
}

fn unrecognized(error: EnvelopeError) -> SessionEvent {
    tracing::warn!(%error, "unrecognized bus message");
    SessionEvent::Unrecognized { error }
}

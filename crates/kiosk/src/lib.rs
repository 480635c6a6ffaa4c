//! # Kiosk
//!
//! Session controller for a self-service vending kiosk. It sequences
//! login, password challenge and purchase phases while events arrive from
//! the backend bus, the kiosk panel and a countdown timer.
//!
//! ## Core Concepts
//!
//! The controller separates **facts** from **intent**:
//! - [`SessionEvent`] = Facts (what happened: a bus message, a key press, a tick)
//! - [`BusCommand`] = Intent (what the backend should be told)
//! - [`RenderNotification`] = What the display should show
//!
//! ## Architecture
//!
//! ```text
//! Bus listener ─── decode_frame() ──┐
//!                                   │
//! Kiosk panel ──────────────────────┼──► ControllerHandle.post()
//!                                   │            │
//! SessionTimer ── Tick{epoch} ──────┘            ▼ mpsc (single consumer)
//!      ▲                                   Dispatcher loop
//!      │                                         │
//!      │                                         ▼
//!      │                              SessionMachine.decide()
//!      │                                         │
//!      │                                    Transition
//!      │                                         │
//!      └──────── start / stop ◄──────────────────┤
//!                                                ├──► watch<SessionSnapshot>
//!                                                ├──► RenderSink
//!                                                └──► CommandSink (bus)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One event in flight** - The dispatcher applies an event and all of
//!    its effects before dequeuing the next
//! 2. **The machine is pure** - No IO, no async; the session lives inside it
//! 3. **Timer runs iff Active** - Every exit from Active stops the timer
//!    before the next event is taken
//! 4. **Stale ticks are no-ops** - Ticks carry the epoch they were armed with
//! 5. **Fail closed** - Malformed bus messages become
//!    [`SessionEvent::Unrecognized`]; missing pairs in the transition table
//!    change nothing
//! 6. **Readers see snapshots** - Only committed, immutable
//!    [`SessionSnapshot`]s leave the dispatcher
//!
//! ## Example
//!
//! ```ignore
//! use kiosk_core::{ControllerBuilder, ControllerConfig, SessionEvent};
//!
//! let (handle, task) = ControllerBuilder::new(ControllerConfig::default())
//!     .with_command_sink(my_bus)
//!     .with_render_sink(my_display)
//!     .build()?
//!     .start()?;
//!
//! // Backend frames from the bus reader
//! kiosk_core::spawn_bus_listener(handle.clone(), bus_frames)?;
//!
//! // Key presses from the panel
//! handle.post(SessionEvent::UserRequestsLogin).await?;
//!
//! // Teardown
//! handle.shutdown().await?;
//! let last = task.await??;
//! ```

mod command;
mod config;
mod dispatch;
mod envelope;
mod error;
mod event;
mod machine;
mod password;
mod render;
mod retry;
mod session;
mod timer;

// Re-export event and command vocabulary
pub use command::BusCommand;
pub use event::{LogoutReason, SessionEvent};

// Re-export bus decoding
pub use envelope::{decode, decode_frame, try_decode, BusMessage};

// Re-export error types
pub use error::{EnvelopeError, KioskError, Result};

// Re-export configuration
pub use config::{
    ControllerConfig, DEFAULT_PASSWORD_LIMIT, DEFAULT_QUEUE_CAPACITY, DEFAULT_TICK_INTERVAL_MS,
};

// Re-export state machine types
pub use machine::{SessionMachine, TimerDirective, Transition};
pub use retry::RetryGuard;
pub use session::{SessionId, SessionSnapshot, SessionState};

// Re-export collaborator seams
pub use dispatch::{CommandSink, TracingCommandSink};
pub use password::{PasswordVerifier, SaltedSha256Verifier};
pub use render::{RenderNotification, RenderSink, TracingRenderSink};

// Re-export dispatcher types (primary entry point)
pub use dispatch::{spawn_bus_listener, Controller, ControllerBuilder, ControllerHandle};

// Re-export commonly used external types
pub use async_trait::async_trait;

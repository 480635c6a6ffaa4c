//! The session state machine.
//!
//! Pure decision logic: no IO, no async, no timers. [`SessionMachine::decide`]
//! applies one event and describes everything that must happen as a result
//! in a [`Transition`]; the dispatcher carries it out before taking the next
//! event.
//!
//! ```text
//! Idle ──UserRequestsLogin──► AwaitingLogin ──LoginSucceeded──────► Active
//!  ▲                              │                                  │  ▲
//!  │                              └─PasswordChallenge─► AwaitingPassword│
//!  │                                                      │  match ─────┘
//!  └──── exhausted / UserRequestsLogout / RemoteLogout ───┴──────────┘
//! ```
//!
//! A (state, event) pair with no row in the table is a no-op.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::command::BusCommand;
use crate::config::ControllerConfig;
use crate::event::SessionEvent;
use crate::password::PasswordVerifier;
use crate::render::RenderNotification;
use crate::session::{Session, SessionId, SessionSnapshot, SessionState};

/// What the dispatcher must do with the session timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDirective {
    /// Arm (or re-arm) the timer; ticks must carry `epoch`.
    Start { epoch: u64 },
    /// Disarm the timer. Idempotent.
    Stop,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub commands: SmallVec<[BusCommand; 2]>,
    pub renders: SmallVec<[RenderNotification; 2]>,
    pub timer: Option<TimerDirective>,
    mutated: bool,
}

impl Transition {
    fn ignored() -> Self {
        Self::default()
    }

    /// True when the session changed and a new snapshot is due.
    pub fn mutated(&self) -> bool {
        self.mutated
    }

    /// True when the event had no effect at all.
    pub fn is_noop(&self) -> bool {
        !self.mutated
            && self.commands.is_empty()
            && self.renders.is_empty()
            && self.timer.is_none()
    }
}

/// Holds the canonical session and applies events to it one at a time.
pub struct SessionMachine {
    session: Session,
    verifier: Arc<dyn PasswordVerifier>,
    password_limit: u32,
    logout_on_expiry: bool,
    timer_epoch: u64,
}

impl SessionMachine {
    pub fn new(config: &ControllerConfig, verifier: Arc<dyn PasswordVerifier>) -> Self {
        Self {
            session: Session::new(),
            verifier,
            password_limit: config.password_limit,
            logout_on_expiry: config.logout_on_expiry,
            timer_epoch: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Epoch the running timer was armed with, if the session is Active.
    pub fn armed_epoch(&self) -> Option<u64> {
        (self.session.state == SessionState::Active).then_some(self.timer_epoch)
    }

    /// Apply one event.
    pub fn decide(&mut self, event: SessionEvent) -> Transition {
        use SessionEvent as E;
        use SessionState as S;

        let from = self.session.state;
        let kind = event.kind();

        let transition = match (from, event) {
            (S::Idle, E::UserRequestsLogin) => self.enter_awaiting_login(),

            (S::AwaitingLogin, E::LoginSubmitted { user }) => {
                let user = user.trim();
                if user.is_empty() {
                    Transition::ignored()
                } else {
                    let mut t = Transition::ignored();
                    t.commands.push(BusCommand::Login {
                        user: user.to_string(),
                    });
                    t
                }
            }

            (S::AwaitingLogin, E::LoginSucceeded { user, balance, ttl }) => {
                self.session.user = Some(user);
                self.session.balance = Some(balance);
                self.enter_active(ttl)
            }

            (
                S::AwaitingLogin,
                E::PasswordChallenge {
                    user,
                    balance,
                    hash,
                    ttl,
                },
            ) => self.enter_awaiting_password(user, balance, hash, ttl),

            (S::AwaitingPassword, E::PasswordSubmitted { candidate }) => {
                self.submit_password(&candidate)
            }

            (S::Active, E::Tick { epoch }) => self.tick(epoch),

            (S::Active, E::PurchaseNotified { item, balance, ttl }) => {
                self.session.purchase_log.push(item.clone());
                self.session.balance = Some(balance.clone());
                self.session.remaining_seconds = ttl;
                let mut t = Transition {
                    mutated: true,
                    ..Transition::default()
                };
                t.renders.push(RenderNotification::Purchase { item, balance });
                t
            }

            (S::Active, E::UserRequestsLogout) => self.logout_locally(),

            (S::Active | S::AwaitingPassword | S::AwaitingLogin, E::RemoteLogout { reason }) => {
                tracing::info!(reason = reason.tag(), "backend ended session");
                self.enter_idle()
            }

            (_, E::Unrecognized { error }) => {
                tracing::debug!(%error, state = ?from, "dropping unrecognized event");
                Transition::ignored()
            }

            (_, E::Tick { epoch }) => {
                tracing::trace!(epoch, state = ?from, "tick outside active session");
                Transition::ignored()
            }

            _ => {
                tracing::debug!(event = kind, state = ?from, "no transition for event");
                Transition::ignored()
            }
        };

        if transition.mutated {
            self.session.revision += 1;
        }
        if self.session.state != from {
            tracing::info!(
                from = ?from,
                to = ?self.session.state,
                event = kind,
                session_id = ?self.session.id,
                "session transition"
            );
        }

        transition
    }

    fn enter_awaiting_login(&mut self) -> Transition {
        self.session.state = SessionState::AwaitingLogin;
        self.session.id = Some(SessionId::new());
        let mut t = Transition {
            mutated: true,
            ..Transition::default()
        };
        t.renders.push(RenderNotification::EnterAwaitingLogin);
        t
    }

    fn enter_awaiting_password(
        &mut self,
        user: String,
        balance: String,
        hash: String,
        ttl: u32,
    ) -> Transition {
        self.session.state = SessionState::AwaitingPassword;
        self.session.user = Some(user.clone());
        self.session.balance = Some(balance);
        self.session.password_hash = Some(hash);
        self.session.pending_ttl = ttl;
        self.session.attempts.reset(self.password_limit);

        let mut t = Transition {
            mutated: true,
            ..Transition::default()
        };
        t.renders
            .push(RenderNotification::EnterAwaitingPassword { user });
        t
    }

    fn submit_password(&mut self, candidate: &str) -> Transition {
        let user = self.session.user.clone().unwrap_or_default();
        let matched = self
            .session
            .password_hash
            .as_deref()
            .is_some_and(|hash| self.verifier.verify(candidate, hash));

        if matched {
            let balance = self.session.balance.clone().unwrap_or_default();
            self.session.password_hash = None;
            let ttl = self.session.pending_ttl;
            let mut t = self.enter_active(ttl);
            t.commands.insert(0, BusCommand::LoginConfirmed { user, balance });
            return t;
        }

        if self.session.attempts.fail() {
            tracing::debug!(
                remaining = self.session.attempts.remaining(),
                "password mismatch"
            );
            return Transition {
                mutated: true,
                ..Transition::default()
            };
        }

        tracing::warn!(user = %user, "password attempts exhausted");
        let mut t = self.enter_idle();
        t.commands.push(BusCommand::LoginDenied { user });
        t
    }

    fn enter_active(&mut self, ttl: u32) -> Transition {
        self.session.state = SessionState::Active;
        self.session.purchase_log.clear();
        self.session.remaining_seconds = ttl;
        self.timer_epoch += 1;

        let mut t = Transition {
            mutated: true,
            timer: Some(TimerDirective::Start {
                epoch: self.timer_epoch,
            }),
            ..Transition::default()
        };
        t.renders.push(RenderNotification::EnterActive {
            user: self.session.user.clone().unwrap_or_default(),
            balance: self.session.balance.clone().unwrap_or_default(),
            remaining_seconds: ttl,
        });
        t
    }

    fn tick(&mut self, epoch: u64) -> Transition {
        if epoch != self.timer_epoch {
            tracing::debug!(epoch, current = self.timer_epoch, "stale tick");
            return Transition::ignored();
        }

        let before = self.session.remaining_seconds;
        let remaining = before.saturating_sub(1);
        self.session.remaining_seconds = remaining;

        // Armed ticks keep firing at zero, so a session that entered or
        // was refreshed at TTL 0 still expires on its next tick.
        if self.logout_on_expiry && remaining == 0 {
            tracing::info!("session countdown expired");
            return self.logout_locally();
        }

        let mut t = Transition {
            mutated: remaining != before,
            ..Transition::default()
        };
        t.renders.push(RenderNotification::Tick {
            remaining_seconds: remaining,
        });
        t
    }

    fn logout_locally(&mut self) -> Transition {
        let mut t = self.enter_idle();
        t.commands.push(BusCommand::Logout);
        t
    }

    fn enter_idle(&mut self) -> Transition {
        self.session.reset_to_idle();
        let mut t = Transition {
            mutated: true,
            timer: Some(TimerDirective::Stop),
            ..Transition::default()
        };
        t.renders.push(RenderNotification::EnterIdle);
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogoutReason;

    fn machine() -> SessionMachine {
        machine_with(ControllerConfig::default())
    }

    fn machine_with(config: ControllerConfig) -> SessionMachine {
        let verifier = |candidate: &str, hash: &str| candidate == "right" && hash == "H";
        SessionMachine::new(&config, Arc::new(verifier))
    }

    fn challenge() -> SessionEvent {
        SessionEvent::PasswordChallenge {
            user: "alice".into(),
            balance: "10.00".into(),
            hash: "H".into(),
            ttl: 60,
        }
    }

    fn password(candidate: &str) -> SessionEvent {
        SessionEvent::PasswordSubmitted {
            candidate: candidate.into(),
        }
    }

    fn logged_in() -> SessionMachine {
        let mut m = machine();
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(SessionEvent::LoginSucceeded {
            user: "alice".into(),
            balance: "10.00".into(),
            ttl: 60,
        });
        m
    }

    fn tick(m: &SessionMachine) -> SessionEvent {
        SessionEvent::Tick {
            epoch: m.armed_epoch().unwrap(),
        }
    }

    #[test]
    fn full_password_scenario() {
        let mut m = machine();
        let mut commands = Vec::new();

        m.decide(SessionEvent::UserRequestsLogin);
        assert_eq!(m.state(), SessionState::AwaitingLogin);

        m.decide(challenge());
        assert_eq!(m.state(), SessionState::AwaitingPassword);
        assert_eq!(m.snapshot().remaining_attempts, Some(3));

        commands.extend(m.decide(password("wrong")).commands);
        assert_eq!(m.snapshot().remaining_attempts, Some(2));

        let t = m.decide(password("right"));
        assert_eq!(t.timer, Some(TimerDirective::Start { epoch: 1 }));
        commands.extend(t.commands);
        let snap = m.snapshot();
        assert_eq!(snap.state, SessionState::Active);
        assert_eq!(snap.user.as_deref(), Some("alice"));
        assert_eq!(snap.balance.as_deref(), Some("10.00"));
        assert_eq!(snap.remaining_seconds, Some(60));

        for _ in 0..5 {
            let ev = tick(&m);
            m.decide(ev);
        }
        assert_eq!(m.snapshot().remaining_seconds, Some(55));

        m.decide(SessionEvent::PurchaseNotified {
            item: "Coke".into(),
            balance: "9.00".into(),
            ttl: 60,
        });
        let snap = m.snapshot();
        assert_eq!(snap.remaining_seconds, Some(60));
        assert_eq!(snap.purchase_log, vec!["Coke".to_string()]);
        assert_eq!(snap.balance.as_deref(), Some("9.00"));

        let t = m.decide(SessionEvent::UserRequestsLogout);
        assert_eq!(t.timer, Some(TimerDirective::Stop));
        commands.extend(t.commands);
        assert_eq!(m.state(), SessionState::Idle);

        assert_eq!(
            commands,
            vec![
                BusCommand::LoginConfirmed {
                    user: "alice".into(),
                    balance: "10.00".into()
                },
                BusCommand::Logout,
            ]
        );
    }

    #[test]
    fn three_mismatches_deny_exactly_once() {
        let mut m = machine();
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(challenge());

        let mut denied = 0;
        for _ in 0..3 {
            let t = m.decide(password("wrong"));
            denied += t
                .commands
                .iter()
                .filter(|c| matches!(c, BusCommand::LoginDenied { .. }))
                .count();
        }
        assert_eq!(denied, 1);
        assert_eq!(m.state(), SessionState::Idle);
        let snap = m.snapshot();
        assert!(snap.user.is_none());
        assert!(snap.session_id.is_none());

        // A fourth submission has nowhere to go.
        assert!(m.decide(password("wrong")).is_noop());
    }

    #[test]
    fn success_on_last_but_one_attempt_and_guard_resets_next_time() {
        let mut m = machine();
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(challenge());
        m.decide(password("wrong"));
        m.decide(password("right"));
        assert_eq!(m.state(), SessionState::Active);

        m.decide(SessionEvent::RemoteLogout {
            reason: LogoutReason::LoggedOut,
        });
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(challenge());
        assert_eq!(m.snapshot().remaining_attempts, Some(3));
    }

    #[test]
    fn repeated_challenge_does_not_reset_attempts() {
        let mut m = machine();
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(challenge());
        m.decide(password("wrong"));

        assert!(m.decide(challenge()).is_noop());
        assert_eq!(m.snapshot().remaining_attempts, Some(2));
    }

    #[test]
    fn entering_active_clears_purchase_log() {
        let mut m = logged_in();
        m.decide(SessionEvent::PurchaseNotified {
            item: "Coke".into(),
            balance: "9.00".into(),
            ttl: 60,
        });
        m.decide(SessionEvent::UserRequestsLogout);
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(SessionEvent::LoginSucceeded {
            user: "bob".into(),
            balance: "1.00".into(),
            ttl: 30,
        });
        assert!(m.snapshot().purchase_log.is_empty());
    }

    #[test]
    fn tick_after_leaving_active_is_ignored() {
        let mut m = logged_in();
        let late = tick(&m);
        m.decide(SessionEvent::UserRequestsLogout);
        let before = m.snapshot();

        let t = m.decide(late);
        assert!(t.is_noop());
        assert_eq!(m.snapshot(), before);
    }

    #[test]
    fn tick_from_previous_sojourn_is_stale() {
        let mut m = logged_in();
        let late = tick(&m);
        m.decide(SessionEvent::UserRequestsLogout);
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(SessionEvent::LoginSucceeded {
            user: "alice".into(),
            balance: "10.00".into(),
            ttl: 60,
        });

        assert!(m.decide(late).is_noop());
        assert_eq!(m.snapshot().remaining_seconds, Some(60));
    }

    #[test]
    fn countdown_floors_at_zero_without_logout_by_default() {
        let mut m = machine();
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(SessionEvent::LoginSucceeded {
            user: "alice".into(),
            balance: "10.00".into(),
            ttl: 1,
        });
        for _ in 0..3 {
            let ev = tick(&m);
            let t = m.decide(ev);
            assert_eq!(
                t.renders.as_slice(),
                &[RenderNotification::Tick {
                    remaining_seconds: 0
                }]
            );
        }
        assert_eq!(m.state(), SessionState::Active);
        assert_eq!(m.snapshot().remaining_seconds, Some(0));
    }

    #[test]
    fn countdown_expiry_logs_out_when_enabled() {
        let mut m = machine_with(ControllerConfig::default().with_logout_on_expiry(true));
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(SessionEvent::LoginSucceeded {
            user: "alice".into(),
            balance: "10.00".into(),
            ttl: 2,
        });
        let ev = tick(&m);
        m.decide(ev);
        let ev = tick(&m);
        let t = m.decide(ev);
        assert_eq!(m.state(), SessionState::Idle);
        assert_eq!(t.commands.as_slice(), &[BusCommand::Logout]);
        assert_eq!(t.timer, Some(TimerDirective::Stop));
    }

    #[test]
    fn zero_ttl_login_expires_on_first_tick_when_enabled() {
        let mut m = machine_with(ControllerConfig::default().with_logout_on_expiry(true));
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(SessionEvent::LoginSucceeded {
            user: "alice".into(),
            balance: "10.00".into(),
            ttl: 0,
        });
        assert_eq!(m.state(), SessionState::Active);

        let ev = tick(&m);
        let t = m.decide(ev);
        assert_eq!(m.state(), SessionState::Idle);
        assert_eq!(t.commands.as_slice(), &[BusCommand::Logout]);
        assert_eq!(t.timer, Some(TimerDirective::Stop));
    }

    #[test]
    fn zero_ttl_purchase_expires_on_next_tick_when_enabled() {
        let mut m = machine_with(ControllerConfig::default().with_logout_on_expiry(true));
        m.decide(SessionEvent::UserRequestsLogin);
        m.decide(SessionEvent::LoginSucceeded {
            user: "alice".into(),
            balance: "10.00".into(),
            ttl: 60,
        });
        let epoch = m.armed_epoch().unwrap();
        m.decide(SessionEvent::PurchaseNotified {
            item: "Coke".into(),
            balance: "9.00".into(),
            ttl: 0,
        });
        assert_eq!(m.snapshot().remaining_seconds, Some(0));

        let t = m.decide(SessionEvent::Tick { epoch });
        assert_eq!(m.state(), SessionState::Idle);
        assert_eq!(t.commands.as_slice(), &[BusCommand::Logout]);
    }

    #[test]
    fn remote_logout_from_idle_is_idempotent() {
        let mut m = logged_in();
        let first = m.decide(SessionEvent::RemoteLogout {
            reason: LogoutReason::Timeout,
        });
        assert!(first.commands.is_empty());
        assert_eq!(m.state(), SessionState::Idle);

        for reason in [LogoutReason::AutoLoggedOut, LogoutReason::LoggedOut] {
            let t = m.decide(SessionEvent::RemoteLogout { reason });
            assert!(t.is_noop());
            assert_eq!(m.state(), SessionState::Idle);
        }
    }

    #[test]
    fn remote_logout_cancels_pending_phases() {
        let setups = [
            vec![SessionEvent::UserRequestsLogin],
            vec![SessionEvent::UserRequestsLogin, challenge()],
        ];
        for setup in setups {
            let mut m = machine();
            for ev in setup {
                m.decide(ev);
            }
            let t = m.decide(SessionEvent::RemoteLogout {
                reason: LogoutReason::Logout,
            });
            assert_eq!(m.state(), SessionState::Idle);
            assert!(t.commands.is_empty());
            assert_eq!(t.renders.as_slice(), &[RenderNotification::EnterIdle]);
        }
    }

    #[test]
    fn login_submission_requests_credential_check() {
        let mut m = machine();
        m.decide(SessionEvent::UserRequestsLogin);

        let t = m.decide(SessionEvent::LoginSubmitted {
            user: " alice ".into(),
        });
        assert_eq!(
            t.commands.as_slice(),
            &[BusCommand::Login {
                user: "alice".into()
            }]
        );
        assert!(!t.mutated());
        assert_eq!(m.state(), SessionState::AwaitingLogin);

        assert!(m
            .decide(SessionEvent::LoginSubmitted { user: "  ".into() })
            .is_noop());
    }

    #[test]
    fn session_id_spans_one_login() {
        let mut m = machine();
        assert!(m.session_id().is_none());
        m.decide(SessionEvent::UserRequestsLogin);
        let id = m.session_id().unwrap();
        m.decide(challenge());
        assert_eq!(m.session_id(), Some(id));
        m.decide(SessionEvent::RemoteLogout {
            reason: LogoutReason::Logout,
        });
        assert!(m.session_id().is_none());
    }

    fn random_event(rng: &mut fastrand::Rng, epoch: u64) -> SessionEvent {
        match rng.u8(0..10) {
            0 => SessionEvent::UserRequestsLogin,
            1 => SessionEvent::LoginSubmitted {
                user: "alice".into(),
            },
            2 => SessionEvent::LoginSucceeded {
                user: "alice".into(),
                balance: "5.00".into(),
                ttl: rng.u32(0..5),
            },
            3 => challenge(),
            4 => password(if rng.bool() { "right" } else { "wrong" }),
            5 => SessionEvent::Tick {
                epoch: if rng.bool() { epoch } else { rng.u64(0..4) },
            },
            6 => SessionEvent::PurchaseNotified {
                item: "Chips".into(),
                balance: "4.00".into(),
                ttl: 60,
            },
            7 => SessionEvent::UserRequestsLogout,
            8 => SessionEvent::RemoteLogout {
                reason: LogoutReason::AutoLoggedOut,
            },
            _ => SessionEvent::Unrecognized {
                error: crate::error::EnvelopeError::MissingTag,
            },
        }
    }

    #[test]
    fn random_sequences_keep_invariants() {
        let mut rng = fastrand::Rng::with_seed(0x50da);
        for _ in 0..200 {
            let mut m = machine();
            for _ in 0..100 {
                let before = m.snapshot();
                let log_before = m.session.purchase_log.clone();
                let attempts_before = m.session.attempts.remaining();
                let event = random_event(&mut rng, m.timer_epoch);
                let t = m.decide(event.clone());
                let after = m.snapshot();

                if t.is_noop() {
                    assert_eq!(before, after, "no-op mutated session on {event:?}");
                }
                if after.state == SessionState::Idle {
                    assert!(after.user.is_none());
                    assert!(m.session.password_hash.is_none());
                }
                match (before.state, after.state) {
                    (SessionState::Active, SessionState::Active) => {
                        assert!(m.session.purchase_log.starts_with(&log_before));
                    }
                    (_, SessionState::Active) => {}
                    _ => assert_eq!(m.session.purchase_log, log_before),
                }
                if before.state == SessionState::AwaitingPassword
                    && after.state == SessionState::AwaitingPassword
                {
                    assert!(m.session.attempts.remaining() <= attempts_before);
                }
                let timer_should_run = after.state == SessionState::Active;
                match t.timer {
                    Some(TimerDirective::Start { .. }) => assert!(timer_should_run),
                    Some(TimerDirective::Stop) => assert!(!timer_should_run),
                    None => assert_eq!(
                        before.state == SessionState::Active,
                        timer_should_run
                    ),
                }
            }
        }
    }
}

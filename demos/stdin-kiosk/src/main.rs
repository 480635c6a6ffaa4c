//! # Stdin Kiosk Demo
//!
//! Drives the kiosk controller from a terminal. Each input line is either a
//! bus frame (whitespace separated) or a panel action starting with `/`:
//!
//! ```text
//! /login
//! /user alice
//! UI-OPEN http://soda/index.php?msg=LOGGEDIN&login=alice&balance=10.00&TTL=60
//! UI-OPEN http://soda/index.php?msg=BOUGHT&login=alice&balance=9.00&TTL=60&item=Coke
//! /logout
//! /quit
//! ```
//!
//! Outbound bus commands are written to stdout as JSON arrays; display
//! updates and logs go to stderr.
//!
//! Usage: `stdin-kiosk-demo [--config <PATH>]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use kiosk_core::{
    BusCommand, CommandSink, ControllerBuilder, ControllerConfig, ControllerHandle,
    RenderNotification, RenderSink, SessionEvent, SessionSnapshot,
};
use tokio::io::{AsyncBufReadExt, BufReader};

// ============================================================================
// Collaborators
// ============================================================================

struct StdoutBus;

#[async_trait]
impl CommandSink for StdoutBus {
    async fn send(&self, command: BusCommand) -> Result<()> {
        println!("{}", serde_json::to_string(&command)?);
        Ok(())
    }
}

struct TerminalDisplay;

impl RenderSink for TerminalDisplay {
    fn render(&self, notification: &RenderNotification, snapshot: &SessionSnapshot) {
        let line = match notification {
            RenderNotification::EnterIdle => "[idle] press /login".to_string(),
            RenderNotification::EnterAwaitingLogin => "[login] enter /user <name>".to_string(),
            RenderNotification::EnterAwaitingPassword { user } => {
                format!("[password] password for {user}: /password <pw>")
            }
            RenderNotification::EnterActive {
                user,
                balance,
                remaining_seconds,
            } => format!("[active] user: {user}  balance: {balance}  time left: {remaining_seconds}"),
            RenderNotification::Tick { remaining_seconds } => {
                format!("[active] time left: {remaining_seconds}")
            }
            RenderNotification::Purchase { item, balance } => format!(
                "[active] bought {item}, balance {balance} ({} items this session)",
                snapshot.purchase_log.len()
            ),
        };
        eprintln!("{line}");
    }
}

// ============================================================================
// Input
// ============================================================================

enum Line {
    Event(SessionEvent),
    Frame(Vec<String>),
    Quit,
    Skip,
}

fn parse_line(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Skip;
    }

    let Some(action) = line.strip_prefix('/') else {
        return Line::Frame(line.split_whitespace().map(str::to_string).collect());
    };

    let (verb, arg) = action.split_once(' ').unwrap_or((action, ""));
    match verb {
        "login" => Line::Event(SessionEvent::UserRequestsLogin),
        "user" => Line::Event(SessionEvent::LoginSubmitted {
            user: arg.to_string(),
        }),
        "password" => Line::Event(SessionEvent::PasswordSubmitted {
            candidate: arg.to_string(),
        }),
        "logout" => Line::Event(SessionEvent::UserRequestsLogout),
        "quit" => Line::Quit,
        other => {
            tracing::warn!(action = other, "unknown panel action");
            Line::Skip
        }
    }
}

async fn feed_stdin(handle: &ControllerHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            Line::Event(event) => handle.post(event).await?,
            Line::Frame(frame) => handle.post_frame(frame.as_slice()).await?,
            Line::Quit => break,
            Line::Skip => {}
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "stdin-kiosk-demo")]
#[command(about = "Drive the kiosk session controller from a terminal", long_about = None)]
struct Args {
    /// JSON controller config; defaults are used when omitted
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ControllerConfig::default(),
    };

    let (handle, task) = ControllerBuilder::new(config)
        .with_command_sink(StdoutBus)
        .with_render_sink(TerminalDisplay)
        .build()?
        .start()?;

    eprintln!("[idle] press /login");
    let fed = feed_stdin(&handle).await;

    handle.shutdown().await.ok();
    let last = task.await.context("controller task panicked")??;
    tracing::info!(state = ?last.state, "kiosk stopped");

    fed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag_is_optional() {
        let args = Args::try_parse_from(["stdin-kiosk-demo"]).unwrap();
        assert!(args.config.is_none());

        let args = Args::try_parse_from(["stdin-kiosk-demo", "--config", "kiosk.json"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("kiosk.json")));
    }

    #[test]
    fn config_flag_without_value_is_rejected() {
        assert!(Args::try_parse_from(["stdin-kiosk-demo", "--config"]).is_err());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Args::try_parse_from(["stdin-kiosk-demo", "--verbose"]).is_err());
    }

    #[test]
    fn panel_actions_and_frames_are_told_apart() {
        assert!(matches!(
            parse_line("/login"),
            Line::Event(SessionEvent::UserRequestsLogin)
        ));
        assert!(matches!(parse_line("  "), Line::Skip));
        assert!(matches!(parse_line("/quit"), Line::Quit));
        match parse_line("UI-OPEN http://soda/?msg=LOGOUT") {
            Line::Frame(frame) => assert_eq!(frame, ["UI-OPEN", "http://soda/?msg=LOGOUT"]),
            _ => panic!("expected a frame"),
        }
    }
}

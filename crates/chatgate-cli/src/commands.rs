//! Command handlers for the chatgate CLI

use std::time::Duration;

use chatgate_core::{GateError, SessionId};
use chatgate_runtime::SessionRegistry;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::cli::Commands;
use crate::error::Result;
use crate::output;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against the registry
    pub async fn execute(command: Commands, registry: &SessionRegistry) -> Result<()> {
        match command {
            Commands::Interactive => Self::handle_interactive(registry).await,
            Commands::Info => output::ok(&registry.system_info()),
            Commands::Demo { sessions } => Self::handle_demo(registry, sessions).await,
        }
    }

    /// Read line commands from stdin until EOF or `quit`.
    ///
    /// Each line maps onto one registry operation and answers with one JSON
    /// envelope, so the mode is usable both by hand and from scripts.
    async fn handle_interactive(registry: &SessionRegistry) -> Result<()> {
        info!("interactive mode ready, type 'help' for commands");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "quit" | "exit") {
                break;
            }
            Self::dispatch_line(registry, line).await?;
        }

        registry.shutdown().await;
        Ok(())
    }

    async fn dispatch_line(registry: &SessionRegistry, line: &str) -> Result<()> {
        let mut parts = line.split_whitespace();
        // Non-empty by construction.
        let verb = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let result = match verb {
            "help" => {
                print_help();
                return Ok(());
            }
            "start" => Self::cmd_start(registry, &args),
            "list" => output::ok(&registry.list()),
            "info" => output::ok(&registry.system_info()),
            "qr" => Self::cmd_qr(registry, &args).await,
            "send" => Self::cmd_send(registry, &args).await,
            "send-media" => Self::cmd_send_media(registry, &args).await,
            "messages" => Self::cmd_messages(registry, &args).await,
            "status" => Self::cmd_status(registry, &args),
            "restore" => Self::cmd_restore(registry, &args).await,
            "destroy" => Self::cmd_destroy(registry, &args).await,
            other => {
                output::usage_error(&format!("unknown command '{}', try 'help'", other));
                return Ok(());
            }
        };
        result
    }

    fn cmd_start(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let id = args.first().map(|s| SessionId::new(*s));
        match registry.start_session(id) {
            Ok(outcome) => output::ok(&outcome),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    async fn cmd_qr(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let Some(id) = args.first() else {
            output::usage_error("usage: qr <session-id> [timeout-secs]");
            return Ok(());
        };
        let timeout = match args.get(1) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    output::usage_error("timeout must be a whole number of seconds");
                    return Ok(());
                }
            },
            None => None,
        };

        match registry.await_pairing(&SessionId::new(*id), timeout).await {
            Ok(outcome) => output::ok(&outcome),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    async fn cmd_send(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let (Some(id), Some(destination)) = (args.first(), args.get(1)) else {
            output::usage_error("usage: send <session-id> <destination> <message...>");
            return Ok(());
        };
        let body = args[2..].join(" ");
        if body.is_empty() {
            output::usage_error("usage: send <session-id> <destination> <message...>");
            return Ok(());
        }

        match registry
            .send_text(&SessionId::new(*id), destination, &body)
            .await
        {
            Ok(receipt) => output::ok(&receipt),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    async fn cmd_send_media(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let (Some(id), Some(destination), Some(path), Some(mime)) =
            (args.first(), args.get(1), args.get(2), args.get(3))
        else {
            output::usage_error(
                "usage: send-media <session-id> <destination> <file> <mime-type> [caption...]",
            );
            return Ok(());
        };
        let caption = if args.len() > 4 {
            Some(args[4..].join(" "))
        } else {
            None
        };

        // A bad path answers like any other command failure; the session
        // host must outlive it.
        let payload = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                output::io_error(&format!("cannot read media file '{}'", path), &err);
                return Ok(());
            }
        };
        let filename = std::path::Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        match registry
            .send_media(
                &SessionId::new(*id),
                destination,
                payload,
                mime,
                caption,
                filename,
            )
            .await
        {
            Ok(receipt) => output::ok(&receipt),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    async fn cmd_messages(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let Some(id) = args.first() else {
            output::usage_error("usage: messages <session-id>");
            return Ok(());
        };
        match registry.messages(&SessionId::new(*id)).await {
            Ok(messages) => output::ok(&messages),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    fn cmd_status(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let Some(id) = args.first() else {
            output::usage_error("usage: status <session-id>");
            return Ok(());
        };
        match registry.status(&SessionId::new(*id)) {
            Ok(status) => output::ok(&status),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    async fn cmd_restore(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let Some(id) = args.first() else {
            output::usage_error("usage: restore <session-id>");
            return Ok(());
        };
        match registry.restore(&SessionId::new(*id)).await {
            Ok(()) => output::ok(&json!({ "restored": id })),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    async fn cmd_destroy(registry: &SessionRegistry, args: &[&str]) -> Result<()> {
        let Some(id) = args.first() else {
            output::usage_error("usage: destroy <session-id>");
            return Ok(());
        };
        match registry.destroy(&SessionId::new(*id)).await {
            Ok(()) => output::ok(&json!({ "destroyed": id })),
            Err(err) => {
                output::gate_error(&err);
                Ok(())
            }
        }
    }

    /// Run sessions through create, pairing, connection and a send, then
    /// print the final summaries
    async fn handle_demo(registry: &SessionRegistry, sessions: usize) -> Result<()> {
        let count = sessions.max(1);
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            match registry.start_session(None) {
                Ok(outcome) => ids.push(outcome.id),
                Err(err) => {
                    output::gate_error(&err);
                    return Ok(());
                }
            }
        }

        for id in &ids {
            match registry.await_pairing(id, None).await {
                Ok(outcome) => {
                    info!(session = %id, ?outcome, "pairing outcome");
                }
                Err(err) => {
                    output::gate_error(&err);
                    return Ok(());
                }
            }
        }

        // Bounded by the grace delay plus headroom; simulated sessions
        // self-authenticate once it elapses.
        let deadline = registry.config().simulated_grace + Duration::from_secs(5);
        for id in &ids {
            if let Err(err) = wait_connected(registry, id, deadline).await {
                output::gate_error(&err);
                return Ok(());
            }
            match registry.send_text(id, "demo-destination", "hello from chatgate").await {
                Ok(receipt) => {
                    info!(session = %id, message = %receipt.message_id, "demo send accepted");
                }
                Err(err) => {
                    output::gate_error(&err);
                    return Ok(());
                }
            }
        }

        output::ok(&registry.list())?;
        registry.shutdown().await;
        Ok(())
    }
}

async fn wait_connected(
    registry: &SessionRegistry,
    id: &SessionId,
    deadline: Duration,
) -> std::result::Result<(), GateError> {
    tokio::time::timeout(deadline, async {
        loop {
            if registry.status(id)?.connected {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .map_err(|_| GateError::Timeout {
        duration_ms: deadline.as_millis() as u64,
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::{GateConfig, UnavailableTransport};
    use std::sync::Arc;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(UnavailableTransport), GateConfig::testing())
            .expect("testing config is valid")
    }

    #[tokio::test]
    async fn test_send_media_with_missing_file_keeps_host_alive() {
        let registry = registry();
        let id = registry.start_session(None).unwrap().id;

        // An unreadable path must answer with an envelope, not abort the
        // command loop.
        let line = format!("send-media {} dest /no/such/file image/png", id);
        let result = CommandDispatcher::dispatch_line(&registry, &line).await;
        assert!(result.is_ok());

        // The registry is still serving commands afterwards.
        assert_eq!(registry.list().len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_host_alive() {
        let registry = registry();
        let result = CommandDispatcher::dispatch_line(&registry, "frobnicate s1").await;
        assert!(result.is_ok());
        registry.shutdown().await;
    }
}

fn print_help() {
    println!("commands:");
    println!("  start [id]                                      create or report a session");
    println!("  list                                            list live sessions");
    println!("  qr <id> [timeout-secs]                          await the pairing payload");
    println!("  send <id> <dest> <message...>                   send a text message");
    println!("  send-media <id> <dest> <file> <mime> [caption]  send a media file");
    println!("  messages <id>                                   dump retained inbound messages");
    println!("  status <id>                                     full session status");
    println!("  restore <id>                                    recreate the session's transport");
    println!("  destroy <id>                                    tear the session down");
    println!("  info                                            environment capabilities");
    println!("  help                                            this text");
    println!("  quit                                            exit");
}

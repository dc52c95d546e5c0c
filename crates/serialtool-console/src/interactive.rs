//! Interactive line-oriented session
//!
//! Plain lines are sent as text. Lines starting with `:` are commands.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context};
use serialtool_core::codec::{format_hex_dump, DEFAULT_BYTES_PER_LINE};
use serialtool_core::session::{
    ConnectionEvent, DataEvent, OperationResult, PortConfiguration, ReceiveMode, Session,
};
use tokio::sync::broadcast::{self, error::RecvError};

const HELP: &str = "\
commands:
  <text>            send the line as text
  :hex <digits>     send hex bytes, e.g. :hex 01 02 FF
  :read             read buffered bytes (acknowledgment mode)
  :mode <mode>      switch to response or ack mode
  :dump             hex dump of everything received so far
  :close            close the port
  :open             reopen the port with the startup settings
  :help             show this help
  :quit             close and exit";

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Text(String),
    Hex(String),
    Read,
    Mode(ReceiveMode),
    Dump,
    Close,
    Open,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(Command::Text(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest.trim(), ""),
        };

        let command = match name {
            "hex" => Command::Hex(arg.to_string()),
            "read" => Command::Read,
            "mode" => Command::Mode(match arg.to_ascii_lowercase().as_str() {
                "response" | "resp" => ReceiveMode::Response,
                "ack" | "acknowledgment" => ReceiveMode::Acknowledgment,
                other => bail!("unknown receive mode '{}'", other),
            }),
            "dump" => Command::Dump,
            "close" => Command::Close,
            "open" => Command::Open,
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => bail!("unknown command ':{}' (try :help)", other),
        };
        Ok(command)
    }
}

type Received = Arc<Mutex<Vec<u8>>>;

fn record(received: &Received, bytes: &[u8]) {
    received
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .extend_from_slice(bytes);
}

fn report(result: &OperationResult) {
    if result.success {
        println!("ok: {}", result.message);
    } else {
        println!("error: {}", result.message);
    }
}

fn spawn_data_printer(
    mut rx: broadcast::Receiver<DataEvent>,
    received: Received,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console-rx".to_string())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => {
                    record(&received, &event.raw_bytes);
                    println!(
                        "[{}] RX {} | {}",
                        event.timestamp.format("%H:%M:%S%.3f"),
                        event.hex_text,
                        event.decoded_text.escape_debug()
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("dropped {} receive events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        })
}

fn spawn_status_printer(mut rx: broadcast::Receiver<ConnectionEvent>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console-status".to_string())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => {
                    let state = if event.connected { "connected" } else { "disconnected" };
                    println!(
                        "[{}] {}: {}",
                        event.timestamp.format("%H:%M:%S%.3f"),
                        state,
                        event.message
                    );
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        })
}

/// Open `config` on `session` and run the prompt until `:quit` or EOF
pub fn run(session: Session, config: PortConfiguration, mode: ReceiveMode) -> anyhow::Result<()> {
    let received: Received = Arc::default();
    let printers = [
        spawn_data_printer(session.subscribe_data(), Arc::clone(&received))
            .context("failed to start receive printer")?,
        spawn_status_printer(session.subscribe_status())
            .context("failed to start status printer")?,
    ];

    report(&session.set_receive_mode(mode));
    let opened = session.open(config.clone());
    if !opened.success {
        bail!("{}", opened.message);
    }
    println!("{} ({} mode), :help for commands", config, mode);

    let encoding = session.text_encoding();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };

        match command {
            Command::Text(text) => report(&session.send_text(&text, encoding)),
            Command::Hex(digits) => report(&session.send_hex(&digits)),
            Command::Read => {
                let outcome = session.read();
                if !outcome.success {
                    println!("error: {}", outcome.message);
                } else if outcome.is_empty() {
                    println!("{}", outcome.message);
                } else {
                    record(&received, &outcome.raw_bytes);
                    println!(
                        "RX {} | {}",
                        outcome.hex_text,
                        outcome.decoded_text.escape_debug()
                    );
                }
            }
            Command::Mode(mode) => report(&session.set_receive_mode(mode)),
            Command::Dump => {
                let bytes = received.lock().unwrap_or_else(PoisonError::into_inner);
                print!("{}", format_hex_dump(&bytes, DEFAULT_BYTES_PER_LINE));
            }
            Command::Close => report(&session.close()),
            Command::Open => report(&session.open(config.clone())),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
        }
        io::stdout().flush().ok();
    }

    session.dispose();
    // Dropping the session closes the event channels
    drop(session);
    for printer in printers {
        if printer.join().is_err() {
            tracing::warn!("printer thread panicked");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_line_is_text() {
        assert_eq!(
            Command::parse("AT+GMR").unwrap(),
            Command::Text("AT+GMR".to_string())
        );
    }

    #[test]
    fn test_hex_command_keeps_argument() {
        assert_eq!(
            Command::parse(":hex 01 02 FF").unwrap(),
            Command::Hex("01 02 FF".to_string())
        );
    }

    #[test]
    fn test_mode_command() {
        assert_eq!(
            Command::parse(":mode ack").unwrap(),
            Command::Mode(ReceiveMode::Acknowledgment)
        );
        assert_eq!(
            Command::parse(":mode Response").unwrap(),
            Command::Mode(ReceiveMode::Response)
        );
        assert!(Command::parse(":mode sometimes").is_err());
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::parse(":read").unwrap(), Command::Read);
        assert_eq!(Command::parse(":dump").unwrap(), Command::Dump);
        assert_eq!(Command::parse(":close").unwrap(), Command::Close);
        assert_eq!(Command::parse(":open").unwrap(), Command::Open);
        assert_eq!(Command::parse(":q").unwrap(), Command::Quit);
    }

    #[test]
    fn test_unknown_command() {
        let err = Command::parse(":frobnicate").unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }
}

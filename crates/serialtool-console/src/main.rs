//! SerialTool console
//!
//! Terminal front-end for manual serial link testing.

mod args;
mod interactive;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serialtool_core::session::{Session, SessionOptions};
use serialtool_core::transport::{LoopbackBackend, PortBackend, PortInfo, SystemBackend};
use tracing_subscriber::EnvFilter;

use crate::args::{EncodingArg, ModeArg, PortArgs};

#[derive(Parser, Debug)]
#[command(name = "serialtool", version, about = "Manual RS-232 serial link tester")]
struct Cli {
    /// Use in-memory loopback ports instead of real hardware
    #[arg(long, global = true)]
    loopback: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    Ports {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open a port and start an interactive session
    Open {
        #[command(flatten)]
        port: PortArgs,

        /// How received bytes are delivered
        #[arg(long, value_enum, default_value = "response")]
        mode: ModeArg,

        /// Text encoding for sent lines and decoded data
        #[arg(long, value_enum, default_value = "utf8")]
        encoding: EncodingArg,
    },
}

#[derive(Serialize)]
struct PortRow<'a> {
    name: &'a str,
    vid: Option<String>,
    pid: Option<String>,
    manufacturer: Option<&'a str>,
    product: Option<&'a str>,
    serial_number: Option<&'a str>,
}

impl<'a> From<&'a PortInfo> for PortRow<'a> {
    fn from(info: &'a PortInfo) -> Self {
        Self {
            name: &info.name,
            vid: info.vid.map(|v| format!("{:04x}", v)),
            pid: info.pid.map(|p| format!("{:04x}", p)),
            manufacturer: info.manufacturer.as_deref(),
            product: info.product.as_deref(),
            serial_number: info.serial_number.as_deref(),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn backend(loopback: bool, port: Option<&str>) -> Arc<dyn PortBackend> {
    if loopback {
        let backend = LoopbackBackend::with_ports(["LOOP0", "LOOP1"]);
        if let Some(name) = port {
            backend.add_port(name);
        }
        Arc::new(backend)
    } else {
        Arc::new(SystemBackend::new())
    }
}

fn list_ports(session: &Session, json: bool) -> anyhow::Result<()> {
    let ports = session.list_port_details();
    if json {
        let rows: Vec<PortRow<'_>> = ports.iter().map(PortRow::from).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in &ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  [{:04x}:{:04x}] {}",
                port.name,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}", port.name),
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Ports { json } => {
            let session = Session::new(backend(cli.loopback, None), SessionOptions::default());
            list_ports(&session, json)
        }
        Command::Open {
            port,
            mode,
            encoding,
        } => {
            let config = port.to_configuration()?;
            let options = SessionOptions {
                text_encoding: encoding.into(),
                ..SessionOptions::default()
            };
            let session = Session::new(backend(cli.loopback, Some(&port.port)), options);
            interactive::run(session, config, mode.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_subcommand() {
        let cli = Cli::try_parse_from([
            "serialtool",
            "open",
            "/dev/ttyUSB0",
            "--baud",
            "115200",
            "--parity",
            "even",
            "--stop-bits",
            "2",
            "--mode",
            "ack",
        ])
        .expect("open args should parse");

        match cli.command {
            Command::Open { port, mode, .. } => {
                assert_eq!(port.port, "/dev/ttyUSB0");
                assert_eq!(port.baud, 115200);
                assert_eq!(mode, ModeArg::Acknowledgment);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_out_of_range_data_bits() {
        let err = Cli::try_parse_from(["serialtool", "open", "COM3", "--data-bits", "9"])
            .expect_err("data bits 9 should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_global_loopback_flag() {
        let cli = Cli::try_parse_from(["serialtool", "ports", "--loopback", "--json"])
            .expect("ports args should parse");
        assert!(cli.loopback);
        assert!(matches!(cli.command, Command::Ports { json: true }));
    }

    #[test]
    fn loopback_backend_includes_requested_port() {
        let backend = backend(true, Some("LOOP7"));
        let names: Vec<String> = backend
            .available_ports()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["LOOP0", "LOOP1", "LOOP7"]);
    }
}

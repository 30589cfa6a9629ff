//! Operator console for rfgen instruments.
//!
//! Thin wrapper over `rfgen-core`: connect to a port, issue one command (or
//! watch telemetry), print the result, disconnect.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rfgen_core::monitor::Monitor;
use rfgen_core::program::ProgramClient;
use rfgen_core::protocol::Dispatcher;
use rfgen_core::rf::RfClient;

#[derive(Parser)]
#[command(name = "rfgen", version, about = "Serial console for benchtop RF signal generators")]
struct Cli {
    /// Serial port (e.g. /dev/ttyACM0 or COM3); not needed for `ports`
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Print machine-readable JSON where applicable
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List available serial ports
    Ports,
    /// Query the device identification string
    Idn,
    /// One-shot system status query
    Status,
    /// Poll telemetry and print each sample as it arrives
    Watch {
        /// Number of samples to print before exiting
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Set the output frequency in Hz
    Freq {
        /// Frequency in Hz (device accepts 10 MHz to 6 GHz)
        hz: u64,
    },
    /// Set the output power in dBm
    Power {
        /// Power in dBm (device accepts -20 to +15)
        dbm: i32,
    },
    /// Switch the RF output on or off
    Output {
        /// "on" or "off"
        #[arg(value_parser = parse_on_off)]
        state: bool,
    },
    /// Run the loaded program
    Run,
    /// Stop the running program
    Stop,
    /// Send an arbitrary command line and print the reply verbatim
    Send {
        /// Command line, without terminator (e.g. "PROG:LIST?")
        line: String,
    },
}

fn parse_on_off(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("expected 'on' or 'off', got {other:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Cmd::Ports = cli.command {
        for port in Dispatcher::list_ports() {
            match (&port.product, port.vid, port.pid) {
                (Some(product), Some(vid), Some(pid)) => {
                    println!("{}  {product} [{vid:04x}:{pid:04x}]", port.name)
                }
                _ => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let port = cli
        .port
        .context("--port is required for this command")?;
    let dispatcher = Dispatcher::new();
    if !dispatcher.connect(&port).await {
        bail!("failed to open {port}");
    }

    let result = dispatch(&cli.command, &dispatcher, cli.json).await;
    dispatcher.disconnect().await;
    result
}

async fn dispatch(command: &Cmd, dispatcher: &Dispatcher, json: bool) -> Result<()> {
    let rf = RfClient::new(dispatcher.clone());
    let programs = ProgramClient::new(dispatcher.clone());
    let monitor = Monitor::new(dispatcher.clone());

    match command {
        Cmd::Ports => unreachable!("handled before connecting"),
        Cmd::Idn => println!("{}", rf.identify().await?),
        Cmd::Status => {
            let status = monitor.status().await?;
            if json {
                let sample = rfgen_core::monitor::TelemetrySample::parse(&status);
                println!("{}", serde_json::to_string(&sample)?);
            } else {
                println!("{status}");
            }
        }
        Cmd::Watch { count } => {
            let mut events = monitor.subscribe();
            monitor.start();
            for _ in 0..*count {
                let sample = events.recv().await?;
                if json {
                    println!("{}", serde_json::to_string(&sample)?);
                } else {
                    println!(
                        "{}  {:5.1} °C  {:5.2} V  {:5.2} A",
                        sample.timestamp.format("%H:%M:%S"),
                        sample.temperature_c,
                        sample.voltage_v,
                        sample.current_a
                    );
                }
            }
            monitor.stop();
        }
        Cmd::Freq { hz } => rf.set_frequency(*hz).await?,
        Cmd::Power { dbm } => rf.set_power(*dbm).await?,
        Cmd::Output { state } => rf.set_output(*state).await?,
        Cmd::Run => programs.run().await?,
        Cmd::Stop => programs.stop().await?,
        Cmd::Send { line } => println!("{}", dispatcher.send_line(line).await?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_off_parsing() {
        assert_eq!(parse_on_off("on"), Ok(true));
        assert_eq!(parse_on_off("OFF"), Ok(false));
        assert!(parse_on_off("maybe").is_err());
    }
}

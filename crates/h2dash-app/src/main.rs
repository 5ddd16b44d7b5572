//! H2Dash - terminal dashboard for the hydrogen vehicle
//!
//! Polls the vehicle microcontroller over serial and renders the four
//! gauges (temperature, hydrogen concentration, sensor ratio, speed) as
//! text or JSON on a fixed render tick.
//!
//! # Usage
//!
//! ```bash
//! h2dash --port /dev/ttyACM0
//! h2dash demo --gradient "Purple-Pink"
//! h2dash ports
//! ```
//!
//! While running, type `gradient <index|name>` to recolor every gauge
//! (`gradient #rrggbb` builds a single-hue gradient), or `quit` to stop.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use h2dash_core::config::EngineConfig;
use h2dash_core::demo::DemoSimulator;
use h2dash_core::engine::{Engine, EngineEvent, Snapshot};
use h2dash_core::gauge::{Gradient, GradientPreset, GradientSelector, Rgb};
use h2dash_core::poller::PollLoop;
use h2dash_core::protocol::{list_ports, ChannelReader, MemoryChannel};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Width of the text gauge bar in cells
const BAR_WIDTH: usize = 20;

#[derive(Parser, Debug)]
#[command(name = "h2dash")]
#[command(about = "Hydrogen vehicle telemetry dashboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial device (e.g. /dev/ttyACM0 or COM4)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Serial read timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Poll interval in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// Render interval in milliseconds
    #[arg(long, global = true, default_value_t = 250)]
    render_ms: u64,

    /// Initial gradient (index or name)
    #[arg(short, long, global = true)]
    gradient: Option<String>,

    /// Print one JSON snapshot per render tick
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Read the configured serial port and render gauges (default)
    Run,

    /// Render gauges from the built-in vehicle simulator
    Demo {
        /// Simulator output period in milliseconds
        #[arg(long, default_value_t = 500)]
        feed_ms: u64,

        /// Fixed random seed for a reproducible drive
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List available serial ports
    Ports,

    /// List gradient presets
    Gradients,
}

impl Cli {
    /// Command-line flags win over file and environment settings
    fn apply_overrides(&self, config: &mut EngineConfig) {
        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(timeout) = self.timeout_ms {
            config.read_timeout_ms = timeout;
        }
        if let Some(interval) = self.interval_ms {
            config.poll_interval_ms = interval;
        }
        if let Some(gradient) = &self.gradient {
            config.gradient = gradient.clone();
        }
    }

    fn load_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        config.apply_env(std::env::vars())?;
        self.apply_overrides(&mut config);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => {
            let config = cli.load_config()?;
            let engine = Arc::new(Engine::from_config(&config)?);
            info!("Opening {} at {} baud", config.port, config.baud_rate);
            let poller = PollLoop::connect(Arc::clone(&engine), &config);
            run_dashboard(&cli, &config, engine, poller).await?;
        }
        Commands::Demo { feed_ms, seed } => {
            let config = cli.load_config()?;
            let engine = Arc::new(Engine::from_config(&config)?);
            let device = MemoryChannel::new();
            let simulator = match seed {
                Some(seed) => DemoSimulator::with_seed(*seed),
                None => DemoSimulator::new(),
            };

            let cancel = CancellationToken::new();
            let feed = tokio::spawn(simulator.feed(
                device.clone(),
                Duration::from_millis(*feed_ms),
                cancel.clone(),
            ));
            info!("Demo mode: simulator output every {feed_ms}ms");

            let reader = ChannelReader::from_channel(Box::new(device));
            let poller = PollLoop::new(Arc::clone(&engine), reader);
            let result = run_dashboard(&cli, &config, engine, poller).await;

            cancel.cancel();
            feed.await.context("Demo feed task failed")?;
            result?;
        }
        Commands::Ports => list_ports_command(cli.json)?,
        Commands::Gradients => list_gradients_command(cli.json)?,
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Render until `quit`, Ctrl-C, or the poll loop stopping on its own
async fn run_dashboard(
    cli: &Cli,
    config: &EngineConfig,
    engine: Arc<Engine>,
    poller: PollLoop,
) -> Result<()> {
    let mut events = engine.subscribe();
    let handle = poller.spawn(config.poll_interval());

    let mut render = tokio::time::interval(Duration::from_millis(cli.render_ms.max(1)));
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = render.tick() => print_snapshot(&engine.snapshot(), cli.json)?,
            event = events.recv() => match event {
                Ok(EngineEvent::GradientChanged) => print_snapshot(&engine.snapshot(), cli.json)?,
                Ok(EngineEvent::ReadFailed { reason }) => debug!("Tick failed: {reason}"),
                Ok(EngineEvent::Stopped) | Err(RecvError::Closed) => break,
                Ok(EngineEvent::Updated) => {}
                Err(RecvError::Lagged(missed)) => debug!("Renderer skipped {missed} events"),
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_console_command(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(ConsoleCommand::Gradient(selector))) => {
                        if let Err(e) = engine.select_gradient(&selector) {
                            eprintln!("{e}");
                        }
                    }
                    Ok(Some(ConsoleCommand::CustomGradient(base))) => {
                        engine.install_gradient(Gradient::ramp(base));
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{message}"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Console input closed: {e}");
                    stdin_open = false;
                }
            },
        }
    }

    let poller = handle.stop().await.context("Poll task failed")?;
    info!("Stopped in state {:?}", poller.state());
    Ok(())
}

/// Commands accepted on stdin while the dashboard runs
#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    Gradient(GradientSelector),
    CustomGradient(Rgb),
    Quit,
}

fn parse_console_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match word.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => Ok(Some(ConsoleCommand::Quit)),
        "gradient" | "g" if rest.trim_start().starts_with('#') => Rgb::from_css_hex(rest.trim())
            .map(|base| Some(ConsoleCommand::CustomGradient(base)))
            .map_err(|e| e.to_string()),
        "gradient" | "g" => rest
            .parse::<GradientSelector>()
            .map(|selector| Some(ConsoleCommand::Gradient(selector)))
            .map_err(|_| "usage: gradient <index|name|#rrggbb>".to_string()),
        other => Err(format!("Unknown command: {other}")),
    }
}

fn print_snapshot(snapshot: &Snapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("{}", render_text(snapshot));
    }
    Ok(())
}

fn render_bar(fraction: f64) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

/// Plain-text frame: a header line, then one row per gauge
fn render_text(snapshot: &Snapshot) -> String {
    let mut out = format!(
        "[{} {}]",
        snapshot.gradient,
        snapshot.base_color.to_css_hex()
    );
    if let Some(status) = &snapshot.status {
        out.push(' ');
        out.push_str(status);
    }
    for gauge in &snapshot.gauges {
        out.push_str(&format!(
            "\n  {:<13} {:>7} {:<5} [{}] {}",
            gauge.title,
            gauge.label,
            gauge.units,
            render_bar(gauge.fraction),
            gauge.color.to_css_hex()
        ));
    }
    out
}

fn list_ports_command(json: bool) -> Result<()> {
    let ports = list_ports();
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let usb = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!(" [{vid:04x}:{pid:04x}]"),
            _ => String::new(),
        };
        let product = port.product.or(port.manufacturer).unwrap_or_default();
        println!("{}{} {}", port.name, usb, product);
    }
    Ok(())
}

#[derive(Serialize)]
struct GradientInfo {
    index: usize,
    name: &'static str,
    base_color: String,
}

fn gradient_listing() -> Vec<GradientInfo> {
    GradientPreset::ALL
        .into_iter()
        .enumerate()
        .map(|(index, preset)| GradientInfo {
            index,
            name: preset.name(),
            base_color: preset.base_color().to_css_hex(),
        })
        .collect()
}

fn list_gradients_command(json: bool) -> Result<()> {
    let listing = gradient_listing();
    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }
    for info in listing {
        println!("{}  {:<13} {}", info.index, info.name, info.base_color);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use h2dash_core::metric::Metric;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["h2dash", "--port", "COM7", "--baud", "115200"]).unwrap();
        assert_eq!(cli.command, None);
        assert_eq!(cli.port.as_deref(), Some("COM7"));
        assert_eq!(cli.baud, Some(115200));
        assert_eq!(cli.render_ms, 250);

        let cli = Cli::try_parse_from(["h2dash", "demo", "--seed", "4", "--json"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Demo {
                feed_ms: 500,
                seed: Some(4)
            })
        );
        assert!(cli.json);

        assert!(Cli::try_parse_from(["h2dash", "--baud", "fast"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "h2dash",
            "--port",
            "/dev/ttyUSB1",
            "--interval-ms",
            "100",
            "--gradient",
            "3",
        ])
        .unwrap();
        let mut config = EngineConfig {
            port: "COM4".to_string(),
            baud_rate: 57600,
            ..EngineConfig::default()
        };
        cli.apply_overrides(&mut config);

        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.gradient, "3");
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(parse_console_command("  "), Ok(None));
        assert_eq!(parse_console_command("quit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(
            parse_console_command("gradient 2"),
            Ok(Some(ConsoleCommand::Gradient(GradientSelector::Index(2))))
        );
        assert_eq!(
            parse_console_command("gradient Red Orange"),
            Ok(Some(ConsoleCommand::Gradient(GradientSelector::Name(
                "Red Orange".to_string()
            ))))
        );
        assert_eq!(
            parse_console_command("gradient #00c864"),
            Ok(Some(ConsoleCommand::CustomGradient(Rgb::new(0, 200, 100))))
        );
        assert_eq!(
            parse_console_command("gradient #00c8"),
            Err("Invalid color: #00c8".to_string())
        );
        assert!(parse_console_command("gradient").is_err());
        assert!(parse_console_command("reboot").is_err());
    }

    #[test]
    fn test_render_bar() {
        assert_eq!(render_bar(0.0), ".".repeat(BAR_WIDTH));
        assert_eq!(render_bar(1.0), "#".repeat(BAR_WIDTH));
        assert_eq!(render_bar(0.5), format!("{}{}", "#".repeat(10), ".".repeat(10)));
        assert_eq!(render_bar(7.0), "#".repeat(BAR_WIDTH));
    }

    #[test]
    fn test_render_text_placeholders() {
        let engine = Engine::new().unwrap();
        let text = render_text(&engine.snapshot());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1 + Metric::COUNT);
        assert_eq!(lines[0], "[Blue-Black #1e90ff]");
        assert!(lines[1].contains("Temperature"));
        assert!(lines[1..].iter().all(|l| l.contains("--")));
    }

    #[test]
    fn test_render_text_values() {
        let engine = Engine::new().unwrap();
        engine.ingest_line("100 km/h");
        let snap = engine.snapshot();
        let text = render_text(&snap);
        let speed = text.lines().find(|l| l.contains("Speed")).unwrap();
        assert!(speed.contains("100"));
        assert!(speed.contains("km/h"));
        assert!(speed.contains(&render_bar(0.5)));
    }

    #[test]
    fn test_gradient_listing() {
        let listing = gradient_listing();
        let names: Vec<&str> = listing.iter().map(|g| g.name).collect();
        assert_eq!(
            names,
            vec!["Blue-Black", "Red-Orange", "Green-Yellow", "Purple-Pink"]
        );
        assert_eq!(listing[1].base_color, "#ff6600");
    }
}

//! Scanlink CLI
//!
//! Talks to GM65 and M3Y-W scanner modules: detection, version queries,
//! settings changes, baud rate control and barcode capture.

use anyhow::Context;
use clap::{Parser, Subcommand};
use scanlink_core::cli::output::{json_bytes, json_value};
use scanlink_core::cli::{format_bytes, print_exit_codes, CliResult, OutputFormat, UsageError};
use scanlink_core::core::protocol::FrameDecoder;
use scanlink_core::core::scanner::gm65::binary_qr_support;
use scanlink_core::{
    detect_among, list_ports, AppConfig, Deadline, Dialect, LightMode, Reply,
    Scanner, SerialConfig, SerialTransport, SettingsRegister,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Capture poll slice, bounds Ctrl+C latency
const CAPTURE_SLICE: Duration = Duration::from_millis(200);

/// Scanlink CLI
#[derive(Parser, Debug)]
#[command(
    name = "scanlink",
    version,
    about = "Driver for GM65 and M3Y-W serial barcode scanners",
    long_about = None
)]
struct Cli {
    /// Serial port (e.g., /dev/ttyUSB0, COM3)
    #[arg(short, long, global = true, env = "SCANLINK_PORT")]
    port: Option<String>,

    /// Initial baud rate
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Scanner dialect (GM65, M3Y-W); detected when omitted
    #[arg(short, long, global = true)]
    dialect: Option<Dialect>,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output (frame dumps)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find the scanner's dialect and baud rate
    Detect,
    /// Query the hardware version
    HwVersion,
    /// Query the software version
    SwVersion,
    /// Query the software year
    SwYear,
    /// Read the settings register
    GetSettings,
    /// Write the settings register (hex byte, not saved)
    SetSettings {
        /// Register value, e.g. 0x55
        value: String,
    },
    /// Persist the settings register
    SaveSettings,
    /// Illumination: off (-1), normal (0) or on (1)
    #[command(allow_negative_numbers = true)]
    SetIllumination {
        /// off, normal, on
        mode: LightMode,
    },
    /// Aimer: off (-1), normal (0) or on (1)
    #[command(allow_negative_numbers = true)]
    SetAimer {
        /// off, normal, on
        mode: LightMode,
    },
    /// Beeper: off (-1) or on (1)
    #[command(allow_negative_numbers = true)]
    SetBeeper {
        /// off, on
        mode: LightMode,
    },
    /// Pause between reads
    SetReadInterval {
        /// Seconds
        seconds: f64,
    },
    /// Suppress re-reads of the same barcode
    SetSameBarcodeDelay {
        /// Seconds
        seconds: f64,
    },
    /// Scan continuously
    ContinuousMode,
    /// Scan on host command only
    CommandMode,
    /// Change the baud rate of scanner and host
    SetBaudrate {
        /// New rate
        rate: u32,
    },
    /// Sweep baud rates for the configured dialect
    FindBaudrate,
    /// Send an opcode outside the command table
    SendRaw {
        /// Opcode bytes in hex
        hex: String,
    },
    /// Trigger scanning
    StartCapture,
    /// Stop scanning
    StopCapture,
    /// Scan and print barcodes until the window ends or Ctrl+C
    Capture {
        /// Window in seconds (default from config)
        #[arg(long)]
        duration: Option<f64>,
    },
    /// List available serial ports
    ListPorts,
    /// Print the exit code table
    ExitCodes,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let result = CliResult::from(&e);
            eprintln!("Error: {:#}", e);
            result.to_exit_code()
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::ListPorts => return print_ports(cli),
        Commands::ExitCodes => {
            print_exit_codes();
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli)?;
    debug!("Configuration: {:?}", config);

    if matches!(cli.command, Commands::Detect) {
        let transport = open_port(cli, &config)?;
        let dialects = cli.dialect.or(config.dialect).map_or_else(|| Dialect::all().to_vec(), |d| vec![d]);
        let (found, _) = detect_among(transport, &dialects, &config.baud_rates, config.timeouts)?;
        match cli.format {
            OutputFormat::Json => println!("{}", json_value(&found)),
            _ => println!("{}", found),
        }
        return Ok(());
    }

    let mut scanner = connect(cli, &config)?;
    let format = cli.format;

    match &cli.command {
        Commands::HwVersion => print_reply(format, "hardware version", &scanner.get_hardware_version()?),
        Commands::SwVersion => {
            let reply = scanner.get_software_version()?;
            print_reply(format, "software version", &reply);
            if scanner.dialect() == Dialect::Gm65 {
                if let [version] = reply.payload.as_slice() {
                    match binary_qr_support(*version) {
                        Some(true) => info!("Firmware {} reads binary QR codes", version),
                        Some(false) => warn!("Firmware {} is known to misread binary QR codes", version),
                        None => debug!("Binary QR support of firmware {} unknown", version),
                    }
                }
            }
        }
        Commands::SwYear => print_reply(format, "software year", &scanner.get_software_year()?),
        Commands::GetSettings => print_settings(format, scanner.get_settings()?),
        Commands::SetSettings { value } => {
            let raw = parse_hex_byte(value)?;
            print_reply(format, "set settings", &scanner.set_settings(SettingsRegister::new(raw))?);
        }
        Commands::SaveSettings => print_reply(format, "save settings", &scanner.save_settings()?),
        Commands::SetIllumination { mode } => {
            print_reply(format, "set illumination", &scanner.set_illumination(*mode)?);
        }
        Commands::SetAimer { mode } => print_reply(format, "set aimer", &scanner.set_aimer(*mode)?),
        Commands::SetBeeper { mode } => print_reply(format, "set beeper", &scanner.set_beeper(*mode)?),
        Commands::SetReadInterval { seconds } => {
            print_reply(format, "set read interval", &scanner.set_read_interval(*seconds)?);
        }
        Commands::SetSameBarcodeDelay { seconds } => {
            print_reply(format, "set same barcode delay", &scanner.set_same_barcode_delay(*seconds)?);
        }
        Commands::ContinuousMode => {
            print_reply(format, "continuous mode", &scanner.enter_continuous_mode()?);
        }
        Commands::CommandMode => print_reply(format, "command mode", &scanner.enter_command_mode()?),
        Commands::SetBaudrate { rate } => {
            print_reply(format, "set baud rate", &scanner.set_baudrate(*rate)?);
        }
        Commands::FindBaudrate => match scanner.find_baudrate(&config.baud_rates)? {
            Some(rate) => match format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "baud_rate": rate })),
                _ => println!("{}", rate),
            },
            None => return Err(scanlink_core::ScannerError::NoDeviceFound.into()),
        },
        Commands::SendRaw { hex } => {
            let opcode = parse_hex(hex)?;
            print_reply(format, "raw", &scanner.send_raw(&opcode)?);
        }
        Commands::StartCapture => print_reply(format, "start scan", &scanner.start_scan()?),
        Commands::StopCapture => print_reply(format, "stop scan", &scanner.stop_scan()?),
        Commands::Capture { duration } => {
            let window = match duration {
                Some(secs) if secs.is_finite() && *secs > 0.0 => Duration::from_secs_f64(*secs),
                Some(secs) => {
                    return Err(UsageError(format!("Invalid capture duration: {secs}")).into());
                }
                None => config.timeouts.capture(),
            };
            capture(&mut scanner, format, window)?;
        }
        Commands::Detect | Commands::ListPorts | Commands::ExitCodes => {}
    }

    Ok(())
}

fn open_port(cli: &Cli, config: &AppConfig) -> anyhow::Result<SerialTransport> {
    let port = cli
        .port
        .clone()
        .or_else(|| config.port.clone())
        .ok_or_else(|| UsageError("No serial port given (use --port or set `port` in the config)".into()))?;
    let baud = cli.baud.unwrap_or(config.baud_rate);

    let transport = SerialTransport::open(SerialConfig::new(&port, baud))?;
    info!("Opened {}", transport.connection_info());
    Ok(transport)
}

/// Open the port and settle on a dialect, detecting when none is configured
fn connect(cli: &Cli, config: &AppConfig) -> anyhow::Result<Scanner<SerialTransport>> {
    let transport = open_port(cli, config)?;
    match cli.dialect.or(config.dialect) {
        Some(dialect) => Ok(Scanner::new(transport, dialect).with_timeouts(config.timeouts)),
        None => {
            let (found, scanner) = detect_among(transport, Dialect::all(), &config.baud_rates, config.timeouts)
                .context("Scanner detection failed")?;
            info!("Using {}", found);
            Ok(scanner)
        }
    }
}

fn parse_hex(text: &str) -> anyhow::Result<Vec<u8>> {
    let cleaned: String = text
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).map_err(|e| UsageError(format!("Invalid hex '{text}': {e}")).into())
}

fn parse_hex_byte(text: &str) -> anyhow::Result<u8> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| UsageError(format!("Invalid register value '{text}': {e}")).into())
}

fn print_reply(format: OutputFormat, what: &str, reply: &Reply) {
    match format {
        OutputFormat::Text => {
            println!("{}: {}", what, format_bytes(&reply.payload, OutputFormat::Text));
            if !reply.skipped.is_empty() {
                println!("skipped: {}", format_bytes(&reply.skipped, OutputFormat::Text));
            }
            if !reply.leftover.is_empty() {
                println!("extra: {}", format_bytes(&reply.leftover, OutputFormat::Text));
            }
        }
        OutputFormat::Hex => println!("{}", hex::encode(&reply.payload)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "command": what,
                "payload": json_bytes(&reply.payload),
                "leftover": json_bytes(&reply.leftover),
                "skipped": json_bytes(&reply.skipped),
            })
        ),
    }
}

fn print_settings(format: OutputFormat, settings: SettingsRegister) {
    match format {
        OutputFormat::Text => println!("{}", settings),
        OutputFormat::Hex => println!("{:02x}", settings.raw()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({
                "raw": settings.raw(),
                "mode": settings.scan_mode().to_string(),
                "illumination": format!("{:?}", settings.illumination()),
                "aimer": format!("{:?}", settings.aimer()),
                "beeper": settings.beeper(),
            })
        ),
    }
}

fn print_ports(cli: &Cli) -> anyhow::Result<()> {
    let ports = list_ports()?;

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ if ports.is_empty() => {
            if !cli.quiet {
                eprintln!("No serial ports found.");
            }
        }
        _ => {
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }
    Ok(())
}

/// Print raw barcode output as it arrives
fn emit_data(format: OutputFormat, data: &[u8]) -> std::io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let mut stdout = std::io::stdout().lock();
    match format {
        OutputFormat::Text => stdout.write_all(data)?,
        OutputFormat::Hex => writeln!(stdout, "{}", hex::encode(data))?,
        OutputFormat::Json => writeln!(stdout, "{}", serde_json::json!({ "data": json_bytes(data) }))?,
    }
    stdout.flush()
}

fn emit_frames(format: OutputFormat, frames: &[Vec<u8>]) {
    for frame in frames {
        match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "frame": json_bytes(frame) })),
            _ => debug!("In-stream frame: {}", hex::encode(frame)),
        }
    }
}

fn capture(scanner: &mut Scanner<SerialTransport>, format: OutputFormat, window: Duration) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let started = scanner.start_scan()?;
    info!("Capturing for {:.1}s, Ctrl+C to stop", window.as_secs_f64());

    let mut decoder = FrameDecoder::new(scanner.descriptor());
    emit_data(format, &started.skipped)?;
    emit_frames(format, &decoder.push(&started.leftover));
    let end = Deadline::after(window);

    let collected = loop {
        if end.is_expired() || !running.load(Ordering::SeqCst) {
            break Ok(());
        }
        let slice = Deadline::at(end.instant().min(Instant::now() + CAPTURE_SLICE));
        match scanner.collect_frames(&mut decoder, &slice) {
            Ok(frames) => emit_frames(format, &frames),
            Err(e) => break Err(e),
        }
        emit_data(format, &decoder.take_discarded())?;
    };

    if let Err(e) = scanner.stop_scan() {
        warn!("Failed to stop scanning: {}", e);
    }
    collected?;

    emit_data(format, &decoder.take_discarded())?;
    emit_data(format, decoder.pending())?;
    Ok(())
}

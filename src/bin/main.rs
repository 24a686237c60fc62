//! CLI binary for the DG-200 library
//!
//! This is the controlling surface: it parses arguments, opens a session and
//! prints what the library returns.

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dg200::{
    connect_with, ClearStatus, Configuration, InfoType, Progress, RetryPolicy, SerialTransport,
    Session, SessionOptions, TrackSession,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: &str = "/dev/ttyUSB0";

fn cli() -> Command {
    let list = Command::new("list").about("List the recorded sessions");
    #[cfg(feature = "json")]
    let list = list.arg(
        Arg::new("json")
            .long("json")
            .help("Print the listing as JSON")
            .action(ArgAction::SetTrue),
    );
    #[cfg(feature = "csv")]
    let list = list.arg(
        Arg::new("csv")
            .long("csv")
            .help("Also write the listing to a CSV file")
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf)),
    );

    let config = Command::new("config").about("Show the logger configuration");
    #[cfg(feature = "json")]
    let config = config.arg(
        Arg::new("json")
            .long("json")
            .help("Print the configuration as JSON")
            .action(ArgAction::SetTrue),
    );

    Command::new("dg200")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(concat!(
            env!("CARGO_PKG_VERSION"),
            " (",
            env!("VERGEN_GIT_SHA"),
            ", built ",
            env!("VERGEN_BUILD_DATE"),
            ")"
        ))
        .about("Download tracks from a GlobalSat DG-200 datalogger and manage its settings.")
        .subcommand_required(true)
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .help("Serial port the logger is attached to")
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .help("Serial baud rate")
                .value_parser(value_parser!(u32))
                .default_value("230400")
                .global(true),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .help("Read timeout for every serial read")
                .value_parser(value_parser!(u64))
                .default_value("1000")
                .global(true),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .help("Frame reads allowed while the device is busy or checksums fail")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("8")
                .global(true),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Enable debug output (frame traces with RUST_LOG=dg200=trace)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("detect").about("Find serial ports with a DG-200 attached"))
        .subcommand(Command::new("identify").about("Print the device identification payload"))
        .subcommand(config)
        .subcommand(
            Command::new("set-config")
                .about("Change logger settings; unspecified settings are kept")
                .arg(
                    Arg::new("info-type")
                        .long("info-type")
                        .help("Record position only, or position and altitude")
                        .value_parser(["position", "altitude"]),
                )
                .arg(
                    Arg::new("by-time")
                        .long("by-time")
                        .help("Log a point every time interval")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("by-distance"),
                )
                .arg(
                    Arg::new("by-distance")
                        .long("by-distance")
                        .help("Log a point every distance interval")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("time-interval")
                        .long("time-interval")
                        .help("Seconds between points")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("distance-interval")
                        .long("distance-interval")
                        .help("Meters between points")
                        .value_name("METERS")
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("speed-threshold")
                        .long("speed-threshold")
                        .help("Only log above this speed (km/h); enables the threshold")
                        .value_name("KMH")
                        .value_parser(value_parser!(u32))
                        .conflicts_with("no-speed-threshold"),
                )
                .arg(
                    Arg::new("no-speed-threshold")
                        .long("no-speed-threshold")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("distance-threshold")
                        .long("distance-threshold")
                        .help("Only log after moving this far (m); enables the threshold")
                        .value_name("METERS")
                        .value_parser(value_parser!(u32))
                        .conflicts_with("no-distance-threshold"),
                )
                .arg(
                    Arg::new("no-distance-threshold")
                        .long("no-distance-threshold")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("waas")
                        .long("waas")
                        .help("Enable or disable WAAS")
                        .value_parser(["on", "off"]),
                ),
        )
        .subcommand(list)
        .subcommand(
            Command::new("download")
                .about("Download sessions as GPX files")
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .short('o')
                        .help("Directory for GPX files (default: current directory)")
                        .value_name("DIR")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("."),
                )
                .arg(
                    Arg::new("sessions")
                        .help("Session numbers from `list` (default: all)")
                        .value_parser(value_parser!(usize))
                        .num_args(0..),
                ),
        )
        .subcommand(
            Command::new("clear").about("Erase every track on the device").arg(
                Arg::new("yes")
                    .long("yes")
                    .help("Confirm the erase")
                    .action(ArgAction::SetTrue),
            ),
        )
}

fn init_logging(debug: bool) {
    let default_level = if debug { "dg200=debug" } else { "dg200=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn session_options(matches: &ArgMatches) -> SessionOptions {
    let retries = *matches.get_one::<u32>("retries").unwrap_or(&8);
    SessionOptions {
        baud_rate: *matches.get_one::<u32>("baud").unwrap_or(&dg200::DEFAULT_BAUD),
        read_timeout: Duration::from_millis(*matches.get_one::<u64>("timeout-ms").unwrap_or(&1000)),
        retry: RetryPolicy {
            max_attempts: retries,
            ..RetryPolicy::default()
        },
    }
}

fn open(matches: &ArgMatches) -> Result<Session<SerialTransport>> {
    let port = matches
        .get_one::<String>("port")
        .map(String::as_str)
        .unwrap_or(DEFAULT_PORT);
    connect_with(port, session_options(matches)).with_context(|| format!("Failed to open {port}"))
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("debug"));

    match matches.subcommand() {
        Some(("detect", _)) => detect(&matches),
        Some(("identify", _)) => {
            let id = open(&matches)?.identify()?;
            println!("Device identification: {}", hex(&id));
            Ok(())
        }
        Some(("config", sub)) => show_config(&matches, sub),
        Some(("set-config", sub)) => set_config(&matches, sub),
        Some(("list", sub)) => list(&matches, sub),
        Some(("download", sub)) => download(&matches, sub),
        Some(("clear", sub)) => clear(&matches, sub),
        _ => unreachable!("subcommand_required is set"),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn detect(matches: &ArgMatches) -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    let mut options = session_options(matches);
    options.retry.max_attempts = options.retry.max_attempts.min(2);

    let mut found = 0;
    for port in ports {
        let name = port.port_name;
        let responded = connect_with(&name, options.clone()).and_then(|mut s| s.identify());
        match responded {
            Ok(id) => {
                println!("{name}: DG-200 ({})", hex(&id));
                found += 1;
            }
            Err(e) => tracing::debug!(port = %name, error = %e, "no logger"),
        }
    }

    if found == 0 {
        bail!("No DG-200 found on any serial port");
    }
    Ok(())
}

fn print_config(config: &Configuration) {
    let info = match config.info_type {
        InfoType::Position => "position, time, date, speed".to_string(),
        InfoType::PositionAltitude => "position, time, date, speed, altitude".to_string(),
        InfoType::Other(b) => format!("unknown ({b})"),
    };
    println!("Information type:   {info}");
    if config.by_distance {
        println!("Interval:           every {} m", config.distance_interval);
    } else {
        println!("Interval:           every {} s", config.time_interval_seconds());
    }
    if config.speed_threshold_disabled {
        println!("Speed threshold:    disabled");
    } else {
        println!("Speed threshold:    {} km/h", config.speed_threshold);
    }
    if config.distance_threshold_disabled {
        println!("Distance threshold: disabled");
    } else {
        println!("Distance threshold: {} m", config.distance_threshold);
    }
    println!("WAAS:               {}", if config.waas_enabled { "on" } else { "off" });
    println!("Memory usage:       {}%", config.memory_usage_percent);
}

fn show_config(matches: &ArgMatches, _sub: &ArgMatches) -> Result<()> {
    let config = open(matches)?.configuration()?;

    #[cfg(feature = "json")]
    if _sub.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    print_config(&config);
    Ok(())
}

fn apply_overrides(mut config: Configuration, sub: &ArgMatches) -> Configuration {
    if let Some(kind) = sub.get_one::<String>("info-type") {
        config.info_type = if kind == "altitude" {
            InfoType::PositionAltitude
        } else {
            InfoType::Position
        };
    }
    if sub.get_flag("by-time") {
        config.by_distance = false;
    }
    if sub.get_flag("by-distance") {
        config.by_distance = true;
    }
    if let Some(&seconds) = sub.get_one::<u32>("time-interval") {
        config.time_interval_ms = seconds.saturating_mul(1000);
    }
    if let Some(&meters) = sub.get_one::<u32>("distance-interval") {
        config.distance_interval = meters;
    }
    if let Some(&kmh) = sub.get_one::<u32>("speed-threshold") {
        config.speed_threshold = kmh;
        config.speed_threshold_disabled = false;
    }
    if sub.get_flag("no-speed-threshold") {
        config.speed_threshold_disabled = true;
    }
    if let Some(&meters) = sub.get_one::<u32>("distance-threshold") {
        config.distance_threshold = meters;
        config.distance_threshold_disabled = false;
    }
    if sub.get_flag("no-distance-threshold") {
        config.distance_threshold_disabled = true;
    }
    if let Some(waas) = sub.get_one::<String>("waas") {
        config.waas_enabled = waas == "on";
    }
    config
}

fn set_config(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let mut session = open(matches)?;
    let current = session.configuration()?;
    let wanted = apply_overrides(current.clone(), sub);
    if wanted == current {
        println!("Nothing to change.");
        print_config(&current);
        return Ok(());
    }

    let applied = session.set_configuration(&wanted)?;
    println!("Configuration written.");
    print_config(&applied);
    Ok(())
}

fn print_sessions(sessions: &[TrackSession]) {
    if sessions.is_empty() {
        println!("No tracks stored.");
        return;
    }
    println!("{:>4}  {:<8}  {:<8}  {:>5}", "#", "Date", "Time", "Parts");
    for (number, session) in sessions.iter().enumerate() {
        println!(
            "{:>4}  {:<8}  {:<8}  {:>5}",
            number + 1,
            session.date,
            session.time,
            session.component_count()
        );
    }
}

fn list(matches: &ArgMatches, _sub: &ArgMatches) -> Result<()> {
    let sessions = open(matches)?.sessions()?;

    #[cfg(feature = "csv")]
    if let Some(path) = _sub.get_one::<PathBuf>("csv") {
        dg200::export_sessions_to_csv(path, &sessions)?;
    }

    #[cfg(feature = "json")]
    if _sub.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    print_sessions(&sessions);
    Ok(())
}

fn download(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    let output_dir = sub
        .get_one::<PathBuf>("output-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let mut session = open(matches)?;
    let sessions = session.sessions()?;

    let selected: Vec<usize> = match sub.get_many::<usize>("sessions") {
        Some(numbers) => numbers.copied().collect(),
        None => (1..=sessions.len()).collect(),
    };
    let mut tracks = Vec::with_capacity(selected.len());
    for number in selected {
        let Some(found) = number.checked_sub(1).and_then(|i| sessions.get(i)) else {
            bail!("No session {number}; the device holds {}", sessions.len());
        };
        tracks.push(found.indices.clone());
    }
    if tracks.is_empty() {
        println!("No tracks stored.");
        return Ok(());
    }

    let report = session.download(&tracks, &output_dir, |p: Progress| {
        eprint!("\rDownloading... {:>3.0}%", p.fraction() * 100.0);
        let _ = std::io::stderr().flush();
    })?;
    eprintln!();

    for track in &report.tracks {
        match &track.path {
            Some(path) => println!("Wrote {} points to {}", track.points, path.display()),
            None => println!("No points for components {:?}", track.indices),
        }
        for failure in &track.failures {
            eprintln!("Warning: component {} skipped: {}", failure.index, failure.error);
        }
    }
    println!(
        "{} file(s) written, {} component(s) skipped",
        report.files_written(),
        report.failure_count()
    );
    report
        .refresh
        .context("Download finished, but the device did not answer the configuration query")?;
    Ok(())
}

fn clear(matches: &ArgMatches, sub: &ArgMatches) -> Result<()> {
    if !sub.get_flag("yes") {
        bail!("Refusing to erase the device without --yes");
    }
    let report = open(matches)?.clear_memory()?;
    match report.status {
        ClearStatus::Cleared => println!("Memory cleared."),
        ClearStatus::Rejected(code) => eprintln!("Device reported status {code}; memory may not be cleared."),
    }
    let config = report
        .refresh
        .context("Memory erase sent, but the device did not answer the configuration query")?;
    println!("Memory usage: {}%", config.memory_usage_percent);
    Ok(())
}

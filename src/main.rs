use clap::Parser;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use packetwatch::capture::{CaptureSession, PcapSource, READ_TIMEOUT_MS};
use packetwatch::device::{self, Device, Resolution};
use packetwatch::error::PacketWatchError;
use packetwatch::logging;
use packetwatch::session::{Session, HELP};
use packetwatch::settings::SettingsStore;

/// Live TCP traffic inspector with watch-rule highlighting.
#[derive(Parser, Debug)]
#[command(name = "packetwatch", version, about, long_about = None)]
struct Cli {
    /// Settings file (default: <program-name>.json in the working directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture on the interface owning this IPv4 address, for this run only.
    #[arg(short, long)]
    device: Option<Ipv4Addr>,

    /// Capture filter for this run only.
    #[arg(short, long)]
    filter: Option<String>,

    /// Diagnostic log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Diagnostic log format (pretty, json).
    #[arg(long, default_value = "pretty")]
    log_format: String,

    /// Print the capture-capable interfaces and exit.
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("{e}");
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "packetwatch terminated");
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), PacketWatchError> {
    let store = match cli.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::for_program(&program_name()),
    };
    let mut settings = store.load().await?;
    tracing::info!(path = %store.path().display(), "settings loaded");
    if let Some(ip) = cli.device {
        settings.device_ip = Some(ip);
    }
    if let Some(filter) = cli.filter {
        settings.filter = Some(filter);
    }

    let devices = device::enumerate()?;
    if cli.list_devices {
        print_devices(&devices);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let device = match device::resolve(&devices, settings.device_ip)? {
        Resolution::Resolved(device) => {
            if let Some(addr) = device.first_ipv4() {
                println!("Found device for {addr}!");
            }
            device.clone()
        }
        Resolution::Prompt => prompt_for_device(&devices, &mut lines).await?,
    };

    println!("opening {}", device.friendly_name);
    let mut capture = CaptureSession::new();
    capture.open(PcapSource::open(&device, READ_TIMEOUT_MS)?)?;

    let session = Session::new(settings, store, capture);
    if let Err(e) = session.sync_filter().await {
        tracing::warn!(error = %e, "initial filter not applied");
        println!("Error: {e}");
    }

    let worker = session.spawn_capture(io::stdout());
    println!("{HELP}");
    let outcome = session.run_commands(&mut lines).await;
    session.shutdown(worker).await?;
    outcome
}

async fn prompt_for_device<R>(
    devices: &[Device],
    lines: &mut Lines<R>,
) -> Result<Device, PacketWatchError>
where
    R: AsyncBufRead + Unpin,
{
    print_devices(devices);
    let answer = lines.next_line().await?.unwrap_or_default();
    let device = device::select(devices, &answer)?;
    Ok(device.clone())
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        tracing::warn!("no capture device with an IPv4 address");
    }
    for (index, device) in devices.iter().enumerate() {
        println!("{}", device.listing_line(index));
    }
}

fn program_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "packetwatch".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetwatch::error::DeviceError;

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["packetwatch"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.device.is_none());
        assert_eq!(cli.log_level, "warn");
        assert_eq!(cli.log_format, "pretty");
        assert!(!cli.list_devices);
    }

    #[test]
    fn cli_overrides() {
        let cli = Cli::try_parse_from([
            "packetwatch",
            "--config",
            "alt.json",
            "--device",
            "192.168.1.20",
            "--filter",
            "tcp port 443",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.json")));
        assert_eq!(cli.device, Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(cli.filter.as_deref(), Some("tcp port 443"));
    }

    #[test]
    fn cli_rejects_non_ipv4_device() {
        assert!(Cli::try_parse_from(["packetwatch", "--device", "eth0"]).is_err());
    }

    #[tokio::test]
    async fn prompt_rejects_out_of_range_index() {
        let devices = vec![Device {
            name: "eth0".to_owned(),
            friendly_name: "eth0".to_owned(),
            description: String::new(),
            addresses: vec!["192.168.1.20".parse().unwrap()],
        }];
        let mut lines = BufReader::new(&b"3\n"[..]).lines();
        let err = prompt_for_device(&devices, &mut lines).await.unwrap_err();
        assert!(matches!(
            err,
            PacketWatchError::Device(DeviceError::InvalidSelection(_))
        ));

        let mut lines = BufReader::new(&b"0\n"[..]).lines();
        let device = prompt_for_device(&devices, &mut lines).await.unwrap();
        assert_eq!(device.name, "eth0");
    }
}

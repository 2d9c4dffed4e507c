use clap::{Parser, ValueEnum};
use color_eyre::eyre::Result;
use network_tools::{
    Bridge, Providers, config,
    config::BridgeConfig,
    probe::SubprocessProbe,
    transport,
    wifi::{
        BroadcastAction, ConnectionInfo, LinuxConnectivity, LinuxWifi, ScanRecord,
        SimulatedConnectivity, SimulatedWifi,
    },
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// `iw`, `ip` and sysfs on this host
    Linux,
    /// Made-up association and scan data with RSSI jitter
    Simulate,
}

/// Wi-Fi telemetry and reachability bridge speaking JSON lines on stdin/stdout
#[derive(Parser, Debug)]
#[command(
    name = "network-tools",
    about = "Wi-Fi telemetry and reachability bridge.\n\nReads channel frames as JSON lines on stdin and writes replies and stream events to stdout.",
    long_about = None,
    version = env!("CARGO_PKG_VERSION"),
    disable_version_flag = true
)]
struct Args {
    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Where Wi-Fi data comes from
    #[arg(long, value_enum, default_value = "linux")]
    source: Source,

    /// Wireless interface for the Linux source
    #[arg(long, default_value = config::DEFAULT_INTERFACE)]
    interface: String,

    /// ICMP echo executable (defaults to /system/bin/ping, or `ping` on PATH)
    #[arg(long = "ping-binary")]
    ping_binary: Option<PathBuf>,

    /// Settling interval between starting a scan and reading results
    #[arg(long = "settle-ms", default_value_t = config::SCAN_DELAY_MS)]
    settle_ms: u64,

    /// Link poll interval for the Linux broadcast source
    #[arg(long = "poll-ms", default_value_t = config::BROADCAST_POLL_MS)]
    poll_ms: u64,
}

fn simulated_providers(probe: Arc<SubprocessProbe>) -> Providers {
    let wifi = Arc::new(SimulatedWifi::new());
    wifi.set_connection(Some(ConnectionInfo {
        ssid: "\"SimulatedNet\"".to_string(),
        bssid: Some("02:00:00:00:00:01".to_string()),
        rssi: -45,
        link_speed: 144,
        frequency: Some(2437),
        ip_address: 0x6401A8C0,
    }));
    wifi.set_scan_results(vec![
        ScanRecord {
            ssid: "\"SimulatedNet\"".to_string(),
            bssid: "02:00:00:00:00:01".to_string(),
            level: -45,
            frequency: 2437,
            capabilities: "[WPA2-PSK-CCMP][ESS]".to_string(),
        },
        ScanRecord {
            ssid: "Neighbor".to_string(),
            bssid: "02:00:00:00:00:02".to_string(),
            level: -78,
            frequency: 5180,
            capabilities: "[ESS]".to_string(),
        },
    ]);

    let jitter = wifi.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(config::SIMULATED_JITTER_MS));
        let mut tick: i32 = 0;
        loop {
            ticker.tick().await;
            tick = tick.wrapping_add(1);
            jitter.set_rssi(-45 - tick.rem_euclid(7));
            jitter.emit(BroadcastAction::RssiChanged);
        }
    });

    Providers::new(wifi, Arc::new(SimulatedConnectivity::wifi()), probe)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let ping_binary = args.ping_binary.unwrap_or_else(|| {
        if Path::new(config::PING_BINARY).exists() {
            PathBuf::from(config::PING_BINARY)
        } else {
            PathBuf::from("ping")
        }
    });
    let bridge_config = BridgeConfig::default()
        .with_settle_delay(Duration::from_millis(args.settle_ms))
        .with_ping_binary(ping_binary);
    let probe = Arc::new(SubprocessProbe::from_config(&bridge_config));

    info!(source = ?args.source, interface = %args.interface, "Starting bridge");

    let providers = match args.source {
        Source::Linux => {
            let wireless = Path::new("/sys/class/net")
                .join(&args.interface)
                .join("wireless");
            if !wireless.exists() {
                warn!(
                    interface = %args.interface,
                    "Interface is not wireless, Wi-Fi queries will report no association"
                );
            }
            Providers::new(
                Arc::new(LinuxWifi::new(
                    args.interface,
                    Duration::from_millis(args.poll_ms),
                )),
                Arc::new(LinuxConnectivity::default()),
                probe,
            )
        }
        Source::Simulate => simulated_providers(probe),
    };

    let bridge = Bridge::activate(providers, bridge_config);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    transport::serve(bridge, stdin, tokio::io::stdout()).await?;
    Ok(())
}

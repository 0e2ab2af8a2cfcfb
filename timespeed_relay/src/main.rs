// CLI entry point for the time-speed relay.
//
// Starts a standalone relay that game processes connect to. The relay routes
// addressed payloads between them and never interprets them. See `server.rs`
// for the networking architecture and `session.rs` for the session state.
//
// Usage:
//   relay [OPTIONS]
//     --bind <ADDR>           Listen address (default: 127.0.0.1)
//     --port <PORT>           Listen port (default: 24642)
//     --max-players <N>       Max players (default: 8)
//
// Log verbosity follows `RUST_LOG` (default: info).

use std::time::Duration;

use timespeed_relay::server::{RelayConfig, start_relay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = parse_args();

    let (_handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "failed to start relay");
            std::process::exit(1);
        }
    };

    info!(%addr, "relay running, press Ctrl+C to stop");

    // The process exits on SIGINT/SIGTERM; relay threads are torn down with it.
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}

/// Parse command-line arguments into a `RelayConfig`. Uses simple
/// `std::env::args()` matching, no clap dependency.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                i += 1;
                config.bind_address = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--bind requires an address");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--max-players" => {
                i += 1;
                config.max_players =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--max-players requires a valid number");
                        std::process::exit(1);
                    });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --bind <ADDR>           Listen address (default: 127.0.0.1)");
    println!("  --port <PORT>           Listen port (default: 24642)");
    println!("  --max-players <N>       Max players (default: 8)");
    println!("  --help, -h              Show this help");
}

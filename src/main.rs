//! stream-relay binary
//!
//! ```text
//! stream-relay --src-address :5000 --sink-address :5001 --sink-passphrase 'at least 10 chars'
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).
//!
//! The relay speaks plain TCP: passphrases and stream data cross the network
//! unencrypted.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stream_relay::protocol::constants::DEFAULT_LATENCY_MS;
use stream_relay::server::parse_listen_addr;
use stream_relay::{EndpointConfig, RelayConfig, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "stream-relay")]
#[command(about = "Relay one live source to many sinks over plain TCP")]
#[command(long_about = "Relay one live source to many sinks over plain TCP.\n\n\
Traffic is not encrypted. A passphrase is sent in clear text during the \
handshake and only gates who may connect; anyone on the path can read it \
and the stream.")]
struct Args {
    /// Address to listen for the source connection
    #[arg(long, env = "RELAY_SRC_ADDRESS", default_value = ":5000")]
    src_address: String,

    /// Source latency in milliseconds
    #[arg(long, env = "RELAY_SRC_LATENCY", default_value_t = DEFAULT_LATENCY_MS)]
    src_latency: u32,

    /// Source passphrase (empty for none); sent in clear text, stream not encrypted
    #[arg(long, env = "RELAY_SRC_PASSPHRASE", default_value = "", hide_env_values = true)]
    src_passphrase: String,

    /// Address to listen for sink connections
    #[arg(long, env = "RELAY_SINK_ADDRESS", default_value = ":5001")]
    sink_address: String,

    /// Sink latency in milliseconds
    #[arg(long, env = "RELAY_SINK_LATENCY", default_value_t = DEFAULT_LATENCY_MS)]
    sink_latency: u32,

    /// Sink passphrase (empty for none); sent in clear text, stream not encrypted
    #[arg(long, env = "RELAY_SINK_PASSPHRASE", default_value = "", hide_env_values = true)]
    sink_passphrase: String,
}

impl Args {
    fn relay_config(&self) -> stream_relay::Result<RelayConfig> {
        let source = EndpointConfig::source()
            .bind(parse_listen_addr(&self.src_address)?)
            .latency(self.src_latency)
            .passphrase(self.src_passphrase.as_str());
        let sink = EndpointConfig::sink()
            .bind(parse_listen_addr(&self.sink_address)?)
            .latency(self.sink_latency)
            .passphrase(self.sink_passphrase.as_str());

        Ok(RelayConfig::new(source, sink))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let server = match args.relay_config().and_then(RelayServer::new) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    match server.run_until(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Relay stopped");
            ExitCode::FAILURE
        }
    }
}

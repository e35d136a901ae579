//! `ipecho` server: answers HTTP requests with the caller's IP address

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ipecho::{EchoConfig, Settings, server};
use tokio::net::TcpListener;
use tracing::{error, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Simple HTTP server which returns the requester IP address
#[derive(Debug, Parser)]
#[command(name = "ipecho", version, about, long_about = None)]
struct Arguments {
    /// Listen address
    #[arg(short = 'l', long = "listen", default_value = "127.0.0.1:1234")]
    listen: String,
    /// Listen path
    #[arg(short = 'p', long = "path", default_value = "/")]
    path: String,
    /// Filter retrieved IP with provided network, e.g. 10.0.0.0/8
    #[arg(short = 'n', long = "network")]
    network: Option<String>,
    /// Set provided value to the `Access-Control-Allow-Origin` header
    #[arg(short = 'o', long = "origin", default_value = "")]
    origin: String,
    /// Get client IP from provided HTTP header instead of the connection address
    #[arg(short = 'r', long = "header")]
    header: Option<String>,
}

impl Arguments {
    fn split(self) -> (String, Settings) {
        let settings = Settings {
            route: self.path,
            origin: self.origin,
            network: self.network,
            address_header: self.header,
        };
        (self.listen, settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(fmt::layer())
        .init();

    // Any way of stopping other than a signal is a failure
    match run(Arguments::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(arguments: Arguments) -> Result<()> {
    let (listen, settings) = arguments.split();
    if listen.is_empty() {
        bail!("no listen address provided");
    }
    let config = EchoConfig::try_from(settings).context("invalid configuration")?;
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("can't listen on {listen}"))?;
    server::serve(listener, config, server::shutdown_signal())
        .await
        .context("server failed")
}

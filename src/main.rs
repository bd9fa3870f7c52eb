//! mtls-chain command line.
//!
//! `generate` builds and persists the trust chain, `verify` checks the persisted
//! artifacts, `serve` and `ping` run the two ends of the echo service.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mtls_chain::chain_verification::verify_persisted_chain;
use mtls_chain::configs::AppConfig;
use mtls_chain::echo_client::EchoClient;
use mtls_chain::echo_server::EchoServer;
use mtls_chain::storage::ArtifactStore;
use mtls_chain::tls_endpoint::TransportSecurity;
use mtls_chain::trust_chain::TrustChainBuilder;

#[derive(Parser, Debug)]
#[command(name = "mtls-chain", version, about)]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the root CA, server and client certificates and write them out.
    Generate,
    /// Load the persisted artifacts and verify the chain.
    Verify {
        /// Server name that must appear in the server certificate.
        #[arg(long)]
        server_name: Option<String>,
    },
    /// Run the echo server.
    Serve {
        /// Start the server without TLS.
        #[arg(long)]
        insecure: bool,
        #[arg(long)]
        listen: Option<String>,
    },
    /// Send one Ping to the echo server.
    Ping {
        /// Connect without TLS.
        #[arg(long)]
        insecure: bool,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        server_name: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;
    let store = ArtifactStore::new(config.artifact_locations());

    match cli.command {
        Command::Generate => {
            let chain = TrustChainBuilder::new(config.chain_policy())
                .build()
                .context("Failed to generate the trust chain")?;
            chain
                .persist(&store)
                .context("Failed to write the trust chain artifacts")?;
            println!("Certificates generated in {}", config.artifacts.directory.display());
        }
        Command::Verify { server_name } => {
            let server_name = server_name.unwrap_or_else(|| config.client.server_name.clone());
            let verified = verify_persisted_chain(&store, &server_name)
                .context("Persisted trust chain failed verification")?;
            println!("✓ Trust chain verified");
            println!("  Root CA serial:            {}", verified.root_serial);
            println!("  Server certificate serial: {}", verified.server_serial);
            println!("  Client certificate serial: {}", verified.client_serial);
        }
        Command::Serve { insecure, listen } => {
            let security = transport(&config, insecure);
            let address = listen.unwrap_or_else(|| config.server.listen_address.clone());
            let server = EchoServer::bind(address.as_str(), security, &store)
                .with_context(|| format!("Could not start the echo server on {address}"))?;
            server.serve().context("Echo server stopped")?;
        }
        Command::Ping {
            insecure,
            address,
            server_name,
        } => {
            let security = transport(&config, insecure);
            let address = address.unwrap_or_else(|| config.client.server_address.clone());
            let server_name = server_name.unwrap_or_else(|| config.client.server_name.clone());
            let client = EchoClient::new(security, &store, server_name)
                .context("Failed to load the client credentials")?;
            let response = client
                .ping(address.as_str())
                .with_context(|| format!("Could not play ping pong with {address}"))?;
            println!("Sent a ping, received {response:?}");
        }
    }

    Ok(())
}

fn transport(config: &AppConfig, insecure_flag: bool) -> TransportSecurity {
    if insecure_flag {
        TransportSecurity::Insecure
    } else {
        config.transport_security()
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

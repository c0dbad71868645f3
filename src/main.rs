use anyhow::Result;
use base64::{engine::general_purpose, Engine};
use clap::{Parser, Subcommand};
use rand::RngCore;
use tracing::info;

use token_gate::comms::http_api;
use token_gate::config::Config;
use token_gate::security::token_provider::MIN_SECRET_BYTES;
use token_gate::utils::logging;

#[derive(Parser)]
#[command(name = "token-gate", version, about = "JWT bearer-token session gateway")]
struct AppCli {
    /// Config file path
    #[arg(short, long, default_value = "config.json", global = true)]
    config: String,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print a fresh base64 signing secret
    GenSecret {
        #[arg(long, default_value_t = MIN_SECRET_BYTES)]
        bytes: usize,
    },
}

fn generate_secret(bytes: usize) -> Result<String> {
    if bytes < MIN_SECRET_BYTES {
        anyhow::bail!("secret must be at least {MIN_SECRET_BYTES} bytes, got {bytes}");
    }
    let mut raw = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut raw);
    Ok(general_purpose::STANDARD.encode(raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = AppCli::parse();

    match args.command {
        Some(Commands::GenSecret { bytes }) => {
            println!("{}", generate_secret(bytes)?);
        }
        Some(Commands::Serve { port }) => run_server(&args.config, port).await?,
        None => run_server(&args.config, 8080).await?,
    }

    Ok(())
}

async fn run_server(config_path: &str, port: u16) -> Result<()> {
    logging::init("info");
    info!(version = token_gate::VERSION, "starting on port {port}");
    let config = Config::from_file(config_path)?;
    http_api::serve(config, port).await
}

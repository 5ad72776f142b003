use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

mod context;
mod demo;
mod server;

#[derive(Parser, Debug, Clone)]
#[command(name = "cmdbridge")]
#[command(author, version, about = "cmdbridge - chat command bridge for Twitch IRC")]
pub struct Args {
    /// Settings file. Defaults to <config dir>/cmdbridge/settings.json
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Chat server, host:port
    #[arg(long, env = "CMDBRIDGE_SERVER_ADDR")]
    pub server_addr: Option<String>,

    /// Force debug logging regardless of the settings file
    #[arg(long, default_value = "false")]
    pub debug: bool,

    /// Bearer token, with or without the `oauth:` scheme
    #[arg(long, env = "CMDBRIDGE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, env = "CMDBRIDGE_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "CMDBRIDGE_CHANNEL")]
    pub channel: Option<String>,
}

/// `RUST_LOG` wins; otherwise `debug` picks the default level.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cmdbridge_common={0},cmdbridge_core={0},cmdbridge_server={0}",
            default_level
        ))
    });
    let sub = fmt().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(sub).is_err() {
        eprintln!("A global tracing subscriber was already set");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let ctx = context::ServerContext::load(&args)?;
    init_tracing(args.debug || ctx.settings.debug_mode);
    info!("cmdbridge starting. settings={}", ctx.settings_path().display());
    ctx.log_loaded();

    if let Err(e) = server::run_server(ctx).await {
        error!("Server error: {:?}", e);
        return Err(e.into());
    }

    info!("Main finished. Goodbye!");
    Ok(())
}

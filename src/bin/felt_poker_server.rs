use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use felt_poker::server::{run_server, ServerConfig};

const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Debug, Parser)]
#[command(name = "felt_poker_server")]
#[command(about = "Launch the poker table engine API server", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SERVER_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// SeaORM-compatible Postgres URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Fan-out endpoint receiving table-update notifications
    #[arg(long, env = "PUBLISH_URL")]
    publish_url: Option<String>,

    /// Per-operation deadline in seconds
    #[arg(long, env = "SERVER_OP_TIMEOUT_SECS", default_value_t = 30)]
    op_timeout_secs: u64,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SERVER_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json);
    let config = build_config(args).context("failed to build server config")?;
    run_server(config).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }
}

fn build_config(args: Args) -> Result<ServerConfig> {
    let publish_url = args
        .publish_url
        .map(|raw| Url::parse(&raw).context("invalid PUBLISH_URL"))
        .transpose()?;

    Ok(ServerConfig {
        bind: args.bind,
        database_url: args.database_url,
        publish_url,
        op_timeout: Duration::from_secs(args.op_timeout_secs),
    })
}

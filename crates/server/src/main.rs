use clap::{Args, Parser, Subcommand};
use citytiles_server::{export_tiles, run_server, AppState, Dataset};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "citytiles", version, about = "Settlement vector data tile server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the tile server (default)
    Serve(ServeArgs),
    /// Export the tileset as files
    Export(ExportArgs),
}

impl Default for Command {
    fn default() -> Self {
        Self::Serve(ServeArgs::default())
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(short, long, default_value_t = 8089)]
    port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Settlement data file (tab-delimited)
    #[arg(short, long, default_value = "data/cities500.txt")]
    data: PathBuf,

    /// Directory served for all non-tile paths
    #[arg(long, default_value = ".")]
    static_dir: PathBuf,

    /// Minimum tree depth points are stored at
    #[arg(long, default_value_t = 3)]
    min_depth: u8,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            port: 8089,
            host: "0.0.0.0".to_string(),
            data: PathBuf::from("data/cities500.txt"),
            static_dir: PathBuf::from("."),
            min_depth: 3,
        }
    }
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Settlement data file (tab-delimited)
    #[arg(short, long, default_value = "data/cities500.txt")]
    data: PathBuf,

    /// Output directory for content/ and subtrees/
    #[arg(short, long, default_value = "data")]
    out: PathBuf,

    /// Minimum tree depth points are stored at
    #[arg(long, default_value_t = 1)]
    min_depth: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "citytiles_server=info,citytiles=info,info".into()),
        )
        .init();

    // `serve` is the default when no subcommand is given.
    match Cli::parse().command.unwrap_or_default() {
        Command::Serve(args) => serve(args).await,
        Command::Export(args) => export(args),
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let dataset = Dataset::load(&args.data, args.min_depth)?;
    let state = Arc::new(AppState::new(vec![dataset], args.static_dir));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    run_server(addr, state).await
}

fn export(args: ExportArgs) -> anyhow::Result<()> {
    let dataset = Dataset::load(&args.data, args.min_depth)?;
    export_tiles(&dataset.tree, &args.out)?;
    Ok(())
}

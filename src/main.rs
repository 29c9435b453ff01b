use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use void_proxy::{BlockSet, Config, ProxyServer, Stats, VERSION};

const DEFAULT_CONFIG: &str = "proxy.toml";

#[derive(Parser, Debug)]
#[command(name = "void-proxy")]
#[command(version = VERSION)]
#[command(about = "HTTP/HTTPS forward proxy with hostname blocklists")]
struct Args {
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    max_users: Option<usize>,

    #[arg(long)]
    blocklist_dir: Option<PathBuf>,

    #[arg(short, long)]
    quiet: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.config.exists() || args.config != PathBuf::from(DEFAULT_CONFIG) {
        Config::load(&args.config)?
    } else {
        Config::default()
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_users) = args.max_users {
        config.max_users = max_users;
    }
    if let Some(dir) = &args.blocklist_dir {
        config.blocklist_dir = dir.clone();
    }
    config.validate()?;

    Ok(config)
}

fn init_logging(args: &Args, colorful: bool) {
    let default_level = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(colorful)
        .init();
}

fn print_banner(config: &Config, blocked: usize) {
    println!("\n╔══════════════════════════════════════════════════════╗");
    println!("║       \x1b[92mvoid-proxy v{}\x1b[0m                             ║", VERSION);
    println!("║       \x1b[97mBlocklisting Forward Proxy\x1b[0m                     ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    println!("\x1b[92m[CONFIG]\x1b[0m");
    println!("  \x1b[97m├─ Address:\x1b[0m {}", config.listen_addr());
    println!("  \x1b[97m├─ Max Users:\x1b[0m {}", config.max_users);
    println!("  \x1b[97m├─ Blocked Domains:\x1b[0m {}", blocked);
    println!(
        "  \x1b[97m├─ Upstream Ports:\x1b[0m http {}, tunnel {}",
        config.upstream.http_port, config.upstream.tunnel_port
    );
    println!("  \x1b[97m└─ Started:\x1b[0m {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("\n\x1b[92m[INFO]\x1b[0m Press \x1b[93mCtrl+C\x1b[0m to stop the proxy\n");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

async fn run(args: Args, config: Config) -> Result<ExitCode> {
    let blocklist = BlockSet::load_dir(&config.blocklist_dir)
        .with_context(|| format!("Failed to load blocklists from {:?}", config.blocklist_dir))?;
    if !config.exclude_domains.is_empty() {
        warn!(
            "exclude_domains is set ({} entries) but is not used for filtering",
            config.exclude_domains.len()
        );
    }

    let stats = Stats::new();
    let blocked = blocklist.len();

    let server = match ProxyServer::bind(&config, Arc::new(blocklist), stats.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if !args.quiet {
        print_banner(&config, blocked);
    }

    let shutdown = CancellationToken::new();
    let shutdown_trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping new connections...");
        shutdown_trigger.cancel();
    });

    server.run(shutdown).await?;

    if !args.quiet {
        stats.snapshot().print();
        println!("\n\x1b[92m[SUCCESS]\x1b[0m Proxy shut down\n");
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = load_config(&args).context("Failed to load configuration")?;
    init_logging(&args, config.colorful);
    if !args.config.exists() {
        warn!("{:?} not found, using default settings", args.config);
    }

    run(args, config).await
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use url::Url;

use vidwatch_config::RuntimeConfig;
use vidwatch_core::{RawSessionConfig, SessionStatus};
use vidwatch_driver::ChromiumDriver;
use vidwatch_gateway::{serve, GatewayState};
use vidwatch_logging::init_logger;
use vidwatch_session::{SessionController, SessionRegistry};

#[derive(Parser)]
#[command(name = "vidwatch")]
#[command(about = "vidwatch — proxied watch-session automation service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP control API
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single watch session to completion
    Run {
        /// URL of the video to watch
        #[arg(long)]
        url: Url,
        /// Watch time in seconds
        #[arg(long, default_value_t = 300)]
        watch_time: u32,
        /// Custom proxy URL (overrides Tor)
        #[arg(long)]
        custom_proxy: Option<Url>,
        /// Run the browser headless
        #[arg(long)]
        headless: bool,
        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = RuntimeConfig::from_env();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            init_logger(&runtime.log_dir, &runtime.log_level, false);
            let addr: SocketAddr =
                format!("{}:{}", runtime.bind_address, port.unwrap_or(runtime.port)).parse()?;

            let driver = Arc::new(ChromiumDriver::from_config(&runtime));
            let registry = Arc::new(SessionRegistry::new(runtime, driver));
            serve(addr, GatewayState { registry }).await
        }
        Commands::Run {
            url,
            watch_time,
            custom_proxy,
            headless,
            debug,
        } => {
            init_logger(&runtime.log_dir, &runtime.log_level, debug);
            run_once(runtime, url, watch_time, custom_proxy, headless, debug).await
        }
    }
}

/// One-shot session from the command line: start, watch until terminal,
/// print the final snapshot. Exit code 0 only on a completed session.
async fn run_once(
    runtime: RuntimeConfig,
    url: Url,
    watch_time: u32,
    custom_proxy: Option<Url>,
    headless: bool,
    debug: bool,
) -> Result<()> {
    let raw = RawSessionConfig {
        video_url: url.to_string(),
        watch_time: i64::from(watch_time),
        proxy_type: if custom_proxy.is_some() {
            "custom".to_string()
        } else {
            "tor".to_string()
        },
        custom_proxy: custom_proxy.map(|u| u.to_string()),
        headless,
        debug,
    };
    let config = raw.validate()?;

    let driver = Arc::new(ChromiumDriver::from_config(&runtime));
    let controller = Arc::new(SessionController::new(config, runtime, driver));
    info!(session = %controller.id(), "starting watch session");
    controller.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping session");
                controller.stop();
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        }
        let snapshot = controller.status();
        if snapshot.status.is_terminal() {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            if snapshot.status != SessionStatus::Completed {
                std::process::exit(1);
            }
            return Ok(());
        }
    }
}

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info, warn};

mod utils;

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let cfg: recorder::config::Config = match ::utils::load("liverec", args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config load error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    ::utils::set_log(format!(
        "liverec={},recorder={},tower_http=info",
        cfg.log.level, cfg.log.level
    ));

    if let Err(e) = cfg.validate() {
        error!("invalid config: {:#}", e);
        return ExitCode::FAILURE;
    }

    warn!("set log level : {}", cfg.log.level);
    debug!("config : {:?}", cfg);

    let listener = match tokio::net::TcpListener::bind(cfg.http.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("bind {}: {}", cfg.http.listen, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = recorder::serve(cfg, listener, utils::shutdown_signal()).await {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }
    info!("Server shutdown");
    ExitCode::SUCCESS
}

use clap::Parser;
use log::{error, info};
use sanctum_core::foundation::ErrorCode;
use sanctum_core::infrastructure::config::ServerConfig;
use sanctum_core::infrastructure::logging::init_logger;
use sanctum_service::api::tls;
use sanctum_service::service::{bootstrap, server};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "sanctum-server")]
#[command(about = "Stateless key encryption service", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config
    #[arg(long)]
    addr: Option<String>,

    /// Log level (trace, debug, info, warn, error), plus optional
    /// `<module>=<level>` entries
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory for rolling log files; stderr only when unset
    #[arg(long)]
    log_dir: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let args = Cli::parse();

    let mut config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return 1;
        }
    };
    if let Some(addr) = args.addr {
        config.address = addr;
    }

    init_logger(args.log_dir.as_deref(), &args.log_level, config.log.error.enabled());

    if let Err(err) = config.validate() {
        error!("configuration invalid error={err}");
        return 1;
    }
    if args.validate_only {
        info!("configuration OK");
        return 0;
    }

    let addr = match config.listen_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!("configuration invalid error={err}");
            return 1;
        }
    };
    let (Some(cert), Some(key)) = (config.tls.cert.clone(), config.tls.key.clone()) else {
        error!("tls.cert and tls.key are required to serve");
        return 1;
    };
    let tls_config = match tls::server_config(&cert, &key, config.tls.password.as_deref()) {
        Ok(tls_config) => Arc::new(tls_config),
        Err(err) => {
            error!("tls setup failed error={err}");
            return 1;
        }
    };

    let (state, router) = match bootstrap::build(&config).await {
        Ok(built) => built,
        Err(err) => {
            error!("startup failed error={err}");
            return 1;
        }
    };
    info!("sanctum-server starting addr={addr} version={}", env!("CARGO_PKG_VERSION"));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = server::serve(addr, tls_config, router, shutdown_rx).await;
    state.registry.stop_all().await;

    match result {
        Ok(()) => 0,
        Err(err) if err.code() == ErrorCode::ConfigError => {
            error!("startup failed error={err}");
            1
        }
        Err(err) => {
            error!("server failed error={err}");
            2
        }
    }
}

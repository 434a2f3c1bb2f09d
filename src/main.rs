pub mod expiring_cache {
    mod data_struct;
    pub mod error;
    pub mod hm;
    pub mod options;
}
pub mod counter {
    pub mod visitor;
}
pub mod web {
    pub mod extract;
    pub mod server;
}
pub mod config;
pub mod unittests {
    pub mod config;
    pub mod extract;
    pub mod hm;
    pub mod server;
    pub mod visitor;
}

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::counter::visitor::VisitorCounter;
use crate::web::server::serve;

#[tokio::main]
async fn main() {
    let config = Config::parse();
    init_tracing(&config.log_level);

    if let Err(err) = config.validate() {
        error!(%err, "invalid configuration");
        std::process::exit(1);
    }

    info!("Welcome to the IPNotes Counter, see the readme for more information");
    let counter_config = config.counter_config();
    info!(
        domain_ttl = ?counter_config.domain_ttl,
        visitor_ttl = ?counter_config.visitor_ttl,
        policy = ?counter_config.domain_policy,
        "configuration loaded"
    );
    let counter = VisitorCounter::new(counter_config);

    let listener = match TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, addr = %config.listen, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(addr = %config.listen, "listening");

    if let Err(err) = serve(listener, counter, shutdown_signal()).await {
        error!(%err, "server exited with error");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

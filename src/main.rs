use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;

mod api;
mod db;
mod growth;
mod util;
mod ws;

use crate::api::server::{self, AppState, StartupError};
use crate::util::config::{Config, ConfigError};

#[derive(Debug, Error)]
enum RunnerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),
}

type Result<T> = core::result::Result<T, RunnerError>;

#[tokio::main]
async fn main() -> Result<()> {
    util::tracing::init();

    tracing::info!("starting garden service");

    let config = Config::load()?;
    let state = AppState::new(&config).await?;

    let socket_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.server_port);
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;

    tracing::info!(
        server_url = &format!("http://127.0.0.1:{}", config.server_port),
        "server ready"
    );

    axum::serve(listener, server::router(state)).await?;

    Ok(())
}

//! Duel server binary.
//!
//! Reads `TETRIS_DUEL_*` configuration, builds the hall with the in-process
//! authority and serves clients until the process is stopped.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use tetris_duel::adapter::{run_server, ServerConfig};
use tetris_duel::table::{Hall, LocalAuthority};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env().context("reading TETRIS_DUEL_* configuration")?;
    info!(
        host = %config.host,
        port = config.port,
        table_host = %config.hall.host,
        "starting duel server"
    );

    let hall = Arc::new(Hall::new(config.hall.clone(), Arc::new(LocalAuthority::new())));
    run_server(config, hall, None).await
}

#![cfg(not(tarpaulin_include))]

use bookgrid::app;
use bookgrid::config::Config;

/// Main entry point for the book grid web server
///
/// Reads its settings from the environment (`BOOKGRID_ADDR`, `PORT`,
/// `BOOKGRID_MAX_UPLOAD_BYTES`, `BOOKGRID_SESSION_TTL_SECS`,
/// `BOOKGRID_MAX_GENERATE`) and serves the API until the process exits.
/// Log verbosity follows `RUST_LOG`, defaulting to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!(
        "starting with upload limit {} bytes, generate limit {}",
        config.max_upload_bytes,
        config.max_generate
    );

    app::run(config).await
}

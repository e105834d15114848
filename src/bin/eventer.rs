//! Cluster event and node-condition monitor
//!
//! Usage:
//!   CLUSTER_NAME=prod DING_ROBOT=https://... cargo run --release --bin eventer
//!
//! See `MonitorConfig::from_env` for the full list of environment variables.

use dotenv::dotenv;
use eventer::config::MonitorConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = MonitorConfig::from_env();
    let rust_log = config
        .as_ref()
        .map(|c| c.rust_log.clone())
        .unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&rust_log))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return Err(e.into());
        }
    };

    let code = eventer::runtime::run(config).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

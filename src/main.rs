use std::env;
use std::path::Path;
use std::process;
use tiered_ratelimit::{config::LimiterConfig, init_server, init_tracing};

#[tokio::main]
async fn main() {
    // Initialize tracing
    init_tracing();

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/ratelimit.yaml".to_string());

    // Load configuration; built-in defaults apply when the default file is absent
    let config = if Path::new(&config_path).exists() {
        match LimiterConfig::from_file(&config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from {}: {}", config_path, e);
                eprintln!("Usage: tiered-ratelimit [config_file]");
                process::exit(1);
            }
        }
    } else {
        tracing::warn!("Config file {} not found, using defaults", config_path);
        LimiterConfig::default()
    };

    // Start the server
    if let Err(e) = init_server(config.with_env()).await {
        eprintln!("Rate limiter error: {}", e);
        process::exit(1);
    }
}

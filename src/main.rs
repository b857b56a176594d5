use fn_stats_api::{api::start_stats_node, config::StatsConfig, logging};
use tracing::error;

#[tokio::main]
async fn main() {
    // Initialize logging
    if let Err(e) = logging::init_logger() {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let config = StatsConfig::from_env();

    if let Err(e) = start_stats_node(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

pub mod stats;

pub use stats::{start_stats_node, stats_router, StatsState};

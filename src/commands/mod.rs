mod declare;
mod observe;
mod relay;

pub use declare::declare;
pub use observe::observe;
pub use relay::relay;

use jobwatch::broker::Topology;
use jobwatch::config::Config;

/// Default topology with the configured declaration deadline
fn topology(config: &Config) -> Topology {
    Topology::job_tracker().with_declare_timeout(config.broker.declare_timeout)
}

/// Resolve on Ctrl-C; a broken signal handler is logged and treated as a request to stop
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to wait for Ctrl+C: {}", e),
    }
}

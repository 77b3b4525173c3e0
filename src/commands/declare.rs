use anyhow::{Context, Result};

use jobwatch::broker::BrokerClient;
use jobwatch::config::Config;

pub async fn declare(config: Config) -> Result<()> {
    config.validate()?;

    let topology = super::topology(&config);
    let client = BrokerClient::new(config.broker);

    let session = client
        .connect(false)
        .await
        .context("Failed to connect to broker")?;

    let declared = topology.declare(session.channel()).await;
    session.close().await;
    declared.context("Failed to declare topology")?;

    println!("Declared topology:");
    for exchange in &topology.exchanges {
        println!("  exchange {} ({:?})", exchange.name, exchange.kind);
    }
    for queue in &topology.queues {
        println!(
            "  queue    {} <- {} [{}]",
            queue.name, queue.bound_exchange, queue.routing_key
        );
    }

    Ok(())
}

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

use jobwatch::broker::{BrokerClient, Consumer, FanOut};
use jobwatch::config::Config;
use jobwatch::notifications::{CommandListener, TelegramNotifier};

/// Consume and deliver until Ctrl-C or until the consumer stops on its own
pub async fn relay(config: Config) -> Result<()> {
    config.validate_relay()?;

    let notifier = TelegramNotifier::new(config.notifier.telegram())
        .context("Failed to create Telegram notifier")?;
    let fanout = FanOut::new(
        Arc::new(notifier),
        config.notifier.recipients.clone(),
        config.notifier.send_timeout,
    );

    let topology = super::topology(&config);
    let client = BrokerClient::new(config.broker.clone());
    let consumer = Consumer::connect(&client, &topology, fanout)
        .await
        .context("Failed to start consumer")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = if config.notifier.answer_commands {
        let listener = CommandListener::new(config.notifier.telegram(), config.notifier.poll_timeout)
            .context("Failed to create command listener")?;
        Some(tokio::spawn(listener.run(shutdown_rx.clone())))
    } else {
        None
    };

    let mut handle = tokio::spawn(consumer.run(shutdown_rx));

    println!(
        "Relaying to {} recipient(s). Press Ctrl+C to stop.",
        config.notifier.recipients.len()
    );

    let finished = tokio::select! {
        _ = super::ctrl_c() => None,
        result = &mut handle => Some(result),
    };

    shutdown_tx.send_replace(true);
    let result = match finished {
        Some(result) => result,
        None => handle.await,
    };

    if let Some(listener) = listener {
        if let Err(e) = listener.await {
            tracing::error!(error = %e, "Command listener task failed");
        }
    }

    result
        .context("Consumer task failed")?
        .context("Consumer stopped with an error")?;

    println!("Relay stopped.");
    Ok(())
}

use anyhow::{Context, Result};
use std::sync::Arc;

use jobwatch::broker::{BrokerClient, Publisher};
use jobwatch::config::Config;
use jobwatch::loader::HtmlLoader;
use jobwatch::scheduler::JobScheduler;
use jobwatch::storage::{Database, SqliteSeenRepository};
use jobwatch::tasks::PollingTask;

/// Run the scheduler and publisher until Ctrl-C
pub async fn observe(config: Config) -> Result<()> {
    config.validate_observer()?;

    let db = Arc::new(
        Database::open(&config.database.path).with_context(|| {
            format!("Failed to open database: {}", config.database.path.display())
        })?,
    );

    let topology = super::topology(&config);
    let route = topology.primary_queue()?.route();
    let publisher = match Publisher::connect(BrokerClient::new(config.broker.clone()), topology, route).await {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            db.close()?;
            return Err(e).context("Failed to start publisher");
        }
    };

    let loader = HtmlLoader::new(config.request_timeout(), &config.loader.user_agent)
        .context("Failed to create loader")?;
    let task = Arc::new(
        PollingTask::new(
            Arc::new(loader),
            Arc::new(SqliteSeenRepository::new(Arc::clone(&db))),
            publisher.clone(),
        )
        .with_policy(config.pipeline.policy),
    );

    let scheduler = JobScheduler::new(config.scheduler);
    for source in &config.sources {
        scheduler.add_job(&source.name, Arc::clone(&task), source.interval(), source.url.clone())?;
        tracing::info!(
            job_id = %source.name,
            url = %source.url,
            period_minutes = source.period_minutes,
            "Source registered"
        );
    }
    scheduler.start()?;

    println!("Observing {} source(s). Press Ctrl+C to stop.", config.sources.len());
    super::ctrl_c().await;

    tracing::info!("Shutting down scheduler");
    scheduler.shutdown(true).await;

    publisher.close().await;

    tracing::info!("Closing database");
    db.close()?;

    println!("Observer stopped.");
    Ok(())
}

//! Fetch, deduplicate and publish one source
//!
//! ```text
//! loader.fetch(url) ──▶ for each record (page order)
//!                         fingerprint
//!                         repository.exists ── yes ──▶ skip
//!                               │ no
//!                         sender.publish ── Ok(true) ──▶ repository.save
//!                               │ Ok(false) / Err
//!                               ▼
//!                         log, leave unsaved (retried next cycle)
//! ```
//!
//! A fingerprint is saved only after the broker confirmed the publish, so
//! a crash between the two steps yields a duplicate at worst, never a
//! lost posting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::MessageSender;
use crate::error::Result;
use crate::loader::Loader;
use crate::models::{Fingerprint, Record};
use crate::scheduler::ScheduledTask;
use crate::storage::Repository;

/// What to do when the seen set cannot be read or written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Keep relaying; duplicates are preferred over silence
    #[default]
    FailOpen,
    /// Hold records back until storage recovers
    FailClosed,
}

/// Counters for one polling cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Records returned by the loader
    pub fetched: usize,
    /// Distinct fingerprints among them
    pub unique: usize,
    /// Records already in the seen set, or held back by policy
    pub skipped: usize,
    /// Records confirmed by the broker
    pub published: usize,
    /// Records the broker refused or that failed to publish
    pub failed: usize,
}

impl fmt::Display for PollSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} unique={} skipped={} published={} failed={}",
            self.fetched, self.unique, self.skipped, self.published, self.failed
        )
    }
}

pub struct PollingTask {
    loader: Arc<dyn Loader>,
    repository: Arc<dyn Repository>,
    sender: Arc<dyn MessageSender>,
    policy: PersistencePolicy,
}

impl PollingTask {
    pub fn new(
        loader: Arc<dyn Loader>,
        repository: Arc<dyn Repository>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            loader,
            repository,
            sender,
            policy: PersistencePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PersistencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PersistencePolicy {
        self.policy
    }

    /// Run one cycle against `source_url`
    ///
    /// Loader failures end the cycle early with an empty summary. Only a
    /// failed save under [`PersistencePolicy::FailClosed`] is returned as
    /// an error.
    pub async fn run(&self, source_url: &str) -> Result<PollSummary> {
        let records = match self.loader.fetch(source_url).await {
            Ok(records) => records,
            Err(e) => {
                warn!(url = source_url, error = %e, "Failed to load listing");
                return Ok(PollSummary::default());
            }
        };

        let mut summary = PollSummary {
            fetched: records.len(),
            unique: records.unique_fingerprints().len(),
            ..PollSummary::default()
        };

        for record in &records {
            let fingerprint = record.fingerprint();

            if self.already_seen(&fingerprint).await {
                debug!(fingerprint = %fingerprint, title = %record.title, "Already forwarded");
                summary.skipped += 1;
                continue;
            }

            if self.forward(record, &fingerprint).await? {
                summary.published += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(url = source_url, %summary, "Polling cycle finished");
        Ok(summary)
    }

    /// Seen-set lookup; read errors resolve per policy
    async fn already_seen(&self, fingerprint: &Fingerprint) -> bool {
        match self.repository.exists(fingerprint).await {
            Ok(seen) => seen,
            Err(e) => {
                let skip = self.policy == PersistencePolicy::FailClosed;
                warn!(
                    fingerprint = %fingerprint,
                    error = %e,
                    policy = ?self.policy,
                    skip,
                    "Seen-set lookup failed"
                );
                skip
            }
        }
    }

    /// Publish, then remember on confirm; `Ok(false)` when not delivered
    async fn forward(&self, record: &Record, fingerprint: &Fingerprint) -> Result<bool> {
        match self.sender.publish(record, fingerprint).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(fingerprint = %fingerprint, title = %record.title, "Broker did not confirm record");
                return Ok(false);
            }
            Err(e) => {
                warn!(
                    fingerprint = %fingerprint,
                    kind = e.kind(),
                    error = %e,
                    "Failed to publish record"
                );
                return Ok(false);
            }
        }

        if let Err(e) = self.repository.save(fingerprint).await {
            match self.policy {
                PersistencePolicy::FailOpen => {
                    warn!(fingerprint = %fingerprint, error = %e, "Published but not remembered");
                }
                PersistencePolicy::FailClosed => return Err(e.into()),
            }
        } else {
            debug!(fingerprint = %fingerprint, "Record forwarded");
        }

        Ok(true)
    }
}

#[async_trait]
impl ScheduledTask for PollingTask {
    type Args = String;

    async fn run(&self, source_url: String) -> Result<()> {
        PollingTask::run(self, &source_url).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_default_and_serde() {
        assert_eq!(PersistencePolicy::default(), PersistencePolicy::FailOpen);
        let policy: PersistencePolicy = serde_json::from_str(r#""fail_closed""#).unwrap();
        assert_eq!(policy, PersistencePolicy::FailClosed);
    }

    #[test]
    fn test_summary_display() {
        let summary = PollSummary {
            fetched: 3,
            unique: 2,
            skipped: 1,
            published: 1,
            failed: 1,
        };
        assert_eq!(
            summary.to_string(),
            "fetched=3 unique=2 skipped=1 published=1 failed=1"
        );
    }
}

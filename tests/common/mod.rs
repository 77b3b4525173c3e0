//! Common test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use jobwatch::broker::{BrokerError, BrokerResult, ExchangeSpec, MessageSender, QueueSpec, TopologyChannel};
use jobwatch::loader::{LoadError, Loader};
use jobwatch::models::{Fingerprint, Record, RecordSet};
use jobwatch::notifications::{Action, Notifier, NotifyError, NotifyResult, Recipient};
use jobwatch::storage::{MemorySeenRepository, Repository, StorageError, StorageResult};

/// Create a test record with default values
pub fn create_test_record() -> Record {
    Record {
        title: "Rust разработчик".to_string(),
        organization: "ООО Ромашка".to_string(),
        compensation: "от 250 000 ₽".to_string(),
        experience_level: "3–6 лет".to_string(),
        description: "Разработка сервисов на Rust\n\nОпыт с tokio".to_string(),
        link: "https://hh.ru/vacancy/100500".to_string(),
        location: "Москва (Metro: Арбатская)".to_string(),
        observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

/// Create a record with a specific title
pub fn create_record_with_title(title: &str) -> Record {
    Record {
        title: title.to_string(),
        ..create_test_record()
    }
}

pub fn record_set(titles: &[&str]) -> RecordSet {
    titles.iter().map(|t| create_record_with_title(t)).collect()
}

/// Loader returning a fixed listing, or failing with a status code
pub struct StaticLoader {
    records: RecordSet,
    failure: Option<u16>,
    pub calls: AtomicUsize,
}

impl StaticLoader {
    pub fn new(records: RecordSet) -> Self {
        Self {
            records,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            records: RecordSet::new(),
            failure: Some(status),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Loader for StaticLoader {
    async fn fetch(&self, _url: &str) -> Result<RecordSet, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Some(status) => Err(LoadError::Status(status)),
            None => Ok(self.records.clone()),
        }
    }
}

/// Sender with scripted outcomes; defaults to a confirmed publish
#[derive(Default)]
pub struct ScriptedSender {
    outcomes: Mutex<VecDeque<BrokerResult<bool>>>,
    published: Mutex<Vec<Fingerprint>>,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, outcome: BrokerResult<bool>) -> Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    pub fn published(&self) -> Vec<Fingerprint> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for ScriptedSender {
    async fn publish(&self, _record: &Record, fingerprint: &Fingerprint) -> BrokerResult<bool> {
        self.published.lock().unwrap().push(fingerprint.clone());
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(true))
    }
}

/// In-memory seen set whose reads and writes can be switched to fail
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: MemorySeenRepository,
    pub fail_exists: AtomicBool,
    pub fail_save: AtomicBool,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_exists() -> Self {
        let repo = Self::default();
        repo.fail_exists.store(true, Ordering::SeqCst);
        repo
    }

    pub fn failing_save() -> Self {
        let repo = Self::default();
        repo.fail_save.store(true, Ordering::SeqCst);
        repo
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn exists(&self, fingerprint: &Fingerprint) -> StorageResult<bool> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        self.inner.exists(fingerprint).await
    }

    async fn save(&self, fingerprint: &Fingerprint) -> StorageResult<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        self.inner.save(fingerprint).await
    }
}

/// Notifier remembering every send, optionally failing or stalling for a recipient
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail_for: Option<String>,
    stall_for: Option<(String, Duration)>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipient: &str) -> Self {
        Self {
            fail_for: Some(recipient.to_string()),
            ..Self::default()
        }
    }

    pub fn stalling_for(recipient: &str, delay: Duration) -> Self {
        Self {
            stall_for: Some((recipient.to_string(), delay)),
            ..Self::default()
        }
    }

    /// Recipients served so far, in order
    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, recipient: &Recipient, text: &str, _actions: &[Action]) -> NotifyResult<()> {
        if let Some((stalled, delay)) = &self.stall_for {
            if stalled == recipient.as_str() {
                tokio::time::sleep(*delay).await;
            }
        }
        if self.fail_for.as_deref() == Some(recipient.as_str()) {
            return Err(NotifyError::Rejected {
                status: 403,
                description: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.as_str().to_string(), text.to_string()));
        Ok(())
    }
}

pub fn recipients(ids: &[&str]) -> Vec<Recipient> {
    ids.iter().map(|id| Recipient::new(*id)).collect()
}

/// Topology channel logging every declaration
#[derive(Default)]
pub struct RecordingChannel {
    ops: Mutex<Vec<String>>,
    reject: Option<String>,
    stall: Option<String>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse any declaration touching `entity`
    pub fn rejecting(entity: &str) -> Self {
        Self {
            reject: Some(entity.to_string()),
            ..Self::default()
        }
    }

    /// Never answer declarations touching `entity`
    pub fn stalling(entity: &str) -> Self {
        Self {
            stall: Some(entity.to_string()),
            ..Self::default()
        }
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    async fn record(&self, op: String, entity: &str) -> BrokerResult<()> {
        if self.stall.as_deref() == Some(entity) {
            std::future::pending::<()>().await;
        }
        if self.reject.as_deref() == Some(entity) {
            return Err(BrokerError::topology(entity, "PRECONDITION_FAILED - inequivalent arg"));
        }
        self.ops.lock().unwrap().push(op);
        Ok(())
    }
}

#[async_trait]
impl TopologyChannel for RecordingChannel {
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> BrokerResult<()> {
        self.record(format!("exchange:{}", exchange.name), &exchange.name)
            .await
    }

    async fn declare_queue(&self, queue: &QueueSpec) -> BrokerResult<()> {
        self.record(format!("queue:{}", queue.name), &queue.name).await
    }

    async fn bind_queue(&self, queue: &QueueSpec) -> BrokerResult<()> {
        self.record(
            format!("bind:{}->{}:{}", queue.name, queue.bound_exchange, queue.routing_key),
            &queue.name,
        )
        .await
    }
}

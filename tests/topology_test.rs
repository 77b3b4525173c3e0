//! Topology declaration order, idempotence and failure classification

mod common;

use std::time::Duration;

use common::RecordingChannel;
use jobwatch::broker::{BrokerError, Topology};

#[tokio::test]
async fn test_declares_exchanges_before_queues() {
    let channel = RecordingChannel::new();
    Topology::job_tracker().declare(&channel).await.unwrap();

    assert_eq!(
        channel.ops(),
        vec![
            "exchange:dlx_job_tracker",
            "exchange:job_tracker",
            "queue:vacancies",
            "bind:vacancies->job_tracker:vacancies",
            "queue:dl_vacancies",
            "bind:dl_vacancies->dlx_job_tracker:failed.vacancies",
        ]
    );
}

#[tokio::test]
async fn test_redeclaration_is_a_no_op() {
    let channel = RecordingChannel::new();
    let topology = Topology::job_tracker();

    topology.declare(&channel).await.unwrap();
    topology.declare(&channel).await.unwrap();

    let ops = channel.ops();
    assert_eq!(ops.len(), 12);
    assert_eq!(ops[..6], ops[6..]);
}

#[tokio::test]
async fn test_conflicting_queue_is_fatal() {
    let channel = RecordingChannel::rejecting("vacancies");
    let err = Topology::job_tracker().declare(&channel).await.unwrap_err();

    assert!(matches!(err, BrokerError::TopologyDeclaration { .. }));
    assert!(!err.is_recoverable());
    assert!(!channel.ops().iter().any(|op| op.contains("dl_vacancies")));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_declaration_times_out() {
    let channel = RecordingChannel::stalling("job_tracker");
    let topology = Topology::job_tracker().with_declare_timeout(Duration::from_secs(15));

    let err = topology.declare(&channel).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(
        err,
        BrokerError::Timeout {
            operation: "exchange declare",
            ..
        }
    ));
    assert_eq!(channel.ops(), vec!["exchange:dlx_job_tracker"]);
}

#[tokio::test]
async fn test_invalid_layout_never_reaches_the_broker() {
    let channel = RecordingChannel::new();
    let mut topology = Topology::job_tracker();
    topology.exchanges.clear();

    let err = topology.declare(&channel).await.unwrap_err();
    assert!(matches!(err, BrokerError::TopologyDeclaration { .. }));
    assert!(channel.ops().is_empty());
}

//! End-to-end scenarios: a real service on temp socket paths, with the
//! peer client playing the other side.

use std::time::{Duration, Instant};

use drinksbar_config::{ConfigError, OversizePolicy};
use drinksbar_core::{
    ChannelError, PeerClient, ReceiveOutcome, Service, ServiceError, ServiceEvent, TransferError,
    TransportKind,
};
use drinksbar_test_utils::config::TestConfigBuilder;
use drinksbar_test_utils::sockets::{TestSockets, spawn_service};
use drinksbar_test_utils::tracing_setup::init_test_tracing;
use pretty_assertions::assert_eq;

fn received_text(outcome: Option<&ReceiveOutcome>) -> String {
    match outcome {
        Some(ReceiveOutcome::Received(payload)) => payload.text().into_owned(),
        other => panic!("expected a payload, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn stream_peer_message_is_reported() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Stream).await;
    assert_eq!(path, sockets.stream_path());

    PeerClient::new(&path).send_stream(b"hello").await.unwrap();

    let summary = running.finish().await.unwrap();
    assert_eq!(received_text(summary.stream.as_ref()), "hello");
    assert!(summary.datagram.is_none());
}

#[test_log::test(tokio::test)]
async fn datagram_message_is_reported() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .datagram_path(sockets.datagram_path())
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Datagram).await;

    let sent = PeerClient::new(&path).send_datagram(b"ping").await.unwrap();
    assert_eq!(sent, 4);

    let summary = running.finish().await.unwrap();
    assert_eq!(received_text(summary.datagram.as_ref()), "ping");
    assert!(summary.stream.is_none());
}

#[tokio::test]
async fn stream_lifecycle_finishes_before_datagram_starts() {
    init_test_tracing();
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .datagram_path(sockets.datagram_path())
        .build();

    let mut running = spawn_service(config);
    let stream_path = running.ready(TransportKind::Stream).await;
    assert!(!sockets.datagram_path().exists());

    PeerClient::new(&stream_path)
        .send_stream(b"hello")
        .await
        .unwrap();

    let datagram_path = running.ready(TransportKind::Datagram).await;
    PeerClient::new(&datagram_path)
        .send_datagram(b"ping")
        .await
        .unwrap();

    let summary = running.finish().await.unwrap();
    assert_eq!(received_text(summary.stream.as_ref()), "hello");
    assert_eq!(received_text(summary.datagram.as_ref()), "ping");
}

#[tokio::test]
async fn events_follow_lifecycle_order() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .datagram_path(sockets.datagram_path())
        .build();

    let service = Service::new(config);
    let mut events = service.subscribe();
    let handle = tokio::spawn(async move { service.run().await });

    let ready = events.recv().await.unwrap();
    assert!(matches!(
        ready,
        ServiceEvent::Ready {
            kind: TransportKind::Datagram,
            ..
        }
    ));

    PeerClient::new(sockets.datagram_path())
        .send_datagram(b"ping")
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        ServiceEvent::Received { kind, payload } => {
            assert_eq!(kind, TransportKind::Datagram);
            assert_eq!(payload.as_bytes(), b"ping");
        }
        other => panic!("expected Received, got {other:?}"),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        ServiceEvent::Closed {
            kind: TransportKind::Datagram
        }
    ));

    handle.await.unwrap().unwrap();
}

#[test_log::test(tokio::test)]
async fn stream_bind_failure_skips_datagram() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.unbindable_path())
        .datagram_path(sockets.datagram_path())
        .build();

    let err = Service::new(config).run().await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Channel(ChannelError::Address {
            kind: TransportKind::Stream,
            op: "bind",
            ..
        })
    ));
    assert_eq!(err.exit_code(), 1);
    assert!(!sockets.datagram_path().exists());
}

#[tokio::test]
async fn identical_paths_are_rejected_before_binding() {
    let sockets = TestSockets::new();
    let shared = sockets.path("shared.sock");
    let config = TestConfigBuilder::new()
        .stream_path(&shared)
        .datagram_path(&shared)
        .build();

    let err = Service::new(config).run().await.unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Config(ConfigError::PathConflict(_))
    ));
    assert!(!shared.exists());
}

#[tokio::test]
async fn missing_ports_create_no_socket() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .without_ports()
        .stream_path(sockets.stream_path())
        .build();

    let err = Service::new(config).run().await.unwrap_err();

    assert!(matches!(err, ServiceError::Config(ConfigError::MissingPorts)));
    assert!(!sockets.stream_path().exists());
}

#[test_log::test(tokio::test)]
async fn deadline_ends_run_and_closes_listener() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .timeout_secs(1)
        .build();

    let started = Instant::now();
    let err = Service::new(config).run().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ServiceError::DeadlineExceeded(_)));
    assert!(elapsed >= Duration::from_millis(900));
    assert!(elapsed < Duration::from_secs(3));

    // The path stays behind, but nothing is listening on it any more.
    assert!(sockets.stream_path().exists());
    let connect = tokio::net::UnixStream::connect(sockets.stream_path()).await;
    assert!(connect.is_err());
}

#[tokio::test]
async fn zero_timeout_waits_for_late_peer() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .datagram_path(sockets.datagram_path())
        .timeout_secs(0)
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Datagram).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    PeerClient::new(&path).send_datagram(b"late").await.unwrap();

    let summary = running.finish().await.unwrap();
    assert_eq!(received_text(summary.datagram.as_ref()), "late");
}

#[tokio::test]
async fn peer_arriving_before_deadline_succeeds() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .timeout_secs(5)
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Stream).await;
    PeerClient::new(&path).send_stream(b"in time").await.unwrap();

    let summary = running.finish().await.unwrap();
    assert_eq!(received_text(summary.stream.as_ref()), "in time");
}

#[tokio::test]
async fn silent_stream_peer_is_not_fatal() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Stream).await;
    PeerClient::new(&path).send_stream(b"").await.unwrap();

    let summary = running.finish().await.unwrap();
    assert!(matches!(
        summary.stream,
        Some(ReceiveOutcome::NothingReceived(TransferError::Empty))
    ));
}

#[tokio::test]
async fn oversize_stream_message_is_rejected_when_configured() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .max_payload(4, OversizePolicy::Reject)
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Stream).await;
    PeerClient::new(&path).send_stream(b"hello").await.unwrap();

    let summary = running.finish().await.unwrap();
    assert!(matches!(
        summary.stream,
        Some(ReceiveOutcome::NothingReceived(TransferError::Oversize { max: 4 }))
    ));
}

#[tokio::test]
async fn oversize_datagram_is_truncated_by_default() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .datagram_path(sockets.datagram_path())
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Datagram).await;
    PeerClient::new(&path)
        .send_datagram(&[b'x'; 300])
        .await
        .unwrap();

    let summary = running.finish().await.unwrap();
    let payload = summary.datagram.as_ref().and_then(|o| o.payload()).unwrap();
    assert_eq!(payload.len(), 255);
    assert!(payload.is_truncated());
}

#[tokio::test]
async fn stale_file_at_stream_path_is_replaced() {
    let sockets = TestSockets::new();
    std::fs::write(sockets.stream_path(), b"stale").unwrap();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Stream).await;
    PeerClient::new(&path).send_stream(b"fresh").await.unwrap();

    let summary = running.finish().await.unwrap();
    assert_eq!(received_text(summary.stream.as_ref()), "fresh");
}

fn closed_kinds(events: &[ServiceEvent]) -> Vec<TransportKind> {
    events
        .iter()
        .filter_map(|event| match event {
            ServiceEvent::Closed { kind } => Some(*kind),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn empty_stream_read_still_reports_closed() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Stream).await;
    PeerClient::new(&path).send_stream(b"").await.unwrap();

    assert!(matches!(
        running.next_event().await,
        ServiceEvent::NothingReceived {
            kind: TransportKind::Stream,
            ..
        }
    ));
    assert!(matches!(
        running.next_event().await,
        ServiceEvent::Closed {
            kind: TransportKind::Stream
        }
    ));
    running.finish().await.unwrap();
}

#[tokio::test]
async fn rejected_datagram_still_reports_closed() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .datagram_path(sockets.datagram_path())
        .max_payload(2, OversizePolicy::Reject)
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Datagram).await;
    PeerClient::new(&path).send_datagram(b"too long").await.unwrap();

    let events = running.drain_events().await;
    assert_eq!(closed_kinds(&events), vec![TransportKind::Datagram]);
    assert!(matches!(
        running.finish().await.unwrap().datagram,
        Some(ReceiveOutcome::NothingReceived(TransferError::Oversize { max: 2 }))
    ));
}

#[tokio::test]
async fn stream_bind_failure_reports_closed_before_error() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.unbindable_path())
        .datagram_path(sockets.datagram_path())
        .build();

    let mut running = spawn_service(config);
    let events = running.drain_events().await;

    assert_eq!(closed_kinds(&events), vec![TransportKind::Stream]);
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, ServiceEvent::Ready { .. }))
    );
    assert!(matches!(
        running.finish().await,
        Err(ServiceError::Channel(ChannelError::Address { op: "bind", .. }))
    ));
}

#[test_log::test(tokio::test)]
async fn interrupt_closes_listener_and_fails_run() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .stream_path(sockets.stream_path())
        .datagram_path(sockets.datagram_path())
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Stream).await;
    running.interrupt();

    let err = running.finish().await.unwrap_err();
    assert!(matches!(err, ServiceError::Interrupted));
    assert_eq!(err.exit_code(), 1);
    assert!(tokio::net::UnixStream::connect(&path).await.is_err());
    assert!(!sockets.datagram_path().exists());
}

#[tokio::test]
async fn out_of_range_timeout_behaves_like_a_long_deadline() {
    let sockets = TestSockets::new();
    let config = TestConfigBuilder::new()
        .datagram_path(sockets.datagram_path())
        .timeout_secs(u64::MAX)
        .build();

    let mut running = spawn_service(config);
    let path = running.ready(TransportKind::Datagram).await;
    PeerClient::new(&path).send_datagram(b"ping").await.unwrap();

    let summary = running.finish().await.unwrap();
    assert_eq!(received_text(summary.datagram.as_ref()), "ping");
}

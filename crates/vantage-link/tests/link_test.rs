#![allow(clippy::unwrap_used)]
// Integration tests for the supervised link loop against simulated controllers.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use vantage_link::{
    ConnectParams, Credentials, Error, LinkConfig, LinkEvent, LinkFactory, LinkHandle, LinkState,
    MemoryController, MemoryNetwork, ObjectCommand, ObjectState, ObjectType, ReconnectConfig,
    SystemObject, Vid,
};

// ── Helpers ─────────────────────────────────────────────────────────

const HOST: &str = "192.168.1.50";

fn controller() -> Arc<MemoryController> {
    Arc::new(
        MemoryController::new(HOST, "12345678")
            .with_login("administrator", "hunter2")
            .with_objects([
                SystemObject::new(1, "Master", ObjectType::Master),
                SystemObject::new(214, "Kitchen Pendants", ObjectType::Load),
                SystemObject::new(683, "Toggle Office Lights", ObjectType::Task),
            ]),
    )
}

fn params() -> ConnectParams {
    ConnectParams::new(HOST).with_credentials(Credentials::new("administrator", "hunter2"))
}

async fn connect(ctrl: &Arc<MemoryController>, config: LinkConfig) -> Result<LinkHandle, Error> {
    let network = MemoryNetwork::new().with_controller(Arc::clone(ctrl));
    let est = LinkHandle::connect(network.connector(&params()), config, CancellationToken::new())
        .await?;
    Ok(est.handle)
}

async fn next_event(rx: &mut broadcast::Receiver<Arc<LinkEvent>>) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("timed out waiting for link event")
        .unwrap()
        .as_ref()
        .clone()
}

// ── Setup ───────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_returns_info_and_directory() {
    let ctrl = controller();
    let network = MemoryNetwork::new().with_controller(Arc::clone(&ctrl));
    let est = LinkHandle::connect(
        network.connector(&params()),
        LinkConfig::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(est.info.serial_number, "12345678");
    assert_eq!(est.objects.len(), 3);
    assert_eq!(est.objects[2].vid, Vid(683));
    assert!(est.handle.is_connected());
    est.handle.shutdown().await;
}

#[tokio::test]
async fn setup_failures_are_returned_not_retried() {
    let network = MemoryNetwork::new().with_controller(controller());

    let bad_login = ConnectParams::new(HOST).with_credentials(Credentials::new("administrator", "x"));
    let err = LinkHandle::connect(
        network.connector(&bad_login),
        LinkConfig::default(),
        CancellationToken::new(),
    )
    .await
    .err()
    .unwrap();
    assert!(err.is_auth_failure(), "got {err:?}");

    let err = LinkHandle::connect(
        network.connector(&ConnectParams::new("10.1.1.1")),
        LinkConfig::default(),
        CancellationToken::new(),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, Error::Connect { .. }), "got {err:?}");
}

// ── Event fan-out ───────────────────────────────────────────────────

#[tokio::test]
async fn pushed_updates_reach_subscribers_in_order() {
    let ctrl = controller();
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    let mut rx = handle.subscribe();
    handle.start();

    for level in [10.0, 20.0, 30.0] {
        ctrl.push_update(
            Vid(214),
            ObjectState {
                level: Some(level),
                ..ObjectState::default()
            },
        )
        .await;
    }

    for expected in [10.0, 20.0, 30.0] {
        match next_event(&mut rx).await {
            LinkEvent::ObjectUpdated { vid, changes } => {
                assert_eq!(vid, Vid(214));
                assert_eq!(changes.level, Some(expected));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn commands_are_delivered_and_echoed() {
    let ctrl = controller();
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    let mut rx = handle.subscribe();
    handle.start();

    handle
        .send(ObjectCommand::StartTask { vid: Vid(683) })
        .await
        .unwrap();

    assert_eq!(
        ctrl.sent_commands().await,
        vec![ObjectCommand::StartTask { vid: Vid(683) }]
    );
    match next_event(&mut rx).await {
        LinkEvent::ObjectUpdated { vid, changes } => {
            assert_eq!(vid, Vid(683));
            assert_eq!(changes.running, Some(true));
        }
        other => panic!("unexpected event {other:?}"),
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn rejected_command_is_reported_once() {
    let ctrl = controller();
    ctrl.set_reject_commands(true).await;
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    handle.start();

    let err = handle
        .send(ObjectCommand::StopTask { vid: Vid(683) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected { .. }));
    assert!(ctrl.sent_commands().await.is_empty());
    assert!(handle.is_connected());
    handle.shutdown().await;
}

// ── Reconnect ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transport_loss_reconnects_with_fresh_directory() {
    let ctrl = controller();
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    let mut rx = handle.subscribe();
    handle.start();

    ctrl.forget_object(Vid(214)).await;
    ctrl.drop_connection("cable pulled").await;

    match next_event(&mut rx).await {
        LinkEvent::Disconnected { reason } => assert!(reason.contains("cable pulled")),
        other => panic!("expected Disconnected, got {other:?}"),
    }
    match next_event(&mut rx).await {
        LinkEvent::Reconnected { objects } => {
            let vids: Vec<Vid> = objects.iter().map(|o| o.vid).collect();
            assert_eq!(vids, vec![Vid(1), Vid(683)]);
        }
        other => panic!("expected Reconnected, got {other:?}"),
    }

    assert_eq!(ctrl.session_count().await, 2);
    assert_eq!(*handle.state().borrow(), LinkState::Connected);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn commands_fail_fast_while_disconnected() {
    let ctrl = controller();
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    let mut rx = handle.subscribe();
    handle.start();

    ctrl.set_reachable(false).await;
    assert!(matches!(
        next_event(&mut rx).await,
        LinkEvent::Disconnected { .. }
    ));

    let err = handle
        .send(ObjectCommand::StartTask { vid: Vid(683) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotConnected), "got {err:?}");
    assert!(ctrl.sent_commands().await.is_empty(), "nothing queued for later");

    ctrl.set_reachable(true).await;
    assert!(matches!(
        next_event(&mut rx).await,
        LinkEvent::Reconnected { .. }
    ));
    handle
        .send(ObjectCommand::StartTask { vid: Vid(683) })
        .await
        .unwrap();
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exactly_one_disconnect_per_loss() {
    let ctrl = controller();
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    let mut rx = handle.subscribe();
    handle.start();

    // Several failed reconnect attempts before the host comes back.
    ctrl.set_reachable(false).await;
    tokio::time::sleep(Duration::from_secs(20)).await;
    ctrl.set_reachable(true).await;

    let mut disconnects = 0;
    loop {
        match next_event(&mut rx).await {
            LinkEvent::Disconnected { .. } => disconnects += 1,
            LinkEvent::Reconnected { .. } => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(disconnects, 1);
    assert!(ctrl.session_count().await >= 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_on_reconnect_stop_the_loop() {
    let ctrl = controller();
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    handle.start();

    ctrl.set_login("administrator", "rotated").await;
    ctrl.drop_connection("controller restarted").await;

    let mut state = handle.state();
    let final_state = state
        .wait_for(|s| *s == LinkState::AuthFailed)
        .await
        .unwrap()
        .clone();
    assert_eq!(final_state, LinkState::AuthFailed);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_exhaustion_fails_the_link() {
    let ctrl = controller();
    let config = LinkConfig {
        reconnect: ReconnectConfig {
            max_retries: Some(2),
            ..ReconnectConfig::default()
        },
        ..LinkConfig::default()
    };
    let handle = connect(&ctrl, config).await.unwrap();
    handle.start();

    ctrl.set_reachable(false).await;

    let mut state = handle.state();
    state.wait_for(|s| *s == LinkState::Failed).await.unwrap();
    assert!(matches!(
        handle.send(ObjectCommand::StartTask { vid: Vid(683) }).await,
        Err(Error::NotConnected)
    ));
}

// ── Timeouts ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn command_timeout_is_a_failure_without_dropping_the_session() {
    let ctrl = controller();
    let config = LinkConfig {
        command_timeout: Duration::from_secs(2),
        ..LinkConfig::default()
    };
    let handle = connect(&ctrl, config).await.unwrap();
    handle.start();

    ctrl.set_command_latency(Some(Duration::from_secs(30))).await;
    let err = handle
        .send(ObjectCommand::StartTask { vid: Vid(683) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_secs: 2 }), "got {err:?}");

    ctrl.set_command_latency(None).await;
    handle
        .send(ObjectCommand::StopTask { vid: Vid(683) })
        .await
        .unwrap();
    assert_eq!(
        ctrl.sent_commands().await,
        vec![ObjectCommand::StopTask { vid: Vid(683) }],
        "timed-out command is never retried"
    );
    assert_eq!(ctrl.session_count().await, 1);
    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_the_link() {
    let ctrl = controller();
    let handle = connect(&ctrl, LinkConfig::default()).await.unwrap();
    handle.start();
    handle.shutdown().await;

    assert_eq!(*handle.state().borrow(), LinkState::Closed);
    assert!(matches!(
        handle.send(ObjectCommand::StartTask { vid: Vid(683) }).await,
        Err(Error::NotConnected)
    ));
}

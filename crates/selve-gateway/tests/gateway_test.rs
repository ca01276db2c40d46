//! Engine tests against a scripted fake gateway.
//!
//! Each test connects a [`Gateway`] to one end of an in-memory pipe and plays
//! the gateway on the other end, either step by step or with a handler that
//! answers every call.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use parking_lot::Mutex;
use selve_gateway::protocol::*;
use selve_gateway::*;

/// Complete one ping. Frames are handled in order, so everything sent
/// before has been consumed once this returns.
async fn round_trip(gateway: &Gateway, fake: &mut FakeGateway) {
    let ping = tokio::spawn({
        let g = gateway.clone();
        async move { g.ping().await }
    });
    fake.next_call().await;
    fake.respond(Method::ServicePing, vec![]).await;
    ping.await.unwrap().unwrap();
}

/// Same as [`round_trip`], with a method other than ping.
async fn sync_state(gateway: &Gateway, fake: &mut FakeGateway) {
    let state = tokio::spawn({
        let g = gateway.clone();
        async move { g.gateway_state().await }
    });
    fake.next_call().await;
    fake.respond(Method::ServiceGetState, vec![Value::Int(3)]).await;
    assert_eq!(state.await.unwrap().unwrap(), ServiceState::Ready);
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_same_method_responses_resolve_in_submission_order() {
    let (gateway, mut fake) = connect().await;

    let a = tokio::spawn({
        let g = gateway.clone();
        async move { g.submit(MethodCall::device_get_values(1)).await }
    });
    let first = fake.next_call().await;
    let b = tokio::spawn({
        let g = gateway.clone();
        async move { g.submit(MethodCall::device_get_values(2)).await }
    });
    let second = fake.next_call().await;
    assert_eq!(first.params[0], Value::Int(1));
    assert_eq!(second.params[0], Value::Int(2));

    let r1 = device_values(1, "R1", MovementState::StoppedOff, 0);
    let r2 = device_values(2, "R2", MovementState::StoppedOff, 0);
    fake.respond(Method::DeviceGetValues, r1.clone()).await;
    fake.respond(Method::DeviceGetValues, r2.clone()).await;

    assert_eq!(a.await.unwrap().unwrap().values, r1);
    assert_eq!(b.await.unwrap().unwrap().values, r2);
    assert_eq!(gateway.pending_commands(), 0);
}

#[tokio::test]
async fn test_timeout_then_late_response_is_discarded() {
    let (gateway, mut fake) = connect().await;

    let err = gateway
        .submit_with_timeout(MethodCall::get_state(), Duration::from_millis(150))
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::Timeout(Duration::from_millis(150)));
    assert_eq!(gateway.pending_commands(), 0);

    // The answer to the timed-out call shows up late.
    fake.next_call().await;
    fake.respond(Method::ServiceGetState, vec![Value::Int(2)]).await;
    round_trip(&gateway, &mut fake).await;

    let next = tokio::spawn({
        let g = gateway.clone();
        async move { g.gateway_state().await }
    });
    fake.next_call().await;
    fake.respond(Method::ServiceGetState, vec![Value::Int(3)]).await;

    assert_eq!(next.await.unwrap().unwrap(), ServiceState::Ready);
    assert_eq!(gateway.state(), WorkerState::Running);
}

#[tokio::test]
async fn test_malformed_frame_between_valid_frames() {
    let (gateway, mut fake) = connect().await;

    let ping = tokio::spawn({
        let g = gateway.clone();
        async move { g.ping().await }
    });
    fake.next_call().await;
    let state = tokio::spawn({
        let g = gateway.clone();
        async move { g.gateway_state().await }
    });
    fake.next_call().await;

    let mut burst = MethodResponse::new(Method::ServicePing, vec![]).encode().unwrap();
    burst.extend_from_slice(b"<methodResponse><array></methodResponse>");
    burst.extend_from_slice(&MethodResponse::new(Method::ServiceGetState, vec![Value::Int(3)]).encode().unwrap());
    fake.send_raw(&burst).await;

    ping.await.unwrap().unwrap();
    assert_eq!(state.await.unwrap().unwrap(), ServiceState::Ready);
    assert_eq!(gateway.state(), WorkerState::Running);
}

#[tokio::test]
async fn test_fault_rejects_the_pending_call() {
    let (gateway, mut fake) = connect().await;

    let read = tokio::spawn({
        let g = gateway.clone();
        async move { g.submit(MethodCall::group_read(9)).await }
    });
    fake.next_call().await;
    fake.fault(FaultCode::IdNotUsed).await;

    assert_eq!(
        read.await.unwrap().unwrap_err(),
        CommandError::Rejected(FaultCode::IdNotUsed)
    );
}

#[tokio::test]
async fn test_cancelled_call_does_not_steal_later_answers() {
    let (gateway, mut fake) = connect().await;

    let cancelled = tokio::spawn({
        let g = gateway.clone();
        async move { g.ping().await }
    });
    fake.next_call().await;
    cancelled.abort();
    let _ = cancelled.await;
    assert!(eventually(|| gateway.pending_commands() == 0).await);

    // Answer to the cancelled call, then a fresh call and its own answer.
    fake.respond(Method::ServicePing, vec![Value::Str("stale".into())]).await;
    sync_state(&gateway, &mut fake).await;
    let fresh = tokio::spawn({
        let g = gateway.clone();
        async move { g.submit(MethodCall::ping()).await }
    });
    fake.next_call().await;
    fake.respond(Method::ServicePing, vec![Value::Str("fresh".into())]).await;

    let response = fresh.await.unwrap().unwrap();
    assert_eq!(response.values, vec![Value::Str("fresh".into())]);
}

#[tokio::test]
async fn test_unanswered_call_does_not_starve_later_calls() {
    let (gateway, mut fake) = connect().await;

    let err = gateway
        .submit_with_timeout(MethodCall::ping(), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::Timeout(Duration::from_millis(200)));
    // Written, never answered.
    fake.next_call().await;

    for n in 0..3 {
        let ping = tokio::spawn({
            let g = gateway.clone();
            async move { g.submit(MethodCall::ping()).await }
        });
        fake.next_call().await;
        fake.respond(Method::ServicePing, vec![Value::Int(n)]).await;
        let response = ping.await.unwrap().unwrap();
        assert_eq!(response.values, vec![Value::Int(n)]);
    }
    assert_eq!(gateway.pending_commands(), 0);
    assert_eq!(gateway.state(), WorkerState::Running);
}

#[tokio::test]
async fn test_oversized_frame_is_discarded() {
    let (gateway, mut fake) = connect_with(GatewayConfig {
        max_frame_size: 256,
        ..test_config()
    })
    .await;

    let ping = tokio::spawn({
        let g = gateway.clone();
        async move { g.ping().await }
    });
    fake.next_call().await;

    // Start of a response that never ends within the size limit.
    let mut junk = b"<?xml version=\"1.0\"?><methodResponse><array><string>".to_vec();
    junk.extend(std::iter::repeat(b'x').take(1024));
    fake.send_raw(&junk).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    fake.respond(Method::ServicePing, vec![]).await;

    ping.await.unwrap().unwrap();
    assert_eq!(gateway.state(), WorkerState::Running);
}

#[tokio::test]
async fn test_orphaned_response_is_dropped() {
    let (gateway, mut fake) = connect().await;

    fake.respond(Method::GroupGetIds, vec![mask(&[1])]).await;

    let ping = tokio::spawn({
        let g = gateway.clone();
        async move { g.ping().await }
    });
    fake.next_call().await;
    fake.respond(Method::ServicePing, vec![]).await;
    ping.await.unwrap().unwrap();
    assert!(gateway.entities(EntityKind::Group).is_empty());
}

// ============================================================================
// Discovery
// ============================================================================

/// A gateway with devices 1 and 5 and group 3 ("Living Room").
fn serve_living_room(fake: FakeGateway, devices: Arc<Mutex<Vec<u8>>>) {
    fake.serve(move |call| {
        let id = call.params.first().and_then(Value::as_int).unwrap_or(0) as u8;
        match call.method {
            Method::ServiceGetState => Reply::Values(vec![Value::Int(ServiceState::Ready.ordinal())]),
            Method::DeviceGetIds => Reply::Values(vec![mask(&devices.lock())]),
            Method::GroupGetIds => Reply::Values(vec![mask(&[3])]),
            Method::IveoGetIds | Method::SensorGetIds | Method::SenderGetIds | Method::SenSimGetIds => {
                Reply::Values(vec![mask(&[])])
            }
            Method::DeviceGetInfo => Reply::Values(device_info(id, &format!("Blind {}", id))),
            Method::DeviceGetValues => Reply::Values(device_values(id, "", MovementState::StoppedOff, 65535)),
            Method::GroupRead => Reply::Values(group_record(id, "Living Room", &[1, 2, 5])),
            _ => Reply::Fault(FaultCode::MethodNotSupported),
        }
    });
}

fn without_timestamps(entities: Vec<Entity>) -> Vec<(u8, Option<String>, EntityDetails, bool)> {
    entities
        .into_iter()
        .map(|e| (e.id, e.name, e.details, e.placeholder))
        .collect()
}

#[tokio::test]
async fn test_discovery_populates_registry() {
    let (gateway, fake) = connect().await;
    serve_living_room(fake, Arc::new(Mutex::new(vec![1, 5])));

    assert_eq!(gateway.discover_all().await.unwrap(), 3);

    let group = gateway.entity(EntityKind::Group, 3).unwrap();
    assert_eq!(group.name.as_deref(), Some("Living Room"));
    assert_eq!(group.members().unwrap().ids(), vec![1, 2, 5]);

    let device = gateway.entity(EntityKind::Device, 5).unwrap();
    assert_eq!(device.name.as_deref(), Some("Blind 5"));
    assert!(!device.placeholder);
    let details = device.device().unwrap();
    assert_eq!(details.device_type, Some(DeviceType::Shutter));
    assert_eq!(details.position, Some(100));
    assert_eq!(device.coarse_state(), Some(CoarseState::Idle));
}

#[tokio::test]
async fn test_discovery_is_idempotent() {
    let (gateway, fake) = connect().await;
    serve_living_room(fake, Arc::new(Mutex::new(vec![1, 5])));

    gateway.discover_all().await.unwrap();
    let first = without_timestamps(gateway.all_entities());

    let notified = Arc::new(AtomicUsize::new(0));
    let n = notified.clone();
    gateway.subscribe(Interest::Any, move |_| {
        n.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    gateway.discover_all().await.unwrap();
    assert_eq!(without_timestamps(gateway.all_entities()), first);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_discovery_prunes_removed_entities() {
    let (gateway, fake) = connect().await;
    let devices = Arc::new(Mutex::new(vec![1, 5]));
    serve_living_room(fake, devices.clone());

    gateway.discover(EntityKind::Device).await.unwrap();
    assert_eq!(gateway.entities(EntityKind::Device).len(), 2);

    let removed = Arc::new(Mutex::new(Vec::new()));
    let r = removed.clone();
    gateway.subscribe(Interest::Kind(EntityKind::Device), move |n| {
        if let Notification::EntityRemoved { id, .. } = n {
            r.lock().push(*id);
        }
        Ok(())
    });

    devices.lock().retain(|id| *id != 5);
    let remaining = gateway.discover(EntityKind::Device).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(*removed.lock(), vec![5]);
}

#[tokio::test]
async fn test_discover_all_requires_ready() {
    let (gateway, fake) = connect().await;
    fake.serve(|call| match call.method {
        Method::ServiceGetState => Reply::Values(vec![Value::Int(ServiceState::Startup.ordinal())]),
        _ => Reply::Silent,
    });

    let err = gateway.discover_all().await.unwrap_err();
    assert!(matches!(err, GatewayError::NotReady(ServiceState::Startup)));
}

// ============================================================================
// Mutation intents
// ============================================================================

#[tokio::test]
async fn test_set_position_writes_one_call_and_leaves_registry_alone() {
    let (gateway, mut fake) = connect().await;

    let call = tokio::spawn({
        let g = gateway.clone();
        async move { g.set_position(5, 50).await }
    });
    let written = fake.next_call().await;
    assert_eq!(written.method, Method::CommandDevice);
    assert_eq!(
        written.params,
        vec![
            Value::Int(5),
            Value::Int(DriveCommand::DrivePos.ordinal()),
            Value::Int(CommandType::Manual.ordinal()),
            Value::Int(32767),
        ]
    );
    fake.respond(Method::CommandDevice, vec![Value::Int(1)]).await;

    assert!(call.await.unwrap().unwrap());
    assert!(fake.is_silent(Duration::from_millis(50)).await);
    assert!(gateway.entity(EntityKind::Device, 5).is_none());
}

#[tokio::test]
async fn test_invalid_intent_writes_nothing() {
    let (gateway, mut fake) = connect().await;

    let err = gateway.set_position(5, 150).await.unwrap_err();
    assert!(matches!(err.as_command(), Some(CommandError::Encoding(_))));
    let err = gateway.stop(64).await.unwrap_err();
    assert!(matches!(err.as_command(), Some(CommandError::Encoding(_))));

    assert!(fake.is_silent(Duration::from_millis(50)).await);
    assert_eq!(gateway.pending_commands(), 0);
}

#[tokio::test]
async fn test_confirmed_delete_removes_entity() {
    let (gateway, fake) = connect().await;
    fake.serve(|call| match call.method {
        Method::DeviceDelete => executed(),
        Method::DeviceGetIds => Reply::Values(vec![mask(&[1])]),
        Method::DeviceGetInfo => Reply::Values(device_info(1, "Kitchen")),
        Method::DeviceGetValues => Reply::Values(device_values(1, "", MovementState::StoppedOff, 0)),
        _ => Reply::Fault(FaultCode::MethodNotSupported),
    });

    gateway.discover(EntityKind::Device).await.unwrap();
    assert!(gateway.entity(EntityKind::Device, 1).is_some());

    assert!(gateway.delete(EntityKind::Device, 1).await.unwrap());
    assert!(gateway.entity(EntityKind::Device, 1).is_none());
}

#[tokio::test]
async fn test_group_label_is_unsupported() {
    let (gateway, mut fake) = connect().await;

    let err = gateway.set_label(EntityKind::Group, 1, "Hall").await.unwrap_err();
    assert!(matches!(err, GatewayError::Unsupported { .. }));
    assert!(fake.is_silent(Duration::from_millis(50)).await);
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_event_for_unknown_device_creates_placeholder() {
    let (gateway, mut fake) = connect().await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let g = gateway.clone();
    gateway.subscribe(Interest::Kind(EntityKind::Device), move |n| {
        if let Notification::EntityUpdated { entity, created } = n {
            // The registry already holds what the callback is told.
            assert_eq!(g.entity(EntityKind::Device, entity.id).as_ref(), Some(entity));
            s.lock().push((entity.id, *created, entity.coarse_state()));
        }
        Ok(())
    });

    fake.event(Method::EventDevice, device_event(7, MovementState::DownOn, 0)).await;
    assert!(eventually(|| !seen.lock().is_empty()).await);

    assert_eq!(seen.lock()[0], (7, true, Some(CoarseState::Moving)));
    assert!(gateway.entity(EntityKind::Device, 7).unwrap().placeholder);
}

#[tokio::test]
async fn test_failing_subscriber_does_not_stop_worker() {
    let (gateway, mut fake) = connect().await;

    gateway.subscribe(Interest::Any, |_| panic!("subscriber bug"));
    gateway.subscribe(Interest::Any, |_| Err("refused".into()));
    let delivered = Arc::new(AtomicUsize::new(0));
    let d = delivered.clone();
    gateway.subscribe(Interest::Kind(EntityKind::Device), move |_| {
        d.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    fake.event(Method::EventDevice, device_event(1, MovementState::UpOn, 0)).await;
    fake.event(Method::EventDevice, device_event(1, MovementState::StoppedOff, 65535)).await;
    assert!(eventually(|| delivered.load(Ordering::SeqCst) == 2).await);

    let ping = tokio::spawn({
        let g = gateway.clone();
        async move { g.ping().await }
    });
    fake.next_call().await;
    fake.respond(Method::ServicePing, vec![]).await;
    ping.await.unwrap().unwrap();
    assert_eq!(gateway.state(), WorkerState::Running);
}

#[tokio::test]
async fn test_unsolicited_command_result_reaches_status() {
    let (gateway, mut fake) = connect().await;

    fake.respond(
        Method::CommandResult,
        vec![
            Value::Int(DriveCommand::DriveDown.ordinal()),
            Value::Int(CommandType::Manual.ordinal()),
            Value::Int(1),
            mask(&[1, 2]),
            mask(&[]),
        ],
    )
    .await;

    assert!(eventually(|| gateway.status().last_command_result.is_some()).await);
    let result = gateway.status().last_command_result.unwrap();
    assert_eq!(result.drive_command(), Some(DriveCommand::DriveDown));
    assert_eq!(result.succeeded.ids(), vec![1, 2]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_transport_loss_fails_pending_calls() {
    let (gateway, mut fake) = connect().await;

    let lost = Arc::new(Mutex::new(None));
    let l = lost.clone();
    gateway.subscribe(Interest::Kind(EntityKind::Group), move |n| {
        if let Notification::ConnectionLost { reason } = n {
            *l.lock() = Some(reason.clone());
        }
        Ok(())
    });

    let calls: Vec<_> = [MethodCall::ping(), MethodCall::group_read(3)]
        .into_iter()
        .map(|call| {
            let g = gateway.clone();
            tokio::spawn(async move { g.submit(call).await })
        })
        .collect();
    fake.next_call().await;
    fake.next_call().await;
    assert_eq!(gateway.pending_commands(), 2);

    drop(fake);
    for call in calls {
        assert_eq!(call.await.unwrap().unwrap_err(), CommandError::ConnectionLost);
    }
    assert!(eventually(|| gateway.state() == WorkerState::Faulted).await);
    assert!(lost.lock().is_some());

    let err = gateway.submit(MethodCall::ping()).await.unwrap_err();
    assert_eq!(err, CommandError::NotRunning);
}

#[tokio::test]
async fn test_stalled_transport_times_out_and_faults() {
    // Nobody reads the far end, so the pipe fills and writes block.
    let (local, _remote) = tokio::io::duplex(16);
    let gateway = Gateway::connect(local, test_config()).await.unwrap();

    let calls: Vec<_> = (0..2)
        .map(|_| {
            let g = gateway.clone();
            tokio::spawn(async move {
                tokio::time::timeout(
                    Duration::from_secs(2),
                    g.submit_with_timeout(MethodCall::ping(), Duration::from_millis(100)),
                )
                .await
            })
        })
        .collect();

    let mut timeouts = 0;
    for call in calls {
        let outcome = call.await.unwrap().expect("call outlived its own timeout");
        match outcome.unwrap_err() {
            CommandError::Timeout(t) => {
                assert_eq!(t, Duration::from_millis(100));
                timeouts += 1;
            }
            CommandError::ConnectionLost | CommandError::NotRunning => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
    assert!(timeouts >= 1);
    assert!(eventually(|| gateway.state() == WorkerState::Faulted).await);
    assert_eq!(gateway.pending_commands(), 0);
}

#[tokio::test]
async fn test_disconnect_cancels_after_grace_period() {
    let (gateway, mut fake) = connect().await;

    let pending = tokio::spawn({
        let g = gateway.clone();
        async move { g.submit(MethodCall::group_read(1)).await }
    });
    fake.next_call().await;

    gateway.disconnect().await.unwrap();
    assert_eq!(pending.await.unwrap().unwrap_err(), CommandError::Cancelled);
    assert_eq!(gateway.state(), WorkerState::Stopped);
    assert_eq!(
        gateway.submit(MethodCall::ping()).await.unwrap_err(),
        CommandError::NotRunning
    );
}

#[tokio::test]
async fn test_disconnect_lets_in_flight_calls_finish() {
    let (gateway, mut fake) = connect_with(GatewayConfig {
        shutdown_grace_ms: 1_000,
        ..test_config()
    })
    .await;

    let pending = tokio::spawn({
        let g = gateway.clone();
        async move { g.gateway_state().await }
    });
    fake.next_call().await;

    let disconnect = tokio::spawn({
        let g = gateway.clone();
        async move { g.disconnect().await }
    });
    assert!(eventually(|| gateway.state() == WorkerState::Stopping).await);
    fake.respond(Method::ServiceGetState, vec![Value::Int(3)]).await;

    assert_eq!(pending.await.unwrap().unwrap(), ServiceState::Ready);
    disconnect.await.unwrap().unwrap();
    assert_eq!(gateway.state(), WorkerState::Stopped);
}

#[tokio::test]
async fn test_connect_enables_events() {
    let (local, remote) = tokio::io::duplex(4096);
    let mut fake = FakeGateway::new(remote);
    let connect = tokio::spawn(Gateway::connect(
        local,
        GatewayConfig {
            enable_events: true,
            ..test_config()
        },
    ));

    let call = fake.next_call().await;
    assert_eq!(call.method, Method::ParamSetEvent);
    assert_eq!(call.params, vec![Value::Int(1); 5]);
    fake.respond(Method::ParamSetEvent, vec![Value::Int(1)]).await;

    let gateway = connect.await.unwrap().unwrap();
    assert_eq!(gateway.state(), WorkerState::Running);
}

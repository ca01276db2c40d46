//! Event routing: registry updates and subscriber delivery.
//!
//! Callbacks run synchronously on the worker task, in registration order,
//! after the registry has been updated. They must not block. A callback that
//! wants to issue gateway calls must clone the [`Gateway`](crate::Gateway)
//! and `tokio::spawn` the call; awaiting a response from inside a callback
//! would stall the loop that delivers it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use selve_metrics::{metric_defs, MetricLabels};
use selve_protocol::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::entity::{Entity, EntityKind, EntityUpdate};
use crate::registry::Registry;

/// Which notifications a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Entity notifications for one kind, plus connection loss.
    Kind(EntityKind),
    /// Everything.
    Any,
}

/// Something a subscriber is told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// An entity was created or its attributes changed.
    EntityUpdated { entity: Entity, created: bool },
    /// An entity no longer exists on the gateway.
    EntityRemoved { kind: EntityKind, id: u8 },
    Log(LogEntry),
    DutyCycle(DutyCycle),
    CommandResult(CommandResult),
    IveoResult(IveoResult),
    ScanProgress(ScanResult),
    SensorTeach(SensorTeachResult),
    SenderTeach(SenderTeachResult),
    /// The session ended; every pending call failed.
    ConnectionLost { reason: String },
}

impl Notification {
    /// Entity kind this notification concerns, if any.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Notification::EntityUpdated { entity, .. } => Some(entity.kind()),
            Notification::EntityRemoved { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    fn matches(&self, interest: Interest) -> bool {
        match interest {
            Interest::Any => true,
            Interest::Kind(kind) => {
                matches!(self, Notification::ConnectionLost { .. }) || self.kind() == Some(kind)
            }
        }
    }
}

/// Error type subscriber callbacks may return.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// A subscriber callback.
pub type Callback = Arc<dyn Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync>;

/// Identifies a subscription for [`Router::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    handle: SubscriptionHandle,
    interest: Interest,
    callback: Callback,
}

/// Gateway-level state reported by events, cached for callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub last_log: Option<LogEntry>,
    pub duty_cycle: Option<DutyCycle>,
    pub last_command_result: Option<CommandResult>,
    pub last_iveo_result: Option<IveoResult>,
    pub scan: Option<ScanResult>,
    pub sensor_teach: Option<SensorTeachResult>,
    pub sender_teach: Option<SenderTeachResult>,
}

/// Applies gateway reports to the registry and fans them out.
pub struct Router {
    registry: Arc<Registry>,
    subscriptions: RwLock<Vec<Subscription>>,
    next_handle: AtomicU64,
    status: Mutex<GatewayStatus>,
    labels: MetricLabels,
}

impl Router {
    pub fn new(registry: Arc<Registry>, labels: MetricLabels) -> Self {
        Router {
            registry,
            subscriptions: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            status: Mutex::new(GatewayStatus::default()),
            labels,
        }
    }

    pub fn subscribe<F>(&self, interest: Interest, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            handle,
            interest,
            callback: Arc::new(callback),
        });
        debug!("subscription {:?} registered for {:?}", handle, interest);
        handle
    }

    /// Remove a subscription. Returns false if the handle was unknown.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.handle != handle);
        subs.len() != before
    }

    pub fn status(&self) -> GatewayStatus {
        self.status.lock().clone()
    }

    /// Deliver to every matching subscriber, isolating failures.
    pub fn publish(&self, notification: &Notification) {
        // Snapshot so callbacks may subscribe or unsubscribe.
        let targets: Vec<(SubscriptionHandle, Callback)> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| notification.matches(s.interest))
            .map(|s| (s.handle, s.callback.clone()))
            .collect();

        for (handle, callback) in targets {
            let failure = match catch_unwind(AssertUnwindSafe(|| callback(notification))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("callback panicked".to_string()),
            };
            if let Some(reason) = failure {
                error!("subscriber {:?} failed: {}", handle, reason);
                metrics::counter!(metric_defs::SUBSCRIBER_FAILURES.name, &self.labels.to_labels()).increment(1);
            }
        }
    }

    /// Merge a discovery or refresh result and notify on change.
    pub fn apply_update(&self, update: &EntityUpdate) -> Entity {
        let applied = self.registry.apply(update);
        if applied.created {
            self.record_entity_count(applied.entity.kind());
        }
        if applied.changed {
            self.publish(&Notification::EntityUpdated {
                entity: applied.entity.clone(),
                created: applied.created,
            });
        }
        applied.entity
    }

    /// Remove an entity and notify.
    pub fn remove_entity(&self, kind: EntityKind, id: u8) -> Option<Entity> {
        let removed = self.registry.remove(kind, id)?;
        self.record_entity_count(kind);
        self.publish(&Notification::EntityRemoved { kind, id });
        Some(removed)
    }

    /// Drop entities of `kind` missing from `ids` and notify for each.
    pub fn prune(&self, kind: EntityKind, ids: IdMask) -> usize {
        let removed = self.registry.retain_ids(kind, ids);
        if removed.is_empty() {
            return 0;
        }
        self.record_entity_count(kind);
        for entity in &removed {
            debug!("{} {} no longer reported, removing", kind, entity.id);
            self.publish(&Notification::EntityRemoved { kind, id: entity.id });
        }
        removed.len()
    }

    /// Route one unsolicited gateway event.
    pub fn dispatch(&self, event: GatewayEvent) {
        metrics::counter!(
            metric_defs::EVENTS_DISPATCHED.name,
            &self.labels.with(&[("event", event.kind().to_string())])
        )
        .increment(1);

        let notification = match event {
            GatewayEvent::Device(report) => return self.report(EntityUpdate::DeviceReport(report)),
            GatewayEvent::Sensor(values) => return self.report(EntityUpdate::SensorValues(values)),
            GatewayEvent::Sender(report) => return self.report(EntityUpdate::SenderReport(report)),
            GatewayEvent::Log(entry) => {
                log_gateway_entry(&entry);
                self.status.lock().last_log = Some(entry.clone());
                Notification::Log(entry)
            }
            GatewayEvent::DutyCycle(duty) => {
                if duty.mode == DutyMode::Blocked {
                    warn!("duty cycle limit reached, RF traffic {}%", duty.traffic);
                }
                self.status.lock().duty_cycle = Some(duty);
                Notification::DutyCycle(duty)
            }
            GatewayEvent::CommandResult(result) => {
                self.status.lock().last_command_result = Some(result);
                Notification::CommandResult(result)
            }
            GatewayEvent::IveoResult(result) => {
                self.status.lock().last_iveo_result = Some(result);
                Notification::IveoResult(result)
            }
            GatewayEvent::ScanResult(scan) => {
                self.status.lock().scan = Some(scan);
                Notification::ScanProgress(scan)
            }
            GatewayEvent::SensorTeach(teach) => {
                self.status.lock().sensor_teach = Some(teach);
                Notification::SensorTeach(teach)
            }
            GatewayEvent::SenderTeach(teach) => {
                self.status.lock().sender_teach = Some(teach.clone());
                Notification::SenderTeach(teach)
            }
        };
        self.publish(&notification);
    }

    /// Unsolicited entity report. Ids outside the kind's id space are
    /// dropped; unknown ids get a placeholder.
    pub fn report(&self, update: EntityUpdate) {
        let (kind, id) = update.key();
        if kind.check_id(id).is_err() {
            warn!("ignoring {} event for out-of-range id {}", kind, id);
            return;
        }
        if !self.registry.contains(kind, id) {
            info!("event for unknown {} {}, adding placeholder", kind, id);
        }
        self.apply_update(&update);
    }

    fn record_entity_count(&self, kind: EntityKind) {
        metrics::gauge!(
            metric_defs::ENTITIES.name,
            &self.labels.with(&[("kind", kind.as_str().to_string())])
        )
        .set(self.registry.count(kind) as f64);
    }
}

/// Re-emit a gateway log entry at the gateway's own severity.
fn log_gateway_entry(entry: &LogEntry) {
    match entry.log_type {
        LogType::Info => info!(code = %entry.code, value = %entry.value, "gateway: {}", entry.description),
        LogType::Warning => warn!(code = %entry.code, value = %entry.value, "gateway: {}", entry.description),
        LogType::Error => error!(code = %entry.code, value = %entry.value, "gateway: {}", entry.description),
    }
}

//! The engine handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use selve_metrics::MetricLabels;
use selve_protocol::*;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::entity::{Entity, EntityKind};
use crate::error::{CommandError, GatewayError};
use crate::registry::Registry;
use crate::router::{GatewayStatus, Interest, Notification, Router, SubscriberError, SubscriptionHandle};
use crate::transport::{self, Transport};
use crate::worker::{Worker, WorkerState};
use crate::Result;

/// A running session with one gateway.
///
/// Cheap to clone; all clones share the same session. Commands may be issued
/// concurrently from any task.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    config: GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    router: Arc<Router>,
    registry: Arc<Registry>,
    state: watch::Receiver<WorkerState>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    /// Start a session over an already-open byte stream.
    pub async fn connect<T: Transport>(io: T, config: GatewayConfig) -> Result<Gateway> {
        config.validate()?;
        let labels = MetricLabels::new(config.name.clone());
        let (reader, writer) = transport::split(io, config.read_timeout());

        let registry = Arc::new(Registry::new());
        let router = Arc::new(Router::new(registry.clone(), labels.clone()));
        let dispatcher = Arc::new(Dispatcher::new(writer, labels.clone()));
        let (state_tx, state_rx) = watch::channel(WorkerState::Starting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker::new(
            reader,
            dispatcher.clone(),
            router.clone(),
            state_tx,
            shutdown_rx,
            config.clone(),
            labels,
        );
        let handle = tokio::spawn(worker.run());

        let gateway = Gateway {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                router,
                registry,
                state: state_rx,
                shutdown: shutdown_tx,
                worker: Mutex::new(Some(handle)),
            }),
        };

        if gateway.inner.config.enable_events {
            gateway.set_event_flags(EventFlags::ALL).await?;
        }
        if gateway.inner.config.discover_on_connect {
            let count = gateway.discover_all().await?;
            info!("discovered {} entities", count);
        }
        Ok(gateway)
    }

    /// Connect to a serial-to-TCP bridge at `addr`.
    pub async fn connect_tcp(addr: &str, config: GatewayConfig) -> Result<Gateway> {
        let stream = transport::connect_tcp(addr).await?;
        Self::connect(stream, config).await
    }

    /// Open the gateway's USB serial port at `path`.
    #[cfg(feature = "serial")]
    pub async fn connect_serial(path: &str, config: GatewayConfig) -> Result<Gateway> {
        let stream = transport::connect_serial(path, BAUD_RATE)?;
        Self::connect(stream, config).await
    }

    /// Stop the worker. In-flight calls get the configured grace period;
    /// whatever is still pending afterwards fails with `Cancelled`.
    pub async fn disconnect(&self) -> Result<()> {
        let _ = self.inner.shutdown.send(true);
        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("gateway worker ended abnormally: {}", e);
            }
        }
        debug!("disconnected from {}", self.inner.config.name);
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn state(&self) -> WorkerState {
        *self.inner.state.borrow()
    }

    /// Receiver for worker state transitions.
    pub fn state_changes(&self) -> watch::Receiver<WorkerState> {
        self.inner.state.clone()
    }

    /// Calls awaiting a response.
    pub fn pending_commands(&self) -> usize {
        self.inner.dispatcher.pending_count()
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Submit with the configured command timeout.
    pub async fn submit(&self, call: MethodCall) -> std::result::Result<MethodResponse, CommandError> {
        self.submit_with_timeout(call, self.inner.config.command_timeout()).await
    }

    pub async fn submit_with_timeout(
        &self,
        call: MethodCall,
        timeout: Duration,
    ) -> std::result::Result<MethodResponse, CommandError> {
        self.inner.dispatcher.submit(&call, timeout).await
    }

    /// Submit and decode the response as `T`.
    pub(crate) async fn call<T: Payload>(&self, call: MethodCall) -> Result<T> {
        let response = self.submit(call).await?;
        Ok(response.decode()?)
    }

    /// Submit a call whose response is an executed flag.
    pub(crate) async fn execute(&self, call: MethodCall) -> Result<bool> {
        let Executed(executed) = self.call(call).await?;
        Ok(executed)
    }

    // ========================================================================
    // Entities and subscriptions
    // ========================================================================

    pub fn entity(&self, kind: EntityKind, id: u8) -> Option<Entity> {
        self.inner.registry.get(kind, id)
    }

    pub fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        self.inner.registry.list(kind)
    }

    pub fn all_entities(&self) -> Vec<Entity> {
        self.inner.registry.all()
    }

    /// Lowest id of `kind` not in use, per the registry.
    pub fn find_free_id(&self, kind: EntityKind) -> Option<u8> {
        self.inner.registry.find_free_id(kind)
    }

    /// Register a callback. Callbacks run on the worker task after the
    /// registry is updated and must not block; spawn a task to issue calls.
    pub fn subscribe<F>(&self, interest: Interest, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Notification) -> std::result::Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.inner.router.subscribe(interest, callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.router.unsubscribe(handle)
    }

    /// Gateway-level state last reported by events.
    pub fn status(&self) -> GatewayStatus {
        self.inner.router.status()
    }

    pub(crate) fn router(&self) -> &Router {
        &self.inner.router
    }

    // ========================================================================
    // Service and parameters
    // ========================================================================

    /// Round-trip a ping.
    pub async fn ping(&self) -> Result<()> {
        self.submit(MethodCall::ping()).await?;
        Ok(())
    }

    pub async fn gateway_state(&self) -> Result<ServiceState> {
        self.call(MethodCall::get_state()).await
    }

    pub async fn is_ready(&self) -> Result<bool> {
        Ok(self.gateway_state().await? == ServiceState::Ready)
    }

    pub async fn version(&self) -> Result<GatewayVersion> {
        self.call(MethodCall::get_version()).await
    }

    pub async fn firmware_version(&self) -> Result<FirmwareVersion> {
        self.call(MethodCall::firmware_get_version()).await
    }

    pub async fn set_led(&self, on: bool) -> Result<bool> {
        self.execute(MethodCall::set_led(on)).await
    }

    pub async fn led(&self) -> Result<LedMode> {
        self.call(MethodCall::get_led()).await
    }

    pub async fn set_forwarding(&self, on: bool) -> Result<bool> {
        self.execute(MethodCall::set_forward(on)).await
    }

    pub async fn forwarding(&self) -> Result<Forwarding> {
        self.call(MethodCall::get_forward()).await
    }

    /// Choose which event classes the gateway forwards.
    pub async fn set_event_flags(&self, flags: EventFlags) -> Result<bool> {
        self.execute(MethodCall::set_event(flags)).await
    }

    pub async fn event_flags(&self) -> Result<EventFlags> {
        self.call(MethodCall::get_event()).await
    }

    pub async fn duty_cycle(&self) -> Result<DutyCycle> {
        self.call(MethodCall::get_duty()).await
    }

    pub async fn rf_info(&self) -> Result<RfInfo> {
        self.call(MethodCall::get_rf()).await
    }

    /// Restart the gateway. Not idempotent.
    pub async fn reset(&self) -> Result<bool> {
        self.execute(MethodCall::reset()).await
    }

    /// Erase every entity on the gateway. Not idempotent.
    pub async fn factory_reset(&self) -> Result<bool> {
        self.execute(MethodCall::factory_reset()).await
    }

    pub(crate) fn require_ready(state: ServiceState) -> Result<()> {
        if state != ServiceState::Ready {
            return Err(GatewayError::NotReady(state));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .field("pending", &self.pending_commands())
            .field("entities", &self.inner.registry.len())
            .finish()
    }
}

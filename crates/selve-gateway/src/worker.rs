//! Worker loop: the only reader of the transport.
//!
//! State machine:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//!                           |
//!                           +-> Faulted   (EOF, read or write failure)
//! ```

use std::sync::Arc;
use std::time::Instant;

use selve_metrics::{metric_defs, MetricLabels};
use selve_protocol::{Frame, FrameCodec, GatewayEvent, Method, MethodResponse, ProtocolError};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::GatewayConfig;
use crate::dispatcher::{Dispatcher, Resolution};
use crate::entity::EntityUpdate;
use crate::error::{CommandError, TransportError};
use crate::router::{Notification, Router};
use crate::transport::{ReadOutcome, TransportReader};

/// Lifecycle of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// The transport failed; the session is over.
    Faulted,
}

impl WorkerState {
    /// Whether the loop has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Faulted)
    }
}

pub(crate) struct Worker {
    reader: TransportReader,
    codec: FrameCodec,
    dispatcher: Arc<Dispatcher>,
    router: Arc<Router>,
    state: watch::Sender<WorkerState>,
    shutdown: watch::Receiver<bool>,
    config: GatewayConfig,
    labels: MetricLabels,
}

enum Exit {
    Shutdown,
    Fault(String),
}

impl Worker {
    pub(crate) fn new(
        reader: TransportReader,
        dispatcher: Arc<Dispatcher>,
        router: Arc<Router>,
        state: watch::Sender<WorkerState>,
        shutdown: watch::Receiver<bool>,
        config: GatewayConfig,
        labels: MetricLabels,
    ) -> Self {
        Worker {
            reader,
            codec: FrameCodec::with_max_frame_size(config.max_frame_size),
            dispatcher,
            router,
            state,
            shutdown,
            config,
            labels,
        }
    }

    pub(crate) async fn run(mut self) {
        self.state.send_replace(WorkerState::Running);
        info!("gateway worker running ({})", self.config.name);

        let mut buf = vec![0u8; self.config.read_buffer_size];
        let exit = loop {
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    // A dropped handle counts as a shutdown request.
                    if changed.is_err() || *self.shutdown.borrow() {
                        break Exit::Shutdown;
                    }
                }
                _ = self.dispatcher.write_failed() => {
                    break Exit::Fault("write to gateway failed".to_string());
                }
                outcome = self.reader.read(&mut buf) => {
                    if let Some(reason) = self.handle_read(outcome, &buf) {
                        break Exit::Fault(reason);
                    }
                }
            }
        };

        match exit {
            Exit::Shutdown => self.stop(&mut buf).await,
            Exit::Fault(reason) => self.fault(reason),
        }
    }

    /// Process one read. Returns a reason if the session must end.
    fn handle_read(&mut self, outcome: Result<ReadOutcome, TransportError>, buf: &[u8]) -> Option<String> {
        match outcome {
            Ok(ReadOutcome::Data(n)) => {
                metrics::counter!(metric_defs::BYTES_RECEIVED.name, &self.labels.to_labels()).increment(n as u64);
                self.ingest(&buf[..n]);
                None
            }
            Ok(ReadOutcome::TimedOut) => {
                self.dispatcher.expire_late();
                None
            }
            Ok(ReadOutcome::Eof) => Some(TransportError::Closed.to_string()),
            Err(e) => Some(e.to_string()),
        }
    }

    fn ingest(&mut self, data: &[u8]) {
        let frames: Vec<Result<Frame, ProtocolError>> = self.codec.feed(data).collect();
        for frame in frames {
            match frame {
                Ok(frame) => self.route(frame),
                Err(e) => {
                    warn!("discarding malformed frame ({} bytes): {}", e.raw().len(), e);
                    metrics::counter!(
                        metric_defs::PROTOCOL_ERRORS.name,
                        &self.labels.with(&[("error", e.kind().to_string())])
                    )
                    .increment(1);
                }
            }
        }
    }

    fn route(&self, frame: Frame) {
        let kind = match &frame {
            Frame::Call(_) => "call",
            Frame::Response(_) => "response",
            Frame::Fault(_) => "fault",
        };
        metrics::counter!(
            metric_defs::FRAMES_RECEIVED.name,
            &self.labels.with(&[("frame", kind.to_string())])
        )
        .increment(1);

        match frame {
            Frame::Response(response) => match self.dispatcher.resolve_response(response) {
                Resolution::Delivered | Resolution::Late => {}
                Resolution::Unmatched(response) => self.unsolicited(response),
            },
            Frame::Fault(fault) => {
                if !self.dispatcher.resolve_fault(&fault) {
                    warn!("fault with no pending call: {}", fault);
                }
            }
            Frame::Call(call) if call.method.is_event() => self.event(call.method, &call.params),
            Frame::Call(call) => warn!("ignoring unexpected call {} from gateway", call.method),
        }
    }

    /// A response nobody asked for: result-style methods become events.
    fn unsolicited(&self, response: MethodResponse) {
        if response.method == Method::DeviceGetValues {
            match response.decode() {
                Ok(values) => {
                    self.router.report(EntityUpdate::DeviceValues(values));
                }
                Err(e) => warn!("undecodable {}: {}", response.method, e),
            }
            return;
        }
        if GatewayEvent::accepts(response.method) {
            self.event(response.method, &response.values);
            return;
        }
        warn!("orphaned response to {}, dropping", response.method);
        metrics::counter!(
            metric_defs::ORPHANED_RESPONSES.name,
            &self.labels.with_method(response.method.name()).to_labels()
        )
        .increment(1);
    }

    fn event(&self, method: Method, values: &[selve_protocol::Value]) {
        match GatewayEvent::decode(method, values) {
            Ok(Some(event)) => {
                trace!("event {}", method);
                self.router.dispatch(event);
            }
            Ok(None) => debug!("{} carries no event", method),
            Err(e) => warn!("undecodable event {}: {}", method, e),
        }
    }

    /// Graceful stop: refuse new calls, let in-flight ones finish within the
    /// grace period, then cancel the rest.
    async fn stop(&mut self, buf: &mut [u8]) {
        self.state.send_replace(WorkerState::Stopping);
        self.dispatcher.close();
        let deadline = Instant::now() + self.config.shutdown_grace();
        debug!("stopping with {} calls in flight", self.dispatcher.pending_count());

        while self.dispatcher.pending_count() > 0 && Instant::now() < deadline {
            let outcome = self.reader.read(buf).await;
            if let Some(reason) = self.handle_read(outcome, buf) {
                debug!("transport ended during shutdown: {}", reason);
                break;
            }
        }

        let cancelled = self.dispatcher.fail_all(CommandError::Cancelled);
        if cancelled > 0 {
            info!("cancelled {} calls still pending at shutdown", cancelled);
        }
        self.dispatcher.shutdown_writer().await;
        self.state.send_replace(WorkerState::Stopped);
        info!("gateway worker stopped");
    }

    fn fault(&mut self, reason: String) {
        error!("gateway connection lost: {}", reason);
        self.dispatcher.close();
        self.dispatcher.fail_all(CommandError::ConnectionLost);
        self.state.send_replace(WorkerState::Faulted);
        self.router.publish(&Notification::ConnectionLost { reason });
    }
}

//! Metrics for the Selve gateway engine.
//!
//! Every metric the engine records is declared once in [`metric_defs`] and
//! recorded through the re-exported `metrics` facade. Nothing is recorded
//! unless the application installs a recorder.
//!
//! ```rust,ignore
//! use selve_metrics::{metric_defs, describe_metrics, MetricLabels};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("usb0").with_method("selve.GW.device.getIDs");
//! metrics::counter!(metric_defs::COMMANDS_SUBMITTED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// One declared metric.
#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub help: &'static str,
}

impl Metric {
    /// Register the help text with the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.help),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.help),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.help),
        }
    }
}

macro_rules! declare_metrics {
    ($($(#[$doc:meta])* $ident:ident: $kind:ident($unit:ident) $name:literal, $help:literal;)+) => {
        $(
            $(#[$doc])*
            pub const $ident: Metric = Metric {
                name: $name,
                kind: MetricKind::$kind,
                unit: Unit::$unit,
                help: $help,
            };
        )+

        /// Every declared metric.
        pub const ALL: &[Metric] = &[$($ident),+];
    };
}

/// Metric declarations. Every metric carries a `gateway` label; extra labels
/// are listed per metric.
pub mod metric_defs {
    use super::{Metric, MetricKind, Unit};

    declare_metrics! {
        /// Labels: frame (response, fault, call)
        FRAMES_RECEIVED: Counter(Count) "selve.codec.frames_received", "Frames decoded from the gateway";
        /// Labels: error
        PROTOCOL_ERRORS: Counter(Count) "selve.codec.protocol_errors", "Malformed frames discarded";
        BYTES_RECEIVED: Counter(Bytes) "selve.transport.bytes_received", "Bytes read from the transport";
        BYTES_SENT: Counter(Bytes) "selve.transport.bytes_sent", "Bytes written to the transport";

        /// Labels: method
        COMMANDS_SUBMITTED: Counter(Count) "selve.dispatch.submitted", "Method calls written to the gateway";
        /// Labels: method, outcome (ok, rejected, timeout, connection_lost, cancelled, ...)
        COMMANDS_COMPLETED: Counter(Count) "selve.dispatch.completed", "Method calls resolved";
        /// Labels: method
        ORPHANED_RESPONSES: Counter(Count) "selve.dispatch.orphaned", "Responses with no pending call";
        PENDING_COMMANDS: Gauge(Count) "selve.dispatch.pending", "Calls awaiting a response";
        /// Write to resolution. Labels: method
        COMMAND_LATENCY: Histogram(Milliseconds) "selve.dispatch.latency_ms", "Round-trip time of method calls";

        /// Labels: event
        EVENTS_DISPATCHED: Counter(Count) "selve.router.events", "Unsolicited events routed to subscribers";
        SUBSCRIBER_FAILURES: Counter(Count) "selve.router.subscriber_failures", "Subscriber callbacks that failed or panicked";
        /// Labels: kind
        ENTITIES: Gauge(Count) "selve.registry.entities", "Entities held in the registry";
    }
}

/// Which gateway, and optionally which method, a sample belongs to.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    pub gateway: String,
    pub method: Option<&'static str>,
}

impl MetricLabels {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            method: None,
        }
    }

    pub fn with_method(&self, method: &'static str) -> Self {
        Self {
            gateway: self.gateway.clone(),
            method: Some(method),
        }
    }

    /// `(key, value)` pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![("gateway", self.gateway.clone())];
        if let Some(method) = self.method {
            labels.push(("method", method.to_string()));
        }
        labels
    }

    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describe every engine metric. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

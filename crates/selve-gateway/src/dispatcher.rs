//! Command dispatcher: writes calls and matches responses to callers.
//!
//! The gateway carries no correlation id. A response is matched to the
//! oldest pending call with the same method name; a fault names no method
//! and goes to the oldest pending call overall. Both rely on the gateway
//! answering strictly in order.
//!
//! When a call times out or its caller goes away after the request was
//! written, its slot is replaced by a late-response marker. A marker absorbs
//! an answer only while no live call of the same method is waiting; a live
//! call always takes the next answer. An unanswered call therefore never
//! starves the calls behind it, at the cost that a late answer arriving while
//! a newer call is in flight resolves that call. Markers expire after the
//! call's own timeout has passed a second time.
//!
//! The per-call timeout covers the whole call: waiting for the write lock,
//! the write itself and the response.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use selve_metrics::{metric_defs, MetricLabels};
use selve_protocol::{GatewayFault, Method, MethodCall, MethodResponse};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};
use tracing::{debug, trace, warn};

use crate::error::CommandError;
use crate::transport::TransportWriter;

type Completion = oneshot::Sender<Result<MethodResponse, CommandError>>;

/// A call awaiting its response.
struct Pending {
    method: Method,
    submitted: Instant,
    completion: Completion,
}

enum Slot {
    Live(Pending),
    /// Caller gave up; absorb one late answer until `expires`.
    Late { method: Method, expires: Instant },
}

impl Slot {
    fn method(&self) -> Method {
        match self {
            Slot::Live(p) => p.method,
            Slot::Late { method, .. } => *method,
        }
    }
}

/// Pending calls by sequence number, plus per-method FIFO queues.
#[derive(Default)]
struct PendingTable {
    slots: BTreeMap<u64, Slot>,
    queues: HashMap<Method, VecDeque<u64>>,
    live: usize,
}

impl PendingTable {
    fn insert(&mut self, seq: u64, pending: Pending) {
        self.queues.entry(pending.method).or_default().push_back(seq);
        self.slots.insert(seq, Slot::Live(pending));
        self.live += 1;
    }

    /// Remove a slot entirely, including its queue position.
    fn remove(&mut self, seq: u64) -> Option<Slot> {
        let slot = self.slots.remove(&seq)?;
        let method = slot.method();
        if let Some(queue) = self.queues.get_mut(&method) {
            queue.retain(|s| *s != seq);
            if queue.is_empty() {
                self.queues.remove(&method);
            }
        }
        if matches!(slot, Slot::Live(_)) {
            self.live -= 1;
        }
        Some(slot)
    }

    /// Slot that takes the next answer for `method`: the oldest live call,
    /// or the oldest unexpired marker when no call is waiting.
    fn take_for_method(&mut self, method: Method, now: Instant) -> Option<Slot> {
        self.expire(now);
        let queue = self.queues.get(&method)?;
        let seq = queue
            .iter()
            .copied()
            .find(|seq| matches!(self.slots.get(seq), Some(Slot::Live(_))))
            .or_else(|| queue.front().copied())?;
        self.remove(seq)
    }

    /// Slot that takes a fault: the oldest live call of any method, or the
    /// oldest unexpired marker when no call is waiting.
    fn take_oldest(&mut self, now: Instant) -> Option<Slot> {
        self.expire(now);
        let seq = self
            .slots
            .iter()
            .find(|(_, slot)| matches!(slot, Slot::Live(_)))
            .map(|(seq, _)| *seq)
            .or_else(|| self.slots.keys().next().copied())?;
        self.remove(seq)
    }

    /// Turn a live slot into a late-response marker.
    fn abandon(&mut self, seq: u64, expires: Instant) -> bool {
        match self.slots.get(&seq) {
            Some(Slot::Live(p)) => {
                let method = p.method;
                self.slots.insert(seq, Slot::Late { method, expires });
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Late { expires, .. } if *expires <= now))
            .map(|(seq, _)| *seq)
            .collect();
        for seq in expired {
            self.remove(seq);
        }
    }
}

/// What became of an inbound response.
#[derive(Debug)]
pub enum Resolution {
    /// Handed to the waiting caller.
    Delivered,
    /// Answer to a call whose caller already gave up; dropped.
    Late,
    /// No pending call for this method.
    Unmatched(MethodResponse),
}

/// Owns the write half and the pending table.
pub struct Dispatcher {
    writer: AsyncMutex<TransportWriter>,
    pending: Mutex<PendingTable>,
    next_seq: AtomicU64,
    closed: AtomicBool,
    write_failed: Notify,
    labels: MetricLabels,
}

impl Dispatcher {
    pub fn new(writer: TransportWriter, labels: MetricLabels) -> Self {
        Dispatcher {
            writer: AsyncMutex::new(writer),
            pending: Mutex::new(PendingTable::default()),
            next_seq: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            write_failed: Notify::new(),
            labels,
        }
    }

    /// Calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().live
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reject new submissions from now on.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Resolves once a write has failed.
    pub async fn write_failed(&self) {
        self.write_failed.notified().await
    }

    /// The write half can no longer be trusted; end the session.
    fn abort_writes(&self) {
        self.close();
        self.write_failed.notify_one();
    }

    /// Write `call` and wait for its response.
    ///
    /// Encoding happens before anything is written, so an invalid call never
    /// reaches the wire. Dropping the returned future cancels the call.
    pub async fn submit(&self, call: &MethodCall, timeout: Duration) -> Result<MethodResponse, CommandError> {
        if self.is_closed() {
            return Err(CommandError::NotRunning);
        }
        let deadline = tokio::time::Instant::now() + timeout;
        let frame = call.encode()?;
        let method = call.method;
        let labels = self.labels.with_method(method.name());

        let (tx, rx) = oneshot::channel();
        let guard = {
            let Ok(mut writer) = tokio::time::timeout_at(deadline, self.writer.lock()).await else {
                debug!("{} timed out waiting to be written", method);
                return Err(CommandError::Timeout(timeout));
            };
            if self.is_closed() {
                return Err(CommandError::NotRunning);
            }
            // Register before writing so a fast answer always finds its slot.
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.pending.lock().insert(
                seq,
                Pending {
                    method,
                    submitted: Instant::now(),
                    completion: tx,
                },
            );
            let mut guard = PendingGuard {
                dispatcher: self,
                seq,
                timeout,
                written: false,
            };
            trace!(seq, "-> {}", method);
            match tokio::time::timeout_at(deadline, writer.write_frame(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("write of {} failed: {}", method, e);
                    self.abort_writes();
                    return Err(CommandError::ConnectionLost);
                }
                Err(_) => {
                    // Part of the frame may be on the wire; the stream is torn.
                    warn!("write of {} stalled for {:?}", method, timeout);
                    self.abort_writes();
                    return Err(CommandError::Timeout(timeout));
                }
            }
            guard.written = true;
            guard
        };
        metrics::counter!(metric_defs::COMMANDS_SUBMITTED.name, &labels.to_labels()).increment(1);
        metrics::counter!(metric_defs::BYTES_SENT.name, &self.labels.to_labels()).increment(frame.len() as u64);
        self.record_pending();

        let result = match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            // Slot dropped without an answer; only happens on teardown.
            Ok(Err(_)) => Err(CommandError::ConnectionLost),
            Err(_) => {
                debug!("{} timed out after {:?}", method, timeout);
                Err(CommandError::Timeout(timeout))
            }
        };
        drop(guard);

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        metrics::counter!(
            metric_defs::COMMANDS_COMPLETED.name,
            &labels.with(&[("outcome", outcome.to_string())])
        )
        .increment(1);
        self.record_pending();
        result
    }

    /// Match a response to the oldest pending call of its method.
    pub fn resolve_response(&self, response: MethodResponse) -> Resolution {
        let mut table = self.pending.lock();
        match table.take_for_method(response.method, Instant::now()) {
            None => Resolution::Unmatched(response),
            Some(Slot::Live(pending)) => {
                drop(table);
                self.complete(pending, Ok(response));
                Resolution::Delivered
            }
            Some(Slot::Late { .. }) => {
                debug!("dropping late answer to {}", response.method);
                Resolution::Late
            }
        }
    }

    /// Resolve the oldest pending call with a fault. Returns false if nothing
    /// was pending.
    pub fn resolve_fault(&self, fault: &GatewayFault) -> bool {
        let mut table = self.pending.lock();
        match table.take_oldest(Instant::now()) {
            None => false,
            Some(Slot::Live(pending)) => {
                drop(table);
                warn!("{} rejected: {}", pending.method, fault);
                self.complete(pending, Err(CommandError::Rejected(fault.code)));
                true
            }
            Some(Slot::Late { method, .. }) => {
                debug!("dropping late fault for {}: {}", method, fault);
                true
            }
        }
    }

    /// Fail every pending call, e.g. when the transport is gone.
    pub fn fail_all(&self, error: CommandError) -> usize {
        let drained: Vec<Pending> = {
            let mut table = self.pending.lock();
            let slots = std::mem::take(&mut table.slots);
            table.queues.clear();
            table.live = 0;
            slots
                .into_values()
                .filter_map(|slot| match slot {
                    Slot::Live(p) => Some(p),
                    Slot::Late { .. } => None,
                })
                .collect()
        };
        let count = drained.len();
        for pending in drained {
            self.complete(pending, Err(error.clone()));
        }
        if count > 0 {
            debug!("failed {} pending calls: {}", count, error);
        }
        self.record_pending();
        count
    }

    /// Drop late-response markers that have outlived their window.
    pub fn expire_late(&self) {
        self.pending.lock().expire(Instant::now());
    }

    pub async fn shutdown_writer(&self) {
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("transport shutdown: {}", e);
        }
    }

    fn complete(&self, pending: Pending, result: Result<MethodResponse, CommandError>) {
        let elapsed = pending.submitted.elapsed();
        metrics::histogram!(
            metric_defs::COMMAND_LATENCY.name,
            &self.labels.with_method(pending.method.name()).to_labels()
        )
        .record(elapsed.as_secs_f64() * 1000.0);
        trace!("<- {} after {:?}", pending.method, elapsed);
        if pending.completion.send(result).is_err() {
            debug!("caller of {} went away before its answer", pending.method);
        }
    }

    fn record_pending(&self) {
        metrics::gauge!(metric_defs::PENDING_COMMANDS.name, &self.labels.to_labels())
            .set(self.pending_count() as f64);
    }
}

/// Cleans up a slot whose caller stopped waiting.
struct PendingGuard<'a> {
    dispatcher: &'a Dispatcher,
    seq: u64,
    timeout: Duration,
    written: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.dispatcher.pending.lock();
        if self.written {
            // The request is on the wire and may still be answered.
            table.abandon(self.seq, Instant::now() + self.timeout);
        } else if let Some(Slot::Live(_)) = table.slots.get(&self.seq) {
            table.remove(self.seq);
        }
    }
}

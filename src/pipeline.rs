//! # Ingestion Pipeline
//!
//! Feeds the store at scale: a generator thread produces records onto a
//! bounded channel; the batch writer drains it and flushes fixed-size
//! transactions through the service. A full channel blocks the producer
//! (backpressure); a shared cancellation flag stops both halves without
//! tearing an in-flight transaction.
//!
//! ```text
//! generator thread ──bounded channel──▶ batch writer ──▶ bulk_ingest
//! ```

use crate::config::ImportConfig;
use crate::error::{Error, Result};
use crate::model::{IpKey, Record, UserId};
use crate::DupChecker;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp1, Normal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often a blocked channel end re-checks the cancellation flag
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Shared cancellation signal for one pipeline run.
///
/// Cloning hands out another handle to the same flag. `cancel` is
/// idempotent; once set the flag never clears.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Parameters of the synthetic dataset model: most users touch few IPs,
/// a few touch many; request counts cluster around a mean.
#[derive(Debug, Clone)]
pub struct SyntheticParams {
    /// Users to generate (ids `1..users`)
    pub users: u64,
    /// Cap on distinct IPs assigned to one user
    pub ips_per_user_max: u64,
    /// Cap on requests attributed to one user
    pub requests_per_user_max: u64,
    /// Mean of the request-count distribution
    pub requests_mean: f64,
    /// Addresses in the shared ring; users drawing from the same small ring
    /// is what produces overlapping IP sets, and therefore duplicates
    pub ip_ring_size: u32,
}

impl SyntheticParams {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            users: config.users,
            ips_per_user_max: config.ips_per_user_max,
            requests_per_user_max: config.requests_per_user_max,
            requests_mean: config.requests_mean,
            ip_ring_size: config.ip_ring_size,
        }
    }
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}

enum Source {
    Fixture,
    Synthetic { params: SyntheticParams, rng: StdRng },
}

/// Produces a lazy, non-restartable sequence of records onto a channel.
pub struct RecordGenerator {
    source: Source,
}

impl RecordGenerator {
    /// The fixed debug dataset ([`fixture_records`]). Deterministic; used by
    /// tests and smoke runs.
    pub fn fixture() -> Self {
        Self {
            source: Source::Fixture,
        }
    }

    /// Statistical model over an explicitly owned, caller-seeded generator.
    /// No global randomness is consulted.
    pub fn synthetic(params: SyntheticParams, rng: StdRng) -> Self {
        Self {
            source: Source::Synthetic { params, rng },
        }
    }

    /// Start producing onto a bounded channel from a dedicated thread.
    ///
    /// The channel closes exactly once, when the thread finishes: either
    /// the sequence is exhausted or `cancel` fired. A blocked send re-checks
    /// the flag every [`CANCEL_POLL_INTERVAL`], so cancellation cannot wedge
    /// on a full channel.
    pub fn spawn(self, capacity: usize, cancel: CancelToken) -> GeneratorHandle {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));

        let handle = thread::Builder::new()
            .name("record-generator".into())
            .spawn(move || match self.source {
                Source::Fixture => produce_fixture(&tx, &cancel),
                Source::Synthetic { params, rng } => produce_synthetic(params, rng, &tx, &cancel),
            })
            .expect("spawn generator thread");

        GeneratorHandle {
            records: rx,
            handle,
        }
    }
}

/// Consumer side of a spawned generator.
pub struct GeneratorHandle {
    records: Receiver<Record>,
    handle: JoinHandle<()>,
}

impl GeneratorHandle {
    pub fn records(&self) -> &Receiver<Record> {
        &self.records
    }

    /// Wait for the producer thread to finish.
    pub fn join(self) {
        drop(self.records);
        let _ = self.handle.join();
    }
}

/// The deterministic debug dataset: four users over three loopback
/// addresses, arranged so that with threshold 2 exactly the pairs
/// (1,2) and (2,3) are duplicates.
pub fn fixture_records() -> Vec<Record> {
    let lines = [
        (1, "127.0.0.1"),
        (1, "127.0.0.2"),
        (2, "127.0.0.1"),
        (2, "127.0.0.2"),
        (2, "127.0.0.3"),
        (3, "127.0.0.3"),
        (3, "127.0.0.1"),
        (4, "127.0.0.1"),
    ];
    lines
        .into_iter()
        .map(|(user, ip)| {
            Record::new(UserId(user), IpKey::parse(ip).expect("fixture address"))
        })
        .collect()
}

fn produce_fixture(tx: &Sender<Record>, cancel: &CancelToken) {
    for record in fixture_records() {
        if !send_with_cancel(tx, record, cancel) {
            return;
        }
    }
    tracing::debug!("fixture generator finished");
}

fn produce_synthetic(
    params: SyntheticParams,
    mut rng: StdRng,
    tx: &Sender<Record>,
    cancel: &CancelToken,
) {
    let request_count = Normal::new(params.requests_mean, 1.0).expect("request distribution");
    let mut ring = IpRing::new(params.ip_ring_size);
    let mut produced = 0u64;

    for user in 1..params.users {
        let ips_count = sample_ip_count(&mut rng, params.ips_per_user_max);
        let ips: Vec<IpKey> = (0..ips_count).map(|_| ring.next()).collect();
        let requests = sample_request_count(&mut rng, &request_count, params.requests_per_user_max);

        for i in 1..=requests {
            // cycle deterministically through this user's assigned set
            let record = Record::new(UserId(user), ips[(i % ips_count) as usize]);
            if !send_with_cancel(tx, record, cancel) {
                tracing::warn!(produced, "synthetic generator cancelled");
                return;
            }
            produced += 1;
        }
    }
    tracing::debug!(produced, "synthetic generator finished");
}

/// Exponentially distributed IP-set size in `[1, max]`: most users use few
/// addresses, a few use many.
fn sample_ip_count(rng: &mut StdRng, max: u64) -> u64 {
    let draw: f64 = Exp1.sample(rng);
    ((draw + 1.0) as u64).clamp(1, max.max(1))
}

/// Normally distributed request count in `[1, max]`.
fn sample_request_count(rng: &mut StdRng, normal: &Normal<f64>, max: u64) -> u64 {
    let draw = normal.sample(rng);
    if draw < 1.0 {
        1
    } else {
        (draw as u64).min(max.max(1))
    }
}

/// Ring over a fixed pool of addresses, shared by every generated user.
struct IpRing {
    current: u32,
    size: u32,
}

impl IpRing {
    fn new(size: u32) -> Self {
        Self {
            current: 0,
            size: size.max(1),
        }
    }

    fn next(&mut self) -> IpKey {
        self.current = (self.current + 1) % self.size;
        IpKey(self.current)
    }
}

/// Send, polling the cancellation flag while the channel is full. Returns
/// `false` once cancelled or when the consumer is gone.
fn send_with_cancel(tx: &Sender<Record>, record: Record, cancel: &CancelToken) -> bool {
    let mut pending = record;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        match tx.send_timeout(pending, CANCEL_POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(record)) => pending = record,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Progress counters reported by the batch writer. Observable side effect,
/// not part of the functional contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Records flushed into the store
    pub records: u64,
    /// Transactions committed
    pub batches: u64,
}

/// Drain `records`, flushing a transaction through `service` every
/// `batch_size` records and once more for the remainder when the channel
/// closes.
///
/// Cancellation stops the writer before it starts another flush and returns
/// [`Error::Cancelled`]; a flush already underway always runs to completion,
/// so no partial transaction is ever left behind.
pub fn drain(
    service: &DupChecker,
    records: &Receiver<Record>,
    batch_size: usize,
    cancel: &CancelToken,
) -> Result<ImportStats> {
    let batch_size = batch_size.max(1);
    let mut buffer: Vec<Record> = Vec::with_capacity(batch_size);
    let mut stats = ImportStats::default();

    loop {
        if cancel.is_cancelled() {
            tracing::warn!(records = stats.records, batches = stats.batches, "import cancelled");
            return Err(Error::Cancelled);
        }

        match records.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(record) => {
                buffer.push(record);
                if buffer.len() >= batch_size {
                    flush(service, &mut buffer, &mut stats)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if cancel.is_cancelled() {
                    tracing::warn!(records = stats.records, "import cancelled");
                    return Err(Error::Cancelled);
                }
                // producer finished: flush the remainder exactly once
                flush(service, &mut buffer, &mut stats)?;
                tracing::info!(
                    records = stats.records,
                    batches = stats.batches,
                    "import finished"
                );
                return Ok(stats);
            }
        }
    }
}

fn flush(service: &DupChecker, buffer: &mut Vec<Record>, stats: &mut ImportStats) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    service.bulk_ingest(buffer)?;
    stats.records += buffer.len() as u64;
    stats.batches += 1;
    tracing::info!(
        batch = stats.batches,
        records = stats.records,
        "flushed batch"
    );
    buffer.clear();
    Ok(())
}

/// Run a whole import: spawn the generator, drain into the service, join.
///
/// Returns the final counters, or [`Error::Cancelled`] when `cancel` fired
/// mid-run. Completion is signalled exactly once even when cancellation
/// races the natural end of the sequence.
pub fn run_import(
    service: &DupChecker,
    generator: RecordGenerator,
    config: &ImportConfig,
    cancel: CancelToken,
) -> Result<ImportStats> {
    let handle = generator.spawn(config.channel_capacity, cancel.clone());
    let result = drain(service, handle.records(), config.batch_size, &cancel);
    if result.is_err() {
        // release a producer blocked on a full channel
        cancel.cancel();
    }
    handle.join();
    result
}

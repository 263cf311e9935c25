//! Shared collaborators for shard processor, encryptor and producer tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use streamseal_crypto::{DataKey, KeySpec, Zeroizing};
use streamseal_stream::checkpoint::Checkpointer;
use streamseal_stream::codec::WireRecord;
use streamseal_stream::encryptor::EnvelopeEncryptor;
use streamseal_stream::handler::RecordHandler;
use streamseal_stream::key_manager::{KeyManager, LocalKeyManager};
use streamseal_stream::timer::{SleepOutcome, Timer};
use streamseal_stream::transport::RecordTransport;
use streamseal_stream::{CheckpointError, PutRecordOutput, StreamError, StreamRecord, StreamResult};
use tokio::sync::Mutex;

// ── Timer ──

/// Virtual clock: sleeps return at once and advance `now` by their duration.
pub struct ManualTimer {
    origin: Instant,
    elapsed: StdMutex<Duration>,
    sleeps: StdMutex<Vec<Duration>>,
    interrupt_after: Option<usize>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: StdMutex::new(Duration::ZERO),
            sleeps: StdMutex::new(Vec::new()),
            interrupt_after: None,
        }
    }

    /// Sleeps past the first `completed` report `Interrupted`.
    pub fn interrupting_after(completed: usize) -> Self {
        Self {
            interrupt_after: Some(completed),
            ..Self::new()
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock().unwrap() += by;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }
}

#[async_trait]
impl Timer for ManualTimer {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) -> SleepOutcome {
        let mut sleeps = self.sleeps.lock().unwrap();
        if let Some(limit) = self.interrupt_after {
            if sleeps.len() >= limit {
                return SleepOutcome::Interrupted;
            }
        }
        sleeps.push(duration);
        *self.elapsed.lock().unwrap() += duration;
        SleepOutcome::Completed
    }
}

// ── Checkpointer ──

/// Replays scripted results, then succeeds.
pub struct MockCheckpointer {
    script: Mutex<VecDeque<Result<(), CheckpointError>>>,
    calls: AtomicU32,
}

impl MockCheckpointer {
    pub fn succeeding() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(results: Vec<Result<(), CheckpointError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// Fails with `err` on every call.
    pub fn always(err: CheckpointError, times: usize) -> Self {
        Self::scripted(vec![Err(err); times])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Checkpointer for MockCheckpointer {
    async fn checkpoint(&self) -> Result<(), CheckpointError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().await.pop_front().unwrap_or(Ok(()))
    }
}

// ── Key manager ──

/// Local key manager whose first `unwrap` calls fail with `KeyService`.
pub struct FlakyKeyManager {
    inner: Arc<LocalKeyManager>,
    unwrap_failures: AtomicU32,
    generate_failures: AtomicU32,
}

impl FlakyKeyManager {
    pub fn new(inner: Arc<LocalKeyManager>) -> Self {
        Self {
            inner,
            unwrap_failures: AtomicU32::new(0),
            generate_failures: AtomicU32::new(0),
        }
    }

    pub fn fail_unwraps(&self, times: u32) {
        self.unwrap_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_generates(&self, times: u32) {
        self.generate_failures.store(times, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl KeyManager for FlakyKeyManager {
    async fn generate_data_key(&self, alias: &str) -> StreamResult<DataKey> {
        if Self::take_failure(&self.generate_failures) {
            return Err(StreamError::KeyService("kms unavailable".into()));
        }
        self.inner.generate_data_key(alias).await
    }

    async fn unwrap(&self, wrapped: &[u8]) -> StreamResult<Zeroizing<Vec<u8>>> {
        if Self::take_failure(&self.unwrap_failures) {
            return Err(StreamError::KeyService("kms throttled".into()));
        }
        self.inner.unwrap(wrapped).await
    }
}

// ── Handler ──

/// Records every delivered plaintext; can fail a number of times first.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<(String, String, Vec<u8>)>>,
    failures: AtomicU32,
    calls: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        let handler = Self::default();
        handler.failures.store(times, Ordering::SeqCst);
        handler
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(shard_id, sequence_number, plaintext)` in delivery order.
    pub async fn seen(&self) -> Vec<(String, String, Vec<u8>)> {
        self.seen.lock().await.clone()
    }

    pub async fn payloads(&self) -> Vec<Vec<u8>> {
        self.seen.lock().await.iter().map(|(_, _, p)| p.clone()).collect()
    }
}

#[async_trait]
impl RecordHandler for RecordingHandler {
    async fn handle(
        &self,
        shard_id: &str,
        record: &StreamRecord,
        plaintext: &[u8],
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("downstream unavailable");
        }
        self.seen.lock().await.push((
            shard_id.to_string(),
            record.sequence_number.clone(),
            plaintext.to_vec(),
        ));
        Ok(())
    }
}

// ── Transport ──

/// In-memory stream: assigns sequence numbers, can fail the first puts.
#[derive(Default)]
pub struct RecordingTransport {
    puts: Mutex<Vec<(String, Vec<u8>)>>,
    failures: AtomicU32,
    unready: Option<String>,
    ready_checks: AtomicU32,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        let transport = Self::default();
        transport.failures.store(times, Ordering::SeqCst);
        transport
    }

    /// Readiness checks fail with `reason`.
    pub fn unready(reason: &str) -> Self {
        Self {
            unready: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn ready_checks(&self) -> u32 {
        self.ready_checks.load(Ordering::SeqCst)
    }

    pub async fn puts(&self) -> Vec<(String, Vec<u8>)> {
        self.puts.lock().await.clone()
    }

    /// Stored bodies as records a shard processor would receive.
    pub async fn delivered(&self) -> Vec<StreamRecord> {
        self.puts
            .lock()
            .await
            .iter()
            .enumerate()
            .map(|(i, (pk, body))| StreamRecord::new(format!("{:056}", i + 1), pk.clone(), body.clone()))
            .collect()
    }
}

#[async_trait]
impl RecordTransport for RecordingTransport {
    async fn put_record(&self, partition_key: &str, body: Vec<u8>) -> StreamResult<PutRecordOutput> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StreamError::Transport("ProvisionedThroughputExceeded".into()));
        }

        let mut puts = self.puts.lock().await;
        puts.push((partition_key.to_string(), body));
        Ok(PutRecordOutput {
            shard_id: "shardId-000000000000".into(),
            sequence_number: format!("{:056}", puts.len()),
        })
    }

    async fn wait_until_ready(&self, _timer: &dyn Timer) -> StreamResult<()> {
        self.ready_checks.fetch_add(1, Ordering::SeqCst);
        match &self.unready {
            Some(reason) => Err(StreamError::Transport(reason.clone())),
            None => Ok(()),
        }
    }
}

// ── Builders ──

pub fn local_key_manager() -> Arc<LocalKeyManager> {
    Arc::new(LocalKeyManager::new(KeySpec::Aes128))
}

/// Encrypts `payloads` under one data key and wraps them as delivered records.
pub async fn sealed_records(
    key_manager: Arc<dyn KeyManager>,
    payloads: &[&[u8]],
) -> Vec<StreamRecord> {
    let encryptor = EnvelopeEncryptor::new(key_manager, "test-key", Duration::from_secs(60));
    let mut records = Vec::new();
    for (i, payload) in payloads.iter().enumerate() {
        let body = encryptor
            .encrypt(payload)
            .await
            .expect("encrypt must succeed")
            .to_bytes()
            .expect("encode must succeed");
        records.push(StreamRecord::new(
            format!("{:056}", i + 1),
            format!("partitionKey-{i}"),
            body,
        ));
    }
    records
}

/// A wire record whose ciphertext was altered after sealing.
pub fn tampered(record: &StreamRecord) -> StreamRecord {
    let mut wire: WireRecord =
        streamseal_stream::codec::decode(&record.data).expect("decode must succeed");
    let last = wire.ciphertext.len() - 1;
    wire.ciphertext[last] ^= 0x01;
    StreamRecord::new(
        record.sequence_number.clone(),
        record.partition_key.clone(),
        wire.to_bytes().expect("encode must succeed"),
    )
}

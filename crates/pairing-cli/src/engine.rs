//! Concurrent runtime around the pipeline.
//!
//! Producers hand signals to [`Engine::submit`], which never blocks: a full
//! queue drops the signal and counts it. One processing worker drains the
//! queue strictly in order, so the pipeline sees observations in arrival
//! order. A maintenance worker decays windows and rescores on an interval.
//! Both take the write lock only for the mutation itself; readers share a
//! read lock. Saves are debounced and run off the async threads; sync pushes
//! go out on a separate channel after the lock is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Result, anyhow};
use pairing_core::{
    Construct, FeatureExtractor, LexicalExtractor, Pipeline, Profile, ProfileDigest,
    ProfileOverride, Signal, SignalEnvelope, SignalError, Timestamp, extract_features,
};
use pairing_store::{Store, StoreError};
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::EngineConfig;
use crate::history;
use crate::outbound;

/// Work for the processing worker. Everything that mutates the profile
/// outside periodic maintenance goes through here.
enum Job {
    Signal(Signal),
    AddOverride {
        construct: Construct,
        dimension: String,
        value: f64,
        reason: String,
        reply: oneshot::Sender<ProfileOverride>,
    },
    RemoveOverride {
        id: u64,
        reply: oneshot::Sender<bool>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Replace {
        profile: Box<Profile>,
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub dropped_signals: u64,
    pub signals_processed: u64,
    pub evidence_entries: usize,
    pub last_saved_at: Option<Timestamp>,
    pub dirty: bool,
    pub paused: bool,
}

struct Shared {
    config: EngineConfig,
    store: Mutex<Store>,
    extractor: Arc<dyn FeatureExtractor>,
    dropped: AtomicU64,
    last_saved_at: Mutex<Option<Timestamp>>,
    sync_tx: Option<mpsc::UnboundedSender<ProfileDigest>>,
    pause: watch::Sender<bool>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Shared {
    fn save_blocking(&self, profile: &Profile, now: Timestamp) -> Result<()> {
        let store = self
            .store
            .lock()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        store.save_profile(profile, now)?;
        if let Ok(mut last) = self.last_saved_at.lock() {
            *last = Some(now);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Engine {
    pipeline: Arc<RwLock<Pipeline>>,
    jobs: mpsc::Sender<Job>,
    shared: Arc<Shared>,
}

impl Engine {
    /// Load the stored profile (or start fresh) and spawn the workers.
    /// A stored document that no longer parses is logged and replaced by a
    /// fresh profile. Must be called inside a tokio runtime.
    pub fn start(store: Store, config: EngineConfig) -> Result<Self> {
        let now = Timestamp::now();
        let (profile, last_saved_at) = match store.load_profile() {
            Ok(Some(p)) => {
                tracing::info!(profile_id = %p.profile_id, "loaded profile");
                (p, store.last_saved_at()?)
            }
            Ok(None) => {
                let p = Profile::new(now);
                tracing::info!(profile_id = %p.profile_id, "created fresh profile");
                (p, store.last_saved_at()?)
            }
            // An unreadable document is replaced on the first save.
            Err(e @ (StoreError::Json(_) | StoreError::InvalidData(_))) => {
                let p = Profile::new(now);
                tracing::warn!(
                    profile_id = %p.profile_id,
                    "stored profile unreadable, starting fresh: {e}"
                );
                (p, None)
            }
            Err(e) => return Err(e.into()),
        };
        let pipeline = Pipeline::with_capacity(profile, config.evidence_capacity);
        Ok(Self::spawn(
            pipeline,
            store,
            config,
            Arc::new(LexicalExtractor::default()),
            last_saved_at,
        ))
    }

    fn spawn(
        pipeline: Pipeline,
        store: Store,
        config: EngineConfig,
        extractor: Arc<dyn FeatureExtractor>,
        last_saved_at: Option<Timestamp>,
    ) -> Self {
        let (jobs, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (pause, pause_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let sync_tx = (config.sync.enabled && !config.sync.sinks.is_empty())
            .then(|| outbound::spawn_worker(config.sync.clone(), &tracker, cancel.clone()));

        let engine = Self {
            pipeline: Arc::new(RwLock::new(pipeline)),
            jobs,
            shared: Arc::new(Shared {
                config,
                store: Mutex::new(store),
                extractor,
                dropped: AtomicU64::new(0),
                last_saved_at: Mutex::new(last_saved_at),
                sync_tx,
                pause,
                cancel,
                tracker,
            }),
        };

        let worker = Worker {
            engine: engine.clone(),
            rx,
            pause_rx,
            since_save: 0,
        };
        engine.shared.tracker.spawn(worker.run());
        engine.shared.tracker.spawn(maintenance(engine.clone()));
        tracing::info!(
            queue_capacity = engine.shared.config.queue_capacity,
            "engine started"
        );
        engine
    }

    /// In-memory engine for tests.
    #[cfg(test)]
    pub fn in_memory(config: EngineConfig) -> Self {
        let store = Store::open_in_memory().expect("in-memory store");
        Self::start(store, config).expect("engine start")
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    // --- Producers ---

    /// Best-effort enqueue. Returns `false` when the signal was dropped.
    pub fn submit(&self, signal: Signal) -> bool {
        let signal_type = signal.signal_type();
        let source = signal.source.clone();
        match self.jobs.try_send(Job::Signal(signal)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(%signal_type, %source, dropped, "signal queue full, dropping signal");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%signal_type, %source, "engine stopped, dropping signal");
                false
            }
        }
    }

    /// Validate a wire envelope and enqueue it.
    pub fn submit_envelope(&self, envelope: SignalEnvelope) -> Result<bool, SignalError> {
        let signal = envelope.into_signal(Timestamp::now())?;
        Ok(self.submit(signal))
    }

    // --- Readers ---

    pub async fn read(&self) -> RwLockReadGuard<'_, Pipeline> {
        self.pipeline.read().await
    }

    pub async fn stats(&self) -> EngineStats {
        let p = self.pipeline.read().await;
        EngineStats {
            queue_depth: self.jobs.max_capacity() - self.jobs.capacity(),
            queue_capacity: self.jobs.max_capacity(),
            dropped_signals: self.dropped(),
            signals_processed: p.profile().meta.signals_processed,
            evidence_entries: p.evidence().len(),
            last_saved_at: self.shared.last_saved_at.lock().ok().and_then(|g| *g),
            dirty: p.is_dirty(),
            paused: *self.shared.pause.borrow(),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    // --- Commands routed through the processing worker ---

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Job) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("engine is not running"))?;
        rx.await.map_err(|_| anyhow!("engine stopped before replying"))
    }

    pub async fn add_override(
        &self,
        construct: Construct,
        dimension: &str,
        value: f64,
        reason: &str,
    ) -> Result<ProfileOverride> {
        self.request(|reply| Job::AddOverride {
            construct,
            dimension: dimension.to_string(),
            value,
            reason: reason.to_string(),
            reply,
        })
        .await
    }

    pub async fn remove_override(&self, id: u64) -> Result<bool> {
        self.request(|reply| Job::RemoveOverride { id, reply }).await
    }

    /// Replace the profile with a fresh one and save immediately.
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Job::Reset { reply }).await
    }

    /// Swap in an imported profile and save immediately.
    pub async fn replace_profile(&self, profile: Profile) -> Result<()> {
        self.request(|reply| Job::Replace {
            profile: Box::new(profile),
            reply,
        })
        .await
    }

    // --- Persistence ---

    /// Save when dirty. Returns whether anything was written. On failure the
    /// pipeline stays dirty so the next debounce retries.
    pub async fn save(&self) -> bool {
        let now = Timestamp::now();
        let snapshot = {
            let mut p = self.pipeline.write().await;
            if !p.is_dirty() {
                return false;
            }
            p.mark_saved();
            p.profile().clone()
        };
        let shared = self.shared.clone();
        let result =
            tokio::task::spawn_blocking(move || shared.save_blocking(&snapshot, now)).await;
        match result {
            Ok(Ok(())) => {
                tracing::debug!("profile saved");
                true
            }
            Ok(Err(e)) => {
                tracing::error!("failed to save profile: {e}");
                self.pipeline.write().await.mark_dirty();
                false
            }
            Err(e) => {
                tracing::error!("save task failed: {e}");
                self.pipeline.write().await.mark_dirty();
                false
            }
        }
    }

    // --- Background scan ---

    /// Start the history backfill. `Err` when no history directory is set.
    pub fn start_scan(&self) -> Result<()> {
        let dir = self
            .shared
            .config
            .scan
            .history_dir
            .clone()
            .ok_or_else(|| anyhow!("scan.history_dir is not configured"))?;
        let pause = std::time::Duration::from_millis(self.shared.config.scan.pause_ms);
        let engine = self.clone();
        self.shared.tracker.spawn(async move {
            let files = match history::discover_histories(&dir) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!("history scan failed: {e:#}");
                    return;
                }
            };
            let (mut queued, mut dropped) = (0usize, 0usize);
            for path in files {
                let messages = match history::extract_user_messages(&path) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("skipping {}: {e:#}", path.display());
                        continue;
                    }
                };
                for msg in messages {
                    if engine.shared.cancel.is_cancelled() {
                        return;
                    }
                    if engine.submit(msg.into_signal(Timestamp::now())) {
                        queued += 1;
                    } else {
                        dropped += 1;
                    }
                    tokio::time::sleep(pause).await;
                }
            }
            tracing::info!(queued, dropped, "history scan complete");
        });
        Ok(())
    }

    // --- Lifecycle ---

    /// Hold the processing worker; queued jobs wait.
    #[cfg(test)]
    pub fn pause(&self) {
        self.shared.pause.send_replace(true);
    }

    #[cfg(test)]
    pub fn resume(&self) {
        self.shared.pause.send_replace(false);
    }

    /// Stop the workers and write a final save if anything changed.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        self.save().await;
        let shared = self.shared.clone();
        let checkpoint = tokio::task::spawn_blocking(move || -> Result<()> {
            let store = shared
                .store
                .lock()
                .map_err(|_| anyhow!("store lock poisoned"))?;
            store.checkpoint()?;
            Ok(())
        })
        .await;
        if let Ok(Err(e)) = checkpoint {
            tracing::warn!("shutdown WAL checkpoint failed: {e}");
        }
        tracing::info!("engine stopped");
    }
}

struct Worker {
    engine: Engine,
    rx: mpsc::Receiver<Job>,
    pause_rx: watch::Receiver<bool>,
    since_save: u32,
}

impl Worker {
    async fn run(mut self) {
        let shared = self.engine.shared.clone();
        let mut save_tick = tokio::time::interval(shared.config.save_interval());
        save_tick.tick().await;
        loop {
            let paused = *self.pause_rx.borrow_and_update();
            tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => break,
                changed = self.pause_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = save_tick.tick() => {
                    if self.engine.save().await {
                        self.since_save = 0;
                    }
                }
                job = self.rx.recv(), if !paused => match job {
                    Some(job) => self.handle(job).await,
                    None => break,
                },
            }
        }
        tracing::debug!("processing worker stopped");
    }

    async fn handle(&mut self, job: Job) {
        match job {
            Job::Signal(signal) => self.process(signal).await,
            Job::AddOverride {
                construct,
                dimension,
                value,
                reason,
                reply,
            } => {
                let o = self.engine.pipeline.write().await.add_override(
                    construct,
                    &dimension,
                    value,
                    &reason,
                    Timestamp::now(),
                );
                let _ = reply.send(o);
            }
            Job::RemoveOverride { id, reply } => {
                let removed = self
                    .engine
                    .pipeline
                    .write()
                    .await
                    .remove_override(id, Timestamp::now());
                let _ = reply.send(removed);
            }
            Job::Reset { reply } => {
                self.engine.pipeline.write().await.reset(Timestamp::now());
                tracing::info!("profile reset");
                self.engine.save().await;
                self.since_save = 0;
                let _ = reply.send(());
            }
            Job::Replace { profile, reply } => {
                self.engine.pipeline.write().await.replace_profile(*profile);
                tracing::info!("profile replaced");
                self.engine.save().await;
                self.since_save = 0;
                let _ = reply.send(());
            }
        }
    }

    async fn process(&mut self, mut signal: Signal) {
        let shared = self.engine.shared.clone();
        let started = Instant::now();
        let signal_type = signal.signal_type();

        if !signal.text().is_empty() {
            let probe = signal.clone();
            let extractor = shared.extractor.clone();
            let task = tokio::task::spawn_blocking(move || {
                extract_features(extractor.as_ref(), &probe)
            });
            match tokio::time::timeout(shared.config.extraction_timeout(), task).await {
                Ok(Ok(mut features)) => {
                    // producer-supplied features win
                    features.append(&mut signal.features);
                    signal.features = features;
                }
                Ok(Err(e)) => tracing::warn!(%signal_type, "feature extraction failed: {e}"),
                Err(_) => tracing::warn!(
                    %signal_type,
                    timeout_ms = shared.config.extraction_timeout_ms,
                    "feature extraction timed out, continuing without features"
                ),
            }
        }

        let outcome = {
            let mut p = self.engine.pipeline.write().await;
            p.process(signal, Timestamp::now())
        };

        for w in &outcome.warnings {
            tracing::warn!(%signal_type, evidence_id = outcome.evidence_id, "{w}");
        }
        let elapsed = started.elapsed();
        if elapsed > shared.config.slow_signal() {
            tracing::warn!(
                %signal_type,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow signal processing"
            );
        }
        if let (Some(digest), Some(tx)) = (outcome.sync, &shared.sync_tx)
            && tx.send(digest).is_err()
        {
            tracing::warn!("sync worker gone, digest not pushed");
        }

        self.since_save += 1;
        if self.since_save >= shared.config.save_every_signals.max(1) && self.engine.save().await {
            self.since_save = 0;
        }
    }
}

async fn maintenance(engine: Engine) {
    let cancel = engine.shared.cancel.clone();
    let mut tick = tokio::time::interval(engine.shared.config.maintenance_interval());
    tick.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let started = Instant::now();
                engine.pipeline.write().await.maintain(Timestamp::now());
                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "maintenance pass complete"
                );
            }
        }
    }
    tracing::debug!("maintenance worker stopped");
}

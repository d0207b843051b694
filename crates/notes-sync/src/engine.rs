//! SyncEngine: runs note operations online-first and reconciles offline work.
//!
//! Live operations try the remote first while the client is online. When a
//! call fails (or the client is offline) the change is applied to the
//! `LocalStore` and queued in `PendingQueues` instead, and the client drops
//! to offline mode.
//!
//! On every transition back online the queues are flushed:
//!
//! 1. Creates, then updates, then deletes, each queue in FIFO order
//! 2. A confirmed create remaps its temporary id to the server id, in the
//!    local store and in every queued entry that references it
//! 3. A transient failure leaves the entry queued and the flush moves on
//! 4. A rejected entry is dropped and reported as discarded
//! 5. If nothing is left failing, the local snapshot is reloaded from the server
//!
//! All local state sits behind one async mutex. A flush holds it from the
//! first queue item to the last, so flushes never overlap each other or a
//! live operation.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use crate::identifier::{Identifier, TempIdGenerator};
use crate::kv::{KeyValueStore, Namespace};
use crate::local_store::LocalStore;
use crate::mode::{Mode, ModeController};
use crate::note::{Note, NotePayload};
use crate::queues::{PendingCounts, PendingOp, PendingQueues, QueueKind};
use crate::remote::{RemoteClient, RemoteError};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound for a single remote call. Elapsed calls count as transient failures.
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Where the engine stands with respect to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    OnlineSynced,
    OnlineSyncing,
    Offline,
    OnlinePartialFailure,
}

impl SyncState {
    pub fn is_online(&self) -> bool {
        !matches!(self, SyncState::Offline)
    }
}

/// A queue entry that stayed queued after a flush attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FailedOp {
    pub operation: PendingOp,
    pub error: String,
}

/// A queue entry the server refused. It is gone from the queue.
#[derive(Debug, Clone, Serialize)]
pub struct DiscardedOp {
    pub operation: PendingOp,
    pub reason: String,
}

/// Aggregate outcome of a flush.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushReport {
    /// Entries confirmed by the server and removed from the queues.
    pub resolved: Vec<PendingOp>,
    /// Entries attempted (or skipped) that remain queued, with the reason.
    pub failed: Vec<FailedOp>,
    /// Entries the server rejected and that were dropped.
    pub discarded: Vec<DiscardedOp>,
    /// Everything still queued once the flush ended, in flush order.
    pub still_pending: Vec<PendingOp>,
    /// The client went offline before the queues were fully walked.
    pub cancelled: bool,
}

impl FlushReport {
    /// True if nothing was attempted.
    pub fn is_noop(&self) -> bool {
        self.resolved.is_empty() && self.failed.is_empty() && self.discarded.is_empty()
    }

    /// True if every queue entry was resolved or discarded.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.still_pending.is_empty()
    }
}

/// Result of sending one queue entry.
enum ItemOutcome {
    Resolved,
    /// Stays queued: transient failure, or still waiting for its create.
    Retained(String),
    Rejected(String),
    Unauthorized,
}

/// State guarded by the engine lock.
struct Inner<K: KeyValueStore> {
    notes: LocalStore<K>,
    queues: PendingQueues<K>,
}

impl<K: KeyValueStore> Inner<K> {
    /// Replace the local snapshot with the server's list, keeping notes that
    /// still have queued work: unconfirmed creates, queued edits (and any in
    /// `keep_local`) keep their local content, queued deletes stay hidden.
    fn reconcile_snapshot(&mut self, server: Vec<Note>, keep_local: &[Identifier]) -> Result<()> {
        let mut merged = Vec::with_capacity(server.len());
        for note in server {
            if self.queues.has_delete(&note.id) {
                continue;
            }
            let keep = self.queues.has_update(&note.id) || keep_local.contains(&note.id);
            match self.notes.get(&note.id) {
                Some(local) if keep => merged.push(local.clone()),
                _ => merged.push(note),
            }
        }
        for local in self.notes.notes() {
            if local.id.is_temporary() && self.queues.has_create(&local.id) {
                merged.push(local.clone());
            }
        }
        self.notes.replace_all(merged)
    }
}

pub struct SyncEngine<R: RemoteClient, K: KeyValueStore> {
    remote: R,
    mode: Arc<ModeController<K>>,
    inner: Mutex<Inner<K>>,
    ids: TempIdGenerator,
    state: watch::Sender<SyncState>,
    events: Arc<EventBus>,
    config: EngineConfig,
}

impl<R: RemoteClient, K: KeyValueStore> SyncEngine<R, K> {
    /// Open the engine over persisted state in `namespace`.
    pub fn open(remote: R, kv: Arc<K>, namespace: &Namespace, config: EngineConfig) -> Result<Self> {
        let notes = LocalStore::load(Arc::clone(&kv), namespace)?;
        let queues = PendingQueues::load(Arc::clone(&kv), namespace)?;
        let mode = ModeController::load(kv, namespace)?;

        let initial = match (mode.mode(), queues.is_empty()) {
            (Mode::Offline, _) => SyncState::Offline,
            (Mode::Online, true) => SyncState::OnlineSynced,
            (Mode::Online, false) => SyncState::OnlinePartialFailure,
        };
        info!(
            "Sync engine opened: {} note(s), {} pending, state {:?}",
            notes.len(),
            queues.counts().total(),
            initial
        );
        let (state, _rx) = watch::channel(initial);

        Ok(Self {
            remote,
            mode: Arc::new(mode),
            inner: Mutex::new(Inner { notes, queues }),
            ids: TempIdGenerator::new(),
            state,
            events: Arc::new(EventBus::new()),
            config,
        })
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// The mode controller. Hand it to connectivity monitors and UI toggles.
    pub fn mode(&self) -> &Arc<ModeController<K>> {
        &self.mode
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub async fn pending_counts(&self) -> PendingCounts {
        self.inner.lock().await.queues.counts()
    }

    /// Every queued entry, in flush order.
    pub async fn pending(&self) -> Vec<PendingOp> {
        self.inner.lock().await.queues.snapshot()
    }

    /// The local snapshot, without touching the network.
    pub async fn local_notes(&self) -> Vec<Note> {
        self.inner.lock().await.notes.get_all()
    }

    // ==================== Live operations ====================

    /// Create a note. Offline (or if the server call fails) the note gets a
    /// temporary id and a queued create.
    pub async fn create(&self, payload: NotePayload) -> Result<Note> {
        let mut inner = self.inner.lock().await;

        if self.mode.is_online() {
            match self.call(self.remote.create(&payload)).await {
                Ok(note) => {
                    debug!("Created note {} on server", note.id);
                    inner.notes.upsert(note.clone())?;
                    return Ok(note);
                }
                Err(RemoteError::Unauthorized) => return Err(self.auth_lost(&mut inner)),
                Err(e) => self.fall_back("create", &e)?,
            }
        }

        let token = self.ids.mint();
        let note = Note::new(Identifier::Temporary(token), payload.content.clone());
        inner.notes.upsert(note.clone())?;
        inner.queues.enqueue_create(token, payload)?;
        self.queued(QueueKind::Create, &note.id);
        Ok(note)
    }

    /// Edit a note known locally. A temporary note's pending create is
    /// amended in place; nothing is sent for it until the create itself is
    /// flushed.
    pub async fn update(&self, id: &Identifier, payload: NotePayload) -> Result<Note> {
        let mut inner = self.inner.lock().await;

        let server_id = match id {
            Identifier::Temporary(_) => {
                if !inner.notes.contains(id) || !inner.queues.amend_create(id, &payload)? {
                    return Err(SyncError::NotFound(id.clone()));
                }
                return Self::apply_local(&mut inner, id, &payload);
            }
            Identifier::Permanent(server_id) => server_id,
        };
        // A note deleted offline stays deleted until its delete is flushed
        if !inner.notes.contains(id) || inner.queues.has_delete(id) {
            return Err(SyncError::NotFound(id.clone()));
        }

        if self.mode.is_online() {
            match self.call(self.remote.update(server_id, &payload)).await {
                Ok(note) => {
                    // A stale queued edit must not overwrite this one later
                    inner.queues.discard_for(id)?;
                    inner.notes.upsert(note.clone())?;
                    return Ok(note);
                }
                Err(RemoteError::Unauthorized) => return Err(self.auth_lost(&mut inner)),
                Err(e) => self.fall_back("update", &e)?,
            }
        }

        let note = Self::apply_local(&mut inner, id, &payload)?;
        inner.queues.enqueue_update(id.clone(), payload)?;
        self.queued(QueueKind::Update, id);
        Ok(note)
    }

    /// Delete a note. A temporary note is dropped together with its pending
    /// create, without any network call.
    pub async fn delete(&self, id: &Identifier) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let server_id = match id {
            Identifier::Temporary(_) => {
                let cancelled = inner.queues.cancel_create(id)?;
                let removed = inner.notes.remove(id)?.is_some();
                if !cancelled && !removed {
                    return Err(SyncError::NotFound(id.clone()));
                }
                debug!("Dropped unsynced note {}", id);
                return Ok(());
            }
            Identifier::Permanent(server_id) => server_id,
        };

        if self.mode.is_online() {
            match self.call(self.remote.delete(server_id)).await {
                Ok(()) => {
                    inner.queues.discard_for(id)?;
                    inner.notes.remove(id)?;
                    return Ok(());
                }
                Err(RemoteError::Unauthorized) => return Err(self.auth_lost(&mut inner)),
                Err(e) => self.fall_back("delete", &e)?,
            }
        }

        inner.notes.remove(id)?;
        inner.queues.enqueue_delete(id.clone())?;
        self.queued(QueueKind::Delete, id);
        Ok(())
    }

    /// All notes. Online, the snapshot is refreshed from the server first; if
    /// that fails, or offline, the local snapshot is returned as is.
    pub async fn load_all(&self) -> Result<Vec<Note>> {
        let mut inner = self.inner.lock().await;

        if self.mode.is_online() {
            match self.call(self.remote.list()).await {
                Ok(server) => inner.reconcile_snapshot(server, &[])?,
                Err(RemoteError::Unauthorized) => return Err(self.auth_lost(&mut inner)),
                Err(e) => warn!("Could not refresh notes, serving local snapshot: {}", e),
            }
        }

        Ok(inner.notes.get_all())
    }

    // ==================== Transitions ====================

    /// Drain the pending queues against the server.
    ///
    /// Stops early (`cancelled`) if the client goes offline; the entry in
    /// flight when that happens still completes. With empty queues this does
    /// nothing at all, not even a state change: an engine marked `Offline`
    /// stays there. Use [`resync`](Self::resync) for the offline-to-online
    /// transition.
    pub async fn flush(&self) -> Result<FlushReport> {
        let mut inner = self.inner.lock().await;
        self.flush_locked(&mut inner).await
    }

    /// The full offline-to-online transition: flush, then reload the snapshot
    /// from the server if everything went through.
    pub async fn resync(&self) -> Result<FlushReport> {
        let mut inner = self.inner.lock().await;

        let report = self.flush_locked(&mut inner).await?;
        if report.cancelled || !report.failed.is_empty() || !self.mode.is_online() {
            return Ok(report);
        }

        // Rejected edits keep their local content until the next reload
        let keep_local: Vec<Identifier> = report
            .discarded
            .iter()
            .filter(|d| d.operation.kind() == QueueKind::Update)
            .map(|d| d.operation.target().clone())
            .collect();

        match self.call(self.remote.list()).await {
            Ok(server) => inner.reconcile_snapshot(server, &keep_local)?,
            Err(RemoteError::Unauthorized) => return Err(self.auth_lost(&mut inner)),
            Err(e) => warn!("Reload after flush failed, keeping local snapshot: {}", e),
        }
        self.set_state(SyncState::OnlineSynced);
        Ok(report)
    }

    /// Switch modes on behalf of the user. Going online resyncs immediately.
    pub async fn switch_mode(&self, mode: Mode) -> Result<Option<FlushReport>> {
        self.mode.request_mode(mode)?;
        match mode {
            Mode::Online => self.resync().await.map(Some),
            Mode::Offline => {
                self.go_offline();
                Ok(None)
            }
        }
    }

    pub fn go_offline(&self) {
        self.set_state(SyncState::Offline);
    }

    /// Follow the mode controller: resync on every switch to online, mark the
    /// engine offline on every switch to offline. Returns when the controller
    /// is dropped.
    pub async fn run(&self) {
        let mut rx = self.mode.subscribe();
        loop {
            let mode = *rx.borrow_and_update();
            match mode {
                Mode::Online => match self.resync().await {
                    Ok(report) => debug!(
                        "Resync finished: {} resolved, {} failed, {} discarded",
                        report.resolved.len(),
                        report.failed.len(),
                        report.discarded.len()
                    ),
                    Err(e) => error!("Resync failed: {}", e),
                },
                Mode::Offline => self.go_offline(),
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    // ==================== Flush internals ====================

    async fn flush_locked(&self, inner: &mut Inner<K>) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        if inner.queues.is_empty() {
            debug!("Nothing to flush");
            return Ok(report);
        }
        if !self.mode.is_online() {
            debug!("Not flushing while offline");
            report.cancelled = true;
            report.still_pending = inner.queues.snapshot();
            self.set_state(SyncState::Offline);
            return Ok(report);
        }

        let counts = inner.queues.counts();
        info!(
            "Flushing {} create(s), {} update(s), {} delete(s)",
            counts.creates, counts.updates, counts.deletes
        );
        self.set_state(SyncState::OnlineSyncing);

        'queues: for kind in QueueKind::FLUSH_ORDER {
            let mut index = 0;
            while let Some(op) = inner.queues.peek(kind, index) {
                if !self.mode.is_online() {
                    info!("Went offline during flush, stopping");
                    report.cancelled = true;
                    break 'queues;
                }

                match self.flush_item(inner, index, &op).await {
                    ItemOutcome::Resolved => {
                        debug!("Resolved {:?} for {}", kind, op.target());
                        report.resolved.push(op);
                    }
                    ItemOutcome::Retained(error) => {
                        debug!("Keeping {:?} for {} queued: {}", kind, op.target(), error);
                        report.failed.push(FailedOp { operation: op, error });
                        index += 1;
                    }
                    ItemOutcome::Rejected(reason) => {
                        self.discard(inner, index, &op, &reason);
                        report.discarded.push(DiscardedOp { operation: op, reason });
                    }
                    ItemOutcome::Unauthorized => return Err(self.auth_lost(inner)),
                }
            }
        }

        // The last item may have been in flight when the client went offline
        if !report.cancelled && !self.mode.is_online() {
            info!("Went offline during the last flush item");
            report.cancelled = true;
        }

        report.still_pending = inner.queues.snapshot();
        let next = if report.cancelled {
            SyncState::Offline
        } else if report.failed.is_empty() {
            SyncState::OnlineSynced
        } else {
            SyncState::OnlinePartialFailure
        };
        info!(
            "Flush finished: {} resolved, {} failed, {} discarded{}",
            report.resolved.len(),
            report.failed.len(),
            report.discarded.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        self.events.emit(SyncEvent::FlushCompleted {
            resolved: report.resolved.len(),
            failed: report.failed.len(),
            discarded: report.discarded.len(),
            cancelled: report.cancelled,
        });
        self.set_state(next);
        Ok(report)
    }

    /// Send one queue entry. A confirmed entry leaves its queue before any
    /// other local write, so a failing store can never get it sent twice.
    async fn flush_item(&self, inner: &mut Inner<K>, index: usize, op: &PendingOp) -> ItemOutcome {
        let kind = op.kind();
        match op {
            PendingOp::Create(create) => {
                let note = match self.call(self.remote.create(&create.payload)).await {
                    Ok(note) => note,
                    Err(e) => return Self::classify(e),
                };
                Self::logged(inner.queues.dequeue(kind, index), "dequeue confirmed create");
                match inner.notes.remap(&create.temp_id, note.id.clone()) {
                    Ok(()) => {}
                    Err(SyncError::NotFound(_)) => {
                        error!(
                            "Confirmed create {} has no local note, storing server copy",
                            create.temp_id
                        );
                        Self::logged(inner.notes.upsert(note.clone()), "store confirmed note");
                    }
                    Err(e) => Self::logged::<()>(Err(e), "remap confirmed note"),
                }
                Self::logged(inner.queues.remap(&create.temp_id, &note.id), "remap queued entries");
                self.events.emit(SyncEvent::NoteRemapped {
                    from: create.temp_id.clone(),
                    to: note.id.clone(),
                });
                ItemOutcome::Resolved
            }
            PendingOp::Update(update) => {
                let Some(server_id) = update.target_id.server_id() else {
                    return ItemOutcome::Retained("waiting for create".into());
                };
                match self.call(self.remote.update(server_id, &update.payload)).await {
                    Ok(note) => {
                        Self::logged(inner.queues.dequeue(kind, index), "dequeue confirmed update");
                        Self::logged(inner.notes.upsert(note), "store confirmed note");
                        ItemOutcome::Resolved
                    }
                    Err(e) => Self::classify(e),
                }
            }
            PendingOp::Delete(delete) => {
                let Some(server_id) = delete.target_id.server_id() else {
                    return ItemOutcome::Retained("waiting for create".into());
                };
                match self.call(self.remote.delete(server_id)).await {
                    Ok(()) => {
                        Self::logged(inner.queues.dequeue(kind, index), "dequeue confirmed delete");
                        Self::logged(inner.notes.remove(&delete.target_id), "remove deleted note");
                        ItemOutcome::Resolved
                    }
                    Err(e) => Self::classify(e),
                }
            }
        }
    }

    /// Drop a rejected entry. A rejected create takes its unsynced note along,
    /// since it can never be confirmed.
    fn discard(&self, inner: &mut Inner<K>, index: usize, op: &PendingOp, reason: &str) {
        warn!("Server rejected {:?} for {}, discarding: {}", op.kind(), op.target(), reason);
        match op {
            PendingOp::Create(create) => {
                Self::logged(inner.queues.cancel_create(&create.temp_id), "cancel rejected create");
                Self::logged(inner.notes.remove(&create.temp_id), "remove rejected note");
            }
            PendingOp::Update(_) | PendingOp::Delete(_) => {
                Self::logged(inner.queues.dequeue(op.kind(), index), "dequeue rejected entry");
            }
        }
        self.events.emit(SyncEvent::OperationDiscarded {
            operation: op.clone(),
            reason: reason.to_string(),
        });
    }

    /// Local writes during a flush never abort it: the in-memory state is
    /// already updated when the store fails, and the next successful write
    /// of the same key persists it.
    fn logged<T>(result: Result<T>, what: &str) {
        if let Err(e) = result {
            error!("Failed to {} during flush: {}", what, e);
        }
    }

    fn classify(err: RemoteError) -> ItemOutcome {
        match err {
            RemoteError::Unauthorized => ItemOutcome::Unauthorized,
            RemoteError::Rejected { .. } => ItemOutcome::Rejected(err.to_string()),
            RemoteError::Timeout | RemoteError::Transient(_) => ItemOutcome::Retained(err.to_string()),
        }
    }

    // ==================== Helpers ====================

    /// Run a remote call under the configured timeout.
    async fn call<T>(&self, fut: impl Future<Output = crate::remote::Result<T>>) -> crate::remote::Result<T> {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    fn apply_local(inner: &mut Inner<K>, id: &Identifier, payload: &NotePayload) -> Result<Note> {
        let mut note = inner
            .notes
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(id.clone()))?;
        note.apply(payload);
        inner.notes.upsert(note.clone())?;
        Ok(note)
    }

    /// A live call failed: continue locally and drop to offline.
    fn fall_back(&self, operation: &str, err: &RemoteError) -> Result<()> {
        warn!("Remote {} failed, queuing locally: {}", operation, err);
        self.mode.force_offline(&format!("{operation} failed"))?;
        self.go_offline();
        Ok(())
    }

    fn queued(&self, kind: QueueKind, target: &Identifier) {
        debug!("Queued {:?} for {}", kind, target);
        self.go_offline();
        self.events.emit(SyncEvent::OperationQueued {
            kind,
            target: target.clone(),
        });
    }

    /// The server refused our credential: wipe local state, go offline and
    /// tell the consumer to re-authenticate.
    fn auth_lost(&self, inner: &mut Inner<K>) -> SyncError {
        warn!("Server requires authentication, clearing local state");
        if let Err(e) = inner.notes.clear() {
            error!("Failed to clear local notes: {}", e);
        }
        if let Err(e) = inner.queues.clear() {
            error!("Failed to clear pending queues: {}", e);
        }
        if let Err(e) = self.mode.force_offline("authentication required") {
            error!("Failed to persist offline mode: {}", e);
        }
        self.go_offline();
        self.events.emit(SyncEvent::AuthRequired);
        SyncError::AuthRequired
    }

    fn set_state(&self, next: SyncState) {
        let mut previous = next;
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });
        if changed {
            info!("Sync state {:?} -> {:?}", previous, next);
            self.events.emit(SyncEvent::StateChanged { state: next });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ServerId;
    use crate::kv::InMemoryKv;
    use crate::simulated::{RemoteCall, SimulatedRemote};

    fn engine_with(remote: SimulatedRemote) -> SyncEngine<SimulatedRemote, InMemoryKv> {
        let kv = Arc::new(InMemoryKv::new());
        SyncEngine::open(remote, kv, &Namespace::default(), EngineConfig::default()).unwrap()
    }

    fn permanent(id: u64) -> Identifier {
        Identifier::Permanent(ServerId::from(id))
    }

    #[tokio::test]
    async fn test_open_starts_synced_when_online_and_empty() {
        let engine = engine_with(SimulatedRemote::new());
        assert_eq!(engine.state(), SyncState::OnlineSynced);
        assert!(engine.pending_counts().await.is_empty());
    }

    #[tokio::test]
    async fn test_open_reports_leftover_work() {
        let kv = Arc::new(InMemoryKv::new());
        let ns = Namespace::default();
        {
            let engine = SyncEngine::open(SimulatedRemote::new(), Arc::clone(&kv), &ns, EngineConfig::default())
                .unwrap();
            engine.mode().set_connectivity(false).unwrap();
            engine.create(NotePayload::new("draft")).await.unwrap();
        }

        // Persisted mode is offline
        let engine = SyncEngine::open(SimulatedRemote::new(), Arc::clone(&kv), &ns, EngineConfig::default())
            .unwrap();
        assert_eq!(engine.state(), SyncState::Offline);

        engine.mode().set_connectivity(true).unwrap();
        let engine = SyncEngine::open(SimulatedRemote::new(), kv, &ns, EngineConfig::default()).unwrap();
        assert_eq!(engine.state(), SyncState::OnlinePartialFailure);
    }

    #[tokio::test]
    async fn test_online_create_gets_server_id() {
        let engine = engine_with(SimulatedRemote::new());
        let note = engine.create(NotePayload::new("hello")).await.unwrap();

        assert_eq!(note.id, permanent(1));
        assert_eq!(engine.local_notes().await, vec![note]);
        assert!(engine.pending_counts().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_create_falls_back_to_queue() {
        let remote = SimulatedRemote::new();
        remote.fail_next(RemoteError::Transient("reset".into()));
        let engine = engine_with(remote);

        let note = engine.create(NotePayload::new("hello")).await.unwrap();

        assert!(note.id.is_temporary());
        assert_eq!(engine.mode().mode(), Mode::Offline);
        assert_eq!(engine.state(), SyncState::Offline);
        assert_eq!(engine.pending_counts().await.creates, 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out_and_falls_back() {
        let remote = SimulatedRemote::new();
        remote.set_latency(Duration::from_millis(500));
        let kv = Arc::new(InMemoryKv::new());
        let config = EngineConfig {
            request_timeout: Duration::from_millis(20),
        };
        let engine = SyncEngine::open(remote, kv, &Namespace::default(), config).unwrap();

        let note = engine.create(NotePayload::new("slow")).await.unwrap();
        assert!(note.id.is_temporary());
        assert_eq!(engine.pending_counts().await.creates, 1);
    }

    #[tokio::test]
    async fn test_editing_temporary_note_amends_create() {
        let engine = engine_with(SimulatedRemote::new());
        engine.mode().set_connectivity(false).unwrap();

        let note = engine.create(NotePayload::new("v1")).await.unwrap();
        let edited = engine.update(&note.id, NotePayload::new("v2")).await.unwrap();

        assert_eq!(edited.content, "v2");
        let pending = engine.pending().await;
        assert_eq!(pending.len(), 1);
        match &pending[0] {
            PendingOp::Create(create) => assert_eq!(create.payload.content, "v2"),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deleting_temporary_note_needs_no_network() {
        let remote = SimulatedRemote::new();
        let engine = engine_with(remote);
        engine.mode().set_connectivity(false).unwrap();

        let note = engine.create(NotePayload::new("scratch")).await.unwrap();
        engine.delete(&note.id).await.unwrap();

        assert!(engine.local_notes().await.is_empty());
        assert!(engine.pending_counts().await.is_empty());
        assert_eq!(engine.remote().call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_notes_are_not_found() {
        let engine = engine_with(SimulatedRemote::new());
        engine.mode().set_connectivity(false).unwrap();

        let missing = permanent(7);
        let err = engine.update(&missing, NotePayload::new("x")).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(id) if id == missing));

        let ghost: Identifier = "tmp:00000000000000ff-3".parse().unwrap();
        assert!(matches!(engine.delete(&ghost).await, Err(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_load_all_keeps_queued_local_state() {
        let remote = SimulatedRemote::new();
        remote.seed(1u64, "server one");
        remote.seed(2u64, "server two");
        let engine = engine_with(remote);
        engine.load_all().await.unwrap();

        engine.mode().set_connectivity(false).unwrap();
        engine.update(&permanent(1), NotePayload::new("local one")).await.unwrap();
        engine.delete(&permanent(2)).await.unwrap();
        let draft = engine.create(NotePayload::new("draft")).await.unwrap();

        // Online read without flushing: the server still has the old state
        engine.mode().set_connectivity(true).unwrap();
        let notes = engine.load_all().await.unwrap();

        let contents: Vec<_> = notes.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, vec!["local one", "draft"]);
        assert!(notes.iter().any(|n| n.id == draft.id));
    }

    #[tokio::test]
    async fn test_load_all_offline_serves_local_snapshot() {
        let remote = SimulatedRemote::new();
        remote.seed(1u64, "one");
        let engine = engine_with(remote);
        engine.load_all().await.unwrap();
        engine.mode().set_connectivity(false).unwrap();
        engine.remote().clear_calls();

        let notes = engine.load_all().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(engine.remote().call_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_with_empty_queues_does_nothing() {
        let engine = engine_with(SimulatedRemote::new());
        let report = engine.flush().await.unwrap();

        assert!(report.is_noop());
        assert!(report.is_complete());
        assert_eq!(engine.remote().call_count(), 0);
        assert_eq!(engine.state(), SyncState::OnlineSynced);
    }

    #[tokio::test]
    async fn test_direct_update_supersedes_queued_one() {
        let remote = SimulatedRemote::new();
        remote.seed(5u64, "orig");
        let engine = engine_with(remote);
        engine.load_all().await.unwrap();

        engine.mode().set_connectivity(false).unwrap();
        engine.update(&permanent(5), NotePayload::new("offline")).await.unwrap();
        assert_eq!(engine.pending_counts().await.updates, 1);

        engine.mode().set_connectivity(true).unwrap();
        engine.update(&permanent(5), NotePayload::new("online")).await.unwrap();

        assert!(engine.pending_counts().await.is_empty());
        assert_eq!(
            engine.remote().calls().last(),
            Some(&RemoteCall::Update(ServerId::from(5), "online".into()))
        );
    }

    #[tokio::test]
    async fn test_update_after_offline_delete_is_not_found_online() {
        let remote = SimulatedRemote::new();
        remote.seed(5u64, "five");
        let engine = engine_with(remote);
        engine.load_all().await.unwrap();

        engine.mode().set_connectivity(false).unwrap();
        engine.delete(&permanent(5)).await.unwrap();
        let offline = engine.update(&permanent(5), NotePayload::new("edited")).await;
        assert!(matches!(offline, Err(SyncError::NotFound(_))));

        engine.mode().set_connectivity(true).unwrap();
        engine.remote().clear_calls();
        let online = engine.update(&permanent(5), NotePayload::new("edited")).await;

        assert!(matches!(online, Err(SyncError::NotFound(_))));
        assert_eq!(engine.pending_counts().await.deletes, 1);
        assert!(engine.local_notes().await.is_empty());
        assert_eq!(engine.remote().call_count(), 0);
    }

    #[tokio::test]
    async fn test_going_offline_during_last_item_cancels_flush() {
        let engine = engine_with(SimulatedRemote::new());
        engine.mode().set_connectivity(false).unwrap();
        engine.create(NotePayload::new("only")).await.unwrap();

        let mode = Arc::clone(engine.mode());
        engine.remote().on_call(move |_| {
            mode.set_connectivity(false).unwrap();
        });
        engine.mode().set_connectivity(true).unwrap();
        let report = engine.flush().await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.resolved.len(), 1);
        assert!(report.still_pending.is_empty());
        assert_eq!(engine.mode().mode(), Mode::Offline);
        assert_eq!(engine.state(), SyncState::Offline);
    }

    #[tokio::test]
    async fn test_empty_flush_keeps_state_until_resync() {
        let engine = engine_with(SimulatedRemote::new());
        engine.mode().set_connectivity(false).unwrap();
        engine.go_offline();

        engine.mode().set_connectivity(true).unwrap();
        engine.flush().await.unwrap();
        assert_eq!(engine.state(), SyncState::Offline);

        engine.resync().await.unwrap();
        assert_eq!(engine.state(), SyncState::OnlineSynced);
    }
}

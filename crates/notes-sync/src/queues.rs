//! PendingQueues: not-yet-confirmed mutations, one FIFO queue per kind.
//!
//! Each queue is persisted under its own key and rewritten only when that
//! queue changes. The queues keep one invariant themselves: no update or
//! delete ever references a temporary id. Edits to an unconfirmed note are
//! folded into its `PendingCreate`, and deleting it cancels the create.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::identifier::{Identifier, TempToken};
use crate::kv::{read_json, write_json, KeyValueStore, Namespace, StateKey};
use crate::note::NotePayload;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCreate {
    pub temp_id: Identifier,
    pub payload: NotePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpdate {
    pub target_id: Identifier,
    pub payload: NotePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDelete {
    pub target_id: Identifier,
}

/// Which queue an entry lives in. Also the order queues are flushed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueKind {
    Create,
    Update,
    Delete,
}

impl QueueKind {
    /// Flush order: creates first, so updates and deletes see permanent ids.
    pub const FLUSH_ORDER: [QueueKind; 3] = [QueueKind::Create, QueueKind::Update, QueueKind::Delete];
}

/// A queue entry of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PendingOp {
    Create(PendingCreate),
    Update(PendingUpdate),
    Delete(PendingDelete),
}

impl PendingOp {
    pub fn kind(&self) -> QueueKind {
        match self {
            PendingOp::Create(_) => QueueKind::Create,
            PendingOp::Update(_) => QueueKind::Update,
            PendingOp::Delete(_) => QueueKind::Delete,
        }
    }

    /// The note this entry is about.
    pub fn target(&self) -> &Identifier {
        match self {
            PendingOp::Create(c) => &c.temp_id,
            PendingOp::Update(u) => &u.target_id,
            PendingOp::Delete(d) => &d.target_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl PendingCounts {
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

pub struct PendingQueues<K: KeyValueStore> {
    kv: Arc<K>,
    create_key: String,
    update_key: String,
    delete_key: String,
    creates: VecDeque<PendingCreate>,
    updates: VecDeque<PendingUpdate>,
    deletes: VecDeque<PendingDelete>,
}

impl<K: KeyValueStore> PendingQueues<K> {
    /// Load all three queues persisted under `namespace`.
    pub fn load(kv: Arc<K>, namespace: &Namespace) -> Result<Self> {
        let create_key = namespace.key(StateKey::PendingCreates);
        let update_key = namespace.key(StateKey::PendingUpdates);
        let delete_key = namespace.key(StateKey::PendingDeletes);

        let creates = read_json(kv.as_ref(), &create_key)?.unwrap_or_default();
        let updates = read_json(kv.as_ref(), &update_key)?.unwrap_or_default();
        let deletes = read_json(kv.as_ref(), &delete_key)?.unwrap_or_default();

        let queues = Self {
            kv,
            create_key,
            update_key,
            delete_key,
            creates,
            updates,
            deletes,
        };
        let counts = queues.counts();
        debug!(
            "Loaded pending queues: {} create(s), {} update(s), {} delete(s)",
            counts.creates, counts.updates, counts.deletes
        );
        Ok(queues)
    }

    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            creates: self.creates.len(),
            updates: self.updates.len(),
            deletes: self.deletes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().is_empty()
    }

    /// Every entry, in flush order.
    pub fn snapshot(&self) -> Vec<PendingOp> {
        let creates = self.creates.iter().cloned().map(PendingOp::Create);
        let updates = self.updates.iter().cloned().map(PendingOp::Update);
        let deletes = self.deletes.iter().cloned().map(PendingOp::Delete);
        creates.chain(updates).chain(deletes).collect()
    }

    /// Entry at `index` in the given queue.
    pub fn peek(&self, kind: QueueKind, index: usize) -> Option<PendingOp> {
        match kind {
            QueueKind::Create => self.creates.get(index).cloned().map(PendingOp::Create),
            QueueKind::Update => self.updates.get(index).cloned().map(PendingOp::Update),
            QueueKind::Delete => self.deletes.get(index).cloned().map(PendingOp::Delete),
        }
    }

    /// Remove and return the entry at `index` in the given queue.
    pub fn dequeue(&mut self, kind: QueueKind, index: usize) -> Result<Option<PendingOp>> {
        let removed = match kind {
            QueueKind::Create => self.creates.remove(index).map(PendingOp::Create),
            QueueKind::Update => self.updates.remove(index).map(PendingOp::Update),
            QueueKind::Delete => self.deletes.remove(index).map(PendingOp::Delete),
        };
        if removed.is_some() {
            self.persist(kind)?;
        }
        Ok(removed)
    }

    pub fn has_create(&self, id: &Identifier) -> bool {
        self.creates.iter().any(|c| &c.temp_id == id)
    }

    pub fn has_update(&self, id: &Identifier) -> bool {
        self.updates.iter().any(|u| &u.target_id == id)
    }

    pub fn has_delete(&self, id: &Identifier) -> bool {
        self.deletes.iter().any(|d| &d.target_id == id)
    }

    /// Queue a create for a freshly minted temporary id.
    pub fn enqueue_create(&mut self, token: TempToken, payload: NotePayload) -> Result<()> {
        let temp_id = Identifier::Temporary(token);
        if self.amend_create(&temp_id, &payload)? {
            return Ok(());
        }
        self.creates.push_back(PendingCreate { temp_id, payload });
        self.persist(QueueKind::Create)
    }

    /// Replace the payload of a queued create in place. Returns false if no
    /// create is queued for `temp_id`.
    pub fn amend_create(&mut self, temp_id: &Identifier, payload: &NotePayload) -> Result<bool> {
        let Some(create) = self.creates.iter_mut().find(|c| &c.temp_id == temp_id) else {
            return Ok(false);
        };
        create.payload = payload.clone();
        self.persist(QueueKind::Create)?;
        Ok(true)
    }

    /// Drop a queued create and everything that references its temporary id.
    /// Returns false if no create was queued.
    pub fn cancel_create(&mut self, temp_id: &Identifier) -> Result<bool> {
        let before = self.creates.len();
        self.creates.retain(|c| &c.temp_id != temp_id);
        let cancelled = self.creates.len() != before;
        if cancelled {
            self.persist(QueueKind::Create)?;
        }
        self.discard_for(temp_id)?;
        Ok(cancelled)
    }

    /// Queue an update.
    ///
    /// A temporary target is folded into its pending create; a permanent
    /// target replaces any update already queued for it, keeping its position.
    pub fn enqueue_update(&mut self, target_id: Identifier, payload: NotePayload) -> Result<()> {
        if target_id.is_temporary() {
            return match self.amend_create(&target_id, &payload)? {
                true => Ok(()),
                false => Err(SyncError::NotFound(target_id)),
            };
        }

        match self.updates.iter_mut().find(|u| u.target_id == target_id) {
            Some(existing) => existing.payload = payload,
            None => self.updates.push_back(PendingUpdate { target_id, payload }),
        }
        self.persist(QueueKind::Update)
    }

    /// Queue a delete.
    ///
    /// A temporary target cancels its pending create instead, and nothing is
    /// queued. A permanent target supersedes queued updates for the same note.
    pub fn enqueue_delete(&mut self, target_id: Identifier) -> Result<()> {
        if target_id.is_temporary() {
            return match self.cancel_create(&target_id)? {
                true => Ok(()),
                false => Err(SyncError::NotFound(target_id)),
            };
        }

        self.drop_updates(&target_id)?;
        if !self.has_delete(&target_id) {
            self.deletes.push_back(PendingDelete { target_id });
            self.persist(QueueKind::Delete)?;
        }
        Ok(())
    }

    /// Point queued updates and deletes at `new` instead of `old`.
    /// Returns how many entries were rewritten.
    pub fn remap(&mut self, old: &Identifier, new: &Identifier) -> Result<usize> {
        let mut updates = 0;
        for update in self.updates.iter_mut().filter(|u| &u.target_id == old) {
            update.target_id = new.clone();
            updates += 1;
        }
        let mut deletes = 0;
        for delete in self.deletes.iter_mut().filter(|d| &d.target_id == old) {
            delete.target_id = new.clone();
            deletes += 1;
        }
        if updates > 0 {
            self.persist(QueueKind::Update)?;
        }
        if deletes > 0 {
            self.persist(QueueKind::Delete)?;
        }
        Ok(updates + deletes)
    }

    /// Drop queued updates and deletes for a note.
    pub fn discard_for(&mut self, id: &Identifier) -> Result<()> {
        self.drop_updates(id)?;
        let before = self.deletes.len();
        self.deletes.retain(|d| &d.target_id != id);
        if self.deletes.len() != before {
            self.persist(QueueKind::Delete)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.creates.clear();
        self.updates.clear();
        self.deletes.clear();
        for kind in QueueKind::FLUSH_ORDER {
            self.persist(kind)?;
        }
        Ok(())
    }

    fn drop_updates(&mut self, id: &Identifier) -> Result<()> {
        let before = self.updates.len();
        self.updates.retain(|u| &u.target_id != id);
        if self.updates.len() != before {
            self.persist(QueueKind::Update)?;
        }
        Ok(())
    }

    fn persist(&self, kind: QueueKind) -> Result<()> {
        let kv = self.kv.as_ref();
        match kind {
            QueueKind::Create => write_json(kv, &self.create_key, &self.creates)?,
            QueueKind::Update => write_json(kv, &self.update_key, &self.updates)?,
            QueueKind::Delete => write_json(kv, &self.delete_key, &self.deletes)?,
        }
        Ok(())
    }
}

//! LocalStore: the persisted snapshot of every note known to the client.
//!
//! Notes are kept in insertion order and written through to the
//! `KeyValueStore` on every mutation.

use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::identifier::Identifier;
use crate::kv::{read_json, write_json, KeyValueStore, Namespace, StateKey};
use crate::note::Note;

pub struct LocalStore<K: KeyValueStore> {
    kv: Arc<K>,
    key: String,
    notes: Vec<Note>,
}

impl<K: KeyValueStore> LocalStore<K> {
    /// Load the snapshot persisted under `namespace`, or start empty.
    pub fn load(kv: Arc<K>, namespace: &Namespace) -> Result<Self> {
        let key = namespace.key(StateKey::Notes);
        let notes: Vec<Note> = read_json(kv.as_ref(), &key)?.unwrap_or_default();
        debug!("Loaded {} note(s) from {}", notes.len(), key);
        Ok(Self { kv, key, notes })
    }

    /// All notes, in insertion order.
    pub fn get_all(&self) -> Vec<Note> {
        self.notes.clone()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: &Identifier) -> Option<&Note> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Insert a note, or replace the one with the same id in place.
    pub fn upsert(&mut self, note: Note) -> Result<()> {
        match self.notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => self.notes.push(note),
        }
        self.persist()
    }

    /// Remove a note. Returns the removed note, if it was present.
    pub fn remove(&mut self, id: &Identifier) -> Result<Option<Note>> {
        let Some(pos) = self.notes.iter().position(|n| &n.id == id) else {
            return Ok(None);
        };
        let removed = self.notes.remove(pos);
        self.persist()?;
        Ok(Some(removed))
    }

    /// Replace a note's identifier, keeping its content and timestamps.
    pub fn remap(&mut self, old: &Identifier, new: Identifier) -> Result<()> {
        let note = self
            .notes
            .iter_mut()
            .find(|n| &n.id == old)
            .ok_or_else(|| SyncError::NotFound(old.clone()))?;
        debug!("Remapping note {} -> {}", old, new);
        note.id = new;
        self.persist()
    }

    /// Overwrite the whole snapshot.
    pub fn replace_all(&mut self, notes: Vec<Note>) -> Result<()> {
        self.notes = notes;
        self.persist()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.replace_all(Vec::new())
    }

    fn persist(&self) -> Result<()> {
        write_json(self.kv.as_ref(), &self.key, &self.notes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{ServerId, TempIdGenerator};
    use crate::kv::InMemoryKv;

    fn store() -> (Arc<InMemoryKv>, LocalStore<InMemoryKv>) {
        let kv = Arc::new(InMemoryKv::new());
        let store = LocalStore::load(Arc::clone(&kv), &Namespace::default()).unwrap();
        (kv, store)
    }

    fn permanent(id: u64) -> Identifier {
        ServerId::from(id).into()
    }

    #[test]
    fn test_upsert_inserts_then_replaces() {
        let (_kv, mut store) = store();

        store.upsert(Note::new(permanent(1), "a")).unwrap();
        store.upsert(Note::new(permanent(2), "b")).unwrap();
        store.upsert(Note::new(permanent(1), "a2")).unwrap();

        let contents: Vec<_> = store.notes().iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, vec!["a2", "b"]);
    }

    #[test]
    fn test_remove() {
        let (_kv, mut store) = store();
        store.upsert(Note::new(permanent(1), "a")).unwrap();

        assert!(store.remove(&permanent(1)).unwrap().is_some());
        assert!(store.remove(&permanent(1)).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remap_preserves_content_and_timestamps() {
        let (_kv, mut store) = store();
        let temp: Identifier = TempIdGenerator::new().mint().into();
        let note = Note::new(temp.clone(), "Buy milk");
        store.upsert(note.clone()).unwrap();

        store.remap(&temp, permanent(10)).unwrap();

        let remapped = store.get(&permanent(10)).unwrap();
        assert_eq!(remapped.content, note.content);
        assert_eq!(remapped.created_at, note.created_at);
        assert_eq!(remapped.updated_at, note.updated_at);
        assert!(!store.contains(&temp));
    }

    #[test]
    fn test_remap_missing_is_not_found() {
        let (_kv, mut store) = store();
        let err = store.remap(&permanent(1), permanent(2)).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(id) if id == permanent(1)));
    }

    #[test]
    fn test_mutations_persist_immediately() {
        let (kv, mut store) = store();
        store.upsert(Note::new(permanent(1), "a")).unwrap();
        store.upsert(Note::new(permanent(2), "b")).unwrap();

        // A second store over the same backing kv sees the writes
        let reloaded = LocalStore::load(Arc::clone(&kv), &Namespace::default()).unwrap();
        assert_eq!(reloaded.get_all(), store.get_all());

        store.clear().unwrap();
        let reloaded = LocalStore::load(kv, &Namespace::default()).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let kv = Arc::new(InMemoryKv::new());
        let mut alice = LocalStore::load(Arc::clone(&kv), &Namespace::new("alice")).unwrap();
        alice.upsert(Note::new(permanent(1), "a")).unwrap();

        let bob = LocalStore::load(kv, &Namespace::new("bob")).unwrap();
        assert!(bob.is_empty());
    }
}

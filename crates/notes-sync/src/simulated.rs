//! SimulatedRemote: an in-memory authoritative store for tests and demos.
//!
//! Assigns sequential numeric server ids, records every call, and lets a test
//! script the outcome of upcoming calls.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::identifier::{Identifier, ServerId};
use crate::note::{Note, NotePayload};
use crate::remote::{RemoteClient, RemoteError, Result};

/// A call received by the simulated server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(String),
    Update(ServerId, String),
    Delete(ServerId),
    List,
}

type CallHook = Arc<dyn Fn(&RemoteCall) + Send + Sync>;

#[derive(Default)]
struct SimState {
    notes: Vec<Note>,
    next_id: u64,
    calls: Vec<RemoteCall>,
    /// Outcomes for upcoming calls, consumed one per call. `None` = behave normally.
    script: VecDeque<Option<RemoteError>>,
    unreachable: bool,
}

pub struct SimulatedRemote {
    state: Mutex<SimState>,
    latency: Mutex<Duration>,
    hook: Mutex<Option<CallHook>>,
}

impl SimulatedRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_id: 1,
                ..Default::default()
            }),
            latency: Mutex::new(Duration::ZERO),
            hook: Mutex::new(None),
        }
    }

    /// Put a note on the server directly, bypassing the call log.
    pub fn seed(&self, id: impl Into<ServerId>, content: &str) -> Note {
        let note = Note::new(Identifier::Permanent(id.into()), content);
        let mut state = self.lock();
        state.notes.push(note.clone());
        note
    }

    /// Notes currently held by the server.
    pub fn notes(&self) -> Vec<Note> {
        self.lock().notes.clone()
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next unscripted call fail with `err`.
    pub fn fail_next(&self, err: RemoteError) {
        self.lock().script.push_back(Some(err));
    }

    /// Let the next unscripted call behave normally.
    pub fn succeed_next(&self) {
        self.lock().script.push_back(None);
    }

    /// While unreachable, every call fails as a transient network error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Delay every call by `latency` before it is processed.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Run `hook` for every call, after the call has been applied.
    pub fn on_call(&self, hook: impl Fn(&RemoteCall) + Send + Sync + 'static) {
        *self.hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Log the call, wait out the latency, then decide whether it fails.
    async fn begin(&self, call: RemoteCall) -> Result<()> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        state.calls.push(call);
        if state.unreachable {
            return Err(RemoteError::Transient("connection refused".into()));
        }
        match state.script.pop_front().flatten() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn finish(&self, call: &RemoteCall) {
        let hook = self.hook.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(hook) = hook {
            hook(call);
        }
    }

    fn not_found(id: &ServerId) -> RemoteError {
        RemoteError::Rejected {
            status: 404,
            message: format!("note {id} not found"),
        }
    }
}

impl Default for SimulatedRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteClient for SimulatedRemote {
    async fn create(&self, payload: &NotePayload) -> Result<Note> {
        let call = RemoteCall::Create(payload.content.clone());
        let outcome = self.begin(call.clone()).await.map(|()| {
            let mut state = self.lock();
            // Skip ids already taken by seeded notes
            let mut id = ServerId::from(state.next_id);
            while state.notes.iter().any(|n| n.id.server_id() == Some(&id)) {
                state.next_id += 1;
                id = ServerId::from(state.next_id);
            }
            state.next_id += 1;
            let note = Note::new(Identifier::Permanent(id), payload.content.clone());
            state.notes.push(note.clone());
            note
        });
        self.finish(&call);
        outcome
    }

    async fn update(&self, id: &ServerId, payload: &NotePayload) -> Result<Note> {
        let call = RemoteCall::Update(id.clone(), payload.content.clone());
        let outcome = self.begin(call.clone()).await.and_then(|()| {
            let mut state = self.lock();
            let note = state
                .notes
                .iter_mut()
                .find(|n| n.id.server_id() == Some(id))
                .ok_or_else(|| Self::not_found(id))?;
            note.apply(payload);
            Ok(note.clone())
        });
        self.finish(&call);
        outcome
    }

    async fn delete(&self, id: &ServerId) -> Result<()> {
        let call = RemoteCall::Delete(id.clone());
        let outcome = self.begin(call.clone()).await.and_then(|()| {
            let mut state = self.lock();
            let before = state.notes.len();
            state.notes.retain(|n| n.id.server_id() != Some(id));
            if state.notes.len() == before {
                return Err(Self::not_found(id));
            }
            Ok(())
        });
        self.finish(&call);
        outcome
    }

    async fn list(&self) -> Result<Vec<Note>> {
        let call = RemoteCall::List;
        let outcome = self.begin(call.clone()).await.map(|()| self.lock().notes.clone());
        self.finish(&call);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let remote = SimulatedRemote::new();
        let a = remote.create(&NotePayload::new("a")).await.unwrap();
        let b = remote.create(&NotePayload::new("b")).await.unwrap();

        assert_eq!(a.id, Identifier::Permanent(ServerId::from(1)));
        assert_eq!(b.id, Identifier::Permanent(ServerId::from(2)));
        assert_eq!(remote.notes().len(), 2);
    }

    #[tokio::test]
    async fn test_create_skips_seeded_ids() {
        let remote = SimulatedRemote::new();
        remote.seed(1u64, "seeded");
        let note = remote.create(&NotePayload::new("new")).await.unwrap();
        assert_eq!(note.id, Identifier::Permanent(ServerId::from(2)));
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let remote = SimulatedRemote::new();
        remote.succeed_next();
        remote.fail_next(RemoteError::Timeout);

        assert!(remote.list().await.is_ok());
        assert_eq!(remote.list().await, Err(RemoteError::Timeout));
        assert!(remote.list().await.is_ok());
        assert_eq!(remote.call_count(), 3);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_are_rejected() {
        let remote = SimulatedRemote::new();
        let missing = ServerId::from(9);

        let err = remote.update(&missing, &NotePayload::new("x")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 404, .. }));
        let err = remote.delete(&missing).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unreachable() {
        let remote = SimulatedRemote::new();
        remote.set_unreachable(true);
        let err = remote.create(&NotePayload::new("x")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(remote.notes().is_empty());
    }
}

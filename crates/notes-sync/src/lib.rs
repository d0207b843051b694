//! Offline-first note synchronization.
//!
//! The client keeps a persisted snapshot of every note and three FIFO queues
//! of mutations the server has not confirmed yet. `SyncEngine` runs each
//! operation against the server while online, falls back to the queues when a
//! call fails, and drains them on every return to online mode.

pub mod engine;
pub mod error;
pub mod events;
pub mod identifier;
pub mod kv;
pub mod local_store;
pub mod mode;
pub mod note;
pub mod queues;
pub mod remote;
pub mod simulated;

pub use engine::{DiscardedOp, EngineConfig, FailedOp, FlushReport, SyncEngine, SyncState};
pub use error::{Result, SyncError};
pub use events::{EventBus, Subscription, SyncEvent};
pub use identifier::{Identifier, IdentifierError, ServerId, TempIdGenerator, TempToken};
pub use kv::{InMemoryKv, KeyValueStore, Namespace, StateKey, StoreError};
pub use local_store::LocalStore;
pub use mode::{Mode, ModeController, ModeSignal};
pub use note::{Note, NotePayload};
pub use queues::{PendingCounts, PendingCreate, PendingDelete, PendingOp, PendingQueues, PendingUpdate, QueueKind};
pub use remote::{AuthProvider, RemoteClient, RemoteError};
pub use simulated::{RemoteCall, SimulatedRemote};

//! notes-client library: native collaborators for `notes_sync`.
//!
//! Exposes the on-disk store, the HTTP remote, token sources and the
//! connectivity monitor so integration tests and the `notes` binary share them.

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod http_remote;
pub mod json_store;

pub use auth::{StaticToken, TokenFile};
pub use config::{Cli, Command};
pub use connectivity::{ConnectivityMonitor, ProbeConfig, ProbeState, Reachability};
pub use http_remote::HttpRemote;
pub use json_store::JsonFileStore;

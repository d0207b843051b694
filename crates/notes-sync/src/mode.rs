//! ModeController: decides whether the client is online or offline.
//!
//! Inputs are connectivity signals (from a monitor), explicit user switches,
//! and fallbacks forced by the engine when a live call fails. The effective
//! mode is persisted under the `mode` key and published on a `watch` channel.
//! The engine subscribes to that channel to start flushes, and polls it between
//! queue items so an in-flight flush stops as soon as the client goes offline.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::info;

use crate::error::Result;
use crate::kv::{read_json, write_json, KeyValueStore, Namespace, StateKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Online,
    Offline,
}

impl Mode {
    pub fn is_online(&self) -> bool {
        matches!(self, Mode::Online)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Online => "online",
            Mode::Offline => "offline",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "online" => Ok(Mode::Online),
            "offline" => Ok(Mode::Offline),
            other => Err(format!("unknown mode '{other}' (expected online or offline)")),
        }
    }
}

/// A signal the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSignal {
    /// The connectivity monitor saw the server become reachable or unreachable.
    Connectivity(bool),
    /// The user explicitly switched modes.
    UserRequest(Mode),
}

struct ModeInner {
    /// Set by a user switch to offline. Connectivity events do not override it.
    pinned_offline: bool,
}

pub struct ModeController<K: KeyValueStore> {
    kv: Arc<K>,
    key: String,
    inner: Mutex<ModeInner>,
    tx: watch::Sender<Mode>,
}

impl<K: KeyValueStore> ModeController<K> {
    /// Load the persisted mode. A client that never stored one starts online.
    pub fn load(kv: Arc<K>, namespace: &Namespace) -> Result<Self> {
        let key = namespace.key(StateKey::Mode);
        let mode: Mode = read_json(kv.as_ref(), &key)?.unwrap_or(Mode::Online);
        let (tx, _rx) = watch::channel(mode);
        Ok(Self {
            kv,
            key,
            inner: Mutex::new(ModeInner {
                pinned_offline: false,
            }),
            tx,
        })
    }

    pub fn mode(&self) -> Mode {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.mode().is_online()
    }

    /// Receiver that observes every change of the effective mode.
    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.tx.subscribe()
    }

    /// React to a signal. Returns the resulting mode.
    pub fn handle(&self, signal: ModeSignal) -> Result<Mode> {
        match signal {
            ModeSignal::Connectivity(connected) => self.set_connectivity(connected),
            ModeSignal::UserRequest(mode) => self.request_mode(mode),
        }
    }

    /// Connectivity changed. Going online is suppressed while the user has
    /// pinned the client offline.
    pub fn set_connectivity(&self, connected: bool) -> Result<Mode> {
        let inner = self.lock();
        let target = if connected && !inner.pinned_offline {
            Mode::Online
        } else {
            Mode::Offline
        };
        self.set(target, if connected { "connectivity restored" } else { "connectivity lost" })
    }

    /// Explicit user switch. Offline pins the client until the user switches back.
    pub fn request_mode(&self, mode: Mode) -> Result<Mode> {
        let mut inner = self.lock();
        inner.pinned_offline = !mode.is_online();
        self.set(mode, "user request")
    }

    /// Drop to offline after a live remote call failed. Not pinned: the next
    /// connectivity signal may bring the client back online.
    pub fn force_offline(&self, reason: &str) -> Result<Mode> {
        let _inner = self.lock();
        self.set(Mode::Offline, reason)
    }

    /// Persist and publish `mode`. Callers hold the inner lock.
    fn set(&self, mode: Mode, reason: &str) -> Result<Mode> {
        let mut previous = mode;
        let mut persisted = Ok(());
        let changed = self.tx.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            if let Err(e) = write_json(self.kv.as_ref(), &self.key, &mode) {
                persisted = Err(e);
                return false;
            }
            previous = *current;
            *current = mode;
            true
        });
        persisted?;
        if changed {
            info!("Mode {} -> {} ({})", previous, mode, reason);
        }
        Ok(mode)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ModeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

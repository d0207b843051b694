//! Command-line configuration for the `notes` binary.

use clap::{Parser, Subcommand};
use notes_sync::Mode;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "notes")]
#[command(about = "Offline-first notes client")]
pub struct Cli {
    /// Base URL of the note service
    #[arg(long, env = "NOTES_SERVER", default_value = "http://localhost:3000")]
    pub server: String,

    /// Directory holding the persisted client state
    #[arg(long, env = "NOTES_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Key prefix for this client's state, to keep several accounts apart
    #[arg(long, default_value = "notes-sync")]
    pub namespace: String,

    /// Bearer token for the note service
    #[arg(long, env = "NOTES_TOKEN", hide_env_values = true, conflicts_with = "token_file")]
    pub token: Option<String>,

    /// File holding the bearer token, re-read on every request
    #[arg(long, env = "NOTES_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Timeout for a single request to the server, in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List all notes
    List,
    /// Create a note
    Add { content: String },
    /// Replace the content of a note
    Edit { id: String, content: String },
    /// Delete a note
    Rm { id: String },
    /// Push queued changes and reload from the server
    Sync,
    /// Show mode, sync state and queued changes
    Status,
    /// Switch between online and offline mode
    Mode {
        #[arg(value_parser = parse_mode)]
        mode: Mode,
    },
    /// Keep running: probe the server and sync whenever it comes back
    Daemon {
        /// Seconds between probes while the server is reachable
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    s.parse()
}

impl Cli {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `--state-dir`, or the platform data directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }
}

/// `<data dir>/notes-sync`, falling back to `./.notes-sync`.
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("notes-sync"))
        .unwrap_or_else(|| PathBuf::from(".notes-sync"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let cli = Cli::try_parse_from(["notes", "--server", "http://n:1", "add", "Buy milk"]).unwrap();
        assert_eq!(cli.server, "http://n:1");
        assert_eq!(cli.command, Command::Add { content: "Buy milk".into() });
        assert_eq!(cli.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_mode() {
        let cli = Cli::try_parse_from(["notes", "mode", "offline"]).unwrap();
        assert_eq!(cli.command, Command::Mode { mode: Mode::Offline });

        assert!(Cli::try_parse_from(["notes", "mode", "sideways"]).is_err());
    }

    #[test]
    fn test_parse_edit_and_daemon() {
        let cli = Cli::try_parse_from(["notes", "--timeout-secs", "3", "edit", "tmp:00000000000000aa-1", "x"]).unwrap();
        assert_eq!(cli.timeout(), Duration::from_secs(3));
        assert!(matches!(cli.command, Command::Edit { ref id, .. } if id == "tmp:00000000000000aa-1"));

        let cli = Cli::try_parse_from(["notes", "daemon", "--interval-secs", "5"]).unwrap();
        assert_eq!(cli.command, Command::Daemon { interval_secs: 5 });
    }

    #[test]
    fn test_explicit_state_dir_wins() {
        let cli = Cli::try_parse_from(["notes", "--state-dir", "/tmp/n", "status"]).unwrap();
        assert_eq!(cli.state_dir(), PathBuf::from("/tmp/n"));
    }

    #[test]
    fn test_token_sources_conflict() {
        let result = Cli::try_parse_from(["notes", "--token", "a", "--token-file", "/t", "list"]);
        assert!(result.is_err());
    }
}

//! Remote command queued by the control plane

use chrono::{DateTime, Utc};

/// What the control plane wants the station to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    RemoteStart,
    RemoteStop,
}

impl CommandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteStart => "REMOTE_START",
            Self::RemoteStop => "REMOTE_STOP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REMOTE_START" => Some(Self::RemoteStart),
            "REMOTE_STOP" => Some(Self::RemoteStop),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch status of a queued command. A command leaves `Pending` exactly
/// once: to `Executed` when handed to a live session, or to `Failed` when
/// it can never be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Executed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A start/stop request queued by the control plane, consumed by the
/// dispatch bridge.
#[derive(Debug, Clone)]
pub struct Command {
    pub id: i64,
    pub station_id: String,
    pub user_id: String,
    pub action: CommandAction,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
}

// ── Tests ──────────────────────────────────────────────────────

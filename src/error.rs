/// Error types for the launcher
///
/// None of these are fatal to the launcher process. Discovery and config
/// load failures are downgraded to warnings by their callers; spawn and
/// save failures are surfaced to the user in a dialog.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::launcher::LauncherPhase;

/// Broad classification used to decide how an error reaches the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Discovery,
    Spawn,
    ConfigLoad,
    ConfigSave,
    Lifecycle,
}

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("cannot read tool directory {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("tool launcher not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("no tool at index {0}")]
    UnknownTool(usize),

    #[error("cannot read config file {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config file {}: {reason}", .path.display())]
    ConfigMalformed { path: PathBuf, reason: String },

    #[error("failed to save config to {}: {source}", .path.display())]
    ConfigSave {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize config: {0}")]
    ConfigSerialize(#[from] serde_json::Error),

    #[error("launcher cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: LauncherPhase,
        to: LauncherPhase,
    },
}

impl LauncherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LauncherError::Discovery { .. } => ErrorKind::Discovery,
            LauncherError::ScriptNotFound(_)
            | LauncherError::Spawn { .. }
            | LauncherError::UnknownTool(_) => ErrorKind::Spawn,
            LauncherError::ConfigRead { .. } | LauncherError::ConfigMalformed { .. } => {
                ErrorKind::ConfigLoad
            }
            LauncherError::ConfigSave { .. } | LauncherError::ConfigSerialize(_) => {
                ErrorKind::ConfigSave
            }
            LauncherError::InvalidTransition { .. } => ErrorKind::Lifecycle,
        }
    }

    /// Dialog title for errors that are shown to the user
    pub fn dialog_title(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Discovery => "Tool Discovery",
            ErrorKind::Spawn => "Launch Failed",
            ErrorKind::ConfigLoad => "Configuration",
            ErrorKind::ConfigSave => "Save Failed",
            ErrorKind::Lifecycle => "PDF Toolbox",
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;

//! Startup backend-mode resolution.
//!
//! The `--mode` flag wins over the config file, which wins over the
//! built-in default. The chosen source is reported so the CLI can log it.

use serde::Serialize;

use crate::{AgentMode, AgentSettings};

/// Where the active mode came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSource {
    Cli,
    Settings,
    Default,
}

impl std::fmt::Display for ModeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cli => "cli",
            Self::Settings => "settings",
            Self::Default => "default",
        })
    }
}

/// Pick the backend mode for this session.
///
/// `settings_mode` is the mode read from the config file, if it set one.
pub fn resolve_mode(cli: Option<AgentMode>, settings_mode: Option<AgentMode>) -> (AgentMode, ModeSource) {
    if let Some(mode) = cli {
        return (mode, ModeSource::Cli);
    }
    match settings_mode {
        Some(mode) => (mode, ModeSource::Settings),
        None => (AgentMode::default(), ModeSource::Default),
    }
}

/// Resolve and write the result back into the settings.
pub fn apply_startup_mode(settings: &mut AgentSettings, cli: Option<AgentMode>) -> ModeSource {
    let (mode, source) = resolve_mode(cli, settings.mode);
    settings.mode = Some(mode);
    source
}

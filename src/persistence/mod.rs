//! Graph files and auto-save
//!
//! Features:
//! - Versioned JSON envelope
//! - Atomic writes (tmp → save)
//! - Auto-save under the user data directory

pub mod envelope;

use std::path::{Path, PathBuf};

pub use envelope::{FORMAT_VERSION, GraphDefinition, LineDefinition, from_json, to_json};

use crate::error::{Error, Result};

const AUTOSAVE_FILE: &str = "autosave.json";

/// Write `graph` to `path`, replacing any existing file only once the new
/// contents are fully written
pub fn save(path: &Path, graph: &GraphDefinition) -> Result<()> {
    let json = to_json(graph)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    log::info!("Saved graph to {}", path.display());
    Ok(())
}

pub fn load(path: &Path) -> Result<GraphDefinition> {
    let json = std::fs::read_to_string(path)?;
    let graph = from_json(&json)?;
    log::info!("Loaded graph from {} ({} lines)", path.display(), graph.lines.len());
    Ok(graph)
}

pub fn autosave_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(crate::APP_DIR).join(AUTOSAVE_FILE))
}

pub fn autosave(graph: &GraphDefinition) -> Result<()> {
    let path = autosave_path().ok_or(Error::NoDataDir)?;
    save(&path, graph)
}

/// The auto-saved graph, if there is a readable one
pub fn load_autosave() -> Option<GraphDefinition> {
    let path = autosave_path()?;
    if !path.exists() {
        return None;
    }
    match load(&path) {
        Ok(graph) => Some(graph),
        Err(e) => {
            log::warn!("Ignoring auto-save {}: {e}", path.display());
            None
        }
    }
}

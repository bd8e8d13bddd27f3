//! Backend binary discovery.
//!
//! Search order:
//!
//! 1. Explicit path from config or `TVBRIDGE_*_PATH`
//! 2. Directory of the running executable
//! 3. Bundled layouts relative to it (`../lib/tvbridge`, `../Resources`)
//! 4. Well-known system locations for the platform

use std::path::{Path, PathBuf};

use crate::config::BackendKind;
use crate::error::BridgeError;

/// Platform binary file name for a backend.
pub fn binary_file_name(kind: BackendKind) -> String {
    format!("{}{}", kind.binary_name(), std::env::consts::EXE_SUFFIX)
}

/// Every path probed for `kind`, in search order.
pub fn candidates(kind: BackendKind, configured: Option<&Path>, exe_dir: Option<&Path>) -> Vec<PathBuf> {
    let file = binary_file_name(kind);
    let mut paths = Vec::new();

    if let Some(path) = configured {
        paths.push(path.to_path_buf());
    }

    if let Some(dir) = exe_dir {
        paths.push(dir.join(&file));
        paths.push(dir.join("../lib/tvbridge").join(&file));
        paths.push(dir.join("../Resources").join(&file));
    }

    for dir in system_dirs(kind) {
        paths.push(dir.join(&file));
    }

    if kind == BackendKind::Player && cfg!(target_os = "macos") {
        paths.push(PathBuf::from("/Applications/mpv.app/Contents/MacOS/mpv"));
    }

    paths
}

fn system_dirs(kind: BackendKind) -> Vec<PathBuf> {
    if cfg!(windows) {
        let mut dirs = Vec::new();
        for var in ["ProgramFiles", "ProgramFiles(x86)"] {
            if let Ok(base) = std::env::var(var) {
                dirs.push(PathBuf::from(base).join(kind.binary_name()));
            }
        }
        dirs
    } else {
        ["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin", "/snap/bin"]
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
}

/// Find the first existing candidate.
pub fn locate_in(kind: BackendKind, candidates: Vec<PathBuf>) -> Result<PathBuf, BridgeError> {
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        log::debug!("[Supervisor] Found {kind} at {}", found.display());
        return Ok(found.clone());
    }
    log::warn!(
        "[Supervisor] {} not found in {} locations",
        kind.binary_name(),
        candidates.len()
    );
    Err(BridgeError::BackendNotFound {
        backend: kind.binary_name().to_string(),
        searched: candidates,
    })
}

/// Locate a backend binary using the running executable's directory.
pub fn locate(kind: BackendKind, configured: Option<&Path>) -> Result<PathBuf, BridgeError> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    locate_in(kind, candidates(kind, configured, exe_dir.as_deref()))
}

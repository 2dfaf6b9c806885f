use std::path::{Path, PathBuf};

use crate::shared::constants::{FALLBACK_INTERPRETER, VENV_INTERPRETER};

/// Picks the Python interpreter for the worker script.
///
/// Resolution order:
/// 1. Explicit interpreter from configuration
/// 2. Virtual environment under `base_dir`
/// 3. System interpreter found on `PATH`
pub fn resolve(explicit: Option<&Path>, base_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let venv = base_dir.join(VENV_INTERPRETER);
    if venv.is_file() {
        log::debug!("Using virtual environment interpreter {}", venv.display());
        return venv;
    }

    PathBuf::from(FALLBACK_INTERPRETER)
}

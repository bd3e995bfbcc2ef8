//! Path helpers for dev-runner data files
//!
//! This module centralizes path resolution for:
//! - The dev-runner home directory (~/.dev-runner)
//! - The persisted snapshot (apps.json)

use std::path::PathBuf;

/// File name of the persisted snapshot
pub const SNAPSHOT_FILE_NAME: &str = "apps.json";

// ============================================================================
// HOME DIRECTORY
// ============================================================================

/// Resolve the user's home directory across platforms.
pub fn get_home_dir() -> Result<PathBuf, String> {
    home_dir_from(|key| std::env::var(key).ok())
}

fn home_dir_from<F>(lookup: F) -> Result<PathBuf, String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(home) = lookup("HOME").filter(|h| !h.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    if let Some(profile) = lookup("USERPROFILE").filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(profile));
    }

    if let (Some(drive), Some(path)) = (lookup("HOMEDRIVE"), lookup("HOMEPATH")) {
        if !drive.is_empty() && !path.is_empty() {
            return Ok(PathBuf::from(format!("{}{}", drive, path)));
        }
    }

    Err("Could not determine home directory".to_string())
}

// ============================================================================
// DEV-RUNNER ROOT
// ============================================================================

/// Get the dev-runner home directory (~/.dev-runner, or $DEV_RUNNER_HOME)
pub fn get_dev_runner_root() -> Result<PathBuf, String> {
    if let Ok(override_home) = std::env::var("DEV_RUNNER_HOME") {
        if !override_home.is_empty() {
            return Ok(PathBuf::from(override_home));
        }
    }

    let home = get_home_dir()?;
    Ok(home.join(".dev-runner"))
}

/// Default location of the persisted snapshot
pub fn get_default_snapshot_path() -> Result<PathBuf, String> {
    let root = get_dev_runner_root()?;
    Ok(root.join(SNAPSHOT_FILE_NAME))
}

// ============================================================================
// TESTS
// ============================================================================

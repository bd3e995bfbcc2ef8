//! Durable snapshot of app definitions, port pools and assignments
//!
//! The whole snapshot is rewritten on every mutation through a temp file and
//! an atomic rename, so a crash never leaves a half-written apps.json behind.

use log::{info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::types::{AppDef, PortSet, Snapshot};

/// Snapshot written on first run
const DEFAULT_SNAPSHOT: &str = include_str!("../defaults/apps.json");

pub struct ConfigStore {
    path: PathBuf,
    snapshot: Snapshot,
}

impl ConfigStore {
    /// Open the snapshot at `path`.
    ///
    /// A missing file is seeded from the bundled defaults. An unreadable or
    /// corrupt file yields an empty state. Assignments left over from a
    /// previous run are purged and the purge is persisted immediately.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();

        let mut store = if path.exists() {
            Self {
                snapshot: load_snapshot(&path),
                path,
            }
        } else {
            let snapshot: Snapshot = serde_json::from_str(DEFAULT_SNAPSHOT)
                .map_err(|e| format!("Failed to parse bundled default snapshot: {}", e))?;
            let store = Self { path, snapshot };
            store.save()?;
            info!("Seeded default snapshot at {:?}", store.path);
            store
        };

        if !store.snapshot.assignments.is_empty() {
            info!(
                "Purging {} stale assignment(s) from previous run",
                store.snapshot.assignments.len()
            );
            store.clear_assignments();
            store.save()?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Write the full snapshot atomically
    pub fn save(&self) -> Result<(), String> {
        write_snapshot_atomic(&self.path, &self.snapshot)
    }

    // ==================== APPS ====================

    pub fn apps(&self) -> &[AppDef] {
        &self.snapshot.apps
    }

    pub fn find_app(&self, id: &str) -> Option<&AppDef> {
        self.snapshot.apps.iter().find(|a| a.id == id)
    }

    pub fn find_app_mut(&mut self, id: &str) -> Option<&mut AppDef> {
        self.snapshot.apps.iter_mut().find(|a| a.id == id)
    }

    pub fn insert_app(&mut self, app: AppDef) {
        self.snapshot.apps.push(app);
    }

    pub fn remove_app(&mut self, id: &str) -> Option<AppDef> {
        let index = self.snapshot.apps.iter().position(|a| a.id == id)?;
        Some(self.snapshot.apps.remove(index))
    }

    // ==================== PORTS ====================

    pub fn ports(&self) -> &PortSet {
        &self.snapshot.ports
    }

    pub fn ports_mut(&mut self) -> &mut PortSet {
        &mut self.snapshot.ports
    }

    // ==================== ASSIGNMENTS ====================

    pub fn assignment(&self, port: u16) -> Option<&str> {
        self.snapshot.assignments.get(&port).map(String::as_str)
    }

    pub fn set_assignment(&mut self, port: u16, app_id: &str) {
        self.snapshot.assignments.insert(port, app_id.to_string());
    }

    pub fn remove_assignment(&mut self, port: u16) -> Option<String> {
        self.snapshot.assignments.remove(&port)
    }

    pub fn clear_assignments(&mut self) {
        self.snapshot.assignments.clear();
    }

    /// Ports currently assigned to `app_id`
    pub fn ports_assigned_to(&self, app_id: &str) -> Vec<u16> {
        self.snapshot
            .assignments
            .iter()
            .filter(|(_, id)| id.as_str() == app_id)
            .map(|(port, _)| *port)
            .collect()
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn load_snapshot(path: &Path) -> Snapshot {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read {:?}, starting empty: {}", path, e);
            return Snapshot::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("Failed to parse {:?}, starting empty: {}", path, e);
            Snapshot::default()
        }
    }
}

fn write_snapshot_atomic(path: &Path, snapshot: &Snapshot) -> Result<(), String> {
    let content = serde_json::to_string_pretty(snapshot)
        .map_err(|e| format!("Failed to serialize snapshot: {}", e))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .map_err(|e| format!("Failed to create snapshot directory: {}", e))?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(".apps.json.tmp-")
        .tempfile_in(parent)
        .map_err(|e| format!("Failed to create temp snapshot: {}", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write temp snapshot: {}", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| format!("Failed to sync snapshot: {}", e))?;
    temp_file
        .persist(path)
        .map_err(|e| format!("Failed to persist snapshot: {}", e.error))?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortCategory;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn app(id: &str) -> AppDef {
        AppDef {
            id: id.to_string(),
            name: format!("app-{}", id),
            app_type: "Service".to_string(),
            icon: "box".to_string(),
            command: "echo hi".to_string(),
            cwd: String::new(),
            env: BTreeMap::new(),
            framework: String::new(),
        }
    }

    fn read_snapshot(path: &Path) -> Snapshot {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_open_seeds_defaults_and_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("apps.json");

        let store = ConfigStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.apps().is_empty());
        assert!(store.ports().contains(3000));
        assert_eq!(read_snapshot(&path), *store.snapshot());
    }

    #[test]
    fn test_open_corrupt_file_yields_empty_state() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("apps.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(*store.snapshot(), Snapshot::default());
    }

    #[test]
    fn test_open_purges_assignments_and_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("apps.json");
        let mut snapshot = Snapshot::default();
        snapshot.apps.push(app("a1"));
        snapshot.ports.insert(PortCategory::Frontend, 3000);
        snapshot.assignments.insert(3000, "a1".to_string());
        fs::write(&path, serde_json::to_string(&snapshot).unwrap()).unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert!(store.snapshot().assignments.is_empty());
        assert_eq!(store.apps().len(), 1);

        let on_disk = read_snapshot(&path);
        assert!(on_disk.assignments.is_empty());
        assert_eq!(on_disk.apps.len(), 1);
    }

    #[test]
    fn test_save_round_trips_mutations() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("apps.json");
        let mut store = ConfigStore::open(&path).unwrap();

        store.insert_app(app("x"));
        store.ports_mut().insert(PortCategory::Backend, 9000);
        store.set_assignment(9000, "x");
        store.save().unwrap();

        let on_disk = read_snapshot(&path);
        assert_eq!(on_disk.apps[0].id, "x");
        assert!(on_disk.ports.backend.contains(&9000));
        assert_eq!(on_disk.assignments.get(&9000).map(String::as_str), Some("x"));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("apps.json");
        let store = ConfigStore::open(&path).unwrap();
        store.save().unwrap();

        let entries: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_app_crud_helpers() {
        let temp = TempDir::new().unwrap();
        let mut store = ConfigStore::open(temp.path().join("apps.json")).unwrap();

        store.insert_app(app("a"));
        store.insert_app(app("b"));
        store.find_app_mut("b").unwrap().name = "renamed".to_string();
        assert_eq!(store.find_app("b").unwrap().name, "renamed");

        assert_eq!(store.remove_app("a").map(|a| a.id), Some("a".to_string()));
        assert!(store.remove_app("a").is_none());
        assert_eq!(store.apps().len(), 1);
    }

    #[test]
    fn test_ports_assigned_to() {
        let temp = TempDir::new().unwrap();
        let mut store = ConfigStore::open(temp.path().join("apps.json")).unwrap();
        store.set_assignment(3000, "a");
        store.set_assignment(3001, "b");
        store.set_assignment(3002, "a");

        assert_eq!(store.ports_assigned_to("a"), vec![3000, 3002]);
        assert_eq!(store.remove_assignment(3000), Some("a".to_string()));
        assert_eq!(store.assignment(3000), None);
        assert_eq!(store.assignment(3001), Some("b"));
    }

    #[cfg(unix)]
    #[test]
    fn test_save_failure_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("locked");
        fs::create_dir(&dir).unwrap();
        let store = ConfigStore::open(dir.join("apps.json")).unwrap();

        fs::set_permissions(&dir, fs::Permissions::from_mode(0o500)).unwrap();
        let result = store.save();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)).unwrap();

        // Root ignores directory permissions
        if unsafe { libc::geteuid() } != 0 {
            assert!(result.is_err());
        }
    }
}

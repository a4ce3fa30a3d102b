//! Files already pulled in by `@once`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static GLOBAL: Lazy<OnceSet> = Lazy::new(OnceSet::new);

/// Shared set of canonical paths that `@once` has included
///
/// Clones share the same underlying set. Runs that must not see each
/// other's history should each use their own [`OnceSet::new`].
#[derive(Debug, Clone, Default)]
pub struct OnceSet {
    seen: Arc<Mutex<HashSet<PathBuf>>>,
}

impl OnceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide set used unless a run is given its own
    pub fn global() -> OnceSet {
        GLOBAL.clone()
    }

    /// Record `path`; false if it was already recorded
    pub fn insert(&self, path: &Path) -> bool {
        self.seen.lock().insert(canonical(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.seen.lock().contains(&canonical(path))
    }

    /// Forget every recorded path
    pub fn reset(&self) {
        self.seen.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

/// Key a path by its resolved location, or as given if it cannot be resolved
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_reports_first_sighting() {
        let set = OnceSet::new();
        assert!(set.insert(Path::new("no/such/file.txt")));
        assert!(!set.insert(Path::new("no/such/file.txt")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_equivalent_paths_share_an_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let file = dir.path().join("header.js");
        std::fs::write(&file, "x").expect("write");

        let set = OnceSet::new();
        assert!(set.insert(&file));
        assert!(set.contains(&dir.path().join("sub").join("..").join("header.js")));
    }

    #[test]
    fn test_clones_share_state_and_reset_clears() {
        let set = OnceSet::new();
        let alias = set.clone();
        set.insert(Path::new("a"));
        assert!(alias.contains(Path::new("a")));
        alias.reset();
        assert!(set.is_empty());
    }
}

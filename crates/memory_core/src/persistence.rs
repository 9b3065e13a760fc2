//! JSON persistence sink for short-term memory state.
//!
//! `save` never raises past the function boundary; `load` returns `None`
//! (plus a log line) for a missing or malformed file rather than
//! propagating an error. Disk errors are observed as `false`/`None`, not a
//! `Result`.

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

/// Write `data` as pretty-printed JSON to `path`, creating parent
/// directories as needed. Returns `false` (and logs) on any I/O or
/// serialization error rather than propagating one.
pub fn save_to_json<T: Serialize>(data: &T, path: &Path) -> bool {
    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            tracing::error!(path = %parent.display(), error = %err, "failed to create parent directory");
            return false;
        }
    }

    let file = match std::fs::File::create(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to create file");
            return false;
        }
    };

    match serde_json::to_writer_pretty(file, data) {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to write json");
            false
        }
    }
}

/// Read and parse `path` as JSON. `None` if the file doesn't exist or fails
/// to parse; both cases are logged (debug for absence, error for a
/// malformed file) but never surfaced as an error to the caller.
pub fn load_from_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no existing state file");
        return None;
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to read state file");
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to parse state file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        stm: std::collections::HashMap<String, Vec<String>>,
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contexts").join("ctx1").join("memory.json");

        let mut stm = std::collections::HashMap::new();
        stm.insert("default".to_string(), vec!["hello".to_string()]);
        let doc = Doc { stm };

        assert!(save_to_json(&doc, &path));
        let loaded: Doc = load_from_json(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let loaded: Option<Doc> = load_from_json(&path);
        assert!(loaded.is_none());
    }

    #[test]
    fn malformed_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"not json").unwrap();
        let loaded: Option<Doc> = load_from_json(&path);
        assert!(loaded.is_none());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("c.json");
        let doc = Doc {
            stm: std::collections::HashMap::new(),
        };
        assert!(save_to_json(&doc, &path));
        assert!(path.exists());
    }
}

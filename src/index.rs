//! Durable index of persisted anchors.
//!
//! Maps anchor identity to the caller's user key, one entry per anchor that
//! has been successfully saved at least once. Serialized as a single TOML
//! document rewritten wholesale on every mutation; the index is the sole
//! source of truth for which anchors are loadable.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::AnchorStoreError;

/// File name of the index document inside the map directory.
pub const INDEX_FILE: &str = "anchors.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
  anchors: HashMap<String, String>,
}

/// Runtime view of the on-disk `identity -> user_key` mapping.
#[derive(Debug)]
pub struct PersistedIndex {
  map_dir: PathBuf,
  entries: HashMap<String, String>,
}

impl PersistedIndex {
  /// Loads the index from `map_dir`, pruning stale entries.
  ///
  /// A missing or malformed index file yields an empty index — that is a
  /// recoverable condition, not a failure. Entries whose payload file is
  /// gone are dropped in memory; the file shrinks on the next persisted
  /// mutation.
  pub fn load(map_dir: PathBuf) -> Self {
    if let Err(e) = fs::create_dir_all(&map_dir) {
      warn!("Failed to create map directory {:?}: {}", map_dir, e);
    }

    let mut entries = HashMap::new();
    let path = map_dir.join(INDEX_FILE);
    if path.exists() {
      match fs::read_to_string(&path) {
        Ok(text) => match toml::from_str::<IndexFile>(&text) {
          Ok(file) => entries = file.anchors,
          Err(e) => warn!("Malformed anchor index {:?}: {}", path, e),
        },
        Err(e) => warn!("Failed to read anchor index {:?}: {}", path, e),
      }
    }

    let stale: Vec<String> = entries
      .keys()
      .filter(|identity| !map_dir.join(identity.as_str()).exists())
      .cloned()
      .collect();
    for identity in stale {
      warn!("Pruning anchor {} with missing payload", identity);
      entries.remove(&identity);
    }

    Self { map_dir, entries }
  }

  /// Directory holding the index document and anchor payloads.
  pub fn map_dir(&self) -> &Path {
    &self.map_dir
  }

  /// Path of the payload file for an identity.
  pub fn payload_path(&self, identity: &str) -> PathBuf {
    self.map_dir.join(identity)
  }

  /// Records a saved anchor and rewrites the index file.
  ///
  /// Rejects identities that are already present — an anchor is saved at
  /// most once. The in-memory insert is rolled back if the rewrite fails.
  pub fn add(
    &mut self,
    identity: impl Into<String>,
    user_key: impl Into<String>,
  ) -> Result<(), AnchorStoreError> {
    let identity = identity.into();
    if self.entries.contains_key(&identity) {
      return Err(AnchorStoreError::Consistency(format!(
        "anchor {} has already been saved",
        identity
      )));
    }

    self.entries.insert(identity.clone(), user_key.into());
    if let Err(e) = self.persist() {
      self.entries.remove(&identity);
      return Err(e.into());
    }
    Ok(())
  }

  /// Removes an entry, rewriting the index file when one was present.
  ///
  /// Returns true if the identity was known.
  pub fn remove(&mut self, identity: &str) -> bool {
    if self.entries.remove(identity).is_none() {
      return false;
    }
    if let Err(e) = self.persist() {
      warn!("Failed to rewrite anchor index after removal: {}", e);
    }
    true
  }

  pub fn contains(&self, identity: &str) -> bool {
    self.entries.contains_key(identity)
  }

  pub fn get(&self, identity: &str) -> Option<&String> {
    self.entries.get(identity)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// All entries whose identity is not in `excluding`.
  ///
  /// The store passes the registry's live identities here so an anchor is
  /// never offered for loading while a live instance already exists.
  pub fn loadable_entries(&self, excluding: &HashSet<String>) -> HashMap<String, String> {
    self
      .entries
      .iter()
      .filter(|(identity, _)| !excluding.contains(identity.as_str()))
      .map(|(identity, key)| (identity.clone(), key.clone()))
      .collect()
  }

  fn persist(&self) -> io::Result<()> {
    let file = IndexFile {
      anchors: self.entries.clone(),
    };
    let text = toml::to_string(&file)
      .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    fs::write(self.map_dir.join(INDEX_FILE), text)
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  fn touch_payload(dir: &TempDir, identity: &str) {
    fs::write(dir.path().join(identity), []).unwrap();
  }

  #[test]
  fn add_persists_and_survives_reload() {
    let dir = TempDir::new().unwrap();
    let mut index = PersistedIndex::load(dir.path().to_path_buf());
    index.add("u1", "key-1").unwrap();
    touch_payload(&dir, "u1");

    let reloaded = PersistedIndex::load(dir.path().to_path_buf());
    assert_eq!(reloaded.get("u1"), Some(&"key-1".to_string()));
    assert_eq!(reloaded.len(), 1);
  }

  #[test]
  fn duplicate_add_is_rejected_without_mutation() {
    let dir = TempDir::new().unwrap();
    let mut index = PersistedIndex::load(dir.path().to_path_buf());
    index.add("u1", "key-1").unwrap();

    let err = index.add("u1", "key-2").unwrap_err();
    assert!(matches!(err, AnchorStoreError::Consistency(_)));
    assert_eq!(index.get("u1"), Some(&"key-1".to_string()));
    assert_eq!(index.len(), 1);
  }

  #[test]
  fn entries_without_payload_are_pruned_at_load() {
    let dir = TempDir::new().unwrap();
    {
      let mut index = PersistedIndex::load(dir.path().to_path_buf());
      index.add("abc", "key-a").unwrap();
      index.add("kept", "key-b").unwrap();
    }
    // Only "kept" has a payload on disk.
    touch_payload(&dir, "kept");

    let reloaded = PersistedIndex::load(dir.path().to_path_buf());
    assert!(!reloaded.contains("abc"));
    assert!(reloaded.contains("kept"));
  }

  #[test]
  fn remove_is_a_noop_for_unknown_identities() {
    let dir = TempDir::new().unwrap();
    let mut index = PersistedIndex::load(dir.path().to_path_buf());
    assert!(!index.remove("ghost"));

    index.add("u1", "key-1").unwrap();
    assert!(index.remove("u1"));
    assert!(index.is_empty());
  }

  #[test]
  fn loadable_entries_exclude_live_identities() {
    let dir = TempDir::new().unwrap();
    let mut index = PersistedIndex::load(dir.path().to_path_buf());
    index.add("u1", "key-1").unwrap();
    index.add("u2", "key-2").unwrap();

    let mut live = HashSet::new();
    live.insert("u1".to_string());

    let loadable = index.loadable_entries(&live);
    assert_eq!(loadable.len(), 1);
    assert_eq!(loadable.get("u2"), Some(&"key-2".to_string()));
  }

  #[test]
  fn malformed_index_file_falls_back_to_empty() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(INDEX_FILE), "not [valid toml").unwrap();

    let index = PersistedIndex::load(dir.path().to_path_buf());
    assert!(index.is_empty());
  }
}

//! In-memory registry of live anchors.
//!
//! Maps native handles to the anchors currently instantiated in the running
//! session. Registry membership is independent of the persisted index: the
//! registry tracks live anchors, the index tracks saved ones. All mutation
//! happens on the owning thread.

use std::collections::{HashMap, HashSet};

use bevy::prelude::*;

use crate::bridge::AnchorHandle;
use crate::error::AnchorStoreError;

/// Snapshot of a registered anchor.
///
/// Identity and user key are immutable after registration, so the store can
/// run save-all and loadable queries without touching components.
#[derive(Clone, Debug)]
pub struct RegisteredAnchor {
  pub entity: Entity,
  pub identity: String,
  pub user_key: String,
}

/// Live anchors keyed by native handle.
#[derive(Debug, Default)]
pub struct AnchorRegistry {
  entries: HashMap<AnchorHandle, RegisteredAnchor>,
}

impl AnchorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers an anchor under its handle.
  ///
  /// A handle appears in the registry at most once; re-registration is a
  /// consistency error.
  pub fn insert(
    &mut self,
    handle: AnchorHandle,
    anchor: RegisteredAnchor,
  ) -> Result<(), AnchorStoreError> {
    if self.entries.contains_key(&handle) {
      return Err(AnchorStoreError::Consistency(format!(
        "handle {} is already registered",
        handle
      )));
    }
    self.entries.insert(handle, anchor);
    Ok(())
  }

  pub fn remove(&mut self, handle: AnchorHandle) -> Option<RegisteredAnchor> {
    self.entries.remove(&handle)
  }

  pub fn get(&self, handle: AnchorHandle) -> Option<&RegisteredAnchor> {
    self.entries.get(&handle)
  }

  pub fn contains_handle(&self, handle: AnchorHandle) -> bool {
    self.entries.contains_key(&handle)
  }

  /// Identities of all live anchors, used to exclude them from loadable
  /// queries.
  pub fn live_identities(&self) -> HashSet<String> {
    self
      .entries
      .values()
      .map(|anchor| anchor.identity.clone())
      .collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = (AnchorHandle, &RegisteredAnchor)> {
    self.entries.iter().map(|(handle, anchor)| (*handle, anchor))
  }

  /// Removes and returns every entry.
  pub fn drain(&mut self) -> Vec<(AnchorHandle, RegisteredAnchor)> {
    self.entries.drain().collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registered(identity: &str) -> RegisteredAnchor {
    RegisteredAnchor {
      entity: Entity::PLACEHOLDER,
      identity: identity.to_string(),
      user_key: format!("key-{}", identity),
    }
  }

  #[test]
  fn insert_and_lookup() {
    let mut registry = AnchorRegistry::new();
    let handle = AnchorHandle::new(7);
    registry.insert(handle, registered("u1")).unwrap();

    assert!(registry.contains_handle(handle));
    assert_eq!(registry.get(handle).unwrap().identity, "u1");
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn double_registration_is_rejected() {
    let mut registry = AnchorRegistry::new();
    let handle = AnchorHandle::new(7);
    registry.insert(handle, registered("u1")).unwrap();

    let err = registry.insert(handle, registered("u2")).unwrap_err();
    assert!(matches!(err, AnchorStoreError::Consistency(_)));
    assert_eq!(registry.get(handle).unwrap().identity, "u1");
  }

  #[test]
  fn live_identities_cover_all_entries() {
    let mut registry = AnchorRegistry::new();
    registry
      .insert(AnchorHandle::new(1), registered("u1"))
      .unwrap();
    registry
      .insert(AnchorHandle::new(2), registered("u2"))
      .unwrap();

    let live = registry.live_identities();
    assert!(live.contains("u1"));
    assert!(live.contains("u2"));
    assert_eq!(live.len(), 2);
  }
}

//! In-memory mock bridge for tests and no-native sessions.
//!
//! Mirrors what a device bridge observably does: handles are issued per
//! anchor, identities are GUID-shaped strings, payload saves produce a
//! placeholder file, and loading a payload mints a fresh handle. Tracking
//! states are settable so per-frame synchronization can be driven from
//! tests.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use super::{AnchorBridge, AnchorHandle};
use crate::anchor::{Pose, TrackingState};

#[derive(Debug)]
struct MockAnchor {
  identity: String,
  pose: Pose,
  state: TrackingState,
}

#[derive(Debug, Default)]
struct MockState {
  anchors: HashMap<AnchorHandle, MockAnchor>,
  next_handle: u64,
  scripted_handles: VecDeque<u64>,
  scripted_identities: VecDeque<String>,
  fail_next_save: bool,
  fail_next_load: bool,
}

impl MockState {
  fn issue_handle(&mut self) -> AnchorHandle {
    if let Some(raw) = self.scripted_handles.pop_front() {
      return AnchorHandle::new(raw);
    }
    self.next_handle += 1;
    AnchorHandle::new(self.next_handle)
  }

  fn issue_identity(&mut self) -> String {
    self
      .scripted_identities
      .pop_front()
      .unwrap_or_else(generate_identity)
  }
}

/// GUID-shaped identity from two random words.
fn generate_identity() -> String {
  let (a, b) = (rand::random::<u64>(), rand::random::<u64>());
  format!(
    "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
    a >> 32,
    (a >> 16) & 0xffff,
    a & 0xffff,
    b >> 48,
    b & 0xffff_ffff_ffff
  )
}

/// Simulated anchor bridge with no native dependency.
#[derive(Debug, Default)]
pub struct MockAnchorBridge {
  state: Mutex<MockState>,
}

impl MockAnchorBridge {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queues a raw handle value to be issued by the next create or load.
  pub fn script_handle(&self, raw: u64) {
    self.state.lock().unwrap().scripted_handles.push_back(raw);
  }

  /// Queues an identity to be assigned by the next create.
  pub fn script_identity(&self, identity: impl Into<String>) {
    self
      .state
      .lock()
      .unwrap()
      .scripted_identities
      .push_back(identity.into());
  }

  /// Makes the next `save_anchor` call report failure.
  pub fn fail_next_save(&self) {
    self.state.lock().unwrap().fail_next_save = true;
  }

  /// Makes the next `load_anchor` call resolve to the null handle.
  pub fn fail_next_load(&self) {
    self.state.lock().unwrap().fail_next_load = true;
  }

  /// Drives the tracking state a later `tracking_state` query reports.
  pub fn set_tracking_state(&self, handle: AnchorHandle, state: TrackingState) {
    if let Some(anchor) = self.state.lock().unwrap().anchors.get_mut(&handle) {
      anchor.state = state;
    }
  }

  /// Moves a live anchor, as relocalization would.
  pub fn set_anchor_pose(&self, handle: AnchorHandle, pose: Pose) {
    if let Some(anchor) = self.state.lock().unwrap().anchors.get_mut(&handle) {
      anchor.pose = pose;
    }
  }

  /// Number of live mock anchors.
  pub fn anchor_count(&self) -> usize {
    self.state.lock().unwrap().anchors.len()
  }
}

impl AnchorBridge for MockAnchorBridge {
  fn add_anchor(&self, pose: Pose) -> AnchorHandle {
    let mut state = self.state.lock().unwrap();
    let handle = state.issue_handle();
    if handle.is_null() {
      return AnchorHandle::NULL;
    }
    let identity = state.issue_identity();
    state.anchors.insert(
      handle,
      MockAnchor {
        identity,
        pose,
        state: TrackingState::Stopped,
      },
    );
    handle
  }

  fn anchor_identity(&self, handle: AnchorHandle) -> String {
    self
      .state
      .lock()
      .unwrap()
      .anchors
      .get(&handle)
      .map(|a| a.identity.clone())
      .unwrap_or_default()
  }

  fn save_anchor(&self, handle: AnchorHandle, path: &Path) -> bool {
    {
      let mut state = self.state.lock().unwrap();
      if state.fail_next_save {
        state.fail_next_save = false;
        return false;
      }
      if !state.anchors.contains_key(&handle) {
        return false;
      }
    }
    // Placeholder payload; a device bridge writes its opaque map blob here.
    fs::write(path, []).is_ok()
  }

  fn load_anchor(&self, path: &Path) -> AnchorHandle {
    let mut state = self.state.lock().unwrap();
    if state.fail_next_load {
      state.fail_next_load = false;
      return AnchorHandle::NULL;
    }
    if !path.exists() {
      return AnchorHandle::NULL;
    }
    let identity = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let handle = state.issue_handle();
    if handle.is_null() {
      return AnchorHandle::NULL;
    }
    state.anchors.insert(
      handle,
      MockAnchor {
        identity,
        pose: Pose::IDENTITY,
        state: TrackingState::Stopped,
      },
    );
    handle
  }

  fn destroy_anchor(&self, handle: AnchorHandle) {
    self.state.lock().unwrap().anchors.remove(&handle);
  }

  fn tracking_state(&self, handle: AnchorHandle) -> TrackingState {
    self
      .state
      .lock()
      .unwrap()
      .anchors
      .get(&handle)
      .map(|a| a.state)
      .unwrap_or(TrackingState::Stopped)
  }

  fn anchor_pose(&self, handle: AnchorHandle) -> Pose {
    self
      .state
      .lock()
      .unwrap()
      .anchors
      .get(&handle)
      .map(|a| a.pose)
      .unwrap_or_default()
  }

  fn live_handles(&self) -> Vec<AnchorHandle> {
    self.state.lock().unwrap().anchors.keys().copied().collect()
  }
}

#[cfg(test)]
mod tests {
  use bevy::math::Vec3;
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn scripted_handle_and_identity_are_issued_in_order() {
    let bridge = MockAnchorBridge::new();
    bridge.script_handle(7);
    bridge.script_identity("u1");

    let handle = bridge.add_anchor(Pose::IDENTITY);
    assert_eq!(handle, AnchorHandle::new(7));
    assert_eq!(bridge.anchor_identity(handle), "u1");

    // Falls back to sequential handles and generated identities.
    let next = bridge.add_anchor(Pose::IDENTITY);
    assert!(!next.is_null());
    assert_ne!(next, handle);
    assert!(!bridge.anchor_identity(next).is_empty());
  }

  #[test]
  fn save_writes_placeholder_payload() {
    let dir = TempDir::new().unwrap();
    let bridge = MockAnchorBridge::new();
    let handle = bridge.add_anchor(Pose::new(Vec3::ONE, bevy::math::Quat::IDENTITY));

    let path = dir.path().join("payload");
    assert!(bridge.save_anchor(handle, &path));
    assert!(path.exists());
  }

  #[test]
  fn load_of_missing_payload_is_null() {
    let dir = TempDir::new().unwrap();
    let bridge = MockAnchorBridge::new();
    assert!(bridge.load_anchor(&dir.path().join("absent")).is_null());
  }

  #[test]
  fn load_mints_fresh_handle_with_payload_identity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("u1");
    fs::write(&path, []).unwrap();

    let bridge = MockAnchorBridge::new();
    bridge.script_handle(42);
    let handle = bridge.load_anchor(&path);
    assert_eq!(handle, AnchorHandle::new(42));
    assert_eq!(bridge.anchor_identity(handle), "u1");
    assert_eq!(bridge.live_handles(), vec![handle]);
  }

  #[test]
  fn failure_injection_is_one_shot() {
    let dir = TempDir::new().unwrap();
    let bridge = MockAnchorBridge::new();
    let handle = bridge.add_anchor(Pose::IDENTITY);
    let path = dir.path().join("payload");

    bridge.fail_next_save();
    assert!(!bridge.save_anchor(handle, &path));
    assert!(bridge.save_anchor(handle, &path));
  }
}

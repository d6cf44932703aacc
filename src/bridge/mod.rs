//! Native anchor bridge capability.
//!
//! The bridge is the seam between the store and the platform's spatial
//! tracking runtime. Device builds plug in a wrapper over the native SDK;
//! tests and editor-style sessions use [`MockAnchorBridge`]. Both are
//! selected at plugin construction, never by inline branching.

mod mock;

use std::fmt;
use std::path::Path;

pub use mock::MockAnchorBridge;

use crate::anchor::{Pose, TrackingState};

/// Opaque native anchor handle. Zero is the null handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AnchorHandle(u64);

impl AnchorHandle {
  /// The null handle, returned by the bridge on failure.
  pub const NULL: Self = Self(0);

  pub const fn new(raw: u64) -> Self {
    Self(raw)
  }

  pub const fn raw(self) -> u64 {
    self.0
  }

  pub const fn is_null(self) -> bool {
    self.0 == 0
  }
}

impl fmt::Display for AnchorHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Primitive operations on native anchor handles.
///
/// Create/destroy/query calls run on the owning thread; `save_anchor` and
/// `load_anchor` are blocking and are invoked from the I/O worker thread,
/// which is why the trait requires `Send + Sync`.
pub trait AnchorBridge: Send + Sync {
  /// Creates a native anchor at the given pose.
  ///
  /// Returns [`AnchorHandle::NULL`] on failure.
  fn add_anchor(&self, pose: Pose) -> AnchorHandle;

  /// Returns the stable identity the platform assigned to a handle.
  fn anchor_identity(&self, handle: AnchorHandle) -> String;

  /// Writes the anchor's native payload to `path`. Blocking.
  fn save_anchor(&self, handle: AnchorHandle, path: &Path) -> bool;

  /// Resolves a payload file back into a live handle. Blocking.
  ///
  /// Returns [`AnchorHandle::NULL`] when the payload cannot be relocalized.
  fn load_anchor(&self, path: &Path) -> AnchorHandle;

  /// Releases a native handle. Best effort.
  fn destroy_anchor(&self, handle: AnchorHandle);

  /// Current tracking state of a handle.
  fn tracking_state(&self, handle: AnchorHandle) -> TrackingState;

  /// Current pose of a handle. Meaningful only while tracking.
  fn anchor_pose(&self, handle: AnchorHandle) -> Pose;

  /// Enumerates the handles the runtime is currently aware of.
  ///
  /// Called once per frame by the synchronization system.
  fn live_handles(&self) -> Vec<AnchorHandle>;
}

//! World anchor component and tracking-state notifications.
//!
//! A `WorldAnchor` locks an entity's `Transform` to a fixed real-world pose.
//! The per-frame synchronization system is the only writer of tracking state
//! and pose; everything else observes transitions through the
//! [`AnchorTrackingChanged`] message.

use bevy::prelude::*;

use crate::bridge::AnchorHandle;

/// Position and orientation of an anchor in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
  pub position: Vec3,
  pub rotation: Quat,
}

impl Pose {
  /// Identity pose at the origin.
  pub const IDENTITY: Self = Self {
    position: Vec3::ZERO,
    rotation: Quat::IDENTITY,
  };

  pub fn new(position: Vec3, rotation: Quat) -> Self {
    Self { position, rotation }
  }

  /// Extracts the pose from a transform.
  pub fn from_transform(transform: &Transform) -> Self {
    Self {
      position: transform.translation,
      rotation: transform.rotation,
    }
  }
}

impl Default for Pose {
  fn default() -> Self {
    Self::IDENTITY
  }
}

/// Tracking quality of a live anchor, reported by the native bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrackingState {
  /// Not tracked. Initial state of every anchor.
  #[default]
  Stopped,
  /// Tracking is temporarily interrupted; the pose is stale but may recover.
  Paused,
  /// Actively tracked; the pose is being refreshed every frame.
  Tracking,
}

/// Component binding an entity to a spatial anchor.
///
/// Freshly placed anchors start unbound (`WorldAnchor::new`); anchors
/// reconstructed from the persisted index start with a known identity
/// (`WorldAnchor::restored`) and receive their handle through
/// `AnchorStore::bind_anchor` once the native load completes.
#[derive(Component, Debug)]
pub struct WorldAnchor {
  identity: String,
  handle: AnchorHandle,
  user_key: String,
  tracking_state: TrackingState,
}

impl WorldAnchor {
  /// Creates an unbound anchor with the given user key.
  ///
  /// The identity is assigned by the bridge when the anchor is created.
  pub fn new(user_key: impl Into<String>) -> Self {
    Self {
      identity: String::new(),
      handle: AnchorHandle::NULL,
      user_key: user_key.into(),
      tracking_state: TrackingState::Stopped,
    }
  }

  /// Creates an anchor whose identity is already known from the index.
  pub fn restored(identity: impl Into<String>, user_key: impl Into<String>) -> Self {
    Self {
      identity: identity.into(),
      handle: AnchorHandle::NULL,
      user_key: user_key.into(),
      tracking_state: TrackingState::Stopped,
    }
  }

  /// Stable identifier persisting across sessions. Empty until bound.
  pub fn identity(&self) -> &str {
    &self.identity
  }

  /// Native handle. Null while unbound.
  pub fn handle(&self) -> AnchorHandle {
    self.handle
  }

  /// Caller-supplied key used to rebuild the presentation on reload.
  pub fn user_key(&self) -> &str {
    &self.user_key
  }

  pub fn tracking_state(&self) -> TrackingState {
    self.tracking_state
  }

  /// Returns true once the anchor holds a live native handle.
  pub fn is_bound(&self) -> bool {
    !self.handle.is_null()
  }

  /// Binds a freshly created anchor to its handle and identity.
  pub(crate) fn bind(&mut self, handle: AnchorHandle, identity: String) {
    self.handle = handle;
    self.identity = identity;
  }

  /// Attaches a handle to a restored anchor.
  pub(crate) fn attach_handle(&mut self, handle: AnchorHandle) {
    self.handle = handle;
  }

  /// Updates the tracking state, returning true on an actual transition.
  ///
  /// Assignment of an identical value is a silent no-op so the change
  /// notification fires exactly once per transition.
  pub(crate) fn set_tracking_state(&mut self, state: TrackingState) -> bool {
    if self.tracking_state == state {
      return false;
    }
    self.tracking_state = state;
    true
  }
}

/// Broadcast whenever an anchor's tracking state transitions.
///
/// Written only on actual value changes, never on repeated identical frames.
#[derive(Message, Clone, Debug)]
pub struct AnchorTrackingChanged {
  pub entity: Entity,
  pub handle: AnchorHandle,
  pub state: TrackingState,
}

/// Broadcast when an asynchronous anchor load resolves to a live handle.
///
/// Consumers typically spawn a presentation entity for `user_key` and call
/// `AnchorStore::bind_anchor` with the delivered handle.
#[derive(Message, Clone, Debug)]
pub struct AnchorLoaded {
  pub identity: String,
  pub user_key: String,
  pub handle: AnchorHandle,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tracking_state_setter_reports_transitions_only() {
    let mut anchor = WorldAnchor::new("key");
    assert_eq!(anchor.tracking_state(), TrackingState::Stopped);

    assert!(anchor.set_tracking_state(TrackingState::Tracking));
    assert!(!anchor.set_tracking_state(TrackingState::Tracking));
    assert!(anchor.set_tracking_state(TrackingState::Paused));
    assert_eq!(anchor.tracking_state(), TrackingState::Paused);
  }

  #[test]
  fn restored_anchor_keeps_identity_until_bound() {
    let mut anchor = WorldAnchor::restored("u1", "key-1");
    assert_eq!(anchor.identity(), "u1");
    assert!(!anchor.is_bound());

    anchor.attach_handle(AnchorHandle::new(42));
    assert!(anchor.is_bound());
    assert_eq!(anchor.identity(), "u1");
  }
}

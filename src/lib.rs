//! Persistent spatial anchor store plugin for Bevy.
//!
//! Maps application-defined keys to native spatial-anchor handles, persists
//! anchor identity and native payloads to durable storage, and synchronizes
//! live tracking state once per frame. Blocking work (native save/load,
//! payload I/O) runs on a background worker; its completions are drained on
//! the main schedule every frame.
//!
//! The native runtime is abstracted behind [`AnchorBridge`], selected at
//! plugin construction: device builds inject their SDK wrapper, tests and
//! editor-style sessions run on [`MockAnchorBridge`].

use std::path::PathBuf;
use std::sync::Arc;

use bevy::prelude::*;

pub mod anchor;
pub mod bridge;
pub mod error;
pub mod index;
mod io_worker;
pub mod registry;
pub mod store;

pub use anchor::{AnchorLoaded, AnchorTrackingChanged, Pose, TrackingState, WorldAnchor};
pub use bridge::{AnchorBridge, AnchorHandle, MockAnchorBridge};
pub use error::AnchorStoreError;
pub use index::{INDEX_FILE, PersistedIndex};
pub use registry::{AnchorRegistry, RegisteredAnchor};
pub use store::AnchorStore;

/// Default application name for the map directory.
pub const DEFAULT_APP_NAME: &str = "world_anchor";

/// Returns the default map directory for the given app name.
///
/// Uses OS-standard data directories:
/// - Linux: `~/.local/share/<app_name>/maps/`
/// - Windows: `%APPDATA%/<app_name>/maps/`
/// - macOS: `~/Library/Application Support/<app_name>/maps/`
#[cfg(feature = "native")]
pub fn default_map_dir(app_name: &str) -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(app_name)
    .join("maps")
}

/// Without the `native` feature the map directory is the working directory.
#[cfg(not(feature = "native"))]
pub fn default_map_dir(app_name: &str) -> PathBuf {
  PathBuf::from(".").join(app_name)
}

/// Configuration for the anchor store.
#[derive(Clone, Debug)]
pub struct AnchorStoreConfig {
  /// Directory holding the index document and anchor payload files.
  pub map_dir: PathBuf,
}

impl AnchorStoreConfig {
  /// Stores anchors under an explicit directory.
  pub fn at(map_dir: impl Into<PathBuf>) -> Self {
    Self {
      map_dir: map_dir.into(),
    }
  }
}

impl Default for AnchorStoreConfig {
  fn default() -> Self {
    Self {
      map_dir: default_map_dir(DEFAULT_APP_NAME),
    }
  }
}

/// Label for the store's per-frame systems (drain, then synchronize).
#[derive(SystemSet, Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct AnchorSyncSet;

/// Bevy plugin inserting the [`AnchorStore`] resource and its systems.
///
/// # Example
/// ```ignore
/// app.add_plugins(
///   AnchorStorePlugin::new(AnchorStoreConfig::at("/tmp/maps"))
///     .with_bridge(Arc::new(MockAnchorBridge::new())),
/// );
/// ```
pub struct AnchorStorePlugin {
  config: AnchorStoreConfig,
  bridge: Option<Arc<dyn AnchorBridge>>,
}

impl AnchorStorePlugin {
  pub fn new(config: AnchorStoreConfig) -> Self {
    Self {
      config,
      bridge: None,
    }
  }

  /// Substitutes the bridge implementation. Defaults to the mock bridge.
  pub fn with_bridge(mut self, bridge: Arc<dyn AnchorBridge>) -> Self {
    self.bridge = Some(bridge);
    self
  }
}

impl Default for AnchorStorePlugin {
  fn default() -> Self {
    Self::new(AnchorStoreConfig::default())
  }
}

impl Plugin for AnchorStorePlugin {
  fn build(&self, app: &mut App) {
    let bridge = self
      .bridge
      .clone()
      .unwrap_or_else(|| Arc::new(MockAnchorBridge::new()));

    app
      .insert_resource(AnchorStore::new(bridge, self.config.map_dir.clone()))
      .add_message::<AnchorTrackingChanged>()
      .add_message::<AnchorLoaded>()
      .add_systems(
        Update,
        (store::drain_io_completions, store::synchronize_anchors)
          .chain()
          .in_set(AnchorSyncSet),
      );
  }
}

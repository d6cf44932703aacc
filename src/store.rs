//! Anchor store orchestration and per-frame synchronization.
//!
//! The [`AnchorStore`] resource owns the persisted index and the live
//! registry, dispatches blocking bridge work to the I/O worker, and is
//! mutated only from the main schedule. Two chained Update systems drive it:
//! `drain_io_completions` empties the worker's completion queue, then
//! `synchronize_anchors` reconciles tracking state and poses against the
//! bridge's live handle list.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bevy::ecs::message::MessageWriter;
use bevy::prelude::*;

use crate::anchor::{AnchorLoaded, AnchorTrackingChanged, Pose, TrackingState, WorldAnchor};
use crate::bridge::{AnchorBridge, AnchorHandle};
use crate::error::AnchorStoreError;
use crate::index::PersistedIndex;
use crate::io_worker::{AnchorIoCommand, AnchorIoDispatcher, AnchorIoResult};
use crate::registry::{AnchorRegistry, RegisteredAnchor};

type LoadCallback = Box<dyn FnOnce(AnchorHandle) + Send + Sync>;

/// Session-scoped anchor persistence context.
///
/// One store exists per AR session, inserted by the plugin and dropped at
/// session end. All operations run on the owning thread; anything blocking
/// is handed to the worker and resolved on a later frame.
#[derive(Resource)]
pub struct AnchorStore {
  bridge: Arc<dyn AnchorBridge>,
  index: PersistedIndex,
  registry: AnchorRegistry,
  io: AnchorIoDispatcher,
  pending_loads: HashMap<String, LoadCallback>,
}

impl AnchorStore {
  /// Opens the store: loads and prunes the index, spawns the I/O worker.
  pub fn new(bridge: Arc<dyn AnchorBridge>, map_dir: PathBuf) -> Self {
    let index = PersistedIndex::load(map_dir);
    info!(
      "Anchor store ready: {} persisted anchors in {:?}",
      index.len(),
      index.map_dir()
    );
    let io = AnchorIoDispatcher::spawn(bridge.clone());
    Self {
      bridge,
      index,
      registry: AnchorRegistry::new(),
      io,
      pending_loads: HashMap::new(),
    }
  }

  /// Creates a native anchor at `pose` and binds it to `anchor`.
  ///
  /// On a null bridge handle nothing is registered and nothing else is
  /// mutated. The identity is bridge-issued.
  pub fn create_anchor(
    &mut self,
    entity: Entity,
    anchor: &mut WorldAnchor,
    pose: Pose,
  ) -> Result<AnchorHandle, AnchorStoreError> {
    let handle = self.bridge.add_anchor(pose);
    if handle.is_null() {
      return Err(AnchorStoreError::NativeBridge(
        "bridge returned a null handle".to_string(),
      ));
    }

    let identity = self.bridge.anchor_identity(handle);
    info!("Created anchor {} under handle {}", identity, handle);

    if let Err(e) = self.registry.insert(
      handle,
      RegisteredAnchor {
        entity,
        identity: identity.clone(),
        user_key: anchor.user_key().to_string(),
      },
    ) {
      // Handle collision; give the freshly created native anchor back.
      self.io.send(AnchorIoCommand::Release { handle });
      return Err(e);
    }

    anchor.bind(handle, identity);
    Ok(handle)
  }

  /// Associates an already-resolved handle with a restored anchor.
  ///
  /// Used when reconstructing an anchor whose identity was already known
  /// from the index, after [`AnchorStore::load_with_identity`] resolves.
  pub fn bind_anchor(
    &mut self,
    entity: Entity,
    anchor: &mut WorldAnchor,
    handle: AnchorHandle,
  ) -> Result<(), AnchorStoreError> {
    if handle.is_null() {
      return Err(AnchorStoreError::NativeBridge(
        "cannot bind the null handle".to_string(),
      ));
    }

    self.registry.insert(
      handle,
      RegisteredAnchor {
        entity,
        identity: anchor.identity().to_string(),
        user_key: anchor.user_key().to_string(),
      },
    )?;
    anchor.attach_handle(handle);
    Ok(())
  }

  /// Saves an anchor: index entry now, payload write in the background.
  ///
  /// Returns true once the index entry is recorded — optimistically, before
  /// the payload hits the disk. A failed payload write rolls the entry back
  /// on a later frame and is logged, not returned. Saving an anchor that is
  /// already in the index returns false without mutation.
  pub fn save_anchor(&mut self, anchor: &WorldAnchor) -> bool {
    if !anchor.is_bound() {
      warn!("Cannot save unbound anchor (key {})", anchor.user_key());
      return false;
    }
    self.queue_save(anchor.handle(), anchor.identity(), anchor.user_key())
  }

  /// Saves every live anchor not yet present in the index.
  ///
  /// Idempotent: already-saved anchors are skipped, not re-written. Returns
  /// the number of saves queued.
  pub fn save_all(&mut self) -> usize {
    let unsaved: Vec<(AnchorHandle, String, String)> = self
      .registry
      .iter()
      .filter(|(_, anchor)| !self.index.contains(&anchor.identity))
      .map(|(handle, anchor)| (handle, anchor.identity.clone(), anchor.user_key.clone()))
      .collect();

    info!(
      "Saving all anchors: {} live, {} unsaved",
      self.registry.len(),
      unsaved.len()
    );

    let mut queued = 0;
    for (handle, identity, user_key) in unsaved {
      if self.queue_save(handle, &identity, &user_key) {
        queued += 1;
      }
    }
    queued
  }

  fn queue_save(&mut self, handle: AnchorHandle, identity: &str, user_key: &str) -> bool {
    match self.index.add(identity, user_key) {
      Ok(()) => {
        let path = self.index.payload_path(identity);
        self.io.send(AnchorIoCommand::Save {
          handle,
          identity: identity.to_string(),
          path,
        });
        true
      }
      Err(e) => {
        warn!("Save rejected for anchor {}: {}", identity, e);
        false
      }
    }
  }

  /// Removes an anchor from the session.
  ///
  /// Synchronously unregisters it, releases the native handle in the
  /// background and despawns the entity. The persisted index is untouched:
  /// destruction is not erasure. Returns true if the anchor was known.
  pub fn destroy_anchor(
    &mut self,
    commands: &mut Commands,
    entity: Entity,
    anchor: &WorldAnchor,
  ) -> bool {
    let known = self.registry.remove(anchor.handle()).is_some();
    if !anchor.handle().is_null() {
      self.io.send(AnchorIoCommand::Release {
        handle: anchor.handle(),
      });
    }
    commands.entity(entity).despawn();
    known
  }

  /// Applies destroy semantics to every live anchor.
  pub fn destroy_all(&mut self, commands: &mut Commands) {
    info!("Destroying all anchors: {}", self.registry.len());
    for (handle, anchor) in self.registry.drain() {
      self.io.send(AnchorIoCommand::Release { handle });
      commands.entity(anchor.entity).despawn();
    }
  }

  /// Erases an anchor from durable storage.
  ///
  /// Removes the index entry if present and deletes the payload file.
  /// Returns false when no payload file existed. Registry membership is
  /// unaffected: a live anchor survives its own erasure.
  pub fn erase_anchor(&mut self, anchor: &WorldAnchor) -> bool {
    self.erase_identity(anchor.identity())
  }

  /// Erase by identity, without a live anchor.
  pub fn erase_identity(&mut self, identity: &str) -> bool {
    info!("Erasing anchor {}", identity);
    self.index.remove(identity);

    let path = self.index.payload_path(identity);
    if !path.exists() {
      return false;
    }
    match fs::remove_file(&path) {
      Ok(()) => true,
      Err(e) => {
        warn!("Failed to delete payload {:?}: {}", path, e);
        false
      }
    }
  }

  /// Requests an asynchronous load of a persisted anchor.
  ///
  /// No-op when the identity is unknown or its payload file is missing. On
  /// success `on_loaded` runs on the owning thread during the next drain and
  /// an [`AnchorLoaded`] message is broadcast; a payload that fails to
  /// relocalize prunes the stale index entry instead.
  pub fn load_with_identity(
    &mut self,
    identity: &str,
    on_loaded: impl FnOnce(AnchorHandle) + Send + Sync + 'static,
  ) {
    if !self.index.contains(identity) {
      debug!("Anchor {} is not in the index, ignoring load", identity);
      return;
    }
    let path = self.index.payload_path(identity);
    if !path.exists() {
      debug!("Anchor {} has no payload on disk, ignoring load", identity);
      return;
    }
    if self.pending_loads.contains_key(identity) {
      debug!("Load already in flight for anchor {}", identity);
      return;
    }

    self
      .pending_loads
      .insert(identity.to_string(), Box::new(on_loaded));
    self.io.send(AnchorIoCommand::Load {
      identity: identity.to_string(),
      path,
    });
  }

  /// Persisted anchors that are not currently live, as `identity ->
  /// user_key`. These are the candidates for `load_with_identity`.
  pub fn loadable_identities(&self) -> HashMap<String, String> {
    self
      .index
      .loadable_entries(&self.registry.live_identities())
  }

  /// Read-only view of the live registry.
  pub fn registry(&self) -> &AnchorRegistry {
    &self.registry
  }

  /// Read-only view of the persisted index.
  pub fn index(&self) -> &PersistedIndex {
    &self.index
  }
}

impl Drop for AnchorStore {
  fn drop(&mut self) {
    self.io.shutdown();
  }
}

/// System: drains the worker's completion queue, once per frame.
///
/// Runs before synchronization so completions observe this frame's state.
/// Completions for anchors destroyed mid-flight find no registry entry and
/// degrade to index-only effects.
pub(crate) fn drain_io_completions(
  store: Option<ResMut<AnchorStore>>,
  mut loaded: MessageWriter<AnchorLoaded>,
) {
  let Some(mut store) = store else {
    return;
  };
  let store = store.as_mut();

  while let Some(result) = store.io.try_recv() {
    match result {
      AnchorIoResult::Saved { identity } => {
        debug!("Anchor {} payload persisted", identity);
      }
      AnchorIoResult::SaveFailed { identity } => {
        warn!(
          "Anchor {} payload write failed, rolling back index entry",
          identity
        );
        store.index.remove(&identity);
      }
      AnchorIoResult::Loaded { identity, handle } => {
        let callback = store.pending_loads.remove(&identity);
        if handle.is_null() {
          warn!(
            "Anchor {} failed to relocalize, pruning stale entry",
            identity
          );
          store.index.remove(&identity);
          continue;
        }
        let user_key = store.index.get(&identity).cloned().unwrap_or_default();
        if let Some(callback) = callback {
          callback(handle);
        }
        loaded.write(AnchorLoaded {
          identity,
          user_key,
          handle,
        });
      }
      AnchorIoResult::Released { handle } => {
        debug!("Native handle {} released", handle);
      }
    }
  }
}

/// System: reconciles live anchors against the bridge, once per frame.
///
/// Skips the bridge round-trip entirely while no anchors are live. Tracking
/// state transitions broadcast [`AnchorTrackingChanged`] exactly once per
/// actual change; poses are copied into the `Transform` only while tracking.
pub(crate) fn synchronize_anchors(
  store: Option<Res<AnchorStore>>,
  mut anchors: Query<(&mut WorldAnchor, &mut Transform)>,
  mut tracking_changed: MessageWriter<AnchorTrackingChanged>,
) {
  let Some(store) = store else {
    return;
  };
  if store.registry.is_empty() {
    return;
  }

  for handle in store.bridge.live_handles() {
    let Some(entry) = store.registry.get(handle) else {
      continue;
    };
    let Ok((mut anchor, mut transform)) = anchors.get_mut(entry.entity) else {
      continue;
    };

    let state = store.bridge.tracking_state(handle);
    if anchor.set_tracking_state(state) {
      tracking_changed.write(AnchorTrackingChanged {
        entity: entry.entity,
        handle,
        state,
      });
    }

    if state == TrackingState::Tracking {
      let pose = store.bridge.anchor_pose(handle);
      transform.translation = pose.position;
      transform.rotation = pose.rotation;
    }
  }
}

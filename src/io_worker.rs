//! Background worker for blocking anchor I/O.
//!
//! Native payload saves and loads block, so they run on a dedicated worker
//! thread fed over `async-channel`. The worker only ever touches the bridge
//! and owned command data captured at dispatch time; results flow back
//! through a completion channel the store drains once per frame on the
//! owning thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_channel::{Receiver, Sender, TryRecvError};

use crate::bridge::{AnchorBridge, AnchorHandle};

/// Commands sent from the owning thread to the worker.
#[derive(Debug, Clone)]
pub(crate) enum AnchorIoCommand {
  /// Write an anchor's native payload to its payload path.
  Save {
    handle: AnchorHandle,
    identity: String,
    path: PathBuf,
  },
  /// Resolve a payload file back into a live handle.
  Load { identity: String, path: PathBuf },
  /// Release a native handle. Best effort.
  Release { handle: AnchorHandle },
  /// Stop the worker.
  Shutdown,
}

/// Completion results delivered back to the owning thread.
#[derive(Debug, Clone)]
pub(crate) enum AnchorIoResult {
  Saved {
    identity: String,
  },
  /// The payload write failed; the caller rolls back its index entry.
  SaveFailed {
    identity: String,
  },
  /// Load finished. A null handle means the payload did not relocalize.
  Loaded {
    identity: String,
    handle: AnchorHandle,
  },
  Released {
    handle: AnchorHandle,
  },
}

/// Owning-thread endpoint of the worker.
pub(crate) struct AnchorIoDispatcher {
  cmd_tx: Sender<AnchorIoCommand>,
  result_rx: Receiver<AnchorIoResult>,
  _worker: JoinHandle<()>,
}

impl AnchorIoDispatcher {
  /// Spawns the worker thread around a shared bridge.
  pub fn spawn(bridge: Arc<dyn AnchorBridge>) -> Self {
    let (cmd_tx, cmd_rx) = async_channel::unbounded::<AnchorIoCommand>();
    let (result_tx, result_rx) = async_channel::unbounded::<AnchorIoResult>();

    let worker = thread::spawn(move || {
      worker_loop(bridge, cmd_rx, result_tx);
    });

    Self {
      cmd_tx,
      result_rx,
      _worker: worker,
    }
  }

  /// Queues a command for the worker.
  pub fn send(&self, cmd: AnchorIoCommand) {
    let _ = self.cmd_tx.send_blocking(cmd);
  }

  /// Takes one completed result, if any. Never blocks.
  pub fn try_recv(&self) -> Option<AnchorIoResult> {
    match self.result_rx.try_recv() {
      Ok(result) => Some(result),
      Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
    }
  }

  /// Asks the worker to stop after the commands already queued.
  pub fn shutdown(&self) {
    let _ = self.cmd_tx.send_blocking(AnchorIoCommand::Shutdown);
  }
}

fn worker_loop(
  bridge: Arc<dyn AnchorBridge>,
  cmd_rx: Receiver<AnchorIoCommand>,
  result_tx: Sender<AnchorIoResult>,
) {
  while let Ok(cmd) = cmd_rx.recv_blocking() {
    let result = match cmd {
      AnchorIoCommand::Save {
        handle,
        identity,
        path,
      } => {
        if bridge.save_anchor(handle, &path) {
          AnchorIoResult::Saved { identity }
        } else {
          AnchorIoResult::SaveFailed { identity }
        }
      }
      AnchorIoCommand::Load { identity, path } => {
        let handle = bridge.load_anchor(&path);
        AnchorIoResult::Loaded { identity, handle }
      }
      AnchorIoCommand::Release { handle } => {
        bridge.destroy_anchor(handle);
        AnchorIoResult::Released { handle }
      }
      AnchorIoCommand::Shutdown => break,
    };

    if result_tx.send_blocking(result).is_err() {
      // Owning side dropped; nothing left to report to.
      break;
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tempfile::TempDir;

  use super::*;
  use crate::anchor::Pose;
  use crate::bridge::MockAnchorBridge;

  fn recv_with_timeout(dispatcher: &AnchorIoDispatcher) -> AnchorIoResult {
    for _ in 0..200 {
      if let Some(result) = dispatcher.try_recv() {
        return result;
      }
      thread::sleep(Duration::from_millis(5));
    }
    panic!("worker produced no result within timeout");
  }

  #[test]
  fn save_command_round_trips_through_worker() {
    let dir = TempDir::new().unwrap();
    let bridge = Arc::new(MockAnchorBridge::new());
    let handle = bridge.add_anchor(Pose::IDENTITY);

    let dispatcher = AnchorIoDispatcher::spawn(bridge.clone());
    dispatcher.send(AnchorIoCommand::Save {
      handle,
      identity: "u1".to_string(),
      path: dir.path().join("u1"),
    });

    match recv_with_timeout(&dispatcher) {
      AnchorIoResult::Saved { identity } => assert_eq!(identity, "u1"),
      other => panic!("unexpected result: {:?}", other),
    }
    assert!(dir.path().join("u1").exists());
    dispatcher.shutdown();
  }

  #[test]
  fn failed_load_reports_null_handle() {
    let dir = TempDir::new().unwrap();
    let bridge = Arc::new(MockAnchorBridge::new());
    let dispatcher = AnchorIoDispatcher::spawn(bridge);

    dispatcher.send(AnchorIoCommand::Load {
      identity: "ghost".to_string(),
      path: dir.path().join("ghost"),
    });

    match recv_with_timeout(&dispatcher) {
      AnchorIoResult::Loaded { identity, handle } => {
        assert_eq!(identity, "ghost");
        assert!(handle.is_null());
      }
      other => panic!("unexpected result: {:?}", other),
    }
    dispatcher.shutdown();
  }
}

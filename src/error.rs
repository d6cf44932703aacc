//! Error taxonomy for anchor store operations.

use std::fmt;
use std::io;

/// Failure of a store operation.
///
/// Stale index metadata is not represented here: it is resolved by silent
/// pruning (at load and on failed relocalization) and only logged.
#[derive(Debug)]
pub enum AnchorStoreError {
  /// The native bridge returned a null handle or rejected the call.
  NativeBridge(String),
  /// A structural invariant would be violated (duplicate save, double
  /// registration of a handle).
  Consistency(String),
  /// Reading or writing durable state failed.
  Io(io::Error),
}

impl fmt::Display for AnchorStoreError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NativeBridge(msg) => write!(f, "native bridge error: {}", msg),
      Self::Consistency(msg) => write!(f, "consistency error: {}", msg),
      Self::Io(e) => write!(f, "I/O error: {}", e),
    }
  }
}

impl std::error::Error for AnchorStoreError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for AnchorStoreError {
  fn from(err: io::Error) -> Self {
    Self::Io(err)
  }
}

//! Wire types shared by the UDS client crates.
//!
//! Nothing in here performs I/O. The REST envelope, data-set keys, push event
//! names and the Socket.IO text packet codec live here so that `uds-core`
//! and its tests agree on one definition of each.

mod envelope;
pub mod events;
mod keys;
pub mod socketio;
pub mod types;

pub use envelope::{ApiFailure, ApiResponse};
pub use keys::{DataSetKey, well_known};
pub use socketio::{EnginePacket, FrameError, OpenHandshake, SocketPacket};

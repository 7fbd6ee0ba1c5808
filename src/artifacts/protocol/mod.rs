//! Pack protocol
//!
//! The line-based exchange that precedes a pack on fetch and push. The pack
//! itself is written and read by the object database.

pub mod advertisement;
pub mod pkt_line;
pub mod refspec;
pub mod transport;

/// Capabilities announced by receive-pack.
pub const RECEIVE_CAPABILITIES: &[&str] = &["report-status", "delete-refs"];

//! Capture module - packet acquisition
//!
//! Provides the pluggable [`PacketSource`] abstraction and a live
//! implementation backed by pnet's datalink layer (AF_PACKET on Linux).

pub mod frame;
pub mod interface;
pub mod source;

pub use frame::RawFrame;
pub use interface::{print_interfaces, NetworkInterface};
pub use source::{CaptureStats, CaptureStatsSnapshot, PacketSource, PnetSource, SourcePoll};

//! Persistence Layer
//!
//! File-backed state that must survive restarts:
//! - Channel registry mapping stat roles to platform channels

pub mod registry;

pub use registry::{ChannelBinding, ChannelRegistry};

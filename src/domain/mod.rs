pub mod role;
pub mod snapshot;

pub use role::*;
pub use snapshot::*;

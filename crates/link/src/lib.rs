// Re-export modules for library use
pub mod codec;
pub mod link;
pub mod types;

// Re-export the main types that users need
pub use codec::{CommandSet, DriveAction, TurnDirection};
pub use link::{LinkHandle, VehicleLink};
pub use types::{LinkConfig, LinkError, LinkStatus};

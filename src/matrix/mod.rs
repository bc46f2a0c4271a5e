//! Matrix side of the bridge.
//!
//! ## Module Structure
//!
//! - `framework`: Callback contracts between the relay core and the framework
//! - `homeserver`: Framework implementation posting into a homeserver
//! - `sync`: Puppet `/sync` loop producing outbound commands

pub mod framework;
pub mod homeserver;
pub mod sync;

pub use framework::{BridgeFramework, ThirdPartyClient};
pub use homeserver::HomeserverBridge;
pub use sync::PuppetSync;

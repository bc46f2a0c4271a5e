//! Relay core between the Skype session and the bridge framework.
//!
//! ## Module Structure
//!
//! - `identity`: Reversible tokens for Skype identifiers
//! - `echo`: Pending self-sent image names
//! - `classifier`: Sorting raw events before relay
//! - `relay`: Skype -> Matrix pipeline
//! - `outbound`: Matrix -> Skype commands
//! - `puppet`: Session startup and framework callbacks
//! - `channels`: Communication channel structures

pub mod channels;
pub mod classifier;
pub mod directory;
pub mod echo;
pub mod identity;
pub mod markup;
pub mod outbound;
pub mod puppet;
pub mod relay;
pub mod session;
pub mod transfer;

pub use channels::ChannelBundle;
pub use puppet::{init_third_party_client, SkypePuppet};
pub use relay::Relay;

//! Skype messaging service client.
//!
//! ## Module Structure
//!
//! - `api`: The session interface used by the relay core
//! - `auth`: Account login
//! - `client`: HTTP implementation of the session
//! - `event`: Long-poll notification decoding

pub mod api;
pub mod auth;
pub mod client;
pub mod event;

pub use api::{ImageUpload, SkypeApi};
pub use client::SkypeClient;

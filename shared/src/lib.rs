//! Data model and wire helpers shared by the discovery daemon and its consumers.

pub mod address;
pub mod protocol;
pub mod types;

//! Utility modules shared by the client and the server.
//!
//! - [`datetime`] - Epoch-millisecond clock helpers and human-readable formatting
//! - [`color`] - Bucket color parsing and the named palette

pub mod color;
pub mod datetime;

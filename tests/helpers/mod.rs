//! Test helpers
//!
//! In-process stand-in for the audiobook backend.

pub mod backend;

pub use backend::{Backend, Received, UploadReply};

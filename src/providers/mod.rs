//! Mailbox and AI provider implementations.
//!
//! - [`email`] - Mailbox clients (Gmail API) and MIME body decoding
//! - [`ai`] - LLM backends and the inference client

pub mod ai;
pub mod email;

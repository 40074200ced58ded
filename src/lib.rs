//! mailsift - inbox sync, AI triage and unsubscribe automation
//!
//! This crate pulls new mail from a remote mailbox, classifies and
//! summarizes each message with a configurable inference backend, stores
//! the results and pushes them to connected subscribers. It also automates
//! unsubscribing from bulk senders.

pub mod config;
pub mod domain;
pub mod providers;
pub mod realtime;
pub mod services;
pub mod storage;

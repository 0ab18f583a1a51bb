//! live-narrator-rs: livestream chat narrator service.
//!
//! Connects to a livestream chat feed, classifies events into a bounded
//! in-memory log behind a polling JSON API, optionally asks a remote AI for
//! replies to comments, and speaks messages aloud.

pub mod ai;
pub mod api;
pub mod config;
pub mod event_log;
pub mod narrator;
pub mod reminder;
pub mod session;
pub mod source;
pub mod state;

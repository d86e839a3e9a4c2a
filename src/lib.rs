//! Live chat to spoken persona replies.
//!
//! The gateway connects to a YouTube live chat, filters spam, reads
//! admitted messages aloud through a VOICEVOX-compatible engine, and
//! answers trigger words with an LLM-generated persona reply, spoken in
//! the persona's voice.
//!
//! Flow per message:
//!
//! ```text
//! chat source ──▶ daemon ──▶ spam filter ──▶ pipeline
//!                                              │
//!                              reading (seq, 0)│reply (seq, 1)
//!                                              ▼
//!                                         audio queue ──▶ engine ──▶ speakers
//! ```
//!
//! The reading and the reply of one message share a reserved sequence
//! number, so playback order always follows chat order even when reply
//! generation is slow.

pub mod agent;
pub mod audio;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod retry;
pub mod spam;
pub mod text;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};

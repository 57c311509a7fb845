//! Streamflix desktop client library
//!
//! Catalog models and REST client, user-state sync, and link-resolving
//! playback. The egui shell in the binary drives these through plain
//! method calls and runs the effects they return.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ffmpeg_player;
pub mod launcher;
pub mod library;
pub mod models;
pub mod notice;
pub mod resolver;

pub use error::{Error, Result};
pub use notice::Notice;

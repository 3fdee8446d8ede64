// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SmartParse: stability-aware file describer and organizer
//!
//! Files dropped into a watched folder are held until their size stops
//! changing, described by a local model, renamed to
//! `<description>_<keyword>_<date>_<time>.<ext>` and moved into a category
//! folder. Anything that cannot be handled is marked `failed_` in place.

pub mod config;
pub mod describer;
pub mod dispatcher;
pub mod error;
pub mod failure;
pub mod handlers;
pub mod mover;
pub mod naming;
pub mod ollama;
pub mod oplog;
pub mod pipeline;
pub mod scheduler;
pub mod stability;
pub mod task;
pub mod watcher;

pub use config::AppConfig;
pub use error::{Result, SmartParseError};

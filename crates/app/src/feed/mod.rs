//! Live-frame feed: capture pipeline, in-memory frame slot, and the HTTP
//! server answering viewer polls.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `data`: the shared `EncodedFrame` and the atomic frame slot.
//! - `transform`: processing seam between capture and encode.
//! - `encoding`: JPEG encoding of raw frames.
//! - `pipeline`: capture loop, retry policy, and lifecycle state machine.
//! - `server`: Actix Web frame endpoints.
//! - `telemetry`: tracing and Prometheus metrics install.

/// Re-export feed settings so callers can configure runs without reaching
/// into submodules.
pub use config::{FeedCliArgs, FeedConfig};
/// Launch the feed with a ready-made configuration.
pub use pipeline::run;

mod config;
mod data;
mod encoding;
mod pipeline;
mod server;
mod telemetry;
mod transform;

//! # H2Dash Core Library
//!
//! Telemetry ingestion and gauge state for the hydrogen vehicle dashboard.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial channel access with permissive line decoding
//! - Classification of firmware text lines into metric updates
//! - A thread-safe store of the latest value per metric
//! - Gauge mapping: span fraction, gradient color, formatted label
//! - A fixed-interval poll loop tying it all together
//!
//! Rendering is left to the caller, which reads [`engine::Snapshot`]s and
//! listens for [`engine::EngineEvent`]s.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use h2dash_core::{config::EngineConfig, engine::Engine, poller::PollLoop};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(None)?;
//! let engine = Arc::new(Engine::from_config(&config)?);
//!
//! let handle = PollLoop::connect(Arc::clone(&engine), &config).spawn(config.poll_interval());
//! for gauge in engine.snapshot().gauges {
//!     println!("{}: {} {}", gauge.title, gauge.label, gauge.units);
//! }
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod demo;
pub mod engine;
pub mod gauge;
pub mod metric;
pub mod poller;
pub mod protocol;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::classifier::{LineClassifier, MetricUpdate};
    pub use crate::config::EngineConfig;
    pub use crate::demo::DemoSimulator;
    pub use crate::engine::{Engine, EngineEvent, Snapshot};
    pub use crate::gauge::{GaugeModel, GaugeReading, Gradient, GradientPreset, GradientSelector, Rgb};
    pub use crate::metric::Metric;
    pub use crate::poller::{PollHandle, PollLoop, PollState};
    pub use crate::protocol::{ChannelReader, ConnectionState, MemoryChannel};
    pub use crate::store::{MetricStore, MetricValues};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

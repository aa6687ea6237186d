//! # kc-core
//!
//! Core utilities, configuration, and error handling for the Kerberos
//! federation engine.
//!
//! This crate provides foundational types used across the other workspace
//! crates: engine configuration, the generic outward error, audit events
//! and tracing setup.
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - AU-2: Event logging framework
//! - SI-11: Error handling

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod telemetry;

pub use config::{EngineConfig, ProviderComponent};
pub use error::{Error, Result};
pub use event::{Event, EventListener, EventType, RecordingEventListener, TracingEventListener};

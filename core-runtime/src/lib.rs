//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other modules depend on.
//! It establishes the logging conventions and event broadcasting mechanism
//! used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};

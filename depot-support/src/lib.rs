//! # Depot Support
//!
//! Shared utilities for the Depot service container.
//!
//! This crate provides:
//! - Text rendering for error messages and log lines
//! - "Did you mean?" suggestions for unknown service keys

pub mod rendering;

//! # Khazina Support
//!
//! Shared utilities for the Khazina DI framework.
//!
//! This crate provides:
//! - Text rendering for error messages
//! - "Did you mean?" suggestions for unknown service ids

pub mod rendering;

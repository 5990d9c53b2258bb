//! Derive macros for Khazina.
//!
//! ```rust,ignore
//! use khazina::prelude::*;
//!
//! #[derive(Injectable)]
//! struct Clock;
//! ```

pub use khazina_macros::Injectable;

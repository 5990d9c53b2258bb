//! # Khazina: dependency injection container for Rust
//!
//! Register services once, then either resolve them lazily with a
//! [`Container`] or compile them ahead of time with a
//! [`ContainerBuilder`] into a [`SealedContainer`].
//!
//! ```rust
//! use khazina::prelude::*;
//! use serde_json::json;
//!
//! let mut container = Container::new();
//! container.set("greeting", json!("hello")).unwrap();
//! assert!(container.has("greeting"));
//! ```

pub use khazina_container::*;
pub use khazina_derive::*;
pub use khazina_support::*;

/// Everything needed to register and resolve services, derive included.
pub mod prelude {
    pub use khazina_container::prelude::*;
    pub use khazina_derive::Injectable;
}

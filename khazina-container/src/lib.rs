//! Core container implementation for Khazina DI.
//!
//! Two containers share one registration surface and one resolver:
//! - [`Container`] builds services lazily at runtime
//! - [`ContainerBuilder`] compiles the same definitions into a
//!   [`SealedContainer`] with no lookups by name left at runtime

pub mod builder;
pub mod cache;
pub mod container;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod expr;
pub mod facade;
mod graph;
pub mod key;
pub mod printer;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod sealed;
pub mod value;

pub use builder::{CompileOptions, ContainerBuilder};
pub use cache::ServiceCache;
pub use container::{Container, InvalidBehavior};
pub use definition::{Argument, Definition, Statement, Target};
pub use descriptor::{ClassEntry, Factory, Injectable, Parameter, TypeCatalog, TypeDescriptor};
pub use error::{KhazinaError, Result};
pub use expr::{Compiled, CompiledUnit};
pub use key::LookupKey;
pub use sealed::SealedContainer;
pub use value::{Arguments, Resolved, Service};

/// Everything needed to register and resolve services.
pub mod prelude {
    pub use crate::builder::{CompileOptions, ContainerBuilder};
    pub use crate::container::{Container, InvalidBehavior};
    pub use crate::definition::{Argument, Definition, Statement, Target};
    pub use crate::descriptor::{Factory, Injectable, Parameter, TypeCatalog, TypeDescriptor};
    pub use crate::error::{KhazinaError, Result};
    pub use crate::provider::{ProviderRegistry, ServiceProvider};
    pub use crate::sealed::SealedContainer;
    pub use crate::value::{Arguments, Resolved, Service};
}

/// Used by `#[derive(Injectable)]` expansions.
#[doc(hidden)]
pub mod __private {
    pub use inventory;
    pub use serde_json;
}

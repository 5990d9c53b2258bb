//! Build resources: what a compiled container was generated from.
//!
//! The builder only tracks them so callers can decide when a compiled
//! container is stale. Resources are opaque and keyed by their display
//! string, so adding the same file twice keeps one entry.

use std::fmt;
use std::path::{Path, PathBuf};

/// An input the compiled output depends on.
pub trait Resource: fmt::Display + fmt::Debug + Send + Sync + 'static {}

/// A configuration or source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for FileResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl Resource for FileResource {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_resource_displays_path() {
        let resource = FileResource::new("config/services.json");
        assert_eq!(resource.to_string(), "config/services.json");
        assert_eq!(resource.path(), Path::new("config/services.json"));
    }
}

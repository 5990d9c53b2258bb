//! Reference graph validation.
//!
//! While compiling, every service accessor records the ids its body
//! refers to. Before the unit is assembled the graph is checked:
//! - every referenced id has an accessor
//! - no id reaches itself
//!
//! The runtime container detects cycles lazily on `get`; a compiled
//! container never builds anything during compilation, so it has to
//! find them here instead.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, instrument, warn};

use crate::error::{CircularReferenceError, KhazinaError, NotFoundError, Result};

/// Validates the reference graph of a compiled unit.
///
/// # Algorithm
/// Depth-first search keeping the current path, so a cycle is reported
/// as the exact chain that closes it.
pub(crate) struct GraphValidator<'a> {
    /// id => ids referenced by its accessor
    edges: &'a IndexMap<String, Vec<String>>,
    /// Currently on the DFS path
    visiting: HashSet<&'a str>,
    /// Already validated
    validated: HashSet<&'a str>,
    /// Current DFS path (for error reporting)
    path: Vec<&'a str>,
}

impl<'a> GraphValidator<'a> {
    pub fn new(edges: &'a IndexMap<String, Vec<String>>) -> Self {
        Self {
            edges,
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// Validates the whole graph, visiting ids in map order.
    ///
    /// # Errors
    /// - [`KhazinaError::CircularReference`] when an id reaches itself
    /// - [`KhazinaError::NotFound`] for a reference to an id without accessor
    #[instrument(skip(self), name = "graph_validation")]
    pub fn validate(&mut self) -> Result<()> {
        debug!(services = self.edges.len(), "Starting reference graph validation");

        let edges = self.edges;
        for id in edges.keys() {
            self.visit(id)?;
        }

        debug!("Reference graph validation passed");
        Ok(())
    }

    fn visit(&mut self, id: &'a str) -> Result<()> {
        if self.validated.contains(id) {
            return Ok(());
        }

        if self.visiting.contains(id) {
            let start = self.path.iter().position(|entry| *entry == id).unwrap_or(0);
            let mut chain: Vec<String> = self.path[start..].iter().map(|s| s.to_string()).collect();
            chain.push(id.to_string());

            warn!(cycle = ?chain, "Circular reference detected");
            return Err(KhazinaError::CircularReference(CircularReferenceError { chain }));
        }

        let edges = self.edges;
        let Some(references) = edges.get(id) else {
            return Err(KhazinaError::NotFound(NotFoundError {
                requested: id.to_string(),
                required_by: self.path.last().map(|s| s.to_string()),
                suggestion: None,
                private: false,
            }));
        };

        self.visiting.insert(id);
        self.path.push(id);

        for reference in references {
            self.visit(reference)?;
        }

        self.path.pop();
        self.visiting.remove(id);
        self.validated.insert(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: Vec<(&str, Vec<&str>)>) -> IndexMap<String, Vec<String>> {
        edges
            .into_iter()
            .map(|(id, refs)| (id.to_string(), refs.into_iter().map(str::to_string).collect()))
            .collect()
    }

    #[test]
    fn valid_simple_graph() {
        let edges = graph(vec![("db", vec![]), ("repo", vec!["db"]), ("users", vec!["repo"])]);
        assert!(GraphValidator::new(&edges).validate().is_ok());
    }

    #[test]
    fn detect_circular_reference() {
        // a → b → c → a
        let edges = graph(vec![("a", vec!["b"]), ("b", vec!["c"]), ("c", vec!["a"])]);
        match GraphValidator::new(&edges).validate().unwrap_err() {
            KhazinaError::CircularReference(err) => assert_eq!(err.chain, ["a", "b", "c", "a"]),
            other => panic!("Expected CircularReference, got: {other:?}"),
        }
    }

    #[test]
    fn detect_self_reference() {
        let edges = graph(vec![("a", vec!["a"])]);
        assert!(GraphValidator::new(&edges).validate().is_err());
    }

    #[test]
    fn detect_missing_reference() {
        let edges = graph(vec![("a", vec!["b"])]);
        match GraphValidator::new(&edges).validate().unwrap_err() {
            KhazinaError::NotFound(err) => {
                assert_eq!(err.requested, "b");
                assert_eq!(err.required_by.as_deref(), Some("a"));
            }
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        //     a
        //    / \
        //   b   c
        //    \ /
        //     d
        let edges = graph(vec![("a", vec!["b", "c"]), ("b", vec!["d"]), ("c", vec!["d"]), ("d", vec![])]);
        assert!(GraphValidator::new(&edges).validate().is_ok());
    }
}

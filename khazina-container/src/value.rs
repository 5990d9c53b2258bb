//! Runtime values flowing through the resolver.
//!
//! A [`Service`] is the type-erased, shareable form every container hands
//! out. While a graph is being built, the resolver works with
//! [`Resolved`], which keeps literal values apart from live services so
//! constructors can read scalars without a downcast.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{KhazinaError, Result};

/// A built service, shared by reference.
///
/// Identity is pointer identity: two `get` calls for a shared id return
/// `Arc`s for which [`Arc::ptr_eq`] holds.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Signature of a compiled accessor or factory body.
pub type ServiceResult = Result<Service>;

/// One resolved argument or service value.
#[derive(Clone)]
pub enum Resolved {
    /// A literal folded from configuration.
    Value(Value),
    /// A live service.
    Service(Service),
    /// An ordered sequence, e.g. every implementer of a type.
    List(Vec<Resolved>),
}

impl Resolved {
    /// The `null` literal.
    #[inline]
    pub fn null() -> Self {
        Self::Value(Value::Null)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }

    /// Converts into a cacheable service.
    ///
    /// Literals become `Arc<Value>`, lists become `Arc<Vec<Service>>`.
    pub fn into_service(self) -> Service {
        match self {
            Self::Value(value) => Arc::new(value),
            Self::Service(service) => service,
            Self::List(items) => Arc::new(
                items
                    .into_iter()
                    .map(Resolved::into_service)
                    .collect::<Vec<Service>>(),
            ),
        }
    }

    /// Reads this value as a literal, looking through `Arc<Value>` services.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Service(service) => service.downcast_ref::<Value>(),
            Self::List(_) => None,
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Service> for Resolved {
    fn from(service: Service) -> Self {
        Self::Service(service)
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "Value({value})"),
            Self::Service(service) => match service.downcast_ref::<Value>() {
                Some(value) => write!(f, "Service({value})"),
                None => write!(f, "Service(..)"),
            },
            Self::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

/// Downcasts a service to its concrete type.
///
/// # Errors
/// [`KhazinaError::ConstructionFailed`] when the service holds another type.
pub fn downcast<T: Any + Send + Sync>(id: &str, service: Service) -> Result<Arc<T>> {
    service.downcast::<T>().map_err(|_| {
        KhazinaError::construction(id, format!("Type mismatch: expected {}", type_name::<T>()))
    })
}

/// Named arguments bound for one constructor or factory call.
///
/// Produced by the resolver in parameter order. Accessors remove the
/// argument they read, so each parameter is consumed once.
///
/// ```
/// use khazina_container::value::{Arguments, Resolved};
/// use serde_json::json;
///
/// let mut args = Arguments::new("app::Server", vec![
///     ("port".to_string(), Resolved::Value(json!(8080))),
/// ]);
/// let port: u16 = args.value("port").unwrap();
/// assert_eq!(port, 8080);
/// ```
pub struct Arguments {
    owner: String,
    entries: Vec<(String, Resolved)>,
}

impl Arguments {
    pub fn new(owner: impl Into<String>, entries: Vec<(String, Resolved)>) -> Self {
        Self {
            owner: owner.into(),
            entries,
        }
    }

    /// Class or factory these arguments were bound for.
    #[inline]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrows a raw argument without consuming it.
    pub fn get(&self, name: &str) -> Option<&Resolved> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Removes and returns a raw argument.
    pub fn take(&mut self, name: &str) -> Result<Resolved> {
        let position = self
            .entries
            .iter()
            .position(|(key, _)| key == name)
            .ok_or_else(|| self.missing(name))?;
        Ok(self.entries.remove(position).1)
    }

    /// Reads a service argument as `Arc<T>`.
    pub fn service<T: Any + Send + Sync>(&mut self, name: &str) -> Result<Arc<T>> {
        match self.take(name)? {
            Resolved::Service(service) => downcast(&self.argument_id(name), service),
            other => Err(self.mismatch::<T>(name, &other)),
        }
    }

    /// Reads a nullable service argument; `null` yields `None`.
    pub fn optional_service<T: Any + Send + Sync>(&mut self, name: &str) -> Result<Option<Arc<T>>> {
        match self.take(name)? {
            Resolved::Service(service) => downcast(&self.argument_id(name), service).map(Some),
            other if other.is_null() => Ok(None),
            other => Err(self.mismatch::<T>(name, &other)),
        }
    }

    /// Reads a collection argument (every implementer of a type).
    pub fn services<T: Any + Send + Sync>(&mut self, name: &str) -> Result<Vec<Arc<T>>> {
        let id = self.argument_id(name);
        match self.take(name)? {
            Resolved::List(items) => items
                .into_iter()
                .map(|item| downcast(&id, item.into_service()))
                .collect(),
            Resolved::Service(service) => match service.downcast::<Vec<Service>>() {
                Ok(list) => list.iter().cloned().map(|s| downcast(&id, s)).collect(),
                Err(single) => downcast(&id, single).map(|s| vec![s]),
            },
            other if other.is_null() => Ok(Vec::new()),
            other => Err(self.mismatch::<T>(name, &other)),
        }
    }

    /// Deserializes a literal argument into `T`.
    pub fn value<T: DeserializeOwned>(&mut self, name: &str) -> Result<T> {
        let resolved = self.take(name)?;
        let value = resolved
            .as_value()
            .cloned()
            .ok_or_else(|| self.mismatch::<T>(name, &resolved))?;

        serde_json::from_value(value).map_err(|err| KhazinaError::ConstructionFailed {
            id: self.argument_id(name),
            source: Box::new(err),
        })
    }

    fn argument_id(&self, name: &str) -> String {
        format!("{}::${name}", self.owner)
    }

    fn missing(&self, name: &str) -> KhazinaError {
        KhazinaError::construction(
            self.argument_id(name),
            "argument was not bound by the resolver",
        )
    }

    fn mismatch<T>(&self, name: &str, got: &Resolved) -> KhazinaError {
        KhazinaError::construction(
            self.argument_id(name),
            format!("Type mismatch: expected {}, got {got:?}", type_name::<T>()),
        )
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner)
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Mailer;

    fn args(entries: Vec<(&str, Resolved)>) -> Arguments {
        Arguments::new(
            "tests::Owner",
            entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        )
    }

    #[test]
    fn literal_into_service_is_value() {
        let service = Resolved::Value(json!("hello")).into_service();
        assert_eq!(service.downcast_ref::<Value>(), Some(&json!("hello")));
    }

    #[test]
    fn list_into_service_is_vec() {
        let service = Resolved::List(vec![Resolved::Value(json!(1))]).into_service();
        let list = service.downcast::<Vec<Service>>().unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn service_argument_downcasts() {
        let mailer: Service = Arc::new(Mailer);
        let mut args = args(vec![("mailer", Resolved::Service(mailer.clone()))]);
        let got = args.service::<Mailer>("mailer").unwrap();
        assert!(Arc::ptr_eq(&(got as Service), &mailer));
        assert!(args.is_empty());
    }

    #[test]
    fn service_argument_wrong_type() {
        let mut args = args(vec![("mailer", Resolved::Service(Arc::new(1u8)))]);
        let err = args.service::<Mailer>("mailer").unwrap_err();
        assert!(format!("{err}").contains("Type mismatch"));
    }

    #[test]
    fn optional_service_null() {
        let mut args = args(vec![("mailer", Resolved::null())]);
        assert!(args.optional_service::<Mailer>("mailer").unwrap().is_none());
    }

    #[test]
    fn services_from_list() {
        let mut args = args(vec![(
            "plugins",
            Resolved::List(vec![
                Resolved::Service(Arc::new(Mailer)),
                Resolved::Service(Arc::new(Mailer)),
            ]),
        )]);
        assert_eq!(args.services::<Mailer>("plugins").unwrap().len(), 2);
    }

    #[test]
    fn value_reads_through_literal_service() {
        let literal: Service = Arc::new(json!({"host": "localhost"}));
        let mut args = args(vec![("config", Resolved::Service(literal))]);
        let config: std::collections::HashMap<String, String> = args.value("config").unwrap();
        assert_eq!(config["host"], "localhost");
    }

    #[test]
    fn missing_argument_fails() {
        let mut args = args(vec![]);
        assert!(args.take("nope").is_err());
    }
}

use std::any::type_name;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use khazina::prelude::*;
use serde_json::json;

trait Notifier: Send + Sync {}

#[derive(Injectable)]
struct Logger {
    #[inject(default = "info")]
    level: String,
}

#[derive(Injectable)]
struct Transport;

#[derive(Injectable)]
#[injectable(implements = "dyn Notifier")]
struct Mailer {
    logger: Arc<Logger>,
    transport: Option<Arc<Transport>>,
    #[inject(id = "mail.sender")]
    sender: String,
    #[inject(default = 25)]
    port: u16,
    #[inject(skip)]
    sent: AtomicUsize,
}

impl Notifier for Mailer {}

#[derive(Injectable)]
struct Handler {
    name: String,
}

#[derive(Injectable)]
struct Dispatcher {
    handlers: Vec<Arc<Handler>>,
    retries: Option<u8>,
}

fn container() -> Container {
    let mut c = Container::with_catalog(TypeCatalog::new());
    c.set("logger", Definition::of::<Logger>().typed()).unwrap();
    c.set("mail.sender", json!("ops@example.com")).unwrap();
    c
}

#[test]
fn derived_fields_are_autowired() {
    let mut c = container();
    c.set("mailer", Definition::of::<Mailer>()).unwrap();

    let mailer = c.get_as::<Mailer>("mailer").unwrap();
    let logger = c.get_as::<Logger>("logger").unwrap();

    assert!(Arc::ptr_eq(&mailer.logger, &logger));
    assert_eq!(logger.level, "info");
    assert!(mailer.transport.is_none());
    assert_eq!(mailer.sender, "ops@example.com");
    assert_eq!(mailer.port, 25);
    assert_eq!(mailer.sent.load(Ordering::SeqCst), 0);
}

#[test]
fn explicit_arguments_win_over_defaults() {
    let mut c = container();
    c.set("mailer", Definition::of::<Mailer>().named("port", json!(2525))).unwrap();

    assert_eq!(c.get_as::<Mailer>("mailer").unwrap().port, 2525);
}

#[test]
fn optional_service_is_filled_when_available() {
    let mut c = container();
    c.set("transport", Definition::of::<Transport>().typed()).unwrap();
    c.set("mailer", Definition::of::<Mailer>()).unwrap();

    let mailer = c.get_as::<Mailer>("mailer").unwrap();
    let transport = c.get_as::<Transport>("transport").unwrap();
    assert!(Arc::ptr_eq(mailer.transport.as_ref().unwrap(), &transport));
}

#[test]
fn implemented_types_are_indexed() {
    let mut c = container();
    c.set("mailer", Definition::of::<Mailer>().typed()).unwrap();

    let by_trait = c.get(type_name::<dyn Notifier>()).unwrap();
    assert!(Arc::ptr_eq(&by_trait, &c.get("mailer").unwrap()));
}

#[test]
fn collections_follow_registration_order() {
    let mut c = Container::with_catalog(TypeCatalog::new());
    c.set("smtp", Definition::of::<Handler>().typed().named("name", json!("smtp"))).unwrap();
    c.set("sms", Definition::of::<Handler>().typed().named("name", json!("sms"))).unwrap();
    c.set("dispatcher", Definition::of::<Dispatcher>()).unwrap();

    let dispatcher = c.get_as::<Dispatcher>("dispatcher").unwrap();
    let names: Vec<&str> = dispatcher.handlers.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, ["smtp", "sms"]);
    assert_eq!(dispatcher.retries, None);
}

#[test]
fn missing_required_value_is_unresolvable() {
    let mut c = Container::with_catalog(TypeCatalog::new());
    c.set("handler", Definition::of::<Handler>()).unwrap();

    match c.get("handler").unwrap_err() {
        KhazinaError::Unresolvable(e) => assert_eq!(e.parameter, "name"),
        other => panic!("Expected Unresolvable, got: {other:?}"),
    }
}

#[test]
fn derived_classes_are_discovered() {
    let catalog = TypeCatalog::discover();
    assert!(catalog.class(type_name::<Transport>()).is_some());

    let descriptor = catalog.class(type_name::<Mailer>()).unwrap().descriptor();
    let names: Vec<&str> = descriptor.parameters().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["logger", "transport", "sender", "port"]);
    assert!(descriptor.types().contains(&type_name::<dyn Notifier>().to_string()));
}

#[test]
fn discovered_class_is_autowired_by_type_name() {
    let c = Container::with_catalog(TypeCatalog::discover());
    let name = type_name::<Transport>();

    let first = c.get(name).unwrap();
    assert!(first.downcast_ref::<Transport>().is_some());
    assert!(Arc::ptr_eq(&first, &c.get(name).unwrap()));
}

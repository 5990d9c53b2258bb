use std::sync::Arc;

use khazina::facade::FacadeProxy;
use khazina::printer::GENERATED_HEADER;
use khazina::resource::FileResource;
use khazina::prelude::*;
use serde_json::json;

#[derive(Injectable)]
struct Logger {
    #[inject(default = "info")]
    level: String,
}

#[derive(Injectable)]
struct Mailer {
    logger: Arc<Logger>,
    #[inject(id = "mail.sender")]
    sender: String,
}

fn port(args: &mut Arguments) -> Result<Resolved> {
    let base: u16 = args.value("base")?;
    Ok(Resolved::Value(json!(base + 1)))
}

fn builder() -> ContainerBuilder {
    let mut builder = ContainerBuilder::with_catalog(TypeCatalog::new());
    builder.set("logger", Definition::of::<Logger>().typed().private()).unwrap();
    builder.set("mail.sender", json!("ops@example.com")).unwrap();
    builder.set("mailer", Definition::of::<Mailer>()).unwrap();
    builder
        .set(
            "mail.port",
            Factory::from_fn("crate::port", port).parameter(Parameter::value("base").with_default(2524)),
        )
        .unwrap();
    builder.alias("mail", "mailer").unwrap();
    builder.tag(["mailer"], json!({"notifier": {"channel": "email"}}));
    builder
}

#[test]
fn compiles_to_rust_source() {
    let mut builder = builder();
    builder.add_resource(FileResource::new("config/mail.json"));

    let compiled = builder
        .compile(&CompileOptions {
            container_class: "MailContainer".to_string(),
            ..Default::default()
        })
        .unwrap();
    let source = compiled.source().unwrap();
    let flat = source.replace(' ', "");

    assert!(source.starts_with(GENERATED_HEADER));
    assert!(flat.contains("pubstructMailContainer"));
    assert!(flat.contains("fnget_mailer(container:&::khazina::SealedContainer)"));
    assert!(flat.contains("fnget_mail_port("));
    assert!(flat.contains("crate::port"));
    assert!(flat.contains("config/mail.json"));
    assert!(flat.contains(".alias(\"mail\",\"mailer\")"));
}

#[test]
fn unit_loads_into_a_sealed_container() {
    let mut catalog = TypeCatalog::new();
    catalog.register::<Logger>().register::<Mailer>();
    catalog.add_function(Factory::from_fn("crate::port", port)).unwrap();

    let unit = builder()
        .compile(&CompileOptions {
            print_to_string: false,
            ..Default::default()
        })
        .unwrap()
        .into_unit()
        .unwrap();
    let sealed = SealedContainer::load(&unit, catalog).unwrap();

    let mailer = sealed.get_as::<Mailer>("mail").unwrap();
    assert_eq!(mailer.sender, "ops@example.com");
    assert_eq!(mailer.logger.level, "info");
    assert!(Arc::ptr_eq(&mailer, &sealed.get_as::<Mailer>("mailer").unwrap()));
    assert_eq!(sealed.get("mail.port").unwrap().downcast_ref::<serde_json::Value>(), Some(&json!(2525)));

    assert!(sealed.has("mailer"));
    assert!(!sealed.has("logger"));
    assert_eq!(sealed.tagged("notifier"), [("mailer".to_string(), json!({"channel": "email"}))]);
}

#[test]
fn anonymous_factories_cannot_be_compiled() {
    let mut builder = ContainerBuilder::with_catalog(TypeCatalog::new());
    builder
        .set("clock", Factory::new("clock", |_| Ok(Resolved::Value(json!(0)))))
        .unwrap();

    assert!(matches!(
        builder.compile(&CompileOptions::default()),
        Err(KhazinaError::Misconfiguration(_))
    ));
}

#[test]
fn facade_lists_public_services() {
    let source = FacadeProxy::new("Mail").generate(&builder()).unwrap();
    let flat = source.replace(' ', "");

    assert!(flat.contains("pubstructMail;"));
    assert!(flat.contains("pubfnmailer(container:&::khazina::SealedContainer)"));
    assert!(flat.contains("pubfnmail_sender("));
    assert!(!flat.contains("logger"));
}

//! Registers a small service graph, resolves it at runtime, then compiles
//! the same graph and runs it through a sealed container.
//!
//! ```sh
//! RUST_LOG=khazina_container=debug cargo run --example compile
//! ```

use std::sync::Arc;

use khazina::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

// === Services ===

#[derive(Injectable)]
struct ConsoleLogger {
    #[inject(default = "info")]
    level: String,
}

impl ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[{}] {msg}", self.level.to_uppercase());
    }
}

#[derive(Injectable)]
struct Database {
    #[inject(id = "database.url")]
    url: String,
    logger: Arc<ConsoleLogger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

#[derive(Injectable)]
struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

fn register<R: ProviderRegistry + ?Sized>(registry: &mut R) -> Result<()> {
    registry.set("database.url", Definition::value("postgres://localhost/myapp"))?;
    registry.set(
        "logger",
        Definition::of::<ConsoleLogger>()
            .typed()
            .private()
            .named("level", json!("debug")),
    )?;
    registry.set("database", Definition::of::<Database>().typed())?;
    registry.set("users", Definition::of::<UserRepository>())?;
    registry.alias("repository", "users")?;
    Ok(())
}

fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog
        .register::<ConsoleLogger>()
        .register::<Database>()
        .register::<UserRepository>();
    catalog
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("khazina_container=info")))
        .init();

    // Runtime container: built on first get
    let mut container = Container::with_catalog(catalog());
    register(&mut container)?;

    let users = container.get_as::<UserRepository>("repository")?;
    println!("{}", users.find_user(42));
    println!("Initialized: {:?}", container.keys().iter().filter(|id| container.initialized(id)).collect::<Vec<_>>());

    // Compiled container: same definitions, no lookups by name
    let mut builder = ContainerBuilder::with_catalog(catalog());
    register(&mut builder)?;

    let source = builder.compile(&CompileOptions {
        container_class: "AppContainer".to_string(),
        ..Default::default()
    })?;
    if let Some(source) = source.source() {
        println!("\n{source}");
    }

    let unit = builder.compile_unit(&CompileOptions::default())?;
    let sealed = SealedContainer::load(&unit, catalog())?;
    let users = sealed.get_as::<UserRepository>("repository")?;
    println!("{}", users.find_user(7));

    Ok(())
}

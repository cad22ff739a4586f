//! Wiring an application from service providers.
//!
//! Run with `RUST_LOG=bindery_container=debug cargo run --example application`.

use std::sync::Arc;

use bindery::prelude::*;
use bindery::Application;
use tracing_subscriber::EnvFilter;

// === Services ===

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger {
    prefix: String,
}

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[{}] {msg}", self.prefix);
    }
}

struct Config {
    app_name: String,
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

struct UserService {
    db: Arc<Database>,
}

impl UserService {
    fn find_user(&self, id: u64) -> String {
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

// === Providers ===

struct ConfigProvider;

impl ServiceProvider for ConfigProvider {
    fn register(&self, container: &Container) -> Result<()> {
        container.instance(
            "config",
            Config {
                app_name: "bindery-demo".to_string(),
                database_url: "postgres://localhost/demo".to_string(),
            },
        )?;
        container.alias("config", "configuration")
    }
}

struct LoggingProvider;

impl ServiceProvider for LoggingProvider {
    fn register(&self, container: &Container) -> Result<()> {
        container.singleton("logger", |r| {
            let config: Arc<Config> = r.resolve("config")?;
            Ok(Arc::new(ConsoleLogger {
                prefix: config.app_name.clone(),
            }) as Arc<dyn Logger>)
        })?;
        // The database gets its own prefix.
        container.when("db").needs("logger").give(|_| {
            Ok(Arc::new(ConsoleLogger {
                prefix: "sql".to_string(),
            }) as Arc<dyn Logger>)
        });
        Ok(())
    }
}

/// Only loaded once something asks for "db" or "users".
struct DatabaseProvider;

impl ServiceProvider for DatabaseProvider {
    fn register(&self, container: &Container) -> Result<()> {
        container.singleton("db", |r| {
            let config: Arc<Config> = r.resolve("configuration")?;
            Ok(Database {
                url: config.database_url.clone(),
                logger: r.resolve_cloned::<Arc<dyn Logger>>("logger")?,
            })
        })?;
        container.bind("users", |r| Ok(UserService { db: r.resolve("db")? }))
    }

    fn boot(&self, container: &Container) -> Result<()> {
        let logger = container.resolve_cloned::<Arc<dyn Logger>>("logger")?;
        logger.log("database provider booted");
        Ok(())
    }

    fn provides(&self) -> Vec<AbstractKey> {
        vec!["db".into(), "users".into()]
    }

    fn is_deferred(&self) -> bool {
        true
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bindery_container=info")))
        .init();

    let app = Application::new();
    app.register(ConfigProvider)?;
    app.register(LoggingProvider)?;
    app.register(DatabaseProvider)?;

    app.after_resolving(|key, value| {
        tracing::debug!(key = %key, value = ?value, "Built");
    });

    app.run(|app| {
        let logger = app.resolve_cloned::<Arc<dyn Logger>>("logger")?;
        logger.log(&format!("{} providers loaded", app.providers().len()));

        let users: Arc<UserService> = app.resolve("users")?;
        println!("{}", users.find_user(42));

        println!("{:#?}", app.snapshot());
        Ok(())
    })
}

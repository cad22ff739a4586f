//! # bindery — a Laravel-style service container for Rust
//!
//! Services are bound under string keys with explicit factories, grouped
//! into service providers, and resolved on demand from any thread.
//!
//! ```rust
//! use bindery::prelude::*;
//!
//! let container = Container::new();
//! container.instance("config.url", String::from("postgres://localhost")).unwrap();
//! container.singleton("db", |r| {
//!     let url: Arc<String> = r.resolve("config.url")?;
//!     Ok(format!("pool({url})"))
//! }).unwrap();
//! container.alias("db", "database").unwrap();
//!
//! let db: Arc<String> = container.resolve("database").unwrap();
//! assert_eq!(db.as_str(), "pool(postgres://localhost)");
//! ```

pub mod application;

pub use application::Application;
pub use bindery_container::*;
pub use bindery_support::*;

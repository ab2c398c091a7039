//! # connector-host
//!
//! A resilient host for uniform identity/integration connectors: a
//! registry of `(type, version)`-keyed connector implementations, a
//! circuit-breaker-and-cache facade in front of every running instance,
//! an external loader that materializes instances from manifest files,
//! and a remote session manager that exposes the whole thing over an
//! OAuth-authenticated outbound WebSocket session (plus a thin,
//! JWT-authenticated HTTP binding for direct calls).
//!
//! ## Example
//!
//! ```rust,no_run
//! use connector_host::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let registry = Registry::new();
//!     load_connectors(&registry, &config.loader).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod facade;
pub mod filter;
pub mod health;
pub mod loader;
pub mod middleware;
pub mod model;
pub mod observability;
pub mod registry;
pub mod server;
pub mod session;
pub mod http;

pub use loader::load_connectors;

/// Common imports for binaries built on top of this crate.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::connector::{ConnectorFactory, ConnectorImpl, FactoryArgs, SearchMode};
    pub use crate::error::{Error, Result};
    pub use crate::facade::Facade;
    pub use crate::loader::load_connectors;
    pub use crate::model::*;
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::registry::Registry;
    pub use crate::server::Server;
}

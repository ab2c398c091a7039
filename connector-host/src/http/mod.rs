//! Thin HTTP front end: liveness plus one generic operation route.
//! Deliberately minimal -- no pagination helpers, no OpenAPI generation,
//! no per-operation route. Both transports share `session::dispatch`.

pub mod handlers;

pub use handlers::router;

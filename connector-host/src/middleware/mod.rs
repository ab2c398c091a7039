//! HTTP front-end middleware.

pub mod jwt;

pub use jwt::{Claims, JwtAuth};

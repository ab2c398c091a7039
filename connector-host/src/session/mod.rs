//! Remote Session Manager: an outbound, OAuth-authenticated WebSocket
//! connection that exposes every registered connector instance to a
//! central orchestrator, plus the frame shapes and dispatch logic the
//! thin HTTP front end reuses.

pub mod client;
pub mod dispatch;
pub mod frames;
pub mod token;

pub use client::SessionClient;
pub use dispatch::dispatch;
pub use frames::{InboundFrame, OutboundFrame};
pub use token::TokenProvider;

//! # vault-gateway
//!
//! HTTP surface of npuvault. Handlers validate requests at the boundary and
//! then call into the safety controller, the model registry and the
//! inference queue; no core logic lives here.
//!
//! Every route is served both at the root and under `/api`.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::{GatewayError, Result};
pub use server::{AppState, GatewayServer, GatewayStats};

//! harmony-gateway — HTTP front door for the fallback handler
//!
//! Exposes the request handler over HTTP: a plain JSON endpoint, a Lambda
//! proxy-event endpoint, and a status endpoint.

pub mod server;

pub use server::GatewayServer;

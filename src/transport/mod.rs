//! Transport adapters.

pub mod ws;

pub use ws::{WsTransport, WsTransportFactory};

//! Wire protocol for the realtime conversational-AI endpoint.
//!
//! JSON envelopes over a persistent duplex WebSocket, discriminated by a
//! `type` field. [`messages`] defines the typed client and server events,
//! [`router`] turns raw inbound text into typed events without ever letting a
//! bad payload take the session down.

pub mod messages;
pub mod router;

pub use messages::{ClientEvent, ServerEvent};
pub use router::parse_server_event;

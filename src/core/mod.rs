//! Synchronous session core.
//!
//! Everything in here runs on the host tick thread. Foreign contexts (the
//! transport reader, token and vision futures) only ever touch the core
//! through [`serializer::ActionQueue`] or the lock-protected
//! [`queue::SampleQueue`].

pub mod audio;
pub mod capture;
pub mod playback;
pub mod queue;
pub mod responses;
pub mod serializer;
pub mod session;
pub mod vision;

pub use queue::SampleQueue;
pub use serializer::ActionQueue;
pub use session::{Session, SessionPorts, SessionState};

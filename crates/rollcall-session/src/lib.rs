//! rollcall-session — The streaming/tracking subsystem.
//!
//! Owns the persistent connection to the recognition service, the paced
//! frame sampler with its backpressure budget, and the single state-owning
//! session actor that folds inbound recognition events into the tracker
//! and the attendance ledger.

pub mod budget;
pub mod config;
pub mod sampler;
pub mod session;
pub mod transport;
pub mod wire;

pub use budget::FrameBudget;
pub use config::SessionConfig;
pub use sampler::{start_sampling, EncodedFrame, SamplerConfig, SamplerHandle};
pub use session::{spawn_session, SessionError, SessionHandle, SessionState, SessionStatus};
pub use transport::{Connection, ConnectionError};
pub use wire::{AckStatus, ClientMessage, ServerEvent};

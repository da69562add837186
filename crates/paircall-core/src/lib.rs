//! Two-party audio call establishment core.
//!
//! Drives room coordination, the offer/answer/ICE exchange over a
//! signaling relay, and the user-visible call phase. The relay client,
//! negotiation primitive, and media capture are pluggable
//! collaborators behind traits; this crate owns only the lifecycle.

pub mod call;
pub mod config;
pub mod errors;
pub mod events;
pub mod media;
pub mod negotiation;
pub mod room;
pub mod signaling;

pub use call::CallManager;
pub use config::CallConfig;
pub use errors::CallError;
pub use events::{CallEvent, CallEventListener, CallPhase};

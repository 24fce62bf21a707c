//! Native network adapters for examguard.
//!
//! - [`ReqwestDispatcher`] implements the core `Dispatch` seam over HTTP, so
//!   an `AuthenticatedTransport` can talk to the auth and grading collaborators.
//! - [`VerifierLink`] opens the verifier's WebSocket with the session
//!   credential and drives a `CadenceStreamer` from it.
//!
//! Both need a tokio runtime.

pub mod http;
pub mod verifier;

pub use http::ReqwestDispatcher;
pub use verifier::{ChannelSink, LinkEvent, VerifierLink, open_channel};

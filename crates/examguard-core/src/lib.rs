//! # examguard-core
//!
//! **Exam-integrity client logic, free of any network or DOM code.**
//!
//! `examguard-core` captures behavioral signal during a timed exam and
//! enforces who is allowed to submit. It never decides whether a session is
//! fraudulent: it streams timing features to a remote verifier, plants bait
//! that only automation trips, and acts on explicit verdicts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use examguard_core::{
//!     AuthenticatedTransport, CredentialStore, MemoryStorage, RecordingNavigator,
//!     SessionController,
//! };
//! # use examguard_core::{ApiRequest, ApiResponse, Dispatch, Result};
//! # struct Wire;
//! # impl Dispatch for Wire {
//! #     async fn dispatch(&self, _: ApiRequest) -> Result<ApiResponse> { unimplemented!() }
//! # }
//!
//! # async fn run() -> Result<()> {
//! let store = Arc::new(CredentialStore::new(MemoryStorage::new()));
//! let navigator = Arc::new(RecordingNavigator::new());
//! let session = SessionController::new(AuthenticatedTransport::new(Wire, store, navigator));
//!
//! session.login("a@b.com", "secret123").await?;
//! if let Some(me) = session.check_session().await {
//!     println!("signed in as {}", me.full_name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SessionController -> AuthenticatedTransport -> Dispatch (reqwest | fetch)
//!         \                    |
//!          +--------> CredentialStore <-------- CadenceStreamer -> TelemetrySink
//! ```
//!
//! [`CredentialStore`] is the only shared mutable state. The transport revokes
//! it on an unauthorized response, the streamer clears it on a TERMINATE
//! verdict, and the controller owns every other transition. Side effects that
//! leave the page go through a [`Navigator`].
//!
//! Forensic artifacts ([`BaitRenderer`], [`PoisonMarker`],
//! [`WatermarkedRenderer`]) are pure renderers; detection happens downstream.

pub mod api;
pub mod bait;
pub mod cadence;
pub mod config;
pub mod credential;
pub mod error;
pub mod exam;
pub mod navigation;
pub mod session;
pub mod transport;
pub mod watermark;

pub use api::{Principal, Registration, TokenResponse};
pub use bait::{BAIT_FIELD_NAME, BaitField, BaitRenderer};
#[cfg(not(target_arch = "wasm32"))]
pub use cadence::MonotonicClock;
pub use cadence::{
    CadenceSample, CadenceStats, CadenceStreamer, ChannelStatus, Clock, KeystrokeOutcome,
    TelemetrySink, Verdict, VerdictKind, VerdictOutcome,
};
pub use config::{ClientConfig, ReconnectPolicy};
#[cfg(not(target_arch = "wasm32"))]
pub use credential::FileStorage;
pub use credential::{CredentialStore, MemoryStorage, TokenStorage};
pub use error::{ProctorError, Result};
pub use exam::{ExamForm, ExamResult, ExamStatus, Submission, submit_exam};
pub use navigation::{Navigator, RecordingNavigator, Route};
pub use session::{SessionController, SessionState};
pub use transport::{Access, ApiRequest, ApiResponse, AuthenticatedTransport, Body, Dispatch, Method};
pub use watermark::{
    MonospaceMeasure, PoisonMarker, RasterPlan, RasterStyle, TextMeasure, WatermarkId,
    WatermarkedRenderer,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

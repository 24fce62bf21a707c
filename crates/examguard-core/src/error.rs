//! Error taxonomy shared by every examguard crate.
//!
//! Transport-level failures are recovered at the boundary that owns the
//! resource; business-level failures carry the server's message verbatim so
//! the presentation layer can show it as-is.

use thiserror::Error;

/// Default message when a refused login carries no server detail.
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Check your credentials.";

/// Default message when a refused registration carries no server detail.
pub const REGISTRATION_FAILED_MESSAGE: &str = "Registration failed";

#[derive(Debug, Error)]
pub enum ProctorError {
    /// The credential was missing or expired. The session has already been
    /// torn down; callers must not retry.
    #[error("authentication rejected; session cleared")]
    AuthenticationRejected,

    /// The login attempt itself was refused.
    #[error("{0}")]
    CredentialsInvalid(String),

    /// Business-level refusal (e.g. email already registered). `detail` is
    /// the server's reason verbatim, empty when it gave none.
    #[error("{}", describe_rejection(*.status, .detail))]
    Rejected { status: u16, detail: String },

    #[error("telemetry channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("malformed verdict: {0}")]
    MalformedVerdict(String),

    /// The remote verifier ended the exam attempt.
    #[error("security violation: {0}")]
    SecurityTermination(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("credential storage failure: {0}")]
    Storage(String),

    #[error("decode failure: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProctorError {
    /// True for failures that ended the session as a side effect.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRejected | Self::SecurityTermination(_)
        )
    }
}

fn describe_rejection(status: u16, detail: &str) -> String {
    if detail.is_empty() {
        format!("request failed with status {status}")
    } else {
        detail.to_string()
    }
}

pub type Result<T> = std::result::Result<T, ProctorError>;

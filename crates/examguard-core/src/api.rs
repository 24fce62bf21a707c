//! Wire types and paths of the HTTP collaborators.

use serde::{Deserialize, Serialize};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/users/open";
pub const PRINCIPAL_PATH: &str = "/users/me";
pub const SUBMIT_PATH: &str = "/exam/submit";

/// Response of `POST /auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// The authenticated identity behind the current credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    /// Average flight time learned by the verifier, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing_baseline: Option<f64>,
}

/// Body of `POST /users/open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

//! Authenticated request/response transport.
//!
//! [`AuthenticatedTransport`] wraps every outbound collaborator call. Before
//! dispatch it attaches the current credential as a bearer header; after the
//! response it runs a single post-response hook: an unauthorized status on an
//! authenticated call revokes the credential and navigates to the login entry
//! point, then the call fails with [`ProctorError::AuthenticationRejected`].
//!
//! The wire itself sits behind [`Dispatch`] (reqwest natively, `fetch` in the
//! browser, a scripted fake in tests).

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::credential::{CredentialStore, TokenStorage};
use crate::error::{ProctorError, Result};
use crate::navigation::{Navigator, Route};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const STATUS_UNAUTHORIZED: u16 = 401;

// ---------------------------------------------------------------------------
// Request / response model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded` pairs, in order.
    Form(Vec<(String, String)>),
}

/// Whether a request carries the session credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authenticated,
    /// Sent without a credential; a 401 is an ordinary refusal.
    Public,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Body,
    pub access: Access,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: Body::Empty,
            access: Access::Authenticated,
            headers: Vec::new(),
        }
    }

    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self> {
        Ok(Self {
            method: Method::Post,
            path: path.into(),
            body: Body::Json(serde_json::to_value(body)?),
            access: Access::Authenticated,
            headers: Vec::new(),
        })
    }

    pub fn post_form<K, V>(path: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Body::Form(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            access: Access::Authenticated,
            headers: Vec::new(),
        }
    }

    pub fn public(mut self) -> Self {
        self.access = Access::Public;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The server-supplied reason for a failure.
    ///
    /// Reads a `detail` field (string, or the first `msg` of a validation
    /// list), falling back to the trimmed body, then `None` if empty.
    pub fn detail(&self) -> Option<String> {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&self.body) {
            match value.get("detail") {
                Some(serde_json::Value::String(s)) => return Some(s.clone()),
                Some(serde_json::Value::Array(items)) => {
                    if let Some(msg) = items
                        .iter()
                        .find_map(|i| i.get("msg").and_then(|m| m.as_str()))
                    {
                        return Some(msg.to_string());
                    }
                }
                Some(other) if !other.is_null() => return Some(other.to_string()),
                _ => {}
            }
        }
        let trimmed = self.body.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch seam
// ---------------------------------------------------------------------------

/// Raw request/response wire.
///
/// Implementations return `Err` only for transport failures (no response at
/// all); every HTTP status, including errors, comes back as `Ok`.
pub trait Dispatch {
    fn dispatch(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse>>;
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn dispatch(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse>> {
        (**self).dispatch(request)
    }
}

// ---------------------------------------------------------------------------
// Authenticated transport
// ---------------------------------------------------------------------------

pub struct AuthenticatedTransport<D, S, N> {
    dispatcher: D,
    credentials: Arc<CredentialStore<S>>,
    navigator: N,
}

impl<D, S, N> AuthenticatedTransport<D, S, N>
where
    D: Dispatch,
    S: TokenStorage,
    N: Navigator,
{
    pub fn new(dispatcher: D, credentials: Arc<CredentialStore<S>>, navigator: N) -> Self {
        Self {
            dispatcher,
            credentials,
            navigator,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore<S>> {
        &self.credentials
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Dispatch a request and classify its response.
    ///
    /// Non-2xx statuses other than an authenticated 401 are returned as
    /// [`ProctorError::Rejected`] with the server's detail, unchanged.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let observed = match request.access {
            Access::Authenticated => {
                let (generation, token) = self.credentials.snapshot();
                if let Some(token) = token {
                    request
                        .headers
                        .push((AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}")));
                }
                Some(generation)
            }
            Access::Public => None,
        };

        let path = request.path.clone();
        let response = self.dispatcher.dispatch(request).await?;

        if let Some(generation) = observed
            && response.status == STATUS_UNAUTHORIZED
        {
            self.on_unauthorized(generation, &path)?;
            return Err(ProctorError::AuthenticationRejected);
        }

        if !response.is_success() {
            return Err(ProctorError::Rejected {
                status: response.status,
                detail: response.detail().unwrap_or_default(),
            });
        }

        Ok(response)
    }

    /// `send`, then decode the body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.send(request).await?.json()
    }

    /// Revoke the credential a 401 was issued against. A credential that
    /// cannot be removed is reported instead of the rejection.
    fn on_unauthorized(&self, generation: u64, path: &str) -> Result<()> {
        if self.credentials.revoke(generation)? {
            log::warn!("{path} rejected the session credential; forcing logout");
            self.navigator.navigate(Route::Login);
        } else {
            log::debug!("{path} rejected an already revoked credential");
        }
        Ok(())
    }
}

//! Session identity lifecycle: login, validity probing, logout, registration.
//!
//! ```text
//! ANONYMOUS --login success--> AUTHENTICATED
//! AUTHENTICATED --logout | 401 rejection | TERMINATE verdict--> ANONYMOUS
//! ```
//!
//! The state is derived from the [`CredentialStore`], never stored twice, so
//! every observer sees the same answer. The resolved [`Principal`] is cached
//! against the credential generation it was resolved under and disappears as
//! soon as that credential is cleared by anyone.

use std::sync::{Arc, Mutex, PoisonError};

use crate::api::{
    LOGIN_PATH, PRINCIPAL_PATH, Principal, REGISTER_PATH, Registration, TokenResponse,
};
use crate::credential::{CredentialStore, TokenStorage};
use crate::error::{LOGIN_FAILED_MESSAGE, ProctorError, REGISTRATION_FAILED_MESSAGE, Result};
use crate::navigation::{Navigator, Route};
use crate::transport::{ApiRequest, AuthenticatedTransport, Dispatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}

pub struct SessionController<D, S, N> {
    transport: AuthenticatedTransport<D, S, N>,
    principal: Mutex<Option<(u64, Principal)>>,
}

impl<D, S, N> SessionController<D, S, N>
where
    D: Dispatch,
    S: TokenStorage,
    N: Navigator,
{
    pub fn new(transport: AuthenticatedTransport<D, S, N>) -> Self {
        Self {
            transport,
            principal: Mutex::new(None),
        }
    }

    pub fn transport(&self) -> &AuthenticatedTransport<D, S, N> {
        &self.transport
    }

    pub fn credentials(&self) -> &Arc<CredentialStore<S>> {
        self.transport.credentials()
    }

    pub fn state(&self) -> SessionState {
        if self.credentials().is_present() {
            SessionState::Authenticated
        } else {
            SessionState::Anonymous
        }
    }

    /// The principal resolved for the current credential, if still valid.
    pub fn principal(&self) -> Option<Principal> {
        let (generation, token) = self.credentials().snapshot();
        token?;
        let cache = self.lock_principal();
        match &*cache {
            Some((cached_at, principal)) if *cached_at == generation => Some(principal.clone()),
            _ => None,
        }
    }

    /// Exchange identifier/secret for a credential, then resolve the principal.
    ///
    /// The request is form-encoded. On refusal the server's reason comes back
    /// as [`ProctorError::CredentialsInvalid`] and the store is left empty.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<Principal> {
        let request = ApiRequest::post_form(
            LOGIN_PATH,
            [("username", identifier), ("password", secret)],
        )
        .public();

        let token = match self.transport.send_json::<TokenResponse>(request).await {
            Ok(token) => token,
            Err(e) => {
                self.credentials().clear()?;
                self.forget_principal();
                return Err(match e {
                    ProctorError::Rejected { detail, .. } if detail.is_empty() => {
                        ProctorError::CredentialsInvalid(LOGIN_FAILED_MESSAGE.to_string())
                    }
                    ProctorError::Rejected { detail, .. } => ProctorError::CredentialsInvalid(detail),
                    ProctorError::Decode(_) => {
                        ProctorError::CredentialsInvalid(LOGIN_FAILED_MESSAGE.to_string())
                    }
                    other => other,
                });
            }
        };

        self.credentials().set(&token.access_token)?;
        log::info!("login succeeded for {identifier}");

        match self.resolve_principal().await {
            Ok(principal) => Ok(principal),
            Err(ProctorError::AuthenticationRejected) => {
                self.forget_principal();
                Err(ProctorError::AuthenticationRejected)
            }
            Err(e) => {
                log::warn!("principal lookup after login failed: {e}");
                if let Err(teardown) = self.logout() {
                    log::warn!("{teardown}");
                }
                Err(e)
            }
        }
    }

    /// Probe the principal-resolution endpoint.
    ///
    /// Returns `None` without any network call when no credential is stored.
    /// Any failure means the session is invalid: the session is torn down.
    pub async fn check_session(&self) -> Option<Principal> {
        if !self.credentials().is_present() {
            return None;
        }
        match self.resolve_principal().await {
            Ok(principal) => Some(principal),
            Err(ProctorError::AuthenticationRejected) => {
                // The transport already cleared the credential and redirected.
                log::warn!("session expired or invalid");
                self.forget_principal();
                None
            }
            Err(e) => {
                log::warn!("session probe failed: {e}");
                if let Err(teardown) = self.logout() {
                    log::warn!("{teardown}");
                }
                None
            }
        }
    }

    /// Fetch the principal for the stored credential and cache it.
    async fn resolve_principal(&self) -> Result<Principal> {
        let generation = self.credentials().generation();
        let principal = self
            .transport
            .send_json::<Principal>(ApiRequest::get(PRINCIPAL_PATH))
            .await?;
        *self.lock_principal() = Some((generation, principal.clone()));
        Ok(principal)
    }

    /// Clear the credential and cached principal, then go to login.
    ///
    /// Safe to call when no session exists. If the stored credential cannot
    /// be removed the error is returned and no navigation happens.
    pub fn logout(&self) -> Result<()> {
        self.forget_principal();
        if self.credentials().clear()? {
            log::info!("session cleared");
        }
        self.transport.navigator().navigate(Route::Login);
        Ok(())
    }

    /// Create an account. Does not establish a session.
    pub async fn register(&self, profile: &Registration) -> Result<()> {
        let request = ApiRequest::post_json(REGISTER_PATH, profile)?.public();
        match self.transport.send(request).await {
            Ok(_) => Ok(()),
            Err(ProctorError::Rejected { status, detail }) => {
                let detail = if detail.is_empty() {
                    REGISTRATION_FAILED_MESSAGE.to_string()
                } else {
                    detail
                };
                Err(ProctorError::Rejected { status, detail })
            }
            Err(e) => Err(e),
        }
    }

    fn forget_principal(&self) {
        *self.lock_principal() = None;
    }

    fn lock_principal(&self) -> std::sync::MutexGuard<'_, Option<(u64, Principal)>> {
        self.principal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

//! Client configuration: collaborator endpoints and channel policy.
//!
//! Endpoints are supplied by the environment (CLI flags / env vars, or the
//! hosting page in the browser); the defaults match a local development stack.

use std::time::Duration;

use url::Url;

use crate::credential::DEFAULT_TOKEN_KEY;
use crate::error::Result;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_VERIFIER_URL: &str = "ws://localhost:8080/ws";

/// Query parameter carrying the credential on the verifier channel.
pub const VERIFIER_TOKEN_PARAM: &str = "token";

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// What the telemetry channel does after it drops.
///
/// The default never reconnects: a dropped channel stays visibly
/// disconnected until the page is reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    #[default]
    Never,
    /// Retry up to `attempts` times, waiting `delay_ms` before each try.
    Fixed { attempts: u32, delay_ms: u64 },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based), or `None`
    /// once the policy is exhausted.
    pub fn delay_for(self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::Fixed { attempts, delay_ms } => {
                if attempt == 0 || attempt > attempts {
                    None
                } else {
                    Some(Duration::from_millis(delay_ms))
                }
            }
        }
    }
}

impl std::fmt::Display for ReconnectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::Fixed { attempts, delay_ms } => write!(f, "{attempts}x{delay_ms}ms"),
        }
    }
}

impl std::str::FromStr for ReconnectPolicy {
    type Err = String;

    /// Parses `never` or `<attempts>x<delay>ms`, e.g. `3x500ms`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") {
            return Ok(Self::Never);
        }
        let invalid = || format!("invalid reconnect policy {s:?} (expected `never` or e.g. `3x500ms`)");
        let (attempts, delay) = s.split_once('x').ok_or_else(invalid)?;
        let delay = delay.strip_suffix("ms").unwrap_or(delay);
        let attempts = attempts.parse().map_err(|_| invalid())?;
        let delay_ms = delay.parse().map_err(|_| invalid())?;
        if attempts == 0 {
            return Ok(Self::Never);
        }
        Ok(Self::Fixed { attempts, delay_ms })
    }
}

// ---------------------------------------------------------------------------
// Client config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the HTTP collaborators (auth, users, exam).
    pub api_base_url: String,
    /// Address of the verifier's persistent channel.
    pub verifier_url: String,
    /// Storage key for the persisted credential.
    pub token_key: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            verifier_url: DEFAULT_VERIFIER_URL.to_string(),
            token_key: DEFAULT_TOKEN_KEY.to_string(),
            reconnect: ReconnectPolicy::Never,
        }
    }
}

impl ClientConfig {
    /// Absolute URL of an API path.
    pub fn endpoint(&self, path: &str) -> String {
        join_url(&self.api_base_url, path)
    }

    /// Verifier channel URL with the credential attached as a query
    /// parameter; the channel has no per-message header concept.
    pub fn verifier_endpoint(&self, token: &str) -> Result<Url> {
        let mut url = Url::parse(&self.verifier_url)?;
        url.query_pairs_mut()
            .append_pair(VERIFIER_TOKEN_PARAM, token);
        Ok(url)
    }
}

/// Join a base address and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_policy_parses_its_display_form() {
        let fixed = ReconnectPolicy::Fixed {
            attempts: 3,
            delay_ms: 500,
        };
        assert_eq!("3x500ms".parse::<ReconnectPolicy>(), Ok(fixed));
        assert_eq!(fixed.to_string().parse::<ReconnectPolicy>(), Ok(fixed));
        assert_eq!("never".parse::<ReconnectPolicy>(), Ok(ReconnectPolicy::Never));
        assert_eq!("0x100".parse::<ReconnectPolicy>(), Ok(ReconnectPolicy::Never));
        assert!("soon".parse::<ReconnectPolicy>().is_err());
    }

    #[test]
    fn default_matches_local_stack() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.verifier_url, "ws://localhost:8080/ws");
        assert_eq!(config.token_key, "access_token");
        assert_eq!(config.reconnect, ReconnectPolicy::Never);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ClientConfig {
            api_base_url: "http://api.test/v1/".into(),
            ..Default::default()
        };
        assert_eq!(config.endpoint("/auth/login"), "http://api.test/v1/auth/login");
        assert_eq!(config.endpoint("users/me"), "http://api.test/v1/users/me");
    }

    #[test]
    fn verifier_endpoint_encodes_token() {
        let config = ClientConfig::default();
        let url = config.verifier_endpoint("a b&c=d").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/ws?token=a+b%26c%3Dd");
        let (k, v) = url.query_pairs().next().unwrap();
        assert_eq!(k, "token");
        assert_eq!(v, "a b&c=d");
    }

    #[test]
    fn verifier_endpoint_rejects_garbage() {
        let config = ClientConfig {
            verifier_url: "not a url".into(),
            ..Default::default()
        };
        assert!(config.verifier_endpoint("t").is_err());
    }

    #[test]
    fn never_policy_has_no_delay() {
        assert_eq!(ReconnectPolicy::Never.delay_for(1), None);
    }

    #[test]
    fn fixed_policy_is_bounded() {
        let policy = ReconnectPolicy::Fixed {
            attempts: 2,
            delay_ms: 500,
        };
        assert_eq!(policy.delay_for(0), None);
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(3), None);
        assert_eq!(policy.to_string(), "2x500ms");
    }
}

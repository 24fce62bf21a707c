pub mod auth;
pub mod exam;
pub mod render;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use examguard_core::{
    AuthenticatedTransport, ClientConfig, CredentialStore, FileStorage, ProctorError, Result,
    SessionController,
};
use examguard_net::ReqwestDispatcher;

use crate::GlobalArgs;
use crate::navigator::TerminalNavigator;

pub type Session = SessionController<ReqwestDispatcher, FileStorage, Arc<TerminalNavigator>>;

/// Everything a command needs to talk to the collaborators.
pub struct Context {
    pub config: ClientConfig,
    pub navigator: Arc<TerminalNavigator>,
    pub session: Session,
}

impl Context {
    pub fn new(global: &GlobalArgs) -> Result<Self> {
        let config = client_config(global);
        let state_dir = match &global.state_dir {
            Some(dir) => dir.clone(),
            None => default_state_dir()?,
        };
        log::debug!("state directory {}", state_dir.display());

        let store = Arc::new(CredentialStore::with_key(
            FileStorage::new(state_dir),
            config.token_key.clone(),
        ));
        let navigator = Arc::new(TerminalNavigator::new());
        let dispatcher = ReqwestDispatcher::from_config(&config)?;
        let session = SessionController::new(AuthenticatedTransport::new(
            dispatcher,
            store,
            Arc::clone(&navigator),
        ));
        Ok(Self {
            config,
            navigator,
            session,
        })
    }
}

pub fn client_config(global: &GlobalArgs) -> ClientConfig {
    ClientConfig {
        api_base_url: global.api_url.clone(),
        verifier_url: global.verifier_url.clone(),
        reconnect: global.reconnect,
        ..ClientConfig::default()
    }
}

/// `~/.examguard`. Never falls back to a relative path: the credential must
/// not land in whatever directory the command happens to run from.
fn default_state_dir() -> Result<PathBuf> {
    state_dir_under(dirs::home_dir())
}

fn state_dir_under(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(home) if home.is_absolute() => Ok(home.join(".examguard")),
        _ => Err(ProctorError::Storage(
            "cannot locate a home directory; pass --state-dir or set EXAMGUARD_STATE_DIR".into(),
        )),
    }
}

/// Single-threaded runtime: nothing in this client runs in parallel.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Use the given password or read one line from stdin.
pub fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(p) = password {
        return Ok(p);
    }
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.is_empty() {
        return Err(ProctorError::CredentialsInvalid("password is required".into()));
    }
    Ok(line)
}

// ─── Session ───
// Token, pending login challenge and signed-in developer. The current state
// is published on a watch channel; token and challenge are persisted through
// a `SessionStore`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::config::IndexConfig;
use crate::core::error::{IndexError, IndexResult};
use crate::core::models::{BeginLoginInfo, Developer, ModManager};
use crate::core::repository::{IndexRepository, IndexRepositoryLive, UpdateSelfBody};
use crate::core::store::{FileSessionStore, SessionStore, LOGIN_KEY, TOKEN_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    /// A device-code login was started and has not resolved yet.
    LoginPending(BeginLoginInfo),
    LoggedIn(Developer),
}

/// Outcome of one [`IndexService::poll_login`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPoll {
    /// The challenge was authorized; carries the new session token.
    LoggedIn(String),
    /// The challenge expired or is unknown to the index. Start over.
    Expired,
    /// Not authorized yet. Poll again after the advertised interval.
    Pending,
}

/// Entry point of the SDK: the gateway, the mod cache and the session.
pub struct IndexService {
    repository: Arc<dyn IndexRepository>,
    mods: ModManager,
    store: Arc<dyn SessionStore>,
    state: watch::Sender<SessionState>,
}

impl IndexService {
    pub fn new(repository: Arc<dyn IndexRepository>, store: Arc<dyn SessionStore>) -> Self {
        let (state, _) = watch::channel(SessionState::LoggedOut);
        Self {
            mods: ModManager::new(Arc::clone(&repository)),
            repository,
            store,
            state,
        }
    }

    /// Live gateway plus a file store under `config.data_dir`.
    pub fn from_config(config: &IndexConfig) -> IndexResult<Self> {
        let repository = IndexRepositoryLive::new(config)?;
        let store = FileSessionStore::open(&config.data_dir);
        Ok(Self::new(Arc::new(repository), Arc::new(store)))
    }

    pub fn repository(&self) -> &Arc<dyn IndexRepository> {
        &self.repository
    }

    pub fn mods(&self) -> &ModManager {
        &self.mods
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every session transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn user(&self) -> Option<Developer> {
        match &*self.state.borrow() {
            SessionState::LoggedIn(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(&*self.state.borrow(), SessionState::LoggedIn(_))
    }

    pub fn active_login(&self) -> Option<BeginLoginInfo> {
        match &*self.state.borrow() {
            SessionState::LoginPending(info) => Some(info.clone()),
            _ => None,
        }
    }

    /// Pick up the persisted session: a saved token is validated with the
    /// index, otherwise a saved login challenge is resumed.
    pub async fn restore(&self) -> IndexResult<SessionState> {
        if let Some(token) = self.store.get(TOKEN_KEY) {
            debug!("Restoring saved session token");
            self.login(&token).await?;
            return Ok(self.state());
        }

        if let Some(raw) = self.store.get(LOGIN_KEY) {
            match serde_json::from_str::<BeginLoginInfo>(&raw) {
                Ok(login) => {
                    debug!("Resuming login attempt {}", login.uuid);
                    self.state.send_replace(SessionState::LoginPending(login));
                }
                Err(e) => {
                    warn!("Discarding unreadable saved login attempt: {}", e);
                    self.persist(LOGIN_KEY, None);
                }
            }
        }

        Ok(self.state())
    }

    /// Sign in with an existing session token.
    ///
    /// On failure the session is logged out and the token is dropped from
    /// the gateway; a token the index rejected is also forgotten on disk.
    pub async fn login(&self, token: &str) -> IndexResult<()> {
        self.repository.set_token(Some(token.to_string()));

        match self.repository.get_self().await {
            Ok(meta) => {
                let user = Developer::from(meta);
                info!("Logged in as {}", user.username);
                self.persist(TOKEN_KEY, Some(token));
                self.state.send_replace(SessionState::LoggedIn(user));
                Ok(())
            }
            Err(e) => {
                self.repository.set_token(None);
                if matches!(e, IndexError::AuthRequired(_)) {
                    self.persist(TOKEN_KEY, None);
                }
                self.state.send_replace(SessionState::LoggedOut);
                Err(e)
            }
        }
    }

    /// Start a device-code login. Replaces any attempt already in progress.
    pub async fn begin_login(&self) -> IndexResult<BeginLoginInfo> {
        let login = self.repository.begin_login_flow().await?;

        match serde_json::to_string(&login) {
            Ok(json) => self.persist(LOGIN_KEY, Some(&json)),
            Err(e) => warn!("Could not serialize login attempt: {}", e),
        }
        info!("Login attempt {} started, code {}", login.uuid, login.code);
        self.state
            .send_replace(SessionState::LoginPending(login.clone()));

        Ok(login)
    }

    /// Ask the index whether the pending login was authorized.
    ///
    /// Does not time out on its own; callers decide when to give up.
    pub async fn poll_login(&self) -> IndexResult<LoginPoll> {
        let login = self.active_login().ok_or(IndexError::NoActiveLogin)?;

        match self.repository.poll_login(login.uuid).await {
            Ok(token) => {
                self.persist(LOGIN_KEY, None);
                if let Err(e) = self.login(&token).await {
                    // The attempt is spent; keep the issued token for `restore`.
                    if !matches!(e, IndexError::AuthRequired(_)) {
                        self.persist(TOKEN_KEY, Some(&token));
                    }
                    return Err(e);
                }
                Ok(LoginPoll::LoggedIn(token))
            }
            Err(IndexError::LoginExpired(m)) | Err(IndexError::NoAttempt(m)) => {
                info!("Login attempt {} ended: {}", login.uuid, m);
                // A newer attempt may have replaced this one during the poll.
                let ended = self.state.send_if_modified(|state| {
                    if matches!(
                        state,
                        SessionState::LoginPending(current) if current.uuid == login.uuid
                    ) {
                        *state = SessionState::LoggedOut;
                        true
                    } else {
                        false
                    }
                });
                if ended {
                    self.persist(LOGIN_KEY, None);
                }
                Ok(LoginPoll::Expired)
            }
            Err(e) if e.is_api() => {
                debug!("Login attempt {} still pending: {}", login.uuid, e.message());
                Ok(LoginPoll::Pending)
            }
            Err(e) => Err(e),
        }
    }

    /// Forget the pending login locally. The index is not told.
    pub fn cancel_login(&self) {
        let cancelled = self.state.send_if_modified(|state| {
            if matches!(state, SessionState::LoginPending(_)) {
                *state = SessionState::LoggedOut;
                true
            } else {
                false
            }
        });

        if cancelled {
            self.persist(LOGIN_KEY, None);
            info!("Login attempt cancelled");
        }
    }

    /// Revoke the current token. Local state is cleared before the request.
    pub async fn logout(&self) -> IndexResult<()> {
        if !self.clear_user() {
            return Ok(());
        }
        self.repository.delete_token().await
    }

    /// Revoke every token of the account. Local state is cleared before the
    /// request.
    pub async fn logout_all(&self) -> IndexResult<()> {
        if !self.clear_user() {
            return Ok(());
        }
        self.repository.delete_all_tokens().await
    }

    /// Change the signed-in developer's display name.
    pub async fn update_self(&self, display_name: &str) -> IndexResult<()> {
        let Some(user) = self.user() else {
            return Ok(());
        };
        if user.display_name == display_name {
            return Ok(());
        }

        let body = UpdateSelfBody {
            display_name: display_name.to_string(),
        };
        self.repository.update_self(&body).await?;

        self.state.send_if_modified(|state| match state {
            SessionState::LoggedIn(user) => {
                user.display_name = body.display_name.clone();
                true
            }
            _ => false,
        });
        info!("Display name changed to {}", display_name);
        Ok(())
    }

    fn clear_user(&self) -> bool {
        let cleared = self.state.send_if_modified(|state| {
            if matches!(state, SessionState::LoggedIn(_)) {
                *state = SessionState::LoggedOut;
                true
            } else {
                false
            }
        });

        if cleared {
            self.persist(TOKEN_KEY, None);
            info!("Logged out");
        }
        cleared
    }

    fn persist(&self, key: &str, value: Option<&str>) {
        if let Err(e) = self.store.set(key, value) {
            warn!("Failed to persist {}: {}", key, e);
        }
    }
}

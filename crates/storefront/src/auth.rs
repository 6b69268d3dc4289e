//! Auth state holder: the signed-in identity and its bearer credential.
//!
//! The credential is persisted under [`AUTH_TOKEN_KEY`], where the API client
//! picks it up for every request. The holder is the only writer of that key.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use secrecy::SecretString;
use tracing::{info, instrument, warn};

use apagina_core::{RegisterRequest, RegisterResult, User};

use crate::api::{ApiClient, ApiError};
use crate::credential::Credential;
use crate::error::{add_breadcrumb, clear_sentry_user, report, set_sentry_user};
use crate::guard::{self, InFlight};
use crate::storage::{AUTH_TOKEN_KEY, KeyValueStore};

const LOGIN_FAILED: &str = "Falha no login. Verifique suas credenciais.";
const LOGIN_NO_TOKEN: &str = "Resposta de login inválida.";
const LOGIN_BAD_TOKEN: &str = "Credencial recebida é inválida.";
const LOGIN_NOT_SAVED: &str = "Não foi possível salvar a sessão.";
const REGISTER_UNKNOWN: &str = "Erro desconhecido no registro.";

/// Whether a session has an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Guest,
    Authenticated,
}

/// Owns the current identity.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AuthHolder {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    api: ApiClient,
    store: Arc<dyn KeyValueStore>,
    state: RwLock<AuthState>,
    in_flight: InFlight,
}

#[derive(Default)]
struct AuthState {
    credential: Option<Credential>,
    error: Option<String>,
}

impl AuthHolder {
    /// Create a holder with no identity. Call [`init`](Self::init) to restore
    /// a persisted session.
    #[must_use]
    pub fn new(api: ApiClient, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                api,
                store,
                state: RwLock::new(AuthState::default()),
                in_flight: InFlight::default(),
            }),
        }
    }

    /// Restore the persisted credential if it is still valid.
    ///
    /// Undecodable or expired credentials are purged without surfacing an
    /// error.
    #[instrument(skip(self))]
    pub fn init(&self) -> Option<User> {
        let _loading = self.inner.in_flight.start();

        let stored = match self.inner.store.get(AUTH_TOKEN_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Could not read persisted credential");
                None
            }
        };

        let credential = stored.and_then(|token| {
            match Credential::decode_valid_at(&token, Utc::now()) {
                Ok(credential) => Some(credential),
                Err(e) => {
                    warn!(error = %e, "Purging persisted credential");
                    self.purge_persisted();
                    None
                }
            }
        });

        let user = credential.as_ref().map(|c| c.user().clone());
        guard::write(&self.inner.state).credential = credential;

        if let Some(user) = &user {
            set_sentry_user(&user.id, Some(&user.username));
            info!(user_id = %user.id, "Restored session from persisted credential");
        }
        user
    }

    /// Log in with a username or email and a password.
    ///
    /// On failure any partial state is cleared (in memory and persisted) and
    /// the reason is available from [`last_error`](Self::last_error).
    #[instrument(skip(self, secret))]
    pub async fn login(&self, identifier: &str, secret: &str) -> bool {
        let _loading = self.inner.in_flight.start();
        guard::write(&self.inner.state).error = None;

        let token = match self.inner.api.login(identifier, secret).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!("Login response carried no token");
                return self.fail_login(LOGIN_NO_TOKEN.to_string());
            }
            Err(e) => {
                report("login", &e);
                let message = match &e {
                    ApiError::Unauthorized(_) | ApiError::Rejected { .. } => e
                        .backend_message()
                        .map_or_else(|| LOGIN_FAILED.to_string(), str::to_string),
                    _ => LOGIN_FAILED.to_string(),
                };
                return self.fail_login(message);
            }
        };

        let credential = match Credential::decode_valid_at(&token, Utc::now()) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Login returned an unusable credential");
                return self.fail_login(LOGIN_BAD_TOKEN.to_string());
            }
        };

        if let Err(e) = self.inner.store.set(AUTH_TOKEN_KEY, credential.expose_token()) {
            warn!(error = %e, "Could not persist credential");
            return self.fail_login(LOGIN_NOT_SAVED.to_string());
        }

        let user = credential.user().clone();
        guard::write(&self.inner.state).credential = Some(credential);

        set_sentry_user(&user.id, Some(&user.username));
        add_breadcrumb("auth", "Logged in", None);
        info!(user_id = %user.id, "Login successful");
        true
    }

    fn fail_login(&self, message: String) -> bool {
        self.purge_persisted();
        let mut state = guard::write(&self.inner.state);
        state.credential = None;
        state.error = Some(message);
        false
    }

    /// Create an account. Does not log in.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn register(&self, request: &RegisterRequest) -> RegisterResult {
        let _loading = self.inner.in_flight.start();

        match self.inner.api.register(request).await {
            Ok(()) => {
                info!("Registration successful");
                RegisterResult::Success
            }
            Err(e) => {
                report("register", &e);
                let errors = e.field_errors();
                if errors.is_empty() {
                    RegisterResult::UnknownFailure(REGISTER_UNKNOWN.to_string())
                } else {
                    RegisterResult::ValidationFailure(errors.to_vec())
                }
            }
        }
    }

    /// Forget the identity, in memory and on disk. Safe to call repeatedly.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        self.purge_persisted();
        let had_session = {
            let mut state = guard::write(&self.inner.state);
            state.error = None;
            state.credential.take().is_some()
        };

        clear_sentry_user();
        if had_session {
            add_breadcrumb("auth", "Logged out", None);
            info!("Logged out");
        }
    }

    /// The current credential, purged first if it has expired.
    fn current(&self) -> Option<Credential> {
        let now = Utc::now();
        {
            let state = guard::read(&self.inner.state);
            match &state.credential {
                None => return None,
                Some(credential) if !credential.is_expired_at(now) => {
                    return Some(credential.clone());
                }
                Some(_) => {}
            }
        }

        let mut state = guard::write(&self.inner.state);
        if state
            .credential
            .as_ref()
            .is_some_and(|c| c.is_expired_at(now))
        {
            info!("Credential expired; ending session");
            state.credential = None;
            drop(state);
            self.purge_persisted();
            clear_sentry_user();
            return None;
        }
        state.credential.clone()
    }

    fn purge_persisted(&self) {
        if let Err(e) = self.inner.store.remove(AUTH_TOKEN_KEY) {
            warn!(error = %e, "Could not remove persisted credential");
        }
    }

    /// The signed-in user, if the credential is still valid.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.current().map(|c| c.user().clone())
    }

    /// The bearer token, if the credential is still valid.
    #[must_use]
    pub fn token(&self) -> Option<SecretString> {
        self.current().map(|c| c.token().clone())
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Guest or authenticated, as of now.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        if self.is_authenticated() {
            AuthMode::Authenticated
        } else {
            AuthMode::Guest
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.in_flight.is_active()
    }

    /// Message describing the last failed login.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        guard::read(&self.inner.state).error.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use apagina_core::UserId;

    use super::*;
    use crate::config::ClientConfig;
    use crate::credential::unsigned_token;
    use crate::storage::MemoryStore;

    fn leitor() -> User {
        User {
            id: UserId::new(42),
            username: "leitor".to_string(),
        }
    }

    /// A holder whose backend refuses every connection.
    fn offline_holder() -> (AuthHolder, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = ClientConfig::with_api_url("http://127.0.0.1:9/api").unwrap();
        let api = ApiClient::new(&config, store.clone()).unwrap();
        (AuthHolder::new(api, store.clone()), store)
    }

    #[test]
    fn test_init_restores_valid_credential() {
        let (auth, store) = offline_holder();
        let token = unsigned_token(&leitor(), Utc::now().timestamp() + 3600);
        store.set(AUTH_TOKEN_KEY, &token).unwrap();

        assert_eq!(auth.init(), Some(leitor()));
        assert!(auth.is_authenticated());
        assert_eq!(auth.mode(), AuthMode::Authenticated);
        assert!(!auth.is_loading());
    }

    #[test]
    fn test_init_purges_expired_credential() {
        let (auth, store) = offline_holder();
        let token = unsigned_token(&leitor(), Utc::now().timestamp() - 10);
        store.set(AUTH_TOKEN_KEY, &token).unwrap();

        assert_eq!(auth.init(), None);
        assert!(auth.user().is_none());
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);
        assert!(auth.last_error().is_none());
    }

    #[test]
    fn test_init_purges_garbage_credential() {
        let (auth, store) = offline_holder();
        store.set(AUTH_TOKEN_KEY, "lixo").unwrap();

        assert_eq!(auth.init(), None);
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_logout_is_idempotent() {
        let (auth, store) = offline_holder();
        let token = unsigned_token(&leitor(), Utc::now().timestamp() + 3600);
        store.set(AUTH_TOKEN_KEY, &token).unwrap();
        auth.init();

        auth.logout();
        auth.logout();

        assert!(!auth.is_authenticated());
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let (auth, store) = offline_holder();
        let other = auth.clone();
        let token = unsigned_token(&leitor(), Utc::now().timestamp() + 3600);
        store.set(AUTH_TOKEN_KEY, &token).unwrap();

        auth.init();
        assert_eq!(other.user(), Some(leitor()));
    }

    #[tokio::test]
    async fn test_login_transport_failure_clears_state() {
        let (auth, store) = offline_holder();
        store.set(AUTH_TOKEN_KEY, "stale").unwrap();

        assert!(!auth.login("leitor", "segredo").await);
        assert_eq!(store.get(AUTH_TOKEN_KEY).unwrap(), None);
        assert!(auth.user().is_none());
        assert_eq!(auth.last_error().as_deref(), Some(LOGIN_FAILED));
        assert!(!auth.is_loading());
    }

    #[tokio::test]
    async fn test_register_transport_failure_is_unknown() {
        let (auth, _store) = offline_holder();
        let request = RegisterRequest {
            username: "novo".to_string(),
            email: apagina_core::Email::parse("novo@example.com").unwrap(),
            password: "segredo".to_string(),
            favorite_book_ids: vec![],
            favorite_genre_ids: vec![],
        };

        assert_eq!(
            auth.register(&request).await,
            RegisterResult::UnknownFailure(REGISTER_UNKNOWN.to_string())
        );
    }
}

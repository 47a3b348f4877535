use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::*;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::GenericError;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub id_token: String,
}

/// Sign-in and sign-up failures. `Display` is the message shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Email này đã được đăng ký!")]
    EmailAlreadyInUse,
    #[error("Email không hợp lệ!")]
    InvalidEmail,
    #[error("Tài khoản không tồn tại!")]
    UserNotFound,
    #[error("Mật khẩu không đúng!")]
    WrongPassword,
    #[error("Mật khẩu không khớp!")]
    PasswordMismatch,
    #[error("Mật khẩu phải có ít nhất 6 ký tự!")]
    PasswordTooShort,
    #[error("Có lỗi xảy ra. Vui lòng thử lại!")]
    Other(String),
}

impl AuthError {
    /// Maps an identity provider error code such as `EMAIL_EXISTS` or
    /// `WEAK_PASSWORD : Password should be at least 6 characters`.
    pub fn from_provider_code(message: &str) -> Self {
        let code = message.split(':').next().unwrap_or_default().trim();
        match code {
            "EMAIL_EXISTS" => AuthError::EmailAlreadyInUse,
            "INVALID_EMAIL" => AuthError::InvalidEmail,
            "EMAIL_NOT_FOUND" => AuthError::UserNotFound,
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => AuthError::WrongPassword,
            "WEAK_PASSWORD" => AuthError::PasswordTooShort,
            _ => AuthError::Other(message.to_string()),
        }
    }
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
}

pub struct FirebaseService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    email: String,
    id_token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirebaseService {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(FirebaseService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn account_call(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let url = format!("{}/accounts:{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await
            .map_err(|why| AuthError::Other(why.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|why| AuthError::Other(why.to_string()))?;
        parse_account(status.is_success(), &body)
    }
}

pub fn parse_account(success: bool, body: &str) -> Result<AuthUser, AuthError> {
    if !success {
        return Err(match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => AuthError::from_provider_code(&envelope.error.message),
            Err(_) => AuthError::Other(body.to_string()),
        });
    }
    let account: AccountResponse =
        serde_json::from_str(body).map_err(|why| AuthError::Other(why.to_string()))?;
    Ok(AuthUser {
        uid: account.local_id,
        email: account.email,
        id_token: account.id_token,
    })
}

#[async_trait]
impl IdentityService for FirebaseService {
    async fn create_user(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        self.account_call("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        self.account_call("signInWithPassword", email, password).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

pub type AuthListener = Arc<dyn Fn(Option<&AuthUser>) + Send + Sync>;

#[derive(Default)]
struct SessionInner {
    user: Option<AuthUser>,
    next_id: u64,
    listeners: Vec<(u64, AuthListener)>,
}

/// Holds the signed-in user and tells subscribers about every transition.
#[derive(Default)]
pub struct AuthSession {
    inner: Mutex<SessionInner>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The listener is called right away with the current user, then on every change.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(Option<&AuthUser>) + Send + Sync + 'static,
    {
        let listener: AuthListener = Arc::new(listener);
        let (id, current) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, listener.clone()));
            (id, inner.user.clone())
        };
        listener(current.as_ref());
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(listener_id, _)| *listener_id != id.0);
        inner.listeners.len() != before
    }

    pub fn current(&self) -> Option<AuthUser> {
        self.lock().user.clone()
    }

    fn transition(&self, user: Option<AuthUser>) {
        let listeners: Vec<AuthListener> = {
            let mut inner = self.lock();
            inner.user = user.clone();
            inner.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in listeners {
            listener(user.as_ref());
        }
    }
}

/// Email/password account flows on top of an identity provider.
pub struct AuthGateway {
    provider: Arc<dyn IdentityService>,
    session: Arc<AuthSession>,
}

impl AuthGateway {
    pub fn new(provider: Arc<dyn IdentityService>, session: Arc<AuthSession>) -> Self {
        AuthGateway { provider, session }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<AuthUser, AuthError> {
        if password != confirm {
            return Err(AuthError::PasswordMismatch);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        let user = self
            .provider
            .create_user(email, password)
            .await
            .map_err(log_failure)?;
        self.session.transition(Some(user.clone()));
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let user = self
            .provider
            .sign_in(email, password)
            .await
            .map_err(log_failure)?;
        self.session.transition(Some(user.clone()));
        Ok(user)
    }

    pub fn sign_out(&self) {
        if self.session.current().is_some() {
            self.session.transition(None);
        }
    }
}

fn log_failure(why: AuthError) -> AuthError {
    if let AuthError::Other(detail) = &why {
        error!("Identity provider failure: {}", detail);
    } else {
        debug!("Identity provider rejected request: {:?}", why);
    }
    why
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider;

    #[async_trait]
    impl IdentityService for FakeProvider {
        async fn create_user(&self, email: &str, _password: &str) -> Result<AuthUser, AuthError> {
            if email == "taken@example.com" {
                return Err(AuthError::from_provider_code("EMAIL_EXISTS"));
            }
            Ok(AuthUser {
                uid: "u1".into(),
                email: email.into(),
                id_token: "t".into(),
            })
        }

        async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
            if password != "hunter22" {
                return Err(AuthError::from_provider_code("INVALID_PASSWORD"));
            }
            Ok(AuthUser {
                uid: "u1".into(),
                email: email.into(),
                id_token: "t".into(),
            })
        }
    }

    fn gateway() -> AuthGateway {
        AuthGateway::new(Arc::new(FakeProvider), Arc::new(AuthSession::new()))
    }

    #[test]
    fn provider_codes_map_to_messages() {
        assert_eq!(
            AuthError::from_provider_code("EMAIL_EXISTS").to_string(),
            "Email này đã được đăng ký!"
        );
        assert_eq!(AuthError::from_provider_code("INVALID_EMAIL"), AuthError::InvalidEmail);
        assert_eq!(AuthError::from_provider_code("EMAIL_NOT_FOUND"), AuthError::UserNotFound);
        assert_eq!(
            AuthError::from_provider_code("INVALID_LOGIN_CREDENTIALS"),
            AuthError::WrongPassword
        );
        assert_eq!(
            AuthError::from_provider_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            AuthError::PasswordTooShort
        );
        let unknown = AuthError::from_provider_code("TOO_MANY_ATTEMPTS_TRY_LATER");
        assert_eq!(unknown.to_string(), "Có lỗi xảy ra. Vui lòng thử lại!");
    }

    #[test]
    fn parses_provider_payloads() {
        let ok = r#"{"localId": "abc", "email": "a@b.vn", "idToken": "tok", "refreshToken": "r", "expiresIn": "3600"}"#;
        assert_eq!(parse_account(true, ok).unwrap().uid, "abc");

        let rejected = r#"{"error": {"code": 400, "message": "EMAIL_NOT_FOUND", "errors": []}}"#;
        assert_eq!(parse_account(false, rejected), Err(AuthError::UserNotFound));

        assert!(matches!(parse_account(false, "bad gateway"), Err(AuthError::Other(_))));
    }

    #[tokio::test]
    async fn registration_validates_locally_first() {
        let gateway = gateway();
        assert_eq!(
            gateway.register("a@b.vn", "secret1", "secret2").await,
            Err(AuthError::PasswordMismatch)
        );
        assert_eq!(
            gateway.register("a@b.vn", "abc", "abc").await,
            Err(AuthError::PasswordTooShort)
        );
        assert_eq!(
            gateway.register("taken@example.com", "secret1", "secret1").await,
            Err(AuthError::EmailAlreadyInUse)
        );
        assert!(gateway.session().current().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_every_transition() {
        let gateway = gateway();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let id = gateway.session().subscribe(move |user| {
            log.lock().unwrap().push(user.map(|u| u.email.clone()));
        });

        gateway.sign_in("a@b.vn", "hunter22").await.unwrap();
        assert_eq!(gateway.sign_in("a@b.vn", "nope").await, Err(AuthError::WrongPassword));
        gateway.sign_out();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("a@b.vn".to_string()), None]
        );

        assert!(gateway.session().unsubscribe(id));
        assert!(!gateway.session().unsubscribe(id));
        gateway.sign_in("a@b.vn", "hunter22").await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn sign_out_without_user_is_silent() {
        let gateway = gateway();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        gateway.session().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        gateway.sign_out();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

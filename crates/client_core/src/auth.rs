//! Login form, auth client and the session kept in the token store.

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::UserProfile,
    protocol::{AuthTokens, LoginRequest, RegisterRequest},
    validation::{validate_email, validate_password, validate_password_check, FieldError},
};
use tracing::{error, info, warn};

use crate::{
    error::Result,
    http::{endpoint, read_json},
    load_state::LoadState,
    token_store::TokenStore,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub email: Option<FieldError>,
    pub password: Option<FieldError>,
    pub password_check: Option<FieldError>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none() && self.password_check.is_none()
    }

    fn first(&self) -> Option<FieldError> {
        self.email.or(self.password).or(self.password_check)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> FieldErrors {
        FieldErrors {
            email: validate_email(&self.email).err(),
            password: validate_password(&self.password).err(),
            password_check: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    pub fn to_request(&self) -> LoginRequest {
        LoginRequest {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_check: String,
}

impl RegisterForm {
    pub fn validate(&self) -> FieldErrors {
        FieldErrors {
            email: validate_email(&self.email).err(),
            password: validate_password(&self.password).err(),
            password_check: validate_password_check(&self.password, &self.password_check).err(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Validates and builds the request, reporting the first broken rule.
    pub fn to_request(&self) -> Result<RegisterRequest> {
        if let Some(err) = self.validate().first() {
            return Err(err.into());
        }
        Ok(RegisterRequest {
            email: self.email.clone(),
            password: self.password.clone(),
            password_check: self.password_check.clone(),
        })
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> Result<AuthTokens>;
    async fn register(&self, req: &RegisterRequest) -> Result<UserProfile>;
    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens>;
    async fn me(&self, access_token: &str) -> Result<UserProfile>;
}

pub struct AuthClient {
    http: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn login(&self, req: &LoginRequest) -> Result<AuthTokens> {
        let url = endpoint(&self.base_url, "auth/login")?;
        let res = self.http.post(url).json(req).send().await?;
        read_json(res).await
    }

    async fn register(&self, req: &RegisterRequest) -> Result<UserProfile> {
        let url = endpoint(&self.base_url, "auth/register")?;
        let res = self.http.post(url).json(req).send().await?;
        read_json(res).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        let url = endpoint(&self.base_url, "auth/refresh")?;
        let res = self.http.post(url).bearer_auth(refresh_token).send().await?;
        read_json(res).await
    }

    async fn me(&self, access_token: &str) -> Result<UserProfile> {
        let url = endpoint(&self.base_url, "user/me")?;
        let res = self.http.get(url).bearer_auth(access_token).send().await?;
        read_json(res).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub display_name: String,
    pub tokens: AuthTokens,
}

pub fn display_name(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

impl Session {
    /// Rebuilds the session from stored tokens. An expired access token is
    /// refreshed once; if that is rejected too the stored tokens are cleared
    /// and `None` is returned.
    pub async fn restore<A, S>(store: &S, api: &A) -> Result<Option<Session>>
    where
        A: AuthApi + ?Sized,
        S: TokenStore + ?Sized,
    {
        let Some(tokens) = store.load()? else {
            return Ok(None);
        };
        match api.me(&tokens.access_token).await {
            Ok(profile) => return Ok(Some(Self::for_profile(&profile, tokens))),
            Err(err) if err.is_unauthorized() => {
                info!("access token rejected; refreshing");
            }
            Err(err) => return Err(err),
        }

        let tokens = match api.refresh(&tokens.refresh_token).await {
            Ok(tokens) => tokens,
            Err(err) if err.is_unauthorized() => {
                warn!("refresh token rejected; clearing stored session");
                store.clear()?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        store.save(&tokens)?;
        let profile = api.me(&tokens.access_token).await?;
        Ok(Some(Self::for_profile(&profile, tokens)))
    }

    pub fn logout<S: TokenStore + ?Sized>(store: &S) -> Result<()> {
        store.clear()?;
        info!("logged out");
        Ok(())
    }

    fn for_profile(profile: &UserProfile, tokens: AuthTokens) -> Self {
        Self {
            display_name: display_name(&profile.email).to_string(),
            tokens,
        }
    }
}

pub struct LoginScreen<A: AuthApi, S: TokenStore> {
    api: A,
    store: S,
    form: LoginForm,
    errors: FieldErrors,
    email_touched: bool,
    password_touched: bool,
    status: LoadState<Session>,
}

impl<A: AuthApi, S: TokenStore> LoginScreen<A, S> {
    pub fn new(api: A, store: S) -> Self {
        let form = LoginForm::default();
        let errors = form.validate();
        Self {
            api,
            store,
            form,
            errors,
            email_touched: false,
            password_touched: false,
            status: LoadState::Idle,
        }
    }

    pub fn form(&self) -> &LoginForm {
        &self.form
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn status(&self) -> &LoadState<Session> {
        &self.status
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.form.email = email.into();
        self.email_touched = true;
        self.errors = self.form.validate();
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.form.password = password.into();
        self.password_touched = true;
        self.errors = self.form.validate();
    }

    pub fn submit_enabled(&self) -> bool {
        self.errors.is_empty()
    }

    pub async fn submit(&mut self) -> Result<Session> {
        self.errors = self.form.validate();
        if let Some(err) = self.errors.first() {
            self.email_touched = true;
            self.password_touched = true;
            return Err(err.into());
        }

        self.status = LoadState::Loading;
        match self.login().await {
            Ok(session) => {
                info!(user = %session.display_name, "login succeeded");
                self.status = LoadState::Ready(session.clone());
                Ok(session)
            }
            Err(err) => {
                error!(error = %err, "login failed");
                self.status = LoadState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    async fn login(&self) -> Result<Session> {
        let tokens = self.api.login(&self.form.to_request()).await?;
        self.store.save(&tokens)?;
        Ok(Session {
            display_name: display_name(&self.form.email).to_string(),
            tokens,
        })
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![format!("email:    {}", self.form.email)];
        if let Some(err) = self.errors.email.filter(|_| self.email_touched) {
            lines.push(format!("  ! {err}"));
        }
        lines.push(format!("password: {}", "*".repeat(self.form.password.chars().count())));
        if let Some(err) = self.errors.password.filter(|_| self.password_touched) {
            lines.push(format!("  ! {err}"));
        }
        lines.push(if self.submit_enabled() {
            "[ login ]".to_string()
        } else {
            "[ login (disabled) ]".to_string()
        });
        match &self.status {
            LoadState::Idle => {}
            LoadState::Loading => lines.push("logging in...".to_string()),
            LoadState::Failed(message) => lines.push(format!("login failed: {message}")),
            LoadState::Ready(session) => lines.push(format!("welcome, {}", session.display_name)),
        }
        lines
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;

// Cloud API HTTP client
//
// Wraps `reqwest::Client` with The Keys cloud specifics: form-encoded
// login, bearer-token inventory listing, and the lazy re-authentication
// contract. The token lives for the session and is refreshed exactly
// once per call when the cloud answers 401 -- there is no backoff on
// the cloud path, only that single transparent retry.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::cloud::models::{LoginResponse, Share};
use crate::error::Error;
use crate::transport::TransportConfig;

/// HTTP client for The Keys cloud API.
///
/// Owns the credential and the cached bearer token. All methods are
/// `&self`; the token cache is an async mutex so concurrent callers
/// share one re-login rather than racing.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
    token: Mutex<Option<String>>,
}

impl CloudClient {
    /// Create a client against `base_url` (e.g. `https://api.the-keys.fr`).
    ///
    /// Does not authenticate -- the first request that needs a token
    /// triggers the login lazily.
    pub fn new(
        base_url: Url,
        username: impl Into<String>,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_cloud_client()?,
            base_url,
            username: username.into(),
            password,
            token: Mutex::new(None),
        })
    }

    /// The cloud base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Authenticate and cache the bearer token.
    ///
    /// `POST /api/login_check` with form fields `_username` / `_password`.
    /// The username is the account phone number in international format.
    pub async fn login(&self) -> Result<(), Error> {
        let url = self.base_url.join("api/login_check")?;
        debug!("logging in at {}", url);

        let resp = self
            .http
            .post(url)
            .form(&[
                ("_username", self.username.as_str()),
                ("_password", self.password.expose_secret()),
            ])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: "bad credentials".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Service {
                message: preview(&body).to_owned(),
                status: status.as_u16(),
            });
        }

        let login: LoginResponse = parse_json(resp).await?;
        *self.token.lock().await = Some(login.token);
        debug!("login successful");
        Ok(())
    }

    /// List the account's shares (lock + gateway inventory).
    ///
    /// `GET /fr/api/v2/share/all` with `Authorization: Bearer <token>`.
    /// A stale token gets exactly one transparent re-login and retry;
    /// a second 401 surfaces as [`Error::Authentication`].
    pub async fn list_devices(&self) -> Result<Vec<Share>, Error> {
        match self.fetch_shares().await {
            Err(ref e) if e.is_auth_expired() => {
                debug!("bearer token stale -- re-authenticating once");
                self.login().await?;
                self.fetch_shares().await
            }
            other => other,
        }
    }

    async fn fetch_shares(&self) -> Result<Vec<Share>, Error> {
        let token = self.ensure_token().await?;
        let url = self.base_url.join("fr/api/v2/share/all")?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Invalidate so the retry path logs in again.
            *self.token.lock().await = None;
            return Err(Error::Authentication {
                message: "bearer token rejected".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Service {
                message: preview(&body).to_owned(),
                status: status.as_u16(),
            });
        }

        parse_json(resp).await
    }

    /// Return the cached token, logging in first if there is none yet.
    async fn ensure_token(&self) -> Result<String, Error> {
        if let Some(token) = self.token.lock().await.clone() {
            return Ok(token);
        }
        self.login().await?;
        self.token
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::Authentication {
                message: "login returned no token".into(),
            })
    }
}

/// Deserialize a response body, keeping a body preview for diagnostics.
async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let body = resp.text().await.map_err(Error::Transport)?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body,
    })
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

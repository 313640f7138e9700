//! HTTP client for the Gazette server.

use reqwest::header::{HeaderValue, COOKIE, SET_COOKIE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::CliError;

/// A newsletter as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
struct NewsletterBody<'a> {
    title: &'a str,
    content: &'a str,
}

/// Logged-in client; every request carries the session cookie.
#[derive(Debug, Clone)]
pub struct GazetteClient {
    http: reqwest::Client,
    base_url: String,
    cookie: HeaderValue,
}

impl GazetteClient {
    /// Log in and keep the returned session cookie.
    pub async fn login(base_url: &str, username: &str, password: &str) -> Result<Self, CliError> {
        let http = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        let response = http
            .post(format!("{base_url}/auth"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let response = check(response).await?;

        let cookie = session_cookie(&response).ok_or(CliError::MissingSession)?;
        debug!(user = username, "logged in");

        Ok(Self {
            http,
            base_url,
            cookie,
        })
    }

    pub async fn create(&self, title: &str, content: &str) -> Result<Newsletter, CliError> {
        let response = self
            .authed(self.http.post(self.url("/newsletters")))
            .json(&NewsletterBody { title, content })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn update(&self, id: i64, title: &str, content: &str) -> Result<Value, CliError> {
        let response = self
            .authed(self.http.put(self.url(&format!("/newsletters/{id}"))))
            .json(&NewsletterBody { title, content })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn list(&self) -> Result<Vec<Newsletter>, CliError> {
        let response = self
            .authed(self.http.get(self.url("/newsletters")))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Open the live change stream. The body is read chunk by chunk.
    pub async fn events(&self) -> Result<Response, CliError> {
        let response = self
            .authed(self.http.get(self.url("/newsletter/events")))
            .send()
            .await?;
        check(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(COOKIE, self.cookie.clone())
    }
}

async fn check(response: Response) -> Result<Response, CliError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CliError::Server {
        status: status.as_u16(),
        detail: error_detail(status, &body),
    })
}

// Prefer the server's `detail` field; fall back to the raw body.
fn error_detail(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("detail").and_then(Value::as_str) {
            Some(detail) => detail.to_string(),
            None => body.to_string(),
        },
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body.to_string(),
    }
}

fn session_cookie(response: &Response) -> Option<HeaderValue> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            let pair = value.split(';').next()?.trim();
            let (name, session) = pair.split_once('=')?;
            (name == "session" && !session.is_empty()).then(|| pair.to_string())
        })
        .and_then(|pair| HeaderValue::from_str(&pair).ok())
}

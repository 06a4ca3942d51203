//! Signature acquisition through the web login flow.
//!
//! The server hands out a one-time signature on the page served right after a
//! successful form login. The signature sits in the first `<script>` element:
//! everything up to the first `;` holds a single-quoted literal, and that
//! literal is the signature.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use reqwest::header::REFERER;
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{LinkError, Result, error_chain};
use crate::tls;

/// Default login page.
pub const DEFAULT_LOGIN_URL: &str = "https://idle-pixel.com/login/";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

static SCRIPT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").unwrap());
static CSRF_INPUT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<input\b[^>]*\bname\s*=\s*["']csrfmiddlewaretoken["'][^>]*>"#).unwrap()
});
static VALUE_ATTR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)\bvalue\s*=\s*["']([^"']*)["']"#).unwrap());

/// Source of one-time login signatures.
///
/// Implementations either return a non-empty signature or an error; they
/// never return a partial value.
#[async_trait]
pub trait SignatureSource: Send + Sync {
    /// Run the login flow and return a fresh signature.
    async fn acquire(&self, credentials: &Credentials) -> Result<String>;
}

/// Extract the signature from the post-login page.
pub fn extract_signature(html: &str) -> Result<String> {
    let script = SCRIPT_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| LinkError::auth_flow("no <script> element in post-login page"))?;

    let head = script.split(';').next().unwrap_or_default();
    let signature = head
        .split('\'')
        .nth(1)
        .ok_or_else(|| LinkError::auth_flow("no quoted signature in first script statement"))?;

    if signature.is_empty() {
        return Err(LinkError::auth_flow("signature is empty"));
    }
    Ok(signature.to_string())
}

/// Extract the CSRF form token from the login page, if it has one.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    let input = CSRF_INPUT_REGEX.find(html)?;
    VALUE_ATTR_REGEX
        .captures(input.as_str())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|token| !token.is_empty())
}

/// Logs in through the HTML form and scrapes the signature.
#[derive(Debug, Clone)]
pub struct HttpLoginFlow {
    login_url: String,
    request_timeout: Option<Duration>,
}

impl Default for HttpLoginFlow {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_URL)
    }
}

impl HttpLoginFlow {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
            request_timeout: None,
        }
    }

    /// Bound each HTTP request. Unset means requests may take arbitrarily long.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Build a fresh client with its own cookie jar. No session cookies are
    /// carried from one attempt to the next.
    fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .use_preconfigured_tls(tls::verifying_config()?)
            .cookie_store(true)
            .user_agent(DEFAULT_USER_AGENT);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    async fn run_flow(&self, credentials: &Credentials) -> Result<String> {
        let client = self.build_client()?;

        debug!("Fetching login page {}", self.login_url);
        let login_page = client
            .get(&self.login_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut form = vec![
            ("username", credentials.username().to_string()),
            ("password", credentials.password().to_string()),
        ];
        if let Some(token) = extract_csrf_token(&login_page) {
            form.push(("csrfmiddlewaretoken", token));
        }

        debug!("Submitting login form for {}", credentials.username());
        let landing_page = client
            .post(&self.login_url)
            .header(REFERER, self.login_url.as_str())
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        extract_signature(&landing_page)
    }
}

#[async_trait]
impl SignatureSource for HttpLoginFlow {
    async fn acquire(&self, credentials: &Credentials) -> Result<String> {
        self.run_flow(credentials).await.map_err(|e| match e {
            LinkError::AuthFlow(_) => e,
            other => LinkError::AuthFlow(error_chain(&other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extract_signature_from_first_script() {
        let html = r#"<html><head><script>var sig = 'abc123'; var other = 'nope';</script>
            <script>var x = 'second';</script></head></html>"#;
        assert_eq!(extract_signature(html).unwrap(), "abc123");
    }

    #[test]
    fn test_extract_signature_ignores_quotes_after_semicolon() {
        let html = "<script>var sig = 1; var s = 'late';</script>";
        assert!(matches!(
            extract_signature(html),
            Err(LinkError::AuthFlow(_))
        ));
    }

    #[test]
    fn test_extract_signature_rejects_empty_literal() {
        let html = "<script>var sig = '';</script>";
        let err = extract_signature(html).unwrap_err();
        assert!(matches!(err, LinkError::AuthFlow(ref m) if m.contains("empty")));
    }

    #[test]
    fn test_extract_signature_without_script() {
        let html = "<html><body>Invalid username or password</body></html>";
        assert!(matches!(
            extract_signature(html),
            Err(LinkError::AuthFlow(_))
        ));
    }

    #[test]
    fn test_extract_signature_script_with_attributes() {
        let html = r#"<SCRIPT type="text/javascript">
            Globals.init('tok-42.x');
        </SCRIPT>"#;
        assert_eq!(extract_signature(html).unwrap(), "tok-42.x");
    }

    #[test]
    fn test_extract_csrf_token() {
        let html = r#"<form method="post">
            <input type="hidden" name="csrfmiddlewaretoken" value="Zx9csrf">
            <input id="id_username" name="username"></form>"#;
        assert_eq!(extract_csrf_token(html).as_deref(), Some("Zx9csrf"));

        let reordered = r#"<input value='v1' type='hidden' name='csrfmiddlewaretoken'/>"#;
        assert_eq!(extract_csrf_token(reordered).as_deref(), Some("v1"));

        assert_eq!(extract_csrf_token("<form></form>"), None);
    }

    #[tokio::test]
    async fn test_unreachable_login_page_is_auth_flow_error() {
        // port 9 (discard) on loopback is closed in test environments
        let flow = HttpLoginFlow::new("http://127.0.0.1:9/login/")
            .with_request_timeout(Duration::from_secs(5));
        let creds = Credentials::new("alice", "secret");
        let err = flow.acquire(&creds).await.unwrap_err();
        assert!(matches!(err, LinkError::AuthFlow(_)));
    }

    mod login_server {
        use std::collections::HashMap;

        use axum::http::header::{COOKIE, SET_COOKIE};
        use axum::http::{HeaderMap, StatusCode};
        use axum::response::{Html, IntoResponse, Response};
        use axum::routing::get;
        use axum::{Form, Router};

        async fn login_page() -> impl IntoResponse {
            (
                [(SET_COOKIE, "csrftoken=cookie-token; Path=/")],
                Html(
                    r#"<form method="post">
                    <input type="hidden" name="csrfmiddlewaretoken" value="form-token">
                    <input id="id_username" name="username">
                    <input id="id_password" name="password" type="password">
                    </form>"#,
                ),
            )
        }

        async fn submit(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
            let cookie_ok = headers
                .get(COOKIE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|c| c.contains("csrftoken=cookie-token"));
            let field = |name: &str| form.get(name).map(String::as_str);
            let form_ok = field("username") == Some("alice")
                && field("password") == Some("secret")
                && field("csrfmiddlewaretoken") == Some("form-token");

            if cookie_ok && form_ok {
                Html("<html><script>var sig = 'srv-sig'; boot(sig);</script></html>").into_response()
            } else {
                (StatusCode::FORBIDDEN, "denied").into_response()
            }
        }

        /// Serve a minimal form login on loopback and return its login URL.
        pub async fn spawn() -> String {
            let app = Router::new().route("/login/", get(login_page).post(submit));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{addr}/login/")
        }
    }

    #[tokio::test]
    async fn test_login_flow_against_loopback_server() {
        let url = login_server::spawn().await;
        let flow = HttpLoginFlow::new(url).with_request_timeout(Duration::from_secs(10));

        let signature = flow
            .acquire(&Credentials::new("alice", "secret"))
            .await
            .unwrap();
        assert_eq!(signature, "srv-sig");
    }

    #[tokio::test]
    async fn test_login_flow_rejected_credentials() {
        let url = login_server::spawn().await;
        let flow = HttpLoginFlow::new(url).with_request_timeout(Duration::from_secs(10));

        let err = flow
            .acquire(&Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::AuthFlow(ref m) if m.contains("403")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_extracts_any_plain_token(token in "[A-Za-z0-9_.-]{1,64}", tail in "[a-z ]{0,20}") {
            let html = format!("<html><script>init('{token}', 1);{tail}</script></html>");
            prop_assert_eq!(extract_signature(&html).unwrap(), token);
        }
    }
}

//! OAuth 2.0 PKCE flow for Google APIs.
//!
//! Authorization Code flow with PKCE, using a loopback redirect:
//!
//! 1. Generate a code verifier and its SHA-256 challenge
//! 2. Bind a local HTTP listener on the first free port in the range
//! 3. Open the browser on Google's consent page
//! 4. Read the authorization code from the redirect
//! 5. Exchange the code (with the verifier) for access and refresh tokens

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

/// Google OAuth consent page.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Random bytes in a code verifier. Encodes to 43 characters.
const VERIFIER_BYTES: usize = 32;

/// Random bytes in the anti-forgery state.
const STATE_BYTES: usize = 16;

/// How long the user has to finish consent in the browser.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// A refreshed access token.
#[derive(Debug)]
pub struct RefreshedToken {
    /// The new access token.
    pub access_token: String,
    /// Lifetime in seconds, if reported.
    pub expires_in: Option<i64>,
    /// A rotated refresh token, if Google issued one.
    pub refresh_token: Option<String>,
}

/// Talks to Google's consent page and token endpoint.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    token_url: String,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client talking to `token_url`.
    pub fn new(
        credentials: OAuthCredentials,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::internal(format!("cannot build OAuth HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            token_url: token_url.into(),
            http,
        })
    }

    /// Runs the interactive consent flow and returns the obtained tokens.
    ///
    /// Blocks until the browser redirect arrives or five minutes pass.
    pub async fn authorize(
        &self,
        scopes: &[String],
        ports: (u16, u16),
    ) -> ProviderResult<TokenInfo> {
        let pkce = Pkce::generate();

        let (listener, port) = bind_loopback(ports)?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let consent_url = pkce.consent_url(&self.credentials.client_id, &redirect_uri, scopes)?;

        info!(port, "waiting for Google consent in the browser");
        debug!(url = %consent_url, "consent URL");
        if let Err(e) = open::that(consent_url.as_str()) {
            warn!("cannot open a browser: {}", e);
            eprintln!("\nOpen this URL to authorize calsync:\n\n{}\n", consent_url);
        }

        let (code, state) = wait_for_callback(listener)?;
        if state != pkce.state {
            return Err(ProviderError::authentication(
                "OAuth callback state does not match the request",
            ));
        }

        debug!("exchanging authorization code");
        self.exchange_code(&code, &pkce.verifier, &redirect_uri, scopes)
            .await
    }

    /// Obtains a new access token with a refresh token.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self.post_token("token refresh", &params).await?;

        info!("refreshed Google access token");
        Ok(RefreshedToken {
            access_token: response.access_token,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
        })
    }

    /// Trades the redirect's code and the PKCE verifier for tokens.
    ///
    /// The granted scopes come from the response; when Google omits them the
    /// requested scopes are assumed.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<TokenInfo> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_uri),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self.post_token("token exchange", &params).await?;

        info!("obtained Google tokens");
        let granted = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => scopes.to_vec(),
        };
        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            granted,
        ))
    }

    async fn post_token(
        &self,
        context: &str,
        params: &[(&str, &str)],
    ) -> ProviderResult<TokenResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(context, e))?;

        let code = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_transport(context, e))?;

        // Google answers a revoked or invalid grant with 400
        if !code.is_success() {
            return Err(ProviderError::authentication(format!(
                "{} failed ({}): {}",
                context,
                code,
                body.trim()
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })
    }
}

/// Binds the redirect listener on the first free port of `ports`.
fn bind_loopback(ports: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    (ports.0..=ports.1)
        .find_map(|port| {
            TcpListener::bind(("127.0.0.1", port))
                .ok()
                .map(|listener| (listener, port))
        })
        .ok_or_else(|| {
            ProviderError::configuration(format!(
                "every loopback port from {} to {} is taken",
                ports.0, ports.1
            ))
        })
}

/// Serves the redirect listener on a helper thread until the redirect arrives.
fn wait_for_callback(listener: TcpListener) -> ProviderResult<(String, String)> {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    error!("loopback accept failed: {}", e);
                    continue;
                }
            };
            if let Some(result) = handle_callback(stream) {
                let _ = tx.send(result);
                break;
            }
        }
    });

    rx.recv_timeout(CALLBACK_TIMEOUT).unwrap_or_else(|e| match e {
        mpsc::RecvTimeoutError::Timeout => Err(ProviderError::authentication(format!(
            "no OAuth redirect within {} seconds",
            CALLBACK_TIMEOUT.as_secs()
        ))),
        mpsc::RecvTimeoutError::Disconnected => {
            Err(ProviderError::internal("loopback listener stopped"))
        }
    })
}

/// Answers one request on the callback server.
///
/// Returns `None` for requests that are not the OAuth redirect, such as a
/// browser asking for `/favicon.ico`.
fn handle_callback(mut stream: TcpStream) -> Option<ProviderResult<(String, String)>> {
    let mut line = String::new();
    BufReader::new(&stream).read_line(&mut line).ok()?;

    let result = parse_callback(&line)?;

    let (status, message) = if result.is_ok() {
        ("200 OK", "calsync is authorized. You can close this tab.")
    } else {
        ("400 Bad Request", "calsync was not authorized. You can close this tab.")
    };
    let page = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nConnection: close\r\n\r\n{}\n",
        status, message
    );
    let _ = stream.write_all(page.as_bytes());
    let _ = stream.flush();

    Some(result)
}

/// Parses `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback(request_line: &str) -> Option<ProviderResult<(String, String)>> {
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return None;
    }
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != "/callback" {
        return None;
    }

    let (mut code, mut state, mut denied) = (None, String::new(), None);
    for (key, value) in query.split('&').filter_map(|pair| pair.split_once('=')) {
        let Ok(value) = urlencoding::decode(value) else {
            continue;
        };
        match key {
            "code" => code = Some(value.into_owned()),
            "state" => state = value.into_owned(),
            "error" => denied = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(reason) = denied {
        return Some(Err(ProviderError::authentication(format!(
            "consent refused: {}",
            reason
        ))));
    }

    Some(
        code.map(|code| (code, state))
            .ok_or_else(|| ProviderError::authentication("OAuth redirect carried no code")),
    )
}

/// One authorization attempt's PKCE secrets (RFC 7636) and state.
struct Pkce {
    verifier: String,
    challenge: String,
    state: String,
}

impl Pkce {
    fn generate() -> Self {
        let verifier = random_token(VERIFIER_BYTES);
        Self {
            challenge: challenge_for(&verifier),
            verifier,
            state: random_token(STATE_BYTES),
        }
    }

    /// Google's consent page URL for this attempt.
    ///
    /// Asks for offline access so a refresh token is issued.
    fn consent_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<url::Url> {
        let scope = scopes.join(" ");
        url::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            [
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("code_challenge", self.challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", self.state.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| ProviderError::internal(format!("cannot build consent URL: {}", e)))
    }
}

/// S256 challenge: unpadded base64url of the verifier's SHA-256.
fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_token(bytes: usize) -> String {
    let mut rng = rand::rng();
    let raw: Vec<u8> = (0..bytes).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(raw)
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    scope: Option<String>,
}

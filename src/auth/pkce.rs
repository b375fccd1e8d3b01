//! PKCE material and the loopback redirect listener.

use super::error::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
const MAX_REQUEST_HEAD_BYTES: usize = 16 * 1024;

/// Code verifier plus its S256 challenge.
#[derive(Debug, Clone)]
pub(crate) struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let verifier: String = (0..64)
            .map(|_| VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())] as char)
            .collect();
        let challenge = s256_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

pub(crate) fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random CSRF `state` value.
pub(crate) fn generate_state() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One-shot HTTP listener on 127.0.0.1 that captures the OAuth redirect.
pub(crate) struct CallbackListener {
    listener: TcpListener,
    port: u16,
    path: &'static str,
}

impl CallbackListener {
    /// Bind the loopback listener. Port 0 picks an ephemeral port.
    pub async fn bind(port: u16, path: &'static str) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|err| {
            AuthError::AuthFailed(format!(
                "cannot listen for the OAuth redirect on port {port}: {err}"
            ))
        })?;
        let port = listener
            .local_addr()
            .map_err(|err| AuthError::AuthFailed(format!("callback listener: {err}")))?
            .port();
        Ok(Self {
            listener,
            port,
            path,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{}", self.port, self.path)
    }

    /// Wait for the redirect and return the authorization code.
    ///
    /// Requests for other paths (favicon probes and the like) are answered
    /// with 404 and ignored.
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: Duration,
    ) -> Result<String, AuthError> {
        match tokio::time::timeout(timeout, self.accept_until_callback(expected_state)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::AuthFailed(format!(
                "no authorization callback received within {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn accept_until_callback(&self, expected_state: &str) -> Result<String, AuthError> {
        loop {
            let (mut stream, _) = self
                .listener
                .accept()
                .await
                .map_err(|err| AuthError::AuthFailed(format!("callback listener: {err}")))?;
            let Some(target) = read_request_target(&mut stream).await else {
                continue;
            };
            let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
                respond(&mut stream, 400, "Malformed request.").await;
                continue;
            };
            if url.path() != self.path {
                debug!(path = url.path(), "ignoring non-callback request");
                respond(&mut stream, 404, "Not found.").await;
                continue;
            }

            let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
            let outcome = callback_outcome(&params, expected_state);
            match &outcome {
                Ok(_) => {
                    respond(
                        &mut stream,
                        200,
                        "Sign-in complete. You can close this tab and return to the app.",
                    )
                    .await
                }
                Err(err) => respond(&mut stream, 400, &format!("Sign-in failed: {err}")).await,
            }
            return outcome;
        }
    }
}

fn callback_outcome(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> Result<String, AuthError> {
    if let Some(error) = params.get("error") {
        let detail = params
            .get("error_description")
            .map(|d| format!("{error}: {d}"))
            .unwrap_or_else(|| error.clone());
        return Err(AuthError::AuthFailed(detail));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::AuthFailed(
            "state mismatch in authorization callback".to_string(),
        ));
    }
    match params.get("code").map(|c| c.trim()) {
        Some(code) if !code.is_empty() => Ok(code.to_string()),
        _ => Err(AuthError::AuthFailed(
            "authorization callback did not include a code".to_string(),
        )),
    }
}

async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        if buf.len() > MAX_REQUEST_HEAD_BYTES {
            return None;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    parts.next().map(str::to_string)
}

async fn respond(stream: &mut TcpStream, status: u16, message: &str) {
    let body = format!(
        "<!DOCTYPE html><html><body style=\"font-family: system-ui; text-align: center; padding-top: 80px;\"><p>{message}</p></body></html>"
    );
    let head = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        if status == 200 { "OK" } else { "Error" },
        body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(body.as_bytes()).await;
    let _ = stream.shutdown().await;
}

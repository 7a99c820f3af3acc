//! # Authorization Callback
//!
//! Receives the browser redirect that completes an authorization request.
//!
//! [`LocalCallbackServer`] binds the redirect URI's host and port before the
//! browser is opened, answers exactly one request on the redirect path, and
//! then closes the socket. Requests for other paths (favicons, probes) get a
//! 404 and the wait continues. The wait is always bounded.
//!
//! Connections are served concurrently and each has a few seconds to send
//! its request head, so a browser's idle preconnect cannot hold up the
//! redirect. A `localhost` redirect listens on both `127.0.0.1` and `::1`.

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use core_async::with_timeout;
use std::io;
use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Time a connection gets to deliver its request head before it is dropped.
const HEAD_READ_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>Signed in</title></head>\
<body><h1>Authentication complete</h1><p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><title>Sign-in failed</title></head>\
<body><h1>Authentication failed</h1><p>Return to the terminal for details.</p></body></html>";

/// Query parameters delivered to the redirect URI.
#[derive(Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl std::fmt::Debug for CallbackParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParams")
            .field("code", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Source of authorization callbacks.
///
/// `listen` must succeed before the browser is sent to the authorization
/// endpoint so the redirect cannot arrive before anyone is listening.
#[async_trait]
pub trait AuthorizationCallback: Send + Sync {
    async fn listen(&self, redirect_uri: &str) -> Result<Box<dyn PendingCallback>>;
}

/// A listener waiting for one callback.
#[async_trait]
pub trait PendingCallback: Send {
    /// Waits for the callback, failing with `Timeout` once `limit` elapses.
    async fn wait(self: Box<Self>, limit: Duration) -> Result<CallbackParams>;
}

/// Loopback HTTP listener for the redirect URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCallbackServer;

impl LocalCallbackServer {
    pub fn new() -> Self {
        Self
    }

    /// Binds the host and port named by `redirect_uri`.
    #[instrument(skip(self))]
    pub async fn bind(&self, redirect_uri: &str) -> Result<LocalCallback> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::Configuration(format!("invalid redirect URI: {e}")))?;
        let port = url.port_or_known_default().ok_or_else(|| {
            AuthError::Configuration("redirect URI must name a port".to_string())
        })?;
        let is_localhost = matches!(url.host_str(), Some("localhost") | None);
        let host = if is_localhost {
            "127.0.0.1"
        } else {
            url.host_str()
                .unwrap_or_default()
                .trim_start_matches('[')
                .trim_end_matches(']')
        };

        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            if e.kind() == io::ErrorKind::AddrInUse {
                warn!(port, "Callback port already in use");
                AuthError::CallbackPortInUse { port }
            } else {
                AuthError::Configuration(format!("cannot listen on {host}:{port}: {e}"))
            }
        })?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        debug!(%local_addr, "Callback listener bound");

        // Browsers may resolve `localhost` to either loopback address.
        let ipv6 = if is_localhost {
            bind_ipv6_loopback(local_addr.port()).await
        } else {
            None
        };

        Ok(LocalCallback {
            listener,
            ipv6,
            local_addr,
            path: url.path().to_string(),
        })
    }
}

async fn bind_ipv6_loopback(port: u16) -> Option<TcpListener> {
    match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
        Ok(listener) => {
            debug!(port, "Callback listener bound on ::1");
            Some(listener)
        }
        Err(e) => {
            debug!(port, error = %e, "IPv6 loopback unavailable; listening on IPv4 only");
            None
        }
    }
}

#[async_trait]
impl AuthorizationCallback for LocalCallbackServer {
    async fn listen(&self, redirect_uri: &str) -> Result<Box<dyn PendingCallback>> {
        Ok(Box::new(self.bind(redirect_uri).await?))
    }
}

/// A bound callback listener. Dropping it closes the socket.
#[derive(Debug)]
pub struct LocalCallback {
    listener: TcpListener,
    ipv6: Option<TcpListener>,
    local_addr: SocketAddr,
    path: String,
}

impl LocalCallback {
    /// Address of the primary listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Every address accepting callbacks, primary first.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        std::iter::once(self.local_addr)
            .chain(self.ipv6.as_ref().and_then(|l| l.local_addr().ok()))
            .collect()
    }

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        match &self.ipv6 {
            Some(ipv6) => tokio::select! {
                accepted = self.listener.accept() => accepted,
                accepted = ipv6.accept() => accepted,
            },
            None => self.listener.accept().await,
        }
    }

    /// Serves connections until one of them settles the authorization.
    /// Pending connection tasks are aborted when this returns.
    async fn accept_callback(&self) -> Result<CallbackParams> {
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(stream, peer, self.path.clone()));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept callback connection"),
                },
                Some(joined) = connections.join_next() => match joined {
                    Ok(Some(outcome)) => return outcome,
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "Callback connection task ended abnormally"),
                },
            }
        }
    }
}

/// Answers one connection. `None` means the connection did not settle the
/// authorization and the wait goes on.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    path: String,
) -> Option<Result<CallbackParams>> {
    let head = core_async::time::timeout(HEAD_READ_TIMEOUT, read_request_target(&mut stream)).await;
    let target = match head {
        Ok(Ok(Some(target))) => target,
        Ok(Ok(None)) => {
            respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
            return None;
        }
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "Dropped unreadable callback connection");
            return None;
        }
        Err(_) => {
            debug!(%peer, "Dropped idle callback connection");
            return None;
        }
    };

    match classify(&path, &target) {
        Callback::OtherPath => {
            debug!(%peer, "Ignoring request for unrelated path");
            respond(&mut stream, "404 Not Found", "").await;
            None
        }
        Callback::Denied(reason) => {
            respond(&mut stream, "200 OK", FAILURE_PAGE).await;
            Some(Err(AuthError::Authentication(reason)))
        }
        Callback::Incomplete => {
            respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
            Some(Err(AuthError::Authentication(
                "authorization callback is missing code or state".to_string(),
            )))
        }
        Callback::Authorized(params) => {
            respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
            info!("Authorization callback received");
            Some(Ok(params))
        }
    }
}

#[async_trait]
impl PendingCallback for LocalCallback {
    async fn wait(self: Box<Self>, limit: Duration) -> Result<CallbackParams> {
        with_timeout(limit, self.accept_callback())
            .await
            .map_err(|e| e.during("Waiting for browser authorization"))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Callback {
    OtherPath,
    Denied(String),
    Incomplete,
    Authorized(CallbackParams),
}

fn classify(expected_path: &str, target: &str) -> Callback {
    let Ok(url) = Url::parse("http://localhost").and_then(|base| base.join(target)) else {
        return Callback::OtherPath;
    };
    if url.path() != expected_path {
        return Callback::OtherPath;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        let reason = match description {
            Some(description) => format!("authorization server returned {error}: {description}"),
            None => format!("authorization server returned {error}"),
        };
        return Callback::Denied(reason);
    }

    match (code, state) {
        (Some(code), Some(state)) if !code.is_empty() => {
            Callback::Authorized(CallbackParams { code, state })
        }
        _ => Callback::Incomplete,
    }
}

/// Reads the request head and returns the request-line target, or `None`
/// when the head is malformed.
async fn read_request_target(stream: &mut TcpStream) -> io::Result<Option<String>> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..read]);
        if head.windows(4).any(|window| window == b"\r\n\r\n") || head.len() >= MAX_REQUEST_HEAD {
            break;
        }
    }

    let head = String::from_utf8_lossy(&head);
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
        _ => Ok(None),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        debug!(error = %e, "Failed to write callback response");
    }
    let _ = stream.shutdown().await;
}

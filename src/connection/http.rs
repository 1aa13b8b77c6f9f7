//! JSON-RPC over HTTP.
//!
//! Each request is a POST of the JSON-RPC envelope to `<base-url>/<method>`
//! (`/tools/list`, `/tools/call`). The transport is stateless; the
//! `reqwest::Client` is the only thing kept between calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use crate::config::{AuthConfig, HttpTransportConfig, OrchestratorSettings, TransportKind};

use super::errors::ConnectionError;
use super::transport::{
    extract_result, next_request_id, tools_call_params, tools_from_list_result, Connection,
};
use super::types::{JsonRpcRequest, JsonRpcResponse, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};

/// Error bodies are truncated to this many bytes in error messages.
const MAX_ERROR_BODY: usize = 512;

/// A tool server reached over HTTP.
pub struct HttpConnection {
    server: String,
    base_url: String,
    auth: AuthConfig,
    http: HttpClient,
    discovery_timeout: Duration,
}

impl HttpConnection {
    /// Validate the URL and build the HTTP client. No request is sent.
    pub fn connect(
        server: &str,
        config: &HttpTransportConfig,
        settings: &OrchestratorSettings,
    ) -> Result<Self, ConnectionError> {
        let base_url = config.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConnectionError::InvalidDescriptor {
                server: server.to_string(),
                reason: "url is empty".into(),
            });
        }

        let parsed = reqwest::Url::parse(&base_url).map_err(|e| ConnectionError::InvalidDescriptor {
            server: server.to_string(),
            reason: format!("invalid url '{base_url}': {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConnectionError::InvalidDescriptor {
                server: server.to_string(),
                reason: format!("unsupported url scheme '{}'", parsed.scheme()),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .map_err(|e| ConnectionError::Http {
                server: server.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        tracing::debug!(server, url = %base_url, "http tool server configured");

        Ok(Self {
            server: server.to_string(),
            base_url,
            auth: config.auth.clone(),
            http,
            discovery_timeout: settings.http_discovery_timeout(),
        })
    }

    /// POST one JSON-RPC request and return its `result`.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ConnectionError> {
        let id = next_request_id();
        let url = format!("{}/{method}", self.base_url);
        let body = JsonRpcRequest::new(id, method, params);

        let builder = self.http.post(&url).json(&body);
        let builder = match &self.auth {
            AuthConfig::None => builder,
            AuthConfig::Bearer { token } => builder.bearer_auth(token),
            AuthConfig::Basic { username, password } => builder.basic_auth(username, Some(password)),
        };

        tracing::debug!(server = %self.server, method, id, "sending http request");

        let response = builder.send().await.map_err(|e| ConnectionError::Http {
            server: self.server.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ConnectionError::Http {
            server: self.server.clone(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(ConnectionError::HttpStatus {
                server: self.server.clone(),
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let parsed: JsonRpcResponse =
            serde_json::from_str(&text).map_err(|e| ConnectionError::MalformedResponse {
                server: self.server.clone(),
                reason: format!("invalid JSON-RPC body: {e}"),
            })?;

        extract_result(&self.server, parsed)
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    async fn discover(&self) -> Result<Vec<serde_json::Value>, ConnectionError> {
        let result = self.request(METHOD_TOOLS_LIST, None).await?;
        tools_from_list_result(&self.server, result)
    }

    async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ConnectionError> {
        self.request(METHOD_TOOLS_CALL, Some(tools_call_params(name, arguments)))
            .await
    }

    async fn close(&self) {
        // Nothing to tear down: dropping the client closes idle sockets.
        tracing::debug!(server = %self.server, "http connection closed");
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &body[..end])
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One request as seen by the stub server.
    #[derive(Debug, Clone)]
    struct Captured {
        path: String,
        authorization: Option<String>,
        body: serde_json::Value,
    }

    /// Minimal HTTP/1.1 stub: answers every request with `status` and a
    /// body produced from the request's JSON-RPC envelope.
    async fn stub_server<F>(status: u16, respond: F) -> (String, Arc<Mutex<Vec<Captured>>>)
    where
        F: Fn(&serde_json::Value) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let log = captured.clone();
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let log = log.clone();
                let respond = respond.clone();
                tokio::spawn(async move {
                    let mut raw = Vec::new();
                    let mut buf = [0u8; 4096];
                    let (head_end, content_length) = loop {
                        let n = socket.read(&mut buf).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        raw.extend_from_slice(&buf[..n]);
                        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                            let head = String::from_utf8_lossy(&raw[..pos]).to_string();
                            let len = head
                                .lines()
                                .find_map(|l| {
                                    let (k, v) = l.split_once(':')?;
                                    k.eq_ignore_ascii_case("content-length")
                                        .then(|| v.trim().parse::<usize>().ok())
                                        .flatten()
                                })
                                .unwrap_or(0);
                            break (pos + 4, len);
                        }
                    };
                    while raw.len() < head_end + content_length {
                        let n = socket.read(&mut buf).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        raw.extend_from_slice(&buf[..n]);
                    }

                    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
                    let path = head
                        .lines()
                        .next()
                        .and_then(|l| l.split_whitespace().nth(1))
                        .unwrap_or_default()
                        .to_string();
                    let authorization = head.lines().find_map(|l| {
                        let (k, v) = l.split_once(':')?;
                        k.eq_ignore_ascii_case("authorization").then(|| v.trim().to_string())
                    });
                    let body: serde_json::Value =
                        serde_json::from_slice(&raw[head_end..]).unwrap_or(serde_json::Value::Null);

                    let reply = respond(&body);
                    log.lock().unwrap().push(Captured {
                        path,
                        authorization,
                        body,
                    });

                    let response = format!(
                        "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                        reply.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), captured)
    }

    fn connection(url: &str, auth: AuthConfig) -> HttpConnection {
        let config = HttpTransportConfig {
            url: url.to_string(),
            auth,
        };
        HttpConnection::connect("bookings", &config, &OrchestratorSettings::default()).unwrap()
    }

    fn reply_with(result: serde_json::Value) -> impl Fn(&serde_json::Value) -> String {
        move |req: &serde_json::Value| {
            json!({"jsonrpc": "2.0", "id": req["id"], "result": result}).to_string()
        }
    }

    #[tokio::test]
    async fn test_discover_posts_to_list_path() {
        let (url, captured) = stub_server(200, reply_with(json!({"tools": [{"name": "lookup"}]}))).await;
        let conn = connection(&format!("{url}/"), AuthConfig::None);

        let tools = conn.discover().await.unwrap();
        assert_eq!(tools[0]["name"], "lookup");

        let requests = captured.lock().unwrap().clone();
        assert_eq!(requests[0].path, "/tools/list");
        assert_eq!(requests[0].body["method"], "tools/list");
        assert_eq!(requests[0].body["jsonrpc"], "2.0");
        assert!(requests[0].authorization.is_none());
    }

    #[tokio::test]
    async fn test_call_sends_name_and_arguments_with_bearer() {
        let (url, captured) = stub_server(200, reply_with(json!({"content": []}))).await;
        let conn = connection(&url, AuthConfig::Bearer { token: "t0k".into() });

        conn.call("lookup", json!({"room": "204"})).await.unwrap();

        let requests = captured.lock().unwrap().clone();
        assert_eq!(requests[0].path, "/tools/call");
        assert_eq!(requests[0].body["params"]["name"], "lookup");
        assert_eq!(requests[0].body["params"]["arguments"]["room"], "204");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer t0k"));
    }

    #[tokio::test]
    async fn test_basic_auth_header() {
        let (url, captured) = stub_server(200, reply_with(json!({"tools": []}))).await;
        let conn = connection(
            &url,
            AuthConfig::Basic {
                username: "ops".into(),
                password: "pw".into(),
            },
        );
        conn.discover().await.unwrap();
        let auth = captured.lock().unwrap()[0].authorization.clone().unwrap();
        // base64("ops:pw")
        assert_eq!(auth, "Basic b3BzOnB3");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let (url, _) = stub_server(503, |_| "maintenance".to_string()).await;
        let conn = connection(&url, AuthConfig::None);
        match conn.discover().await.unwrap_err() {
            ConnectionError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rpc_error_reply() {
        let (url, _) = stub_server(200, |req| {
            json!({"jsonrpc": "2.0", "id": req["id"], "error": {"code": -32601, "message": "no such method"}})
                .to_string()
        })
        .await;
        let conn = connection(&url, AuthConfig::None);
        assert!(matches!(
            conn.discover().await,
            Err(ConnectionError::Rpc { code: -32601, .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (url, _) = stub_server(200, |_| "<html>oops</html>".to_string()).await;
        let conn = connection(&url, AuthConfig::None);
        assert!(matches!(
            conn.call("x", json!({})).await,
            Err(ConnectionError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_connect_rejects_bad_urls() {
        let settings = OrchestratorSettings::default();
        for url in ["", "   ", "not a url", "ftp://files.example"] {
            let config = HttpTransportConfig {
                url: url.to_string(),
                auth: AuthConfig::None,
            };
            assert!(
                matches!(
                    HttpConnection::connect("s", &config, &settings),
                    Err(ConnectionError::InvalidDescriptor { .. })
                ),
                "{url:?}"
            );
        }
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let out = truncate_body(&long);
        assert!(out.ends_with("...(truncated)"));
        assert!(out.len() <= MAX_ERROR_BODY + "...(truncated)".len());
    }
}

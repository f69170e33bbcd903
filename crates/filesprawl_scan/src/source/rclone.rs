//! rclone rc client for `operations/list`.

use super::{ListOptions, ListPage, ListRequest, ListingSource};
use crate::config::RcConfig;
use crate::error::{ListingError, Result, ScanError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filesprawl_db::ObjectDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const LIST_ENDPOINT: &str = "operations/list";

/// Request body for `operations/list`
#[derive(Debug, Serialize)]
struct ListCall<'a> {
    fs: &'a str,
    remote: &'a str,
    opt: &'a ListOptions,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    list: Vec<ListResponseItem>,
}

/// One entry of an rc listing. Fields the rc server always sends are
/// required so a truncated or foreign body fails to decode.
#[derive(Debug, Deserialize)]
struct ListResponseItem {
    #[serde(rename = "ID", default)]
    id: Option<String>,
    #[serde(rename = "IsDir")]
    is_dir: bool,
    #[serde(rename = "MimeType", default)]
    mime_type: Option<String>,
    #[serde(rename = "ModTime", default)]
    mod_time: Option<String>,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Size")]
    size: i64,
    #[serde(rename = "Hashes", default)]
    hashes: BTreeMap<String, String>,
    #[serde(rename = "Metadata", default)]
    metadata: Option<serde_json::Value>,
}

/// Error body returned by the rc server
#[derive(Debug, Deserialize)]
struct RcErrorEnvelope {
    error: String,
    #[serde(default)]
    status: Option<u16>,
}

impl ListResponseItem {
    fn into_descriptor(self, listed: &str) -> std::result::Result<ObjectDescriptor, ListingError> {
        if self.path.is_empty() {
            return Err(ListingError::decode(listed, "entry with empty Path"));
        }

        let mod_time = match self.mod_time.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| {
                        ListingError::decode(listed, format!("bad ModTime '{raw}' on {}: {e}", self.path))
                    })?
                    .with_timezone(&Utc),
            ),
        };

        let name = if self.name.is_empty() {
            ObjectDescriptor::base_name(&self.path).to_string()
        } else {
            self.name
        };

        Ok(ObjectDescriptor {
            id: self.id.filter(|id| !id.is_empty()),
            is_dir: self.is_dir,
            mime_type: self.mime_type.filter(|m| !m.is_empty()),
            mod_time,
            name,
            path: self.path,
            size: self.size,
            hashes: self.hashes,
            metadata: self.metadata,
        })
    }
}

/// Classify an rc response.
///
/// 2xx bodies must decode strictly. Anything carrying an rc error envelope
/// or a 4xx status is a rejection; 408, 429 and 5xx without an envelope are
/// treated as the server being unavailable.
pub fn interpret_response(
    path: &str,
    status: u16,
    body: &str,
) -> std::result::Result<ListPage, ListingError> {
    if (200..300).contains(&status) {
        let response: ListResponse = serde_json::from_str(body)
            .map_err(|e| ListingError::decode(path, e.to_string()))?;
        return response
            .list
            .into_iter()
            .map(|item| item.into_descriptor(path))
            .collect();
    }

    if let Ok(envelope) = serde_json::from_str::<RcErrorEnvelope>(body) {
        return Err(ListingError::rejected(
            path,
            envelope.status.unwrap_or(status),
            envelope.error,
        ));
    }

    let message = body.trim();
    let message = if message.is_empty() {
        format!("HTTP {status}")
    } else {
        message.to_string()
    };
    if status == 408 || status == 429 || status >= 500 {
        Err(ListingError::unavailable(path, message))
    } else {
        Err(ListingError::rejected(path, status, message))
    }
}

/// HTTP client for an rc server.
#[derive(Debug, Clone)]
pub struct RcClient {
    http_client: reqwest::Client,
    base_url: String,
    user: Option<String>,
    pass: Option<String>,
}

impl RcClient {
    pub fn new(config: &RcConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build rc client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            pass: config.pass.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, LIST_ENDPOINT)
    }
}

#[async_trait]
impl ListingSource for RcClient {
    async fn list(&self, request: &ListRequest) -> std::result::Result<ListPage, ListingError> {
        let body = ListCall {
            fs: &request.remote,
            remote: &request.path,
            opt: &request.options,
        };

        let mut call = self.http_client.post(self.endpoint()).json(&body);
        if self.user.is_some() || self.pass.is_some() {
            call = call.basic_auth(self.user.as_deref().unwrap_or_default(), self.pass.as_deref());
        }

        let response = call.send().await.map_err(|e| {
            warn!(remote = %request.remote, path = %request.path, "rc request failed: {}", e);
            ListingError::unavailable(&request.path, format!("connection failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            ListingError::unavailable(&request.path, format!("failed to read rc response: {e}"))
        })?;

        debug!(
            remote = %request.remote,
            path = %request.path,
            status,
            bytes = text.len(),
            "rc list response"
        );
        interpret_response(&request.path, status, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LISTING: &str = r#"{
        "list": [
            {
                "ID": "id:a4ayc_80_OEAAAAAAAAAXw",
                "IsDir": false,
                "MimeType": "text/plain",
                "ModTime": "2023-03-01T10:15:30.000Z",
                "Name": "notes.txt",
                "Path": "rollbar/macbook/notes.txt",
                "Size": 1024,
                "Hashes": {"md5": "872f92f3", "dropbox": "9a0b"},
                "Tier": "hot"
            },
            {
                "IsDir": true,
                "MimeType": "inode/directory",
                "ModTime": "2023-03-01T10:15:30Z",
                "Name": "photos",
                "Path": "rollbar/macbook/photos",
                "Size": -1
            }
        ]
    }"#;

    #[test]
    fn test_decodes_listing() {
        let page = interpret_response("rollbar/macbook", 200, LISTING).unwrap();
        assert_eq!(page.len(), 2);

        let file = &page[0];
        assert_eq!(file.id.as_deref(), Some("id:a4ayc_80_OEAAAAAAAAAXw"));
        assert_eq!(file.size, 1024);
        assert_eq!(file.hashes.get("md5").map(String::as_str), Some("872f92f3"));
        assert_eq!(
            file.mod_time.unwrap().to_rfc3339(),
            "2023-03-01T10:15:30+00:00"
        );

        let dir = &page[1];
        assert!(dir.is_dir);
        assert!(dir.hashes.is_empty());
        assert_eq!(dir.id, None);
    }

    #[test]
    fn test_missing_required_field_is_decode_error() {
        let body = r#"{"list": [{"IsDir": false, "Name": "a", "Size": 1}]}"#;
        let err = interpret_response("x", 200, body).unwrap_err();
        assert!(matches!(err, ListingError::Decode { .. }));
        assert!(err.to_string().contains("Path"));
    }

    #[test]
    fn test_bad_mod_time_is_decode_error() {
        let body = r#"{"list": [{"IsDir": false, "Name": "a", "Path": "a", "Size": 1, "ModTime": "yesterday"}]}"#;
        assert!(matches!(
            interpret_response("x", 200, body),
            Err(ListingError::Decode { .. })
        ));
    }

    #[test]
    fn test_empty_name_falls_back_to_base_name() {
        let body = r#"{"list": [{"IsDir": false, "Name": "", "Path": "a/b/c.txt", "Size": 1, "MimeType": ""}]}"#;
        let page = interpret_response("a/b", 200, body).unwrap();
        assert_eq!(page[0].name, "c.txt");
        assert_eq!(page[0].mime_type, None);
    }

    #[test]
    fn test_garbage_success_body_is_decode_error() {
        assert!(matches!(
            interpret_response("x", 200, "<html>proxy</html>"),
            Err(ListingError::Decode { .. })
        ));
    }

    #[test]
    fn test_error_envelope_is_rejection() {
        let body = r#"{"error": "directory not found", "input": {"fs": "dbox:"}, "path": "operations/list", "status": 404}"#;
        let err = interpret_response("missing", 404, body).unwrap_err();
        assert_eq!(
            err,
            ListingError::rejected("missing", 404, "directory not found")
        );

        // rc reports most failures as 500 with an envelope
        let body = r#"{"error": "didn't find section in config file", "status": 500}"#;
        let err = interpret_response("x", 500, body).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_overload_without_envelope_is_transient() {
        for status in [408, 429, 502, 503] {
            let err = interpret_response("x", status, "Service Unavailable").unwrap_err();
            assert!(err.is_transient(), "status {status} should be transient");
        }
    }

    #[test]
    fn test_client_error_without_envelope_is_rejection() {
        let err = interpret_response("x", 401, "").unwrap_err();
        assert_eq!(err, ListingError::rejected("x", 401, "HTTP 401"));
    }

    #[test]
    fn test_request_body_shape() {
        let opts = ListOptions {
            show_hash: true,
            hash_types: vec!["md5".to_string()],
            ..ListOptions::default()
        };
        let call = ListCall {
            fs: "dbox:",
            remote: "rollbar/macbook",
            opt: &opts,
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["fs"], "dbox:");
        assert_eq!(value["remote"], "rollbar/macbook");
        assert_eq!(value["opt"]["showHash"], true);
    }

    /// Serve a single rc call with `body` and return the request head.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            let head_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before request head");
                request.extend_from_slice(&buf[..n]);
                if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&request[..head_end]).to_string();
            let content_length = header(&head, "content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            while request.len() < head_end + content_length {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            head
        });

        (url, handle)
    }

    fn header(head: &str, name: &str) -> Option<String> {
        head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    fn request() -> ListRequest {
        ListRequest {
            remote: "dbox:".to_string(),
            path: "rollbar/macbook".to_string(),
            options: ListOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_list_sends_basic_auth_when_configured() {
        let (url, server) = serve_once(LISTING).await;
        let client = RcClient::new(&RcConfig {
            url,
            user: Some("scanner".to_string()),
            pass: Some("hunter2".to_string()),
            timeout_secs: 5,
        })
        .unwrap();

        let page = client.list(&request()).await.unwrap();
        assert_eq!(page[0].path, "rollbar/macbook/notes.txt");

        let head = server.await.unwrap();
        assert!(head.starts_with("POST /operations/list "));
        assert_eq!(
            header(&head, "authorization").as_deref(),
            Some("Basic c2Nhbm5lcjpodW50ZXIy")
        );
    }

    #[tokio::test]
    async fn test_list_without_credentials_sends_no_auth() {
        let (url, server) = serve_once(r#"{"list": []}"#).await;
        let client = RcClient::new(&RcConfig {
            url,
            timeout_secs: 5,
            ..RcConfig::default()
        })
        .unwrap();

        let page = client.list(&request()).await.unwrap();
        assert!(page.is_empty());

        let head = server.await.unwrap();
        assert_eq!(header(&head, "authorization"), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RcClient::new(&RcConfig {
            url: format!("http://{addr}"),
            timeout_secs: 5,
            ..RcConfig::default()
        })
        .unwrap();

        let err = client.list(&request()).await.unwrap_err();
        assert!(matches!(err, ListingError::Unavailable { .. }), "{err:?}");
        assert!(err.is_transient());
        assert_eq!(err.path(), "rollbar/macbook");
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        let client = RcClient::new(&RcConfig {
            url: "http://localhost:5572/".to_string(),
            ..RcConfig::default()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:5572/operations/list");
    }
}

//! Minimal HTTP/1.1 server for exercising the client against canned
//! SharePoint responses.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const SITE_PATH: &str = "/sites/Team";
pub const DIGEST: &str = "0xDIGEST,18 Oct 2026 10:00:00 -0000";

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Request path below the site, e.g. `/_api/web`.
    pub fn endpoint(&self) -> &str {
        self.path.strip_prefix(SITE_PATH).unwrap_or(&self.path)
    }
}

type Route = dyn Fn(&Recorded) -> (u16, String) + Send + Sync;

pub struct MockServer {
    /// Site URL served by the mock, `http://127.0.0.1:port/sites/Team`.
    pub site_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Starts a server answering every request with `route`.
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let route: Arc<Route> = Arc::new(route);

        let log = requests.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let log = log.clone();
                let route = route.clone();
                tokio::spawn(async move {
                    serve(stream, log, route).await;
                });
            }
        });

        Self {
            site_url: format!("http://127.0.0.1:{port}{SITE_PATH}"),
            requests,
            handle,
        }
    }

    /// Starts a server with the stock SharePoint routes only.
    pub async fn sharepoint() -> Self {
        Self::start(default_route).await
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests other than form digest lookups.
    pub fn api_requests(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.endpoint() != "/_api/contextinfo")
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Answers `contextinfo` and `web`; everything else gets `200 {}`.
pub fn default_route(req: &Recorded) -> (u16, String) {
    match req.endpoint() {
        "/_api/contextinfo" => (
            200,
            format!(r#"{{"d":{{"GetContextWebInformation":{{"FormDigestValue":"{DIGEST}"}}}}}}"#),
        ),
        "/_api/web" => (
            200,
            format!(
                r#"{{"d":{{"Id":"web-1","Title":"Team","Description":"Team site","Created":"2020-01-01T00:00:00","LastItemUserModifiedDate":"2026-10-01T00:00:00Z","ServerRelativeUrl":"{SITE_PATH}"}}}}"#
            ),
        ),
        _ => (200, "{}".into()),
    }
}

/// Verbose listing body with the given `(type, name)` entries.
pub fn listing(items: &[(&str, &str)]) -> String {
    let entries: Vec<String> = items
        .iter()
        .map(|(kind, name)| {
            format!(
                r#"{{"__metadata":{{"type":"{kind}"}},"Name":"{name}","ServerRelativeUrl":"{SITE_PATH}/{name}","Length":"10"}}"#
            )
        })
        .collect();
    format!(r#"{{"d":{{"results":[{}]}}}}"#, entries.join(","))
}

async fn serve(mut stream: TcpStream, log: Arc<Mutex<Vec<Recorded>>>, route: Arc<Route>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }

    let request = Recorded {
        method,
        path,
        headers,
        body,
    };
    let (status, reply) = route(&request);
    log.lock().unwrap().push(request);

    let resp = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.len(),
        reply
    );
    let _ = stream.write_all(resp.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

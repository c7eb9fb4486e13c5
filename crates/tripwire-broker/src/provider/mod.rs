//! Event-provider integration: the per-service HTTP client and the
//! catalog-driven manager that routes subscribe/unsubscribe/describe calls.

mod client;
mod manager;

pub use self::client::{ProviderClient, HEADER_AUTH_ENTITY, HEADER_REQUEST_ID};
pub use self::manager::EventProviderManager;

use thiserror::Error;

/// Errors loading or parsing the event-type catalog file.
///
/// Load failures never surface through manager operations: the previous
/// catalog snapshot is retained and the failure logged.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read event-type catalog: {message}")]
    Read { message: String },
    #[error("failed to parse event-type catalog: {message}")]
    Parse { message: String },
}

#[cfg(test)]
pub(crate) mod testutil {
    //! A minimal blocking HTTP server for provider-protocol tests, in the
    //! spirit of spinning a raw mock TCP server per test.

    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::Arc;

    use parking_lot::Mutex;

    /// One request the mock server saw.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: String,
        pub path: String,
        pub headers: HashMap<String, String>,
    }

    #[derive(Default)]
    struct ServerState {
        requests: Vec<RecordedRequest>,
        /// Per-method (status, body) overrides; fallback is 200 + default
        /// body.
        by_method: HashMap<String, (u16, String)>,
        default_body: String,
    }

    /// Mock event-provider service listening on a random local port.
    pub struct MockProviderServer {
        addr: SocketAddr,
        state: Arc<Mutex<ServerState>>,
    }

    impl MockProviderServer {
        /// Start the server with a default 200 response body.
        pub fn start(default_body: &str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock provider");
            let addr = listener.local_addr().expect("local addr");
            let state = Arc::new(Mutex::new(ServerState {
                default_body: default_body.to_string(),
                ..Default::default()
            }));

            let loop_state = Arc::clone(&state);
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    handle_connection(stream, &loop_state);
                }
            });

            Self { addr, state }
        }

        /// Override the response for one HTTP method.
        pub fn respond_to(&self, method: &str, status: u16, body: &str) {
            self.state
                .lock()
                .by_method
                .insert(method.to_string(), (status, body.to_string()));
        }

        pub fn url(&self) -> String {
            format!("http://{}", self.addr)
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.state.lock().requests.clone()
        }
    }

    fn handle_connection(mut stream: TcpStream, state: &Arc<Mutex<ServerState>>) {
        // Read until the end of the request head; provider requests carry
        // no body.
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(_) => return,
            }
        }
        let head = String::from_utf8_lossy(&buf);
        let mut lines = head.lines();
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        let headers: HashMap<String, String> = lines
            .take_while(|l| !l.is_empty())
            .filter_map(|l| {
                l.split_once(':')
                    .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            })
            .collect();

        let (status, body) = {
            let mut state = state.lock();
            state.requests.push(RecordedRequest {
                method: method.clone(),
                path,
                headers,
            });
            state
                .by_method
                .get(&method)
                .cloned()
                .unwrap_or((200, state.default_body.clone()))
        };

        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            _ => "Status",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
    }
}

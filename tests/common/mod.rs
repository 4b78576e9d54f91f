//! Recording HTTP server standing in for vendor endpoints

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde_json::Value;
use tokio::net::TcpListener;

/// One request as the server saw it
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<Captured>>>,
    /// Status answered to every request; 0 means 200
    status: Arc<AtomicU16>,
    /// Status answered to the next request only, ahead of `status`
    next: Arc<AtomicU16>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: MockState,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .fallback(capture)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to read local address");
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .await
                .expect("Mock server failed");
        });

        Self { addr, state }
    }

    /// `host:port` of the server
    pub fn authority(&self) -> String {
        self.addr.to_string()
    }

    pub fn respond_with(&self, status: StatusCode) {
        self.state.status.store(status.as_u16(), Ordering::SeqCst);
    }

    /// Answer only the next request with `status`.
    pub fn respond_once_with(&self, status: StatusCode) {
        self.state.next.store(status.as_u16(), Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn capture(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.requests.lock().unwrap().push(Captured {
        method,
        uri,
        headers,
        body,
    });

    let status = match state.next.swap(0, Ordering::SeqCst) {
        0 => state.status.load(Ordering::SeqCst),
        code => code,
    };
    match status {
        0 => StatusCode::OK,
        code => StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

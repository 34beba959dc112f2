#![allow(dead_code)]

use std::sync::Arc;

use axum::serve;
use gateway::{AppState, KeyTable, app};
use relay::{HttpUpstream, Relay, RelayConfig};

pub const KEY: &str = "test-key";

pub struct TestGateway {
    pub url: String,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Relay speaking HTTP to `upstream_url` with no side-call providers.
pub fn http_relay(upstream_url: String) -> Relay {
    let config = RelayConfig {
        base_url: upstream_url,
        ..RelayConfig::default()
    };
    let upstream = Arc::new(HttpUpstream::new(&config).unwrap());
    Relay::new(config, upstream)
}

pub async fn spawn(state: AppState) -> TestGateway {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state);
    let server = tokio::spawn(async move {
        serve(listener, router.into_make_service()).await.unwrap();
    });
    TestGateway {
        url: format!("http://{addr}"),
        server,
    }
}

/// Gateway in front of `upstream_url` that requires [`KEY`].
pub async fn spawn_with_key(upstream_url: String) -> TestGateway {
    let state = AppState::new(http_relay(upstream_url)).with_keys(Arc::new(KeyTable::from_keys([KEY])));
    spawn(state).await
}

pub async fn spawn_open(upstream_url: String) -> TestGateway {
    spawn(AppState::new(http_relay(upstream_url))).await
}

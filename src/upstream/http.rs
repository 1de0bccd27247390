//! Plain HTTP tile sessions backed by `reqwest`.
//!
//! Each session owns its own client, so its cookie jar and connection pool
//! live and die with it. Recycling a session therefore presents a fresh
//! visitor to the provider.

use super::options::HttpSessionOptions;
use super::payload::{decode_tile_payload, FetchFailure, TilePayload};
use super::session::{FetchSession, SessionFactory};
use super::tile::TileCoord;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct HttpSessionFactory {
    options: Arc<HttpSessionOptions>,
    opened: AtomicU64,
}

impl HttpSessionFactory {
    pub fn new(options: HttpSessionOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options: Arc::new(options),
            opened: AtomicU64::new(0),
        })
    }

    pub fn options(&self) -> &HttpSessionOptions {
        &self.options
    }

    /// Number of sessions handed out so far.
    pub fn sessions_opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    fn build_session(&self) -> Result<HttpFetchSession> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .gzip(true)
            .user_agent(self.options.user_agent.as_str())
            .default_headers(headers)
            .timeout(self.options.request_timeout)
            .build()
            .context("failed to build HTTP tile client")?;

        let id = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(session = id, "opened HTTP tile session");
        Ok(HttpFetchSession {
            id,
            client,
            options: Arc::clone(&self.options),
        })
    }
}

impl SessionFactory for HttpSessionFactory {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn FetchSession>>> {
        Box::pin(async move {
            let session = self.build_session()?;
            Ok(Box::new(session) as Box<dyn FetchSession>)
        })
    }
}

pub struct HttpFetchSession {
    id: u64,
    client: reqwest::Client,
    options: Arc<HttpSessionOptions>,
}

impl HttpFetchSession {
    async fn fetch_tile(&self, tile: TileCoord) -> Result<TilePayload, FetchFailure> {
        let url = tile.render_url(&self.options.url_template);
        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let limit = self.options.max_body_bytes;
        if let Some(declared) = response.content_length() {
            if declared > limit as u64 {
                return Err(oversized_body(declared, limit));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_transport_error)? {
            let received = body.len() + chunk.len();
            if received > limit {
                return Err(oversized_body(received as u64, limit));
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&body);
        decode_tile_payload(&text)
    }
}

fn oversized_body(bytes: u64, limit: usize) -> FetchFailure {
    FetchFailure::Malformed(format!("body of {bytes} bytes exceeds limit of {limit}"))
}

fn classify_transport_error(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Transport(err.to_string())
    }
}

impl FetchSession for HttpFetchSession {
    fn fetch(&self, tile: TileCoord) -> BoxFuture<'_, Result<TilePayload, FetchFailure>> {
        Box::pin(self.fetch_tile(tile))
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        let id = self.id;
        drop(self);
        Box::pin(async move {
            tracing::debug!(session = id, "closed HTTP tile session");
        })
    }
}

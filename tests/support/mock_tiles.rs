use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::body::Bytes;
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tanker_collector::TileCoord;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What the mock provider answers for one tile path.
#[derive(Clone, Debug)]
pub enum TileResponse {
    Rows(Vec<Value>),
    Status(u16),
    Raw(String),
    /// Streams the body without a declared length.
    Chunked(String),
    Stall(Duration),
}

#[derive(Clone, Default)]
pub struct MockTiles {
    responses: Arc<RwLock<HashMap<String, TileResponse>>>,
    hits: Arc<RwLock<HashMap<String, usize>>>,
}

impl MockTiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tile: TileCoord, response: TileResponse) {
        self.responses
            .write()
            .expect("mock tiles poisoned")
            .insert(tile_path(tile), response);
    }

    pub fn hits(&self, tile: TileCoord) -> usize {
        self.hits
            .read()
            .expect("mock hits poisoned")
            .get(&tile_path(tile))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.read().expect("mock hits poisoned").values().sum()
    }

    fn record_hit(&self, path: &str) {
        *self
            .hits
            .write()
            .expect("mock hits poisoned")
            .entry(path.to_owned())
            .or_insert(0) += 1;
    }

    fn response_for(&self, path: &str) -> Option<TileResponse> {
        self.responses
            .read()
            .expect("mock tiles poisoned")
            .get(path)
            .cloned()
    }
}

pub struct MockTileServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockTileServer {
    pub async fn start(tiles: MockTiles) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock tile listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let tiles = tiles.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(tiles.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock tile server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// URL template understood by the collector config.
    pub fn url_template(&self) -> String {
        format!("{}/tiles/{{z}}/{{x}}/{{y}}", self.url)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

fn tile_path(tile: TileCoord) -> String {
    format!("/tiles/{}/{}/{}", tile.zoom, tile.x, tile.y)
}

async fn serve_request(
    tiles: MockTiles,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(status_response(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"));
    }

    let path = req.uri().path().to_owned();
    tiles.record_hit(&path);

    let response = match tiles.response_for(&path) {
        Some(TileResponse::Rows(rows)) => {
            json_response(json!({ "type": 1, "data": { "rows": rows, "areaShips": rows.len() } }))
        }
        Some(TileResponse::Status(code)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            status_response(status, "upstream refused")
        }
        Some(TileResponse::Raw(body)) => Response::new(Body::from(body)),
        Some(TileResponse::Chunked(body)) => {
            let (mut sender, streamed) = Body::channel();
            tokio::spawn(async move {
                for chunk in body.into_bytes().chunks(64) {
                    if sender.send_data(Bytes::copy_from_slice(chunk)).await.is_err() {
                        break;
                    }
                }
            });
            Response::new(streamed)
        }
        Some(TileResponse::Stall(delay)) => {
            tokio::time::sleep(delay).await;
            json_response(json!({ "data": { "rows": [] } }))
        }
        None => status_response(StatusCode::NOT_FOUND, "unknown tile"),
    };
    Ok(response)
}

fn json_response(value: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn status_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = status;
    response
}

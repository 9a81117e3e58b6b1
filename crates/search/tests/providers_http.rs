use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use lensbot_search::backends::{GenericApiBackend, RedirectBackend, VisionLabelBackend};
use lensbot_search::{
    Attachment, BackendErrorKind, FetchError, Fetcher, ImageRef, InboundEvent, Reply, ReplyTransport, ResultCap,
    SearchBackend, SearchOrchestrator, SearchQuery, Stage, TransportReplyError,
};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Clone, Default)]
struct Hits(Arc<AtomicUsize>);

impl Hits {
    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn bytes_query() -> SearchQuery {
    SearchQuery::new(ImageRef::bytes(PNG.to_vec(), "image/png"), ResultCap::default())
}

fn url_query(url: &str) -> SearchQuery {
    SearchQuery::new(ImageRef::Url(url.to_string()), ResultCap::default())
}

// --- vision ---

async fn vision_ok(Query(params): Query<Vec<(String, String)>>, axum::Json(body): axum::Json<Value>) -> impl IntoResponse {
    assert!(params.contains(&("key".to_string(), "vision-key".to_string())));
    assert_eq!(body["requests"][0]["features"][0]["type"], "WEB_DETECTION");
    assert!(body["requests"][0]["image"]["content"].as_str().is_some_and(|c| !c.is_empty()));
    axum::Json(json!({
        "responses": [{
            "webDetection": {
                "bestGuessLabels": [{"label": "tabby cat"}],
                "pagesWithMatchingImages": [
                    {"url": "https://cats.example/a", "score": 0.9,
                     "fullMatchingImages": [{"url": "https://cats.example/a.jpg"}]}
                ],
                "visuallySimilarImages": [{"url": "https://sim.example/1.jpg"}]
            }
        }]
    }))
}

async fn vision_embedded_error() -> impl IntoResponse {
    axum::Json(json!({"responses": [{"error": {"code": 3, "message": "Bad image data."}}]}))
}

#[tokio::test]
async fn vision_maps_web_detection() {
    let addr = serve(Router::new().route("/v1/annotate", post(vision_ok))).await;
    let backend = VisionLabelBackend::new(
        reqwest::Client::new(),
        format!("http://{}/v1/annotate", addr),
        Some("vision-key".into()),
    );

    let result = backend.search(&bytes_query()).await.unwrap();
    assert_eq!(result.labels, vec!["tabby cat".to_string()]);
    assert_eq!(result.matches[0].url, "https://cats.example/a");
    assert_eq!(result.matches[0].image_url.as_deref(), Some("https://cats.example/a.jpg"));
    assert_eq!(result.similar_images, vec!["https://sim.example/1.jpg".to_string()]);
}

#[tokio::test]
async fn vision_error_inside_200_is_provider_error() {
    let addr = serve(Router::new().route("/v1/annotate", post(vision_embedded_error))).await;
    let backend = VisionLabelBackend::new(
        reqwest::Client::new(),
        format!("http://{}/v1/annotate", addr),
        Some("vision-key".into()),
    );

    let err = backend.search(&bytes_query()).await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::ProviderError);
    assert!(err.detail.contains("Bad image data."));
}

#[tokio::test]
async fn vision_http_failure_is_transport_error() {
    let app = Router::new().route("/v1/annotate", post(|| async { StatusCode::FORBIDDEN }));
    let addr = serve(app).await;
    let backend = VisionLabelBackend::new(
        reqwest::Client::new(),
        format!("http://{}/v1/annotate", addr),
        Some("vision-key".into()),
    );

    let err = backend.search(&bytes_query()).await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::TransportError);
}

// --- redirect ---

async fn upload_redirects(headers: HeaderMap) -> impl IntoResponse {
    let is_multipart = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    if !is_multipart {
        return StatusCode::BAD_REQUEST.into_response();
    }
    (StatusCode::FOUND, [(header::LOCATION, "/search?vsrid=42")]).into_response()
}

#[tokio::test]
async fn redirect_returns_location_as_single_match() {
    let addr = serve(Router::new().route("/upload", post(upload_redirects))).await;
    let backend = RedirectBackend::new(Duration::from_secs(5), format!("http://{}/upload", addr)).unwrap();

    let result = backend.search(&bytes_query()).await.unwrap();
    assert_eq!(result.matches.len(), 1);
    assert_eq!(result.matches[0].url, format!("http://{}/search?vsrid=42", addr));
}

#[tokio::test]
async fn redirect_without_location_is_no_redirect() {
    let app = Router::new().route("/upload", post(|| async { (StatusCode::OK, "results inline") }));
    let addr = serve(app).await;
    let backend = RedirectBackend::new(Duration::from_secs(5), format!("http://{}/upload", addr)).unwrap();

    let err = backend.search(&bytes_query()).await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::NoRedirect);
}

// --- generic api ---

async fn generic_search(headers: HeaderMap, Query(params): Query<Vec<(String, String)>>) -> impl IntoResponse {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer api-key");
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let url = params.iter().find(|(k, _)| k == "url").map(|(_, v)| v.clone()).unwrap_or_default();
    if url.contains('?') {
        return StatusCode::BAD_REQUEST.into_response();
    }
    axum::Json(json!({
        "results": [
            {"url": "https://found.example/page", "thumbnail": "https://found.example/t.jpg", "score": 0.7},
            "https://found.example/raw.jpg"
        ]
    }))
    .into_response()
}

#[tokio::test]
async fn generic_sends_bearer_and_canonical_url() {
    let addr = serve(Router::new().route("/search", get(generic_search))).await;
    let backend = GenericApiBackend::new(
        reqwest::Client::new(),
        format!("http://{}/search", addr),
        Some("api-key".into()),
    );

    let result = backend.search(&url_query("https://cdn.example/img.png?sig=1#x")).await.unwrap();
    assert_eq!(result.matches.len(), 2);
    assert_eq!(result.matches[0].image_url.as_deref(), Some("https://found.example/t.jpg"));
    assert_eq!(result.matches[1].url, "https://found.example/raw.jpg");
}

#[tokio::test]
async fn generic_wrong_key_is_transport_error() {
    let addr = serve(Router::new().route("/search", get(generic_search))).await;
    let backend = GenericApiBackend::new(
        reqwest::Client::new(),
        format!("http://{}/search", addr),
        Some("stale".into()),
    );

    let err = backend.search(&url_query("https://cdn.example/img.png")).await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::TransportError);
}

#[tokio::test]
async fn generic_empty_list_is_empty_result() {
    let app = Router::new().route("/search", get(|| async { axum::Json(json!([])) }));
    let addr = serve(app).await;
    let backend = GenericApiBackend::new(
        reqwest::Client::new(),
        format!("http://{}/search", addr),
        Some("api-key".into()),
    );

    let err = backend.search(&url_query("https://cdn.example/img.png")).await.unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::EmptyResult);
}

// --- fetch ---

fn fetcher(max_bytes: u64) -> (Fetcher, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    (Fetcher::new(reqwest::Client::new(), max_bytes, dir.path().to_path_buf()), dir)
}

#[tokio::test]
async fn fetch_reads_body_and_content_type() {
    let app = Router::new().route(
        "/img.png",
        get(|| async { ([(header::CONTENT_TYPE, "image/png; charset=binary")], PNG.to_vec()) }),
    );
    let addr = serve(app).await;
    let (fetcher, _dir) = fetcher(1024);

    let image = fetcher.acquire(ImageRef::Url(format!("http://{}/img.png", addr))).await.unwrap();
    let (data, content_type) = image.data().unwrap();
    assert_eq!(data, PNG);
    assert_eq!(content_type, "image/png");
}

#[tokio::test]
async fn fetch_non_success_status() {
    let addr = serve(Router::new().route("/gone.png", get(|| async { StatusCode::NOT_FOUND }))).await;
    let (fetcher, _dir) = fetcher(1024);

    let err = fetcher.acquire(ImageRef::Url(format!("http://{}/gone.png", addr))).await.unwrap_err();
    assert!(matches!(err, FetchError::Status(404)));
}

#[tokio::test]
async fn fetch_rejects_oversized_body() {
    let app = Router::new().route("/huge.png", get(|| async { vec![0u8; 64 * 1024] }));
    let addr = serve(app).await;
    let (fetcher, _dir) = fetcher(1024);

    let err = fetcher.acquire(ImageRef::Url(format!("http://{}/huge.png", addr))).await.unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));
}

// --- end to end ---

#[derive(Default)]
struct Collect(Vec<Reply>);

#[async_trait::async_trait]
impl ReplyTransport for Collect {
    async fn notify_processing(&mut self, _text: &str) -> Result<(), TransportReplyError> {
        Ok(())
    }

    async fn deliver(&mut self, reply: Reply) -> Result<(), TransportReplyError> {
        self.0.push(reply);
        Ok(())
    }
}

#[tokio::test]
async fn redirect_flow_fetches_stages_and_cleans_scratch() {
    let uploads = Hits::default();
    let app = Router::new()
        .route("/img.png", get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG.to_vec()) }))
        .route(
            "/upload",
            post(|State(hits): State<Hits>, headers: HeaderMap| async move {
                hits.bump();
                upload_redirects(headers).await
            }),
        )
        .with_state(uploads.clone());
    let addr = serve(app).await;

    let scratch = tempfile::tempdir().unwrap();
    let backend = RedirectBackend::new(Duration::from_secs(5), format!("http://{}/upload", addr)).unwrap();
    let orch = SearchOrchestrator::with_backend(
        Arc::new(backend),
        Fetcher::new(reqwest::Client::new(), 1024 * 1024, scratch.path().to_path_buf()),
        ResultCap::default(),
    );

    let event = InboundEvent {
        request_id: "e2e-1".into(),
        attachments: vec![Attachment {
            filename: "img.png".into(),
            content_type: Some("image/png".into()),
            url: Some(format!("http://{}/img.png", addr)),
            data: None,
        }],
        argument: None,
    };

    let mut transport = Collect::default();
    let outcome = orch.handle(&event, &mut transport, &CancellationToken::new()).await;

    assert_eq!(outcome.stage, Stage::Replied);
    assert_eq!(uploads.count(), 1);
    let Reply::Rendered(reply) = &transport.0[0] else {
        panic!("expected rendered reply");
    };
    assert_eq!(reply.blocks[0].url.as_deref(), Some(format!("http://{}/search?vsrid=42", addr).as_str()));
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn fetch_failure_reaches_user_as_status_text() {
    let addr = serve(Router::new().route("/gone.png", get(|| async { StatusCode::NOT_FOUND }))).await;
    let scratch = tempfile::tempdir().unwrap();
    let backend = VisionLabelBackend::new(reqwest::Client::new(), "http://127.0.0.1:9/unused".into(), Some("k".into()));
    let orch = SearchOrchestrator::with_backend(
        Arc::new(backend),
        Fetcher::new(reqwest::Client::new(), 1024, scratch.path().to_path_buf()),
        ResultCap::default(),
    );

    let event = InboundEvent {
        request_id: "e2e-2".into(),
        argument: Some(format!("http://{}/gone.png", addr)),
        ..InboundEvent::default()
    };
    let mut transport = Collect::default();
    let outcome = orch.handle(&event, &mut transport, &CancellationToken::new()).await;

    assert_eq!(outcome.stage, Stage::Errored);
    assert_eq!(transport.0, vec![Reply::Text("⚠️ Failed to fetch the image (HTTP 404).".into())]);
}

fn vision_orchestrator(addr: SocketAddr, scratch: &std::path::Path) -> SearchOrchestrator {
    let backend = VisionLabelBackend::new(
        reqwest::Client::new(),
        format!("http://{}/v1/annotate", addr),
        Some("vision-key".into()),
    );
    SearchOrchestrator::with_backend(
        Arc::new(backend),
        Fetcher::new(reqwest::Client::new(), 1024 * 1024, scratch.to_path_buf()),
        ResultCap::default(),
    )
}

fn inline_png(request_id: &str) -> InboundEvent {
    InboundEvent {
        request_id: request_id.into(),
        attachments: vec![Attachment {
            filename: "cat.png".into(),
            content_type: Some("image/png".into()),
            url: None,
            data: Some(PNG.to_vec()),
        }],
        argument: None,
    }
}

#[tokio::test]
async fn vision_flow_without_labels_renders_pages_and_thumbnail() {
    let app = Router::new().route(
        "/v1/annotate",
        post(|| async {
            axum::Json(json!({
                "responses": [{
                    "webDetection": {
                        "pagesWithMatchingImages": [
                            {"url": "https://high.example/page", "score": 0.9},
                            {"url": "https://low.example/page", "score": 0.4}
                        ],
                        "visuallySimilarImages": [{"url": "https://sim.example/1.jpg"}]
                    }
                }]
            }))
        }),
    );
    let addr = serve(app).await;
    let scratch = tempfile::tempdir().unwrap();
    let orch = vision_orchestrator(addr, scratch.path());

    let mut transport = Collect::default();
    let outcome = orch.handle(&inline_png("e2e-3"), &mut transport, &CancellationToken::new()).await;

    assert_eq!(outcome.stage, Stage::Replied);
    let Reply::Rendered(reply) = &transport.0[0] else {
        panic!("expected rendered reply");
    };
    assert_eq!(reply.blocks.len(), 1);
    let block = &reply.blocks[0];
    assert!(block.fields.iter().all(|f| f.name != "Best Guess"));

    let pages = block
        .fields
        .iter()
        .find(|f| f.name == "Pages with Matching Images (Top 3)")
        .expect("pages field");
    let lines: Vec<&str> = pages.value.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("https://high.example/page"));
    assert!(lines[1].contains("https://low.example/page"));
    assert_eq!(block.image_url.as_deref(), Some("https://sim.example/1.jpg"));
}

#[tokio::test]
async fn vision_flow_with_only_pages_stays_one_block() {
    let app = Router::new().route(
        "/v1/annotate",
        post(|| async {
            let pages: Vec<Value> = (0..8)
                .map(|i| json!({"url": format!("https://pages.example/{}", i), "score": 0.9}))
                .collect();
            axum::Json(json!({"responses": [{"webDetection": {"pagesWithMatchingImages": pages}}]}))
        }),
    );
    let addr = serve(app).await;
    let scratch = tempfile::tempdir().unwrap();
    let orch = vision_orchestrator(addr, scratch.path());

    let mut transport = Collect::default();
    let outcome = orch.handle(&inline_png("e2e-4"), &mut transport, &CancellationToken::new()).await;

    assert_eq!(outcome.stage, Stage::Replied);
    let Reply::Rendered(reply) = &transport.0[0] else {
        panic!("expected rendered reply");
    };
    assert_eq!(reply.blocks.len(), 1);
    let block = &reply.blocks[0];
    assert_eq!(block.fields.len(), 1);
    assert_eq!(block.fields[0].name, "Pages with Matching Images (Top 3)");
    assert_eq!(block.fields[0].value.lines().count(), 3);
    assert_eq!(block.image_url, None);
}

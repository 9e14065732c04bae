//! OCR pipeline against a mocked completion endpoint
//!
//! Articles come from a temporary archive; images are inlined from disk and
//! each mock matches the base64 payload of one image.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wxreader::articles::{ArticleRepository, GuideMappings};
use wxreader::ocr::{content_hash, ImageResolver, OcrCache, OcrOptions, OcrPipeline, OcrResult, OcrStatus};
use wxreader::providers::{
    CompletionClient, CompletionRequest, ContentPart, DeltaReceiver, MessageContent, OpenAiClient,
};
use wxreader::settings::ChatConfig;

mod common;

fn pipeline(root: &Path, cache: OcrCache) -> OcrPipeline {
    let client = Arc::new(OpenAiClient::new(Duration::from_secs(10)).unwrap());
    let resolver = ImageResolver::new(None).with_local_archive("/articles", root);
    let options = OcrOptions {
        concurrency: 3,
        max_images: 100,
        max_tokens: 1024,
        temperature: 0.1,
    };
    OcrPipeline::new(client, cache, resolver, options).unwrap()
}

fn article_content(root: &Path) -> String {
    let repo = ArticleRepository::new(root, "/articles", GuideMappings::default());
    repo.get("2024-01-01_test").unwrap().content_html
}

fn settings(server: &MockServer) -> ChatConfig {
    ChatConfig {
        api_key: "sk-test".into(),
        base_url: server.uri(),
        ..ChatConfig::default()
    }
}

async fn mount_image(server: &MockServer, marker: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(common::png_base64(marker)))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

/// Article body with `count` inline images tagged `IMG0`, `IMG1`, ...
fn inline_images_html(count: usize) -> String {
    (0..count)
        .map(|i| format!(r#"<p><img src="data:image/png;base64,IMG{}"></p>"#, i))
        .collect()
}

/// Index of the inline image a request asks about
fn image_index(request: &CompletionRequest) -> usize {
    let MessageContent::Parts(parts) = &request.messages[0].content else {
        panic!("OCR request without image parts");
    };
    parts
        .iter()
        .find_map(|part| match part {
            ContentPart::ImageUrl { image_url } => image_url.url.rsplit("IMG").next(),
            _ => None,
        })
        .and_then(|i| i.parse().ok())
        .unwrap()
}

fn stub_pipeline(client: Arc<dyn CompletionClient>, concurrency: usize) -> OcrPipeline {
    let options = OcrOptions {
        concurrency,
        max_images: 100,
        max_tokens: 1024,
        temperature: 0.1,
    };
    OcrPipeline::new(client, OcrCache::disabled(), ImageResolver::new(None), options).unwrap()
}

fn stub_settings() -> ChatConfig {
    ChatConfig {
        api_key: "sk-test".into(),
        ..ChatConfig::default()
    }
}

/// Tracks how many requests overlap and the order they start in
#[derive(Default)]
struct RecordingClient {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<usize>>,
}

#[async_trait]
impl CompletionClient for RecordingClient {
    async fn complete(&self, _config: &ChatConfig, request: CompletionRequest) -> wxreader::Result<String> {
        let index = image_index(&request);
        self.started.lock().unwrap().push(index);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(30)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("text {}", index))
    }

    async fn stream(&self, _config: &ChatConfig, _request: CompletionRequest) -> wxreader::Result<DeltaReceiver> {
        Err(anyhow::anyhow!("streaming is not used for OCR"))
    }
}

/// Holds every reply until `release` is notified
#[derive(Default)]
struct GatedClient {
    release: Notify,
}

#[async_trait]
impl CompletionClient for GatedClient {
    async fn complete(&self, _config: &ChatConfig, _request: CompletionRequest) -> wxreader::Result<String> {
        self.release.notified().await;
        Ok("released".into())
    }

    async fn stream(&self, _config: &ChatConfig, _request: CompletionRequest) -> wxreader::Result<DeltaReceiver> {
        Err(anyhow::anyhow!("streaming is not used for OCR"))
    }
}

fn ok(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(common::completion_body(text))
}

#[tokio::test]
async fn test_run_recognizes_every_image_in_order() {
    let archive = common::fixture_archive();
    let cache_dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_image(&server, "image_1", ok("first"), 1).await;
    mount_image(&server, "image_2", ok("second"), 1).await;
    mount_image(&server, "image_3", ok("third"), 1).await;

    let pipeline = pipeline(archive.path(), OcrCache::new(cache_dir.path().join("ocr")).unwrap());
    let html = article_content(archive.path());
    let (tx, rx) = watch::channel(Vec::new());

    let run = pipeline.run(&html, &settings(&server), &tx).await.unwrap();

    assert!(!run.from_cache);
    assert_eq!(run.hash, content_hash(&html));
    let texts: Vec<&str> = run.results.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
    assert!(run.results.iter().all(|r| r.status == OcrStatus::Success));
    assert!(run.results[0].url.starts_with("file://"));
    assert!(run.results[0].url.ends_with("image_1.png"));

    assert_eq!(*rx.borrow(), run.results);
    assert_eq!(
        run.context_text(),
        "\n[Image 1 Content]:\nfirst\n\n[Image 2 Content]:\nsecond\n\n[Image 3 Content]:\nthird\n"
    );
}

#[tokio::test]
async fn test_cached_results_make_no_requests() {
    let archive = common::fixture_archive();
    let cache_dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    for marker in ["image_1", "image_2", "image_3"] {
        mount_image(&server, marker, ok("text"), 1).await;
    }

    let pipeline = pipeline(archive.path(), OcrCache::new(cache_dir.path().join("ocr")).unwrap());
    let html = article_content(archive.path());
    let (tx, _rx) = watch::channel(Vec::new());

    let first = pipeline.run(&html, &settings(&server), &tx).await.unwrap();
    let second = pipeline.run(&html, &settings(&server), &tx).await.unwrap();

    assert!(second.from_cache);
    assert_eq!(second.results, first.results);
    // Each mock expects exactly one call; the server verifies on drop.
}

#[tokio::test]
async fn test_cache_with_different_count_is_ignored() {
    let archive = common::fixture_archive();
    let cache_dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    for marker in ["image_1", "image_2", "image_3"] {
        mount_image(&server, marker, ok("fresh"), 1).await;
    }

    let cache = OcrCache::new(cache_dir.path().join("ocr")).unwrap();
    let html = article_content(archive.path());
    cache.set(&content_hash(&html), &[OcrResult::pending("stale")]);

    let pipeline = pipeline(archive.path(), cache.clone());
    let (tx, _rx) = watch::channel(Vec::new());
    let run = pipeline.run(&html, &settings(&server), &tx).await.unwrap();

    assert!(!run.from_cache);
    assert_eq!(run.results.len(), 3);
    assert_eq!(cache.get(&run.hash).unwrap(), run.results);
}

#[tokio::test]
async fn test_partial_failure_is_cached_then_retried() {
    let archive = common::fixture_archive();
    let cache_dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_image(&server, "image_1", ok("one"), 1).await;
    mount_image(
        &server,
        "image_2",
        ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": {"message": "model overloaded"}})),
        1,
    )
    .await;
    mount_image(&server, "image_3", ok("three"), 1).await;

    let cache = OcrCache::new(cache_dir.path().join("ocr")).unwrap();
    let pipeline = pipeline(archive.path(), cache.clone());
    let html = article_content(archive.path());
    let (tx, _rx) = watch::channel(Vec::new());

    let mut run = pipeline.run(&html, &settings(&server), &tx).await.unwrap();

    assert_eq!(run.count(OcrStatus::Success), 2);
    let failed = &run.results[1];
    assert_eq!(failed.status, OcrStatus::Error);
    assert!(failed.text.is_empty());
    let error = failed.error.as_deref().unwrap();
    assert!(error.starts_with("model overloaded (Image: file://"));
    assert!(error.ends_with("image_2.png)"));
    assert!(run.context_text().contains("[Image 2 Content]: (识别失败: model overloaded"));

    // The failed run is cached as-is.
    let cached = cache.get(&run.hash).unwrap();
    assert_eq!(cached[1].status, OcrStatus::Error);

    server.reset().await;
    mount_image(&server, "image_2", ok("two"), 1).await;

    let status = pipeline
        .retry(&mut run, 1, &settings(&server), &tx)
        .await
        .unwrap();

    assert_eq!(status, OcrStatus::Success);
    assert_eq!(run.results[1].text, "two");
    assert!(run.results[1].error.is_none());
    assert_eq!(run.results[0].text, "one");
    assert_eq!(cache.get(&run.hash).unwrap(), run.results);
}

#[tokio::test]
async fn test_failed_retry_leaves_cache_untouched() {
    let archive = common::fixture_archive();
    let cache_dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    for marker in ["image_1", "image_3"] {
        mount_image(&server, marker, ok("fine"), 1).await;
    }
    mount_image(&server, "image_2", ResponseTemplate::new(502), 2).await;

    let cache = OcrCache::new(cache_dir.path().join("ocr")).unwrap();
    let pipeline = pipeline(archive.path(), cache.clone());
    let html = article_content(archive.path());
    let (tx, _rx) = watch::channel(Vec::new());

    let mut run = pipeline.run(&html, &settings(&server), &tx).await.unwrap();
    let before = cache.get(&run.hash).unwrap();

    let status = pipeline
        .retry(&mut run, 1, &settings(&server), &tx)
        .await
        .unwrap();

    assert_eq!(status, OcrStatus::Error);
    assert!(run.results[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("API Error: 502 Bad Gateway"));
    assert_eq!(cache.get(&run.hash).unwrap(), before);
}

#[tokio::test]
async fn test_retry_out_of_range_is_rejected() {
    let archive = common::fixture_archive();
    let server = MockServer::start().await;
    for marker in ["image_1", "image_2", "image_3"] {
        mount_image(&server, marker, ok("x"), 1).await;
    }

    let pipeline = pipeline(archive.path(), OcrCache::disabled());
    let html = article_content(archive.path());
    let (tx, _rx) = watch::channel(Vec::new());
    let mut run = pipeline.run(&html, &settings(&server), &tx).await.unwrap();

    let err = pipeline
        .retry(&mut run, 3, &settings(&server), &tx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Image 4 does not exist"));
}

#[tokio::test]
async fn test_article_without_images_needs_no_key() {
    let archive = tempfile::tempdir().unwrap();
    let pipeline = pipeline(archive.path(), OcrCache::disabled());
    let (tx, rx) = watch::channel(vec![OcrResult::pending("old")]);

    let run = pipeline
        .run("<p>just text</p>", &ChatConfig::default(), &tx)
        .await
        .unwrap();

    assert!(run.results.is_empty());
    assert!(rx.borrow().is_empty());
    assert_eq!(run.context_text(), "");
}

#[tokio::test]
async fn test_missing_key_fails_before_any_request() {
    let archive = common::fixture_archive();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok("never"))
        .expect(0)
        .mount(&server)
        .await;

    let pipeline = pipeline(archive.path(), OcrCache::disabled());
    let html = article_content(archive.path());
    let config = ChatConfig {
        base_url: server.uri(),
        ..ChatConfig::default()
    };
    let (tx, _rx) = watch::channel(Vec::new());

    let err = pipeline.run(&html, &config, &tx).await.unwrap_err();
    assert_eq!(err.to_string(), "API Key is missing");
}

#[tokio::test]
async fn test_dispatch_runs_contiguous_chunks_with_bounded_parallelism() {
    let client = Arc::new(RecordingClient::default());
    let pipeline = stub_pipeline(client.clone(), 3);
    let (tx, _rx) = watch::channel(Vec::new());

    let run = pipeline
        .run(&inline_images_html(7), &stub_settings(), &tx)
        .await
        .unwrap();

    assert_eq!(run.count(OcrStatus::Success), 7);
    assert_eq!(run.results[6].text, "text 6");

    let peak = client.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight was {}", peak);
    assert!(peak > 1, "chunks never overlapped");

    // ceil(7 / 3) = 3 images per chunk: [0, 1, 2], [3, 4, 5], [6]
    let started = client.started.lock().unwrap().clone();
    assert_eq!(started.len(), 7);
    let mut first_wave = started[..3].to_vec();
    first_wave.sort_unstable();
    assert_eq!(first_wave, vec![0, 3, 6]);
    for chunk in [vec![0, 1, 2], vec![3, 4, 5], vec![6]] {
        let seen: Vec<usize> = started.iter().copied().filter(|i| chunk.contains(i)).collect();
        assert_eq!(seen, chunk);
    }
}

#[tokio::test]
async fn test_single_worker_processes_images_in_document_order() {
    let client = Arc::new(RecordingClient::default());
    let pipeline = stub_pipeline(client.clone(), 1);
    let (tx, _rx) = watch::channel(Vec::new());

    pipeline
        .run(&inline_images_html(4), &stub_settings(), &tx)
        .await
        .unwrap();

    assert_eq!(client.peak.load(Ordering::SeqCst), 1);
    assert_eq!(*client.started.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_progress_publishes_processing_before_success() {
    let client = Arc::new(GatedClient::default());
    let pipeline = stub_pipeline(client.clone(), 3);
    let (tx, mut rx) = watch::channel(Vec::<OcrResult>::new());
    let settings = stub_settings();
    let html = inline_images_html(1);

    let observe = async {
        let mut history: Vec<OcrStatus> = Vec::new();
        while rx.changed().await.is_ok() {
            let Some(status) = rx.borrow_and_update().first().map(|r| r.status) else {
                continue;
            };
            if history.last() != Some(&status) {
                history.push(status);
            }
            match status {
                OcrStatus::Processing => client.release.notify_one(),
                OcrStatus::Success | OcrStatus::Error => break,
                OcrStatus::Pending => {}
            }
        }
        history
    };

    let (run, history) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(pipeline.run(&html, &settings, &tx), observe) },
    )
    .await
    .unwrap();

    let run = run.unwrap();
    assert_eq!(run.results[0].status, OcrStatus::Success);
    assert_eq!(run.results[0].text, "released");

    let processing = history.iter().position(|s| *s == OcrStatus::Processing).unwrap();
    let success = history.iter().position(|s| *s == OcrStatus::Success).unwrap();
    assert!(processing < success, "history was {:?}", history);
    assert!(!history.contains(&OcrStatus::Error));
}

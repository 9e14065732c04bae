use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// PNG signature followed by a marker so each test image is distinct
#[allow(dead_code)]
pub fn png_bytes(marker: &str) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(marker.as_bytes());
    bytes
}

/// Base64 payload the pipeline will inline for an image made by `png_bytes`
#[allow(dead_code)]
pub fn png_base64(marker: &str) -> String {
    STANDARD.encode(png_bytes(marker))
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Write one article with `index.html` and the named images
#[allow(dead_code)]
pub fn write_article(root: &Path, id: &str, html: &str, images: &[&str]) -> PathBuf {
    let dir = root.join(id);
    fs::create_dir_all(&dir).expect("failed to create article dir");
    fs::write(dir.join("index.html"), html).expect("failed to write article html");
    for image in images {
        let marker = image.split('.').next().unwrap_or(image);
        fs::write(dir.join(image), png_bytes(marker)).expect("failed to write image");
    }
    dir
}

/// A saved page with metadata scripts and a `js_content` body
#[allow(dead_code)]
pub fn article_html(title: &str, epoch_secs: i64, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<div class="rich_media_wrp">
  <span class="rich_media_meta rich_media_meta_text">Editor</span>
  <em id="copyright_logo">原创</em>
  <div class="rich_media_content" id="js_content" style="visibility: hidden;">{body}</div>
</div>
<script>var ct = "{epoch_secs}"; var nickname = "Test Account"; var user_name = "gh_test";</script>
<script>window.__ip = {{ ip_wording2: "上海" }};</script>
</body>
</html>"#
    )
}

/// Archive with the standard `2024-01-01_test` article and three images
#[allow(dead_code)]
pub fn fixture_archive() -> TempDir {
    let dir = TempDir::new().expect("failed to create tempdir");
    let body = r#"<h2>Introduction</h2>
<p>Article body text about the annual plan.</p>
<p><img data-ratio="0.75" data-src="image_1.png" src="image_1.png"></p>
<h3>Details</h3>
<p><img src="image_2.png"></p>
<div><img src="image_3.png"></div>"#;
    write_article(
        dir.path(),
        "2024-01-01_test",
        &article_html("Test Article", 1_704_110_400, body),
        &["image_1.png", "image_2.png", "image_3.png"],
    );
    dir
}

/// One SSE frame carrying a content delta
#[allow(dead_code)]
pub fn sse_delta(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
    )
}

/// A complete SSE body streaming `parts` then `[DONE]`
#[allow(dead_code)]
pub fn sse_body(parts: &[&str]) -> String {
    let mut body: String = parts.iter().map(|p| sse_delta(p)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// Non-streaming completion response body
#[allow(dead_code)]
pub fn completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

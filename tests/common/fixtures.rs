//! Source fixtures: a mock HTTP origin and `rclone lsjson` listings

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Deterministic fake video bytes for `name`
pub fn video_bytes(name: &str, size: usize) -> Vec<u8> {
    name.bytes().cycle().take(size).collect()
}

/// Serve each `(path, body)` pair with 200 under `/videos/<path>`
pub async fn serve_videos(server: &MockServer, videos: &[(&str, Vec<u8>)]) {
    for (name, body) in videos {
        Mock::given(method("GET"))
            .and(path(format!("/videos/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(server)
            .await;
    }
}

/// Answer `/videos/<name>` with `status` for every request
pub async fn serve_status(server: &MockServer, name: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/videos/{}", name)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Base URL items are downloaded from
pub fn source_prefix(server: &MockServer) -> String {
    format!("{}/videos", server.uri())
}

/// `rclone lsjson` output for `files`, preceded by their parent directory entry
pub fn lsjson_listing(dir: &str, files: &[&str]) -> String {
    let mut entries = vec![serde_json::json!({
        "Path": dir,
        "Name": dir,
        "Size": -1,
        "MimeType": "inode/directory",
        "ModTime": "2021-06-01T00:00:00Z",
        "IsDir": true
    })];

    for file in files {
        entries.push(serde_json::json!({
            "Path": format!("{}/{}", dir, file),
            "Name": file,
            "Size": 4096,
            "MimeType": "video/mp4",
            "ModTime": "2021-06-01T10:00:00Z",
            "IsDir": false,
            "Tier": "STANDARD"
        }));
    }

    serde_json::Value::Array(entries).to_string()
}

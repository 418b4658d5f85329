mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{spawn_app, BACKENDS};
use serde_json::json;

/// Matches `max_bytes` in the shared test configuration
const MAX_BYTES: usize = 64 * 1024;

fn multipart_upload(uri: &str, cookie: Option<&str>, file_name: &str, content: &[u8]) -> Request<Body> {
    let boundary = "labtrack-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn images_are_stored_served_and_replaced() {
    for backend in BACKENDS {
        let app = spawn_app(backend).await;
        let cookie = app.admin_cookie().await;
        let researcher = app.create(&cookie, "researchers", json!({ "full_name": "Rosalind Franklin" })).await;
        let uri = format!("/api/researchers/{}/image", researcher);

        let response = app.send(multipart_upload(&uri, Some(&cookie), "evil.php", b"<?php")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = app.send(multipart_upload(&uri, Some(&cookie), "photo 51.png", b"png-bytes")).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        let first_url = response.json()["image"].as_str().unwrap().to_string();
        assert!(first_url.starts_with("/uploads/researchers/"));
        assert!(first_url.ends_with("_photo_51.png"));

        let served = app.get(&first_url, None).await;
        assert_eq!(served.status, StatusCode::OK);
        assert_eq!(served.body, b"png-bytes");

        let response = app.send(multipart_upload(&uri, Some(&cookie), "second.jpg", b"jpg-bytes")).await;
        assert_eq!(response.status, StatusCode::OK);
        let first_file = app.upload_dir.join(first_url.trim_start_matches("/uploads/"));
        assert!(!first_file.exists());

        let record = app.get(&format!("/api/researchers/{}", researcher), None).await.json();
        assert!(record["IMAGE"].as_str().unwrap().ends_with("_second.jpg"));

        // Grades carry no image
        let grade = app.create(&cookie, "grades", json!({ "name_grade": "PhD" })).await;
        let response = app
            .send(multipart_upload(&format!("/api/grades/{}/image", grade), Some(&cookie), "a.png", b"x"))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn served_svg_cannot_run_script() {
    let app = spawn_app(BACKENDS[0]).await;
    let cookie = app.admin_cookie().await;
    let researcher = app.create(&cookie, "researchers", json!({ "full_name": "Mallory" })).await;
    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><script>fetch('/api/grades',{method:'POST'})</script></svg>"#;

    let response = app
        .send(multipart_upload(
            &format!("/api/researchers/{}/image", researcher),
            Some(&cookie),
            "x.svg",
            svg,
        ))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
    let url = response.json()["image"].as_str().unwrap().to_string();

    let served = app.get(&url, None).await;
    assert_eq!(served.status, StatusCode::OK);
    let csp = served.headers[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
    assert!(csp.contains("default-src 'none'"));
    assert!(csp.contains("sandbox"));
    assert_eq!(served.headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
}

#[tokio::test]
async fn oversized_files_are_rejected_with_a_size_message() {
    for backend in BACKENDS {
        let app = spawn_app(backend).await;
        let cookie = app.admin_cookie().await;
        let researcher = app.create(&cookie, "researchers", json!({ "full_name": "Big Picture" })).await;
        let uri = format!("/api/researchers/{}/image", researcher);
        let expected = format!("File too large. Maximum size: {} bytes", MAX_BYTES);

        // Just past the file limit, still inside the request body limit
        let response = app
            .send(multipart_upload(&uri, Some(&cookie), "big.png", &vec![0u8; MAX_BYTES + 10]))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], expected);

        // Far past it, cut off by the request body limit
        let response = app
            .send(multipart_upload(&uri, Some(&cookie), "huge.png", &vec![0u8; 200 * 1024]))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["error"], expected);

        let record = app.get(&format!("/api/researchers/{}", researcher), None).await.json();
        assert!(record.get("IMAGE").is_none());
    }
}

#[tokio::test]
async fn uploads_require_a_session() {
    let app = spawn_app(BACKENDS[1]).await;
    let response = app
        .send(multipart_upload("/api/researchers/1/image", None, "a.png", b"x"))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

//! HTTP-level tests: start the server on a free port and talk to it with
//! `reqwest`, the way a browser front end would.

use relsearch::config::Config;
use relsearch::server::run_server;
use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

// ─── Helpers ────────────────────────────────────────────────────────

const CUSTOMIZATIONS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ImportExportXml>
  <EntityRelationships>
    <EntityRelationship Name="mmpl_contact">
      <ReferencingEntityName>mmpl_Application</ReferencingEntityName>
      <ReferencedEntityName>contact</ReferencedEntityName>
      <ReferencingAttributeName>mmpl_Contact</ReferencingAttributeName>
    </EntityRelationship>
    <EntityRelationship Name="mmpl_contactid">
      <ReferencingEntityName>mmpl_Application</ReferencingEntityName>
      <ReferencedEntityName>contact</ReferencedEntityName>
      <ReferencingAttributeName>mmpl_ContactId</ReferencingAttributeName>
    </EntityRelationship>
    <EntityRelationship Name="mmpl_employerid">
      <ReferencingEntityName>mmpl_Application</ReferencingEntityName>
      <ReferencedEntityName>account</ReferencedEntityName>
      <ReferencingAttributeName>mmpl_EmployerId</ReferencingAttributeName>
    </EntityRelationship>
  </EntityRelationships>
</ImportExportXml>
"#;

fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, content) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn test_config(port: u16, restrict_to_storage: bool) -> Config {
    let config_content = format!(
        r#"
[server]
bind = "127.0.0.1:{}"
restrict_to_storage = {}
"#,
        port, restrict_to_storage
    );
    toml::from_str(&config_content).unwrap()
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Starts a server with a fresh storage root and returns its base URL.
async fn start_server(restrict_to_storage: bool) -> (TempDir, String) {
    let storage = TempDir::new().unwrap();
    let port = find_free_port();
    let cfg = test_config(port, restrict_to_storage);
    let root = storage.path().canonicalize().unwrap();

    tokio::spawn(async move {
        run_server(&cfg, &root).await.ok();
    });
    wait_for_server(port).await;

    (storage, format!("http://127.0.0.1:{}", port))
}

async fn upload(base: &str, file_name: &str, archive: Vec<u8>) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(archive).file_name(file_name.to_string());
    let form = reqwest::multipart::Form::new().part("zipfile", part);
    reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn search(base: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/search", base))
        .json(&body)
        .send()
        .await
        .unwrap()
}

fn file_count(dir: &std::path::Path) -> usize {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health() {
    let (_storage, base) = start_server(true).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_upload_then_search() {
    let (storage, base) = start_server(true).await;

    let resp = upload(
        &base,
        "Solution.zip",
        build_zip(&[("Other/Customizations.xml", CUSTOMIZATIONS)]),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    let extract_path = body["extract_path"].as_str().unwrap().to_string();
    assert!(PathBuf::from(&extract_path).starts_with(storage.path().canonicalize().unwrap()));
    assert!(extract_path.ends_with("Solution.zip_extracted"));
    assert_eq!(
        body["structure"],
        json!([
            { "path": ".", "folders": ["Other"], "files": [] },
            { "path": "Other", "folders": [], "files": ["Customizations.xml"] },
        ])
    );

    let resp = search(
        &base,
        json!({
            "extract_path": extract_path,
            "folder": "Other",
            "keywords": [],
            "attributes": [],
            "not_endings": ["Id"],
            "startings": ["mmpl_"],
        }),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "results": [{
                "file": "Other/Customizations.xml",
                "ReferencingAttributeName": "mmpl_Contact",
                "ReferencedEntityName": "contact",
                "ReferencingEntityName": "mmpl_Application",
            }]
        })
    );
}

#[tokio::test]
async fn test_same_name_uploads_get_separate_directories() {
    let (_storage, base) = start_server(true).await;
    let archive = build_zip(&[("a.xml", "<a/>")]);

    let first: Value = upload(&base, "same.zip", archive.clone()).await.json().await.unwrap();
    let second: Value = upload(&base, "same.zip", archive).await.json().await.unwrap();
    assert_ne!(first["extract_path"], second["extract_path"]);
}

#[tokio::test]
async fn test_upload_without_file_is_400() {
    let (_storage, base) = start_server(true).await;

    let form = reqwest::multipart::Form::new().text("other", "value");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No file uploaded");

    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .body("plain body")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_unsafe_upload_is_400_and_leaves_nothing() {
    let (storage, base) = start_server(true).await;

    let resp = upload(
        &base,
        "evil.zip",
        build_zip(&[("fine.xml", "<a/>"), ("../../../escape.xml", "<evil/>")]),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unsafe archive entry"));
    assert_eq!(file_count(storage.path()), 0);
    assert!(!storage.path().join("evil.zip_extracted").exists());
}

#[tokio::test]
async fn test_invalid_upload_is_400() {
    let (_storage, base) = start_server(true).await;
    let resp = upload(&base, "broken.zip", b"not a zip".to_vec()).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("invalid archive"));
}

#[tokio::test]
async fn test_search_missing_parameters_is_400() {
    let (_storage, base) = start_server(true).await;
    let resp = search(&base, json!({ "folder": "Other" })).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing parameters: extract_path");
}

#[tokio::test]
async fn test_search_outside_storage_is_rejected() {
    let (_storage, base) = start_server(true).await;
    let elsewhere = TempDir::new().unwrap();
    let resp = search(
        &base,
        json!({ "extract_path": elsewhere.path().to_str().unwrap(), "folder": "." }),
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_search_outside_storage_allowed_when_unrestricted() {
    let (_storage, base) = start_server(false).await;
    let elsewhere = TempDir::new().unwrap();
    std::fs::write(elsewhere.path().join("c.xml"), CUSTOMIZATIONS).unwrap();

    let resp = search(
        &base,
        json!({ "extract_path": elsewhere.path().to_str().unwrap(), "folder": "." }),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
}

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use clinic_reports::api::error::AppError;
use clinic_reports::config::ReportsConfig;
use clinic_reports::entities::reports;
use clinic_reports::infrastructure::database;
use clinic_reports::services::catalog::{ReportCatalog, SeaOrmCatalog};
use clinic_reports::services::report_service::ReportService;
use clinic_reports::services::storage::LocalBlobStore;
use clinic_reports::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------974767299852498929531610575";

struct TestApp {
    app: Router,
    uploads: TempDir,
}

async fn setup() -> TestApp {
    let db = database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    setup_with_catalog(Arc::new(SeaOrmCatalog::new(db)), None).await
}

async fn setup_with_catalog(
    catalog: Arc<dyn ReportCatalog>,
    max_file_size: Option<usize>,
) -> TestApp {
    let uploads = TempDir::new().unwrap();
    let mut config = ReportsConfig::development(uploads.path());
    if let Some(max) = max_file_size {
        config.max_file_size = max;
    }

    let blobs = Arc::new(LocalBlobStore::new(
        &config.uploads_dir,
        &config.public_uploads_path,
    ));
    let report_service = Arc::new(ReportService::new(blobs, catalog));

    let app = create_app(AppState {
        report_service,
        config,
    });

    TestApp { app, uploads }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                        name, value
                    )
                    .as_bytes(),
                );
            }
            Part::File(name, filename, data) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn upload(app: &Router, parts: &[Part<'_>]) -> Response {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri("/api/upload-report")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap(),
    )
    .await
}

async fn upload_simple(app: &Router, owner: &str, filename: &str, data: &[u8]) -> Value {
    let response = upload(
        app,
        &[
            Part::Text("ownerIdentity", owner),
            Part::Text("category", "X-Ray"),
            Part::File("reportFile", filename, data),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

async fn list(app: &Router, owner: &str) -> Vec<Value> {
    let response = send(
        app,
        Request::builder()
            .uri(format!("/api/get-my-reports?ownerIdentity={}", owner))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await.as_array().unwrap().clone()
}

async fn delete(app: &Router, id: &str) -> Response {
    send(
        app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/delete-report/{}", id))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

async fn get(app: &Router, uri: &str) -> Response {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn files_in(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn test_upload_then_list_and_fetch_content() {
    let t = setup().await;
    let content = b"%PDF-1.4 complete blood count";

    let uploaded = upload(
        &t.app,
        &[
            Part::File("reportFile", "lab results.pdf", content),
            Part::Text("ownerIdentity", "alice@example.com"),
            Part::Text("category", "Blood Test (CBC)"),
            Part::Text("notes", "  fasting sample  "),
        ],
    )
    .await;
    assert_eq!(uploaded.status(), StatusCode::OK);
    let uploaded = json_body(uploaded).await;
    assert_eq!(
        uploaded["message"],
        "File uploaded and data saved successfully!"
    );
    assert_eq!(uploaded["displayName"], "lab results.pdf");
    assert!(uploaded["storageKey"].as_str().unwrap().ends_with("lab_results.pdf"));

    let reports = list(&t.app, "alice@example.com").await;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report["id"], uploaded["id"]);
    assert_eq!(report["displayName"], "lab results.pdf");
    assert_eq!(report["category"], "Blood Test (CBC)");
    assert_eq!(report["notes"], "fasting sample");
    assert!(report["createdAt"].is_string());

    let locator = report["resolvedLocator"].as_str().unwrap();
    assert!(locator.starts_with("/uploads/alice_example_com/"));

    let fetched = get(&t.app, locator).await;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(body_bytes(fetched).await, content);
}

#[tokio::test]
async fn test_owner_isolation() {
    let t = setup().await;

    upload_simple(&t.app, "alice@example.com", "a.pdf", b"alice").await;
    upload_simple(&t.app, "bob@example.com", "b.pdf", b"bob").await;

    let alice = list(&t.app, "alice@example.com").await;
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0]["displayName"], "a.pdf");

    let bob = list(&t.app, "bob@example.com").await;
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0]["displayName"], "b.pdf");
}

#[tokio::test]
async fn test_owners_sharing_a_partition_stay_isolated() {
    let t = setup().await;

    // Both identities map to the partition directory `a_b_x_io`
    let dotted = upload_simple(&t.app, "a.b@x.io", "same.pdf", b"dotted owner").await;
    upload_simple(&t.app, "a_b@x.io", "same.pdf", b"underscore owner").await;

    let dotted_reports = list(&t.app, "a.b@x.io").await;
    let underscore_reports = list(&t.app, "a_b@x.io").await;
    assert_eq!(dotted_reports.len(), 1);
    assert_eq!(underscore_reports.len(), 1);
    assert_eq!(dotted_reports[0]["id"], dotted["id"]);

    let dotted_locator = dotted_reports[0]["resolvedLocator"].as_str().unwrap().to_string();
    let underscore_locator = underscore_reports[0]["resolvedLocator"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(dotted_locator.starts_with("/uploads/a_b_x_io/"));
    assert!(underscore_locator.starts_with("/uploads/a_b_x_io/"));
    assert_ne!(dotted_locator, underscore_locator);

    assert_eq!(body_bytes(get(&t.app, &dotted_locator).await).await, b"dotted owner");
    assert_eq!(
        body_bytes(get(&t.app, &underscore_locator).await).await,
        b"underscore owner"
    );

    let response = delete(&t.app, dotted["id"].as_str().unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(list(&t.app, "a.b@x.io").await.is_empty());
    assert_eq!(get(&t.app, &dotted_locator).await.status(), StatusCode::NOT_FOUND);

    let remaining = list(&t.app, "a_b@x.io").await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(
        body_bytes(get(&t.app, &underscore_locator).await).await,
        b"underscore owner"
    );
}

#[tokio::test]
async fn test_display_name_drops_client_directories() {
    let t = setup().await;

    let uploaded = upload_simple(&t.app, "alice@example.com", "reports/2024/same.pdf", b"pdf").await;
    assert_eq!(uploaded["displayName"], "same.pdf");

    let reports = list(&t.app, "alice@example.com").await;
    assert_eq!(reports[0]["displayName"], "same.pdf");
}

#[tokio::test]
async fn test_same_name_uploads_do_not_overwrite() {
    let t = setup().await;

    let first = upload_simple(&t.app, "alice@example.com", "scan.png", b"first scan").await;
    let second = upload_simple(&t.app, "alice@example.com", "scan.png", b"second scan").await;
    assert_ne!(first["storageKey"], second["storageKey"]);
    assert_ne!(first["id"], second["id"]);

    let reports = list(&t.app, "alice@example.com").await;
    assert_eq!(reports.len(), 2);

    let mut contents = Vec::new();
    for report in &reports {
        assert_eq!(report["displayName"], "scan.png");
        let fetched = get(&t.app, report["resolvedLocator"].as_str().unwrap()).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        contents.push(body_bytes(fetched).await);
    }
    contents.sort();
    assert_eq!(contents, vec![b"first scan".to_vec(), b"second scan".to_vec()]);
}

#[tokio::test]
async fn test_delete_removes_record_and_content() {
    let t = setup().await;

    let uploaded = upload_simple(&t.app, "alice@example.com", "mri.dcm", b"mri data").await;
    let id = uploaded["id"].as_str().unwrap();
    let locator = list(&t.app, "alice@example.com").await[0]["resolvedLocator"]
        .as_str()
        .unwrap()
        .to_string();

    let response = delete(&t.app, id).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "Report deleted successfully.");

    assert!(list(&t.app, "alice@example.com").await.is_empty());
    assert_eq!(get(&t.app, &locator).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        get(&t.app, &format!("/api/reports/{}/download", id))
            .await
            .status(),
        StatusCode::NOT_FOUND
    );

    let again = delete(&t.app, id).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(again).await["message"], "Report not found.");
}

#[tokio::test]
async fn test_delete_unknown_id_is_not_found() {
    let t = setup().await;
    let response = delete(&t.app, "does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Catalog that refuses every write.
struct UnavailableCatalog;

#[async_trait]
impl ReportCatalog for UnavailableCatalog {
    async fn insert(&self, _record: reports::Model) -> Result<String, AppError> {
        Err(AppError::Persistence(sea_orm::DbErr::Custom(
            "connection refused".to_string(),
        )))
    }

    async fn list_by_owner(&self, _owner_identity: &str) -> Result<Vec<reports::Model>, AppError> {
        Ok(Vec::new())
    }

    async fn find_by_id(&self, _id: &str) -> Result<reports::Model, AppError> {
        Err(AppError::NotFound("Report not found.".to_string()))
    }

    async fn delete_by_id(&self, _id: &str) -> Result<(), AppError> {
        Err(AppError::NotFound("Report not found.".to_string()))
    }

    async fn ping(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_failed_insert_leaves_no_blob_behind() {
    let t = setup_with_catalog(Arc::new(UnavailableCatalog), None).await;

    let response = upload(
        &t.app,
        &[
            Part::Text("ownerIdentity", "alice@example.com"),
            Part::File("reportFile", "report.pdf", b"orphan candidate"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["message"].is_string());

    assert_eq!(files_in(&t.uploads.path().join("alice_example_com")), 0);
}

#[tokio::test]
async fn test_empty_listing_for_unknown_owner() {
    let t = setup().await;
    assert!(list(&t.app, "nobody@example.com").await.is_empty());
}

#[tokio::test]
async fn test_listing_is_most_recent_first() {
    let t = setup().await;

    for name in ["first.pdf", "second.pdf", "third.pdf"] {
        upload_simple(&t.app, "alice@example.com", name, name.as_bytes()).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let names: Vec<String> = list(&t.app, "alice@example.com")
        .await
        .iter()
        .map(|r| r["displayName"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["third.pdf", "second.pdf", "first.pdf"]);
}

#[tokio::test]
async fn test_upload_rejects_missing_fields() {
    let t = setup().await;

    let no_file = upload(&t.app, &[Part::Text("ownerIdentity", "alice@example.com")]).await;
    assert_eq!(no_file.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(no_file).await["message"], "Missing user email or file.");

    let no_owner = upload(&t.app, &[Part::File("reportFile", "a.pdf", b"data")]).await;
    assert_eq!(no_owner.status(), StatusCode::BAD_REQUEST);

    let empty_file = upload(
        &t.app,
        &[
            Part::Text("ownerIdentity", "alice@example.com"),
            Part::File("reportFile", "a.pdf", b""),
        ],
    )
    .await;
    assert_eq!(empty_file.status(), StatusCode::BAD_REQUEST);

    assert!(list(&t.app, "alice@example.com").await.is_empty());
}

#[tokio::test]
async fn test_upload_accepts_legacy_field_names() {
    let t = setup().await;

    let response = upload(
        &t.app,
        &[
            Part::Text("userEmail", "carol@example.com"),
            Part::Text("reportType", "Other"),
            Part::Text("otherCategory", "Dental chart"),
            Part::File("file", "teeth.jpg", b"jpeg"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&t.app, "/api/get-my-reports?email=carol@example.com").await;
    assert_eq!(response.status(), StatusCode::OK);
    let reports = json_body(response).await;
    assert_eq!(reports[0]["category"], "Dental chart");
}

#[tokio::test]
async fn test_list_requires_owner() {
    let t = setup().await;
    let response = get(&t.app, "/api/get-my-reports").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let db = database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    let t = setup_with_catalog(Arc::new(SeaOrmCatalog::new(db)), Some(1024)).await;

    let big = vec![7u8; 4096];
    let response = upload(
        &t.app,
        &[
            Part::Text("ownerIdentity", "alice@example.com"),
            Part::File("reportFile", "big.bin", &big),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(list(&t.app, "alice@example.com").await.is_empty());
    assert_eq!(files_in(&t.uploads.path().join("alice_example_com")), 0);
}

#[tokio::test]
async fn test_download_streams_attachment() {
    let t = setup().await;
    let uploaded = upload_simple(&t.app, "alice@example.com", "lab results.pdf", b"pdf bytes").await;

    let response = get(
        &t.app,
        &format!("/api/reports/{}/download", uploaded["id"].as_str().unwrap()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''lab%20results%2Epdf"
    );
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "9");
    assert_eq!(body_bytes(response).await, b"pdf bytes");
}

#[tokio::test]
async fn test_health_and_request_id() {
    let t = setup().await;

    let response = send(
        &t.app,
        Request::builder()
            .uri("/health")
            .header("x-request-id", "req-123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let health = json_body(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["database"], "connected");
    assert_eq!(health["storage"], "writable");

    let response = get(&t.app, "/health").await;
    assert!(response.headers().contains_key("x-request-id"));
}

use std::io::{Cursor, Write};

use attachments_core::download::HttpFetcher;
use attachments_core::{Attachments, UnpackError};
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream;
use zip::write::SimpleFileOptions;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

fn bundle_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [("docs/a.md", "# A"), ("docs/b.md", "# B")] {
        writer
            .start_file(name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn app() -> Router {
    Router::new()
        .route(
            "/download",
            get(|| async {
                (
                    [(header::CONTENT_DISPOSITION, r#"attachment; filename="quarterly report.csv""#)],
                    "q,total\n1,10\n",
                )
            }),
        )
        .route("/files/:name", get(|| async { "plain notes" }))
        .route("/big.bin", get(|| async { vec![7u8; 4096] }))
        .route(
            "/stream.bin",
            get(|| async {
                // No Content-Length: only the running counter can stop it.
                let chunks = (0..8).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![1u8; 1024])));
                Body::from_stream(stream::iter(chunks))
            }),
        )
        .route("/latest", get(|| async { Redirect::to("/files/real.txt") }))
        .route(
            "/bundle.zip",
            get(|| async { ([(header::CONTENT_TYPE, "application/zip")], bundle_zip()) }),
        )
        .route(
            "/missing",
            get(|| async { StatusCode::NOT_FOUND.into_response() }),
        )
}

#[tokio::test]
async fn content_disposition_names_the_file() {
    let base = serve(app()).await;
    let fetcher = HttpFetcher::new("attachments-test", 1024 * 1024);

    let (name, body) = fetcher.fetch(&format!("{base}/download")).await.unwrap();
    assert_eq!(name, "quarterly report.csv");
    assert_eq!(&body[..], b"q,total\n1,10\n");
}

#[tokio::test]
async fn url_path_names_the_file_without_disposition() {
    let base = serve(app()).await;
    let fetcher = HttpFetcher::new("attachments-test", 1024 * 1024);

    let (name, body) = fetcher
        .fetch(&format!("{base}/files/notes%20v2.txt"))
        .await
        .unwrap();
    assert_eq!(name, "notes v2.txt");
    assert_eq!(&body[..], b"plain notes");
}

#[tokio::test]
async fn body_over_the_cap_fails_without_output() {
    let base = serve(app()).await;
    let fetcher = HttpFetcher::new("attachments-test", 1024);

    let err = fetcher.fetch(&format!("{base}/big.bin")).await.unwrap_err();
    assert!(matches!(err, UnpackError::SizeLimitExceeded { limit_mb: 0, .. }));
}

#[tokio::test]
async fn downloaded_archive_is_exploded() {
    let base = serve(app()).await;
    let entries = Attachments::new()
        .unpack(&format!("{base}/bundle.zip"), &[])
        .await
        .unwrap();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["bundle.zip/docs/a.md", "bundle.zip/docs/b.md"]);
}

#[tokio::test]
async fn error_status_is_reported() {
    let base = serve(app()).await;
    let fetcher = HttpFetcher::new("attachments-test", 1024);

    let err = fetcher.fetch(&format!("{base}/missing")).await.unwrap_err();
    assert!(matches!(err, UnpackError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn streamed_body_over_the_cap_is_aborted() {
    let base = serve(app()).await;
    let fetcher = HttpFetcher::new("attachments-test", 2048);

    let err = fetcher.fetch(&format!("{base}/stream.bin")).await.unwrap_err();
    assert!(matches!(err, UnpackError::SizeLimitExceeded { .. }));

    let roomy = HttpFetcher::new("attachments-test", 64 * 1024);
    let (_, body) = roomy.fetch(&format!("{base}/stream.bin")).await.unwrap();
    assert_eq!(body.len(), 8 * 1024);
}

#[tokio::test]
async fn redirects_are_followed_and_name_comes_from_final_url() {
    let base = serve(app()).await;
    let fetcher = HttpFetcher::new("attachments-test", 1024 * 1024);

    let (name, body) = fetcher.fetch(&format!("{base}/latest")).await.unwrap();
    assert_eq!(name, "real.txt");
    assert_eq!(&body[..], b"plain notes");
}

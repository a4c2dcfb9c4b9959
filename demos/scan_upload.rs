//! Upload scan example with mock scanners.
//!
//! This example shows how to:
//! - Wire a dispatcher and a review queue into a `ScanService`
//! - Submit an upload and read the normalized results
//! - Act on the review entries a malware hit creates
//!
//! Run with: RUST_LOG=info cargo run --example scan_upload

use scanwarden::backends::{MockAdapter, MockBehavior};
use scanwarden::prelude::*;
use scanwarden::review::MemoryStore;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Scanwarden Upload Scan Example ===\n");

    let workdir = tempfile::TempDir::new()?;
    let reviews = Arc::new(ReviewQueue::new(Arc::new(MemoryStore::new())));

    // Stand-ins for the real tools: a clean Trivy, an infected ClamAV and a
    // YARA run that never finishes.
    let dispatcher = ScanDispatcher::builder()
        .add_adapter(
            MockAdapter::new("trivy", ScannerKind::VulnScan)
                .with_label("Trivy FS")
                .with_stdout(r#"{"Results": []}"#),
        )
        .add_adapter(
            MockAdapter::new("clamav", ScannerKind::Av)
                .with_label("ClamAV")
                .with_stdout("/uploads/invoice.pdf: Win.Test.EICAR_HDB-1 FOUND\n"),
        )
        .add_adapter(
            MockAdapter::new("yara", ScannerKind::SignatureMatch)
                .with_label("YARA")
                .with_behavior(MockBehavior::Hang),
        )
        .with_review_queue(Arc::clone(&reviews))
        .with_config(DispatcherConfig::new().with_adapter_timeout(Duration::from_secs(2)))
        .build()?;

    let service = ScanService::new(dispatcher, reviews, workdir.path().join("uploads"));

    let request = ScanRequest::upload(vec![UploadedFile::new(
        "invoice.pdf",
        b"%PDF-1.7 not really a pdf".to_vec(),
    )]);
    let report = service.handle_scan(request).await?;

    println!("\n=== Scan Results ===");
    for result in report.all_results() {
        let status = if result.succeeded { "ok" } else { "failed" };
        println!(
            "  {:<10} {:<8} {:<8} {}",
            result.scan_type,
            status,
            format!("{:?}", result.severity),
            result.details.lines().next().unwrap_or_default()
        );
    }

    let status = service.status();
    println!("\nScan completed: {}", status.scan_completed);
    println!("Findings exist: {}", status.findings_exist);

    println!("\n=== Review Queue ===");
    for (position, entry) in service.list_reviews().await?.iter().enumerate() {
        println!("  [{}] {} via {} - {:?}", position, entry.path, entry.scan_type, entry.status);
    }

    let response = service.mark_reviewed(0usize).await;
    println!("\nMark reviewed: {}", serde_json::to_string(&response)?);

    let response = service.delete_review(7usize).await;
    println!("Delete out of range: {}", serde_json::to_string(&response)?);

    println!("\n=== Example Complete ===");
    Ok(())
}

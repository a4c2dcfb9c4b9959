//! End-to-end dispatcher scenarios with mock adapters.

use async_trait::async_trait;
use scanwarden::backends::{MockAdapter, MockBehavior, TrivyConfig, TrivyScanner};
use scanwarden::core::FailureKind;
use scanwarden::manager::DispatcherConfig;
use scanwarden::prelude::*;
use scanwarden::review::JsonFileStore;
use scanwarden::workspace::{ImageExporter, RepositoryCloner};

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TRIVY_WITH_CRITICAL: &str = r#"{
  "Results": [
    {
      "Target": "requirements.txt",
      "Vulnerabilities": [
        {"VulnerabilityID": "CVE-2024-0001", "PkgName": "django", "Severity": "CRITICAL"}
      ]
    }
  ]
}"#;

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    let mut names: Vec<String> = paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

#[derive(Debug)]
struct FakeCloner;

#[async_trait]
impl RepositoryCloner for FakeCloner {
    async fn clone_repo(&self, _url: &str, dest: &Path) -> Result<PathBuf, ScanError> {
        let checkout = dest.join("repo");
        std::fs::create_dir_all(checkout.join("src"))?;
        std::fs::write(checkout.join("src/main.py"), b"print('hi')")?;
        Ok(checkout)
    }
}

#[derive(Debug)]
struct FailingExporter;

#[async_trait]
impl ImageExporter for FailingExporter {
    async fn export(&self, image: &str, _dest: &Path) -> Result<PathBuf, ScanError> {
        Err(ScanError::engine_unavailable("docker", format!("no such image: {}", image)))
    }
}

#[tokio::test]
async fn plain_file_gets_one_result_per_adapter() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, b"nothing to see").unwrap();

    let dispatcher = ScanDispatcher::builder()
        .add_adapter(MockAdapter::new("trivy", ScannerKind::VulnScan).with_label("Trivy FS"))
        .add_adapter(MockAdapter::new("clamav", ScannerKind::Av).with_label("ClamAV"))
        .add_adapter(MockAdapter::new("yara", ScannerKind::SignatureMatch).with_label("YARA"))
        .build()
        .unwrap();

    let report = dispatcher.dispatch(&ArtifactRef::path(&file), &ScanContext::new()).await.unwrap();

    let labels: Vec<_> = report.file_scan_results.iter().map(|r| r.scan_type.as_str()).collect();
    assert_eq!(labels, vec!["Trivy FS", "ClamAV", "YARA"]);
    assert!(report.all_results().all(|r| r.succeeded && r.severity == Severity::Info));
    assert!(report.image_scan_results.is_empty());
    assert!(!report.findings_exist());
}

#[tokio::test]
async fn archive_is_extracted_scanned_and_cleaned_up() {
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let archive = dir.path().join("bundle.zip");
    write_zip(&archive, &[("a.txt", b"one"), ("nested/b.txt", b"two")]);

    let clamav = Arc::new(MockAdapter::new("clamav", ScannerKind::Av));
    let dispatcher = ScanDispatcher::builder()
        .add_arc_adapter(clamav.clone())
        .with_config(DispatcherConfig::new().with_work_dir(&work))
        .build()
        .unwrap();

    let report = dispatcher.dispatch(&ArtifactRef::path(&archive), &ScanContext::new()).await.unwrap();

    assert_eq!(report.file_scan_results.len(), 1);
    assert!(report.file_scan_results[0].succeeded);
    assert_eq!(report.file_scan_results[0].target, archive.display().to_string());

    assert_eq!(file_names(&clamav.observed_files()), vec!["a.txt", "b.txt"]);
    let scanned = clamav.targets()[0].as_path().unwrap().to_path_buf();
    assert!(scanned.starts_with(&work));
    assert!(!scanned.exists());
    assert!(is_empty_dir(&work));
}

#[tokio::test]
async fn corrupt_archive_fails_every_adapter() {
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    let archive = dir.path().join("broken.zip");
    write_zip(&archive, &[("a.txt", &[7u8; 4096])]);
    let bytes = std::fs::read(&archive).unwrap();
    std::fs::write(&archive, &bytes[..bytes.len() / 2]).unwrap();

    let trivy = Arc::new(MockAdapter::new("trivy", ScannerKind::VulnScan));
    let dispatcher = ScanDispatcher::builder()
        .add_arc_adapter(trivy.clone())
        .add_adapter(MockAdapter::new("clamav", ScannerKind::Av))
        .with_config(DispatcherConfig::new().with_work_dir(&work))
        .build()
        .unwrap();

    let report = dispatcher.dispatch(&ArtifactRef::path(&archive), &ScanContext::new()).await.unwrap();

    assert_eq!(report.file_scan_results.len(), 2);
    for result in &report.file_scan_results {
        assert!(!result.succeeded);
        assert_eq!(result.failure, Some(FailureKind::Extraction));
        assert!(result.details.starts_with("archive invalid"));
    }
    assert_eq!(trivy.invocation_count(), 0);
    assert!(is_empty_dir(&work));
}

#[tokio::test]
async fn failing_adapters_do_not_affect_siblings() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("a.bin");
    std::fs::write(&file, b"data").unwrap();

    let dispatcher = ScanDispatcher::builder()
        .add_adapter(
            MockAdapter::new("trivy", ScannerKind::VulnScan)
                .with_behavior(MockBehavior::Unavailable("trivy: not found".into())),
        )
        .add_adapter(MockAdapter::new("clamav", ScannerKind::Av).with_behavior(MockBehavior::AbnormalExit {
            exit_code: 2,
            stderr: "LibClamAV Error: database not found".into(),
        }))
        .add_adapter(MockAdapter::new("yara", ScannerKind::SignatureMatch))
        .build()
        .unwrap();

    let report = dispatcher.dispatch(&ArtifactRef::path(&file), &ScanContext::new()).await.unwrap();
    let results = &report.file_scan_results;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].failure, Some(FailureKind::Unavailable));
    assert_eq!(results[1].failure, Some(FailureKind::NonZeroExit));
    assert!(results[1].details.contains("database not found"));
    assert!(results[2].succeeded);
    assert!(report.is_partial_failure());
    assert!(report.escalated.is_empty());
}

#[tokio::test]
async fn only_malware_hits_are_escalated() {
    let dir = TempDir::new().unwrap();
    let upload = dir.path().join("eicar.com");
    std::fs::write(&upload, b"X5O!P%@AP[4\\PZX54(P^)7CC)7}").unwrap();
    let review_file = dir.path().join("results/review.json");

    let reviews = Arc::new(ReviewQueue::new(Arc::new(JsonFileStore::open(&review_file).unwrap())));
    let dispatcher = ScanDispatcher::builder()
        .add_adapter(
            MockAdapter::new("trivy", ScannerKind::VulnScan)
                .with_label("Trivy FS")
                .with_stdout(TRIVY_WITH_CRITICAL),
        )
        .add_adapter(
            MockAdapter::new("clamav", ScannerKind::Av)
                .with_label("ClamAV")
                .with_stdout(format!("{}: Eicar-Signature FOUND\n", upload.display())),
        )
        .with_review_queue(reviews)
        .build()
        .unwrap();

    let context = ScanContext::new().with_artifact_name("eicar.com");
    let report = dispatcher.dispatch(&ArtifactRef::path(&upload), &context).await.unwrap();

    assert_eq!(report.file_scan_results[0].severity, Severity::Critical);
    assert_eq!(report.file_scan_results[1].severity, Severity::Critical);
    assert_eq!(report.escalated.len(), 1);
    assert_eq!(report.escalated[0].scan_type, "ClamAV");
    assert_eq!(report.escalated[0].detections, vec!["Eicar-Signature".to_string()]);

    let persisted = JsonFileStore::open(&review_file).unwrap();
    let queue = ReviewQueue::new(Arc::new(persisted));
    let entries = queue.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "eicar.com");
    assert_eq!(entries[0].status, ReviewStatus::PendingReview);

    let raw = std::fs::read_to_string(&review_file).unwrap();
    assert!(raw.contains("\"Pending Review\""));
}

#[tokio::test]
async fn unsafe_input_is_rejected_before_any_adapter_runs() {
    let clamav = Arc::new(MockAdapter::new("clamav", ScannerKind::Av));
    let trivy = Arc::new(
        MockAdapter::new("trivy", ScannerKind::VulnScan)
            .with_supported(&[ArtifactKind::Filesystem, ArtifactKind::Image, ArtifactKind::Repository]),
    );
    let dispatcher = ScanDispatcher::builder()
        .add_arc_adapter(clamav.clone())
        .add_arc_adapter(trivy.clone())
        .build()
        .unwrap();

    for artifact in [
        ArtifactRef::path("/uploads/../../etc/shadow"),
        ArtifactRef::image("--output=/etc/passwd"),
        ArtifactRef::repository("https://example.com/r.git; rm -rf /"),
    ] {
        let err = dispatcher.dispatch(&artifact, &ScanContext::new()).await.unwrap_err();
        assert!(err.is_invalid_input(), "{} should be rejected", artifact);
    }
    assert_eq!(clamav.invocation_count(), 0);
    assert_eq!(trivy.invocation_count(), 0);
}

#[tokio::test]
async fn hung_adapter_times_out() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("a.bin");
    std::fs::write(&file, b"data").unwrap();

    let dispatcher = ScanDispatcher::builder()
        .add_adapter(MockAdapter::new("clamav", ScannerKind::Av).with_behavior(MockBehavior::Hang))
        .add_adapter(MockAdapter::new("yara", ScannerKind::SignatureMatch))
        .with_config(DispatcherConfig::new().with_adapter_timeout(Duration::from_millis(200)))
        .build()
        .unwrap();

    let report = dispatcher.dispatch(&ArtifactRef::path(&file), &ScanContext::new()).await.unwrap();

    assert_eq!(report.file_scan_results[0].details, "timed out");
    assert!(!report.file_scan_results[0].succeeded);
    assert!(report.file_scan_results[1].succeeded);
}

#[tokio::test]
async fn repository_scans_remote_then_clone() {
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();

    let clamav = Arc::new(MockAdapter::new("clamav", ScannerKind::Av).with_label("ClamAV"));
    let trivy = Arc::new(
        MockAdapter::new("trivy", ScannerKind::VulnScan)
            .with_label("Trivy")
            .with_supported(&[ArtifactKind::Filesystem, ArtifactKind::Repository])
            .with_latency(Duration::from_millis(50)),
    );
    let dispatcher = ScanDispatcher::builder()
        .add_arc_adapter(trivy.clone())
        .add_arc_adapter(clamav.clone())
        .with_repository_cloner(FakeCloner)
        .with_config(DispatcherConfig::new().with_work_dir(&work))
        .build()
        .unwrap();

    let url = "https://github.com/example/project.git";
    let report = dispatcher.dispatch(&ArtifactRef::repository(url), &ScanContext::new()).await.unwrap();

    let labels: Vec<_> = report.git_scan_results.iter().map(|r| r.scan_type.as_str()).collect();
    assert_eq!(labels, vec!["Trivy", "Trivy", "ClamAV"]);
    assert!(report.git_scan_results.iter().all(|r| r.succeeded && r.target == url));

    // trivy sees the URL first, then the checkout
    let trivy_targets = trivy.targets();
    assert_eq!(trivy_targets[0], ArtifactRef::repository(url));
    assert!(trivy_targets[1].as_path().is_some());
    assert_eq!(file_names(&trivy.observed_files()), vec!["main.py"]);
    assert_eq!(file_names(&clamav.observed_files()), vec!["main.py"]);
    assert!(is_empty_dir(&work));
}

#[tokio::test]
async fn repository_checkout_gets_trivy_fs_result() {
    let trivy = TrivyScanner::new(TrivyConfig::new().with_program("/nonexistent/trivy"));
    let dispatcher = ScanDispatcher::builder()
        .add_adapter(trivy)
        .with_repository_cloner(FakeCloner)
        .build()
        .unwrap();

    let url = "https://github.com/example/project.git";
    let report = dispatcher.dispatch(&ArtifactRef::repository(url), &ScanContext::new()).await.unwrap();

    let labels: Vec<_> = report.git_scan_results.iter().map(|r| r.scan_type.as_str()).collect();
    assert_eq!(labels, vec!["Trivy Repo", "Trivy FS"]);
    assert!(report
        .git_scan_results
        .iter()
        .all(|r| r.failure == Some(FailureKind::Unavailable)));
}

#[tokio::test]
async fn image_export_failure_only_fails_local_engines() {
    let dispatcher = ScanDispatcher::builder()
        .add_adapter(
            MockAdapter::new("grype", ScannerKind::SbomScan)
                .with_label("Grype")
                .with_supported(&[ArtifactKind::Image]),
        )
        .add_adapter(MockAdapter::new("yara", ScannerKind::SignatureMatch).with_label("YARA"))
        .with_image_exporter(FailingExporter)
        .build()
        .unwrap();

    let report = dispatcher
        .dispatch(&ArtifactRef::image("registry.local/app:1.2"), &ScanContext::new())
        .await
        .unwrap();
    let results = &report.image_scan_results;

    assert_eq!(results.len(), 2);
    assert!(results[0].succeeded);
    assert!(!results[1].succeeded);
    assert_eq!(results[1].failure, Some(FailureKind::Unavailable));
    assert!(results[1].details.contains("no such image"));
}

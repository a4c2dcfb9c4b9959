//! The request-level scan service.

use crate::backends::{
    ClamAvConfig, ClamAvScanner, GrypeConfig, GrypeScanner, TrivyConfig, TrivyScanner, YaraConfig,
    YaraScanner,
};
use crate::config::ServiceConfig;
use crate::core::artifact::validate_bare_name;
use crate::core::{
    ArtifactKind, ArtifactRef, FileHasher, ReviewError, ReviewResult, ScanContext, ScanError,
    ScanReport,
};
use crate::manager::dispatcher::{DispatcherConfig, ScanDispatcher};
use crate::manager::session::{ScanSession, SessionSnapshot};
use crate::review::{JsonFileStore, ReviewEntry, ReviewQueue, ReviewRef};
use crate::workspace::{DockerImageExporter, GitCloner, TempWorkspace};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// One uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Client-supplied file name; must be a bare name.
    pub filename: String,

    /// File contents.
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Creates an uploaded file.
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// A scan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Which kind of artifact the request carries.
    pub scan_type: ArtifactKind,

    /// Uploaded files, for `filesystem` requests.
    #[serde(default)]
    pub files: Vec<UploadedFile>,

    /// Image reference, for `image` requests.
    #[serde(default)]
    pub image_name: Option<String>,

    /// Repository URL, for `git` requests.
    #[serde(default)]
    pub repo_url: Option<String>,
}

impl ScanRequest {
    /// A request to scan uploaded files.
    pub fn upload(files: Vec<UploadedFile>) -> Self {
        Self {
            scan_type: ArtifactKind::Filesystem,
            files,
            image_name: None,
            repo_url: None,
        }
    }

    /// A request to scan a container image.
    pub fn image(name: impl Into<String>) -> Self {
        Self {
            scan_type: ArtifactKind::Image,
            files: Vec::new(),
            image_name: Some(name.into()),
            repo_url: None,
        }
    }

    /// A request to scan a repository.
    pub fn repository(url: impl Into<String>) -> Self {
        Self {
            scan_type: ArtifactKind::Repository,
            files: Vec::new(),
            image_name: None,
            repo_url: Some(url.into()),
        }
    }
}

/// Response to a review action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionResponse {
    /// The action succeeded.
    Message {
        /// Human-readable confirmation.
        message: String,
    },
    /// The action failed.
    Error {
        /// Human-readable reason.
        error: String,
    },
}

impl ActionResponse {
    /// Creates a success response.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Creates a failure response.
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into() }
    }

    /// Returns `true` for a success response.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Message { .. })
    }
}

/// Scan requests, status polling and review actions in one place.
///
/// # Example
///
/// ```rust,ignore
/// use scanwarden::manager::{ScanRequest, ScanService, UploadedFile};
/// use scanwarden::ServiceConfig;
///
/// let service = ScanService::from_config(&ServiceConfig::from_env()?)?;
/// let report = service
///     .handle_scan(ScanRequest::upload(vec![UploadedFile::new("invoice.zip", bytes)]))
///     .await?;
/// println!("findings: {}", service.status().findings_exist);
/// ```
pub struct ScanService {
    dispatcher: ScanDispatcher,
    session: ScanSession,
    reviews: Arc<ReviewQueue>,
    upload_dir: PathBuf,
    max_upload_size: u64,
    hasher: FileHasher,
}

impl ScanService {
    /// Creates a service over an existing dispatcher and review queue.
    ///
    /// The dispatcher should escalate into the same `reviews` queue.
    pub fn new(dispatcher: ScanDispatcher, reviews: Arc<ReviewQueue>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            dispatcher,
            session: ScanSession::new(),
            reviews,
            upload_dir: upload_dir.into(),
            max_upload_size: ServiceConfig::default().max_upload_size,
            hasher: FileHasher::new(),
        }
    }

    /// Sets the maximum size of one uploaded file.
    pub fn with_max_upload_size(mut self, size: u64) -> Self {
        self.max_upload_size = size;
        self
    }

    /// Wires the Trivy, Grype, ClamAV and YARA adapters from `config`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the review file cannot be opened or the
    /// ClamAV transport is unsupported on this build.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ScanError> {
        let store = JsonFileStore::open(config.review_file())
            .map_err(|e| ScanError::configuration(format!("review store: {}", e)))?;
        let reviews = Arc::new(ReviewQueue::new(Arc::new(store)));

        let clamav = match &config.clamd_socket {
            Some(socket) => ClamAvConfig::new().with_socket(socket),
            None => ClamAvConfig::new().with_cli(&config.clamscan_bin),
        }
        .with_scan_timeout(config.scan_timeout);

        let mut dispatcher_config = DispatcherConfig::new()
            .with_adapter_timeout(config.scan_timeout + config.scan_timeout / 10)
            .with_work_dir(&config.upload_dir);
        if let Some(dir) = config.report_dir() {
            dispatcher_config = dispatcher_config.with_report_dir(dir);
        }

        let dispatcher = ScanDispatcher::builder()
            .add_adapter(TrivyScanner::new(
                TrivyConfig::new()
                    .with_program(&config.trivy_bin)
                    .with_timeout(config.scan_timeout),
            ))
            .add_adapter(GrypeScanner::new(
                GrypeConfig::new()
                    .with_program(&config.grype_bin)
                    .with_timeout(config.scan_timeout),
            ))
            .add_adapter(ClamAvScanner::new(clamav)?)
            .add_adapter(YaraScanner::new(
                YaraConfig::new()
                    .with_program(&config.yara_bin)
                    .with_rules_path(&config.yara_rules_path)
                    .with_timeout(config.scan_timeout),
            ))
            .with_image_exporter(
                DockerImageExporter::new()
                    .with_program(&config.docker_bin)
                    .with_timeout(config.scan_timeout),
            )
            .with_repository_cloner(
                GitCloner::new()
                    .with_program(&config.git_bin)
                    .with_timeout(config.scan_timeout),
            )
            .with_review_queue(Arc::clone(&reviews))
            .with_config(dispatcher_config)
            .build()?;

        tracing::info!(
            adapters = dispatcher.adapters().len(),
            review_file = %config.review_file().display(),
            "Scan service configured"
        );

        Ok(Self::new(dispatcher, reviews, &config.upload_dir).with_max_upload_size(config.max_upload_size))
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &ScanDispatcher {
        &self.dispatcher
    }

    /// Returns the review queue.
    pub fn reviews(&self) -> &Arc<ReviewQueue> {
        &self.reviews
    }

    /// Handles one scan request and records it as the latest session.
    ///
    /// # Errors
    ///
    /// Request-level faults only: a missing or unsafe name, URL or file,
    /// or an I/O failure while staging uploads. Tool failures are reported
    /// inside the returned report.
    pub async fn handle_scan(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        let ticket = self.session.begin();

        match self.run_request(request).await {
            Ok(report) => {
                self.session.complete(ticket, report.clone());
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Scan request rejected");
                self.session.fail(ticket, e.to_string());
                Err(e)
            }
        }
    }

    async fn run_request(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        let context = ScanContext::new().with_request_id(uuid::Uuid::new_v4().to_string());

        match request.scan_type {
            ArtifactKind::Filesystem => self.scan_uploads(request.files, &context).await,
            ArtifactKind::Image => {
                let name = request
                    .image_name
                    .ok_or_else(|| ScanError::invalid_input("image_name", "missing image name"))?;
                let context = context.with_artifact_name(&name);
                self.dispatcher.dispatch(&ArtifactRef::image(name), &context).await
            }
            ArtifactKind::Repository => {
                let url = request
                    .repo_url
                    .ok_or_else(|| ScanError::invalid_input("repo_url", "missing repository URL"))?;
                let context = context.with_artifact_name(&url);
                self.dispatcher.dispatch(&ArtifactRef::repository(url), &context).await
            }
        }
    }

    async fn scan_uploads(
        &self,
        files: Vec<UploadedFile>,
        context: &ScanContext,
    ) -> Result<ScanReport, ScanError> {
        if files.is_empty() {
            return Err(ScanError::invalid_input("files", "no files uploaded"));
        }
        for file in &files {
            validate_bare_name(&file.filename)?;
            if file.data.len() as u64 > self.max_upload_size {
                return Err(ScanError::invalid_input(
                    &file.filename,
                    format!("exceeds maximum upload size of {} bytes", self.max_upload_size),
                ));
            }
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let workspace = TempWorkspace::create(Some(&self.upload_dir), "upload-")?;

        let mut report = ScanReport::new();
        for file in files {
            let path = workspace.join(&file.filename);
            tokio::fs::write(&path, &file.data).await?;

            let digest = self.hasher.hash_bytes(&file.data);
            tracing::info!(file = %file.filename, size = file.data.len(), digest = %digest, "Staged upload");

            let context = context
                .clone()
                .with_artifact_name(&file.filename)
                .with_artifact_digest(digest);
            report.merge(self.dispatcher.dispatch(&ArtifactRef::path(&path), &context).await?);
        }

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "Failed to remove upload workspace");
        }
        Ok(report)
    }

    /// Returns the latest session snapshot.
    pub fn status(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Returns every review entry in insertion order.
    pub async fn list_reviews(&self) -> ReviewResult<Vec<ReviewEntry>> {
        self.reviews.list().await
    }

    /// Marks a review entry reviewed.
    pub async fn mark_reviewed(&self, reference: impl Into<ReviewRef>) -> ActionResponse {
        match self.reviews.mark_reviewed(reference.into()).await {
            Ok(_) => ActionResponse::message("Item marked as reviewed."),
            Err(e) => action_error(e),
        }
    }

    /// Deletes a review entry.
    pub async fn delete_review(&self, reference: impl Into<ReviewRef>) -> ActionResponse {
        match self.reviews.delete(reference.into()).await {
            Ok(_) => ActionResponse::message("Item deleted."),
            Err(e) => action_error(e),
        }
    }
}

impl std::fmt::Debug for ScanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanService")
            .field("dispatcher", &self.dispatcher)
            .field("upload_dir", &self.upload_dir)
            .finish()
    }
}

fn action_error(error: ReviewError) -> ActionResponse {
    tracing::warn!(error = %error, "Review action failed");
    ActionResponse::error(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockAdapter;
    use crate::core::ScannerKind;
    use crate::review::{MemoryStore, ReviewStatus};
    use tempfile::TempDir;

    fn service(dir: &TempDir, clamav: MockAdapter) -> ScanService {
        let reviews = Arc::new(ReviewQueue::new(Arc::new(MemoryStore::new())));
        let dispatcher = ScanDispatcher::builder()
            .add_adapter(MockAdapter::new("trivy", ScannerKind::VulnScan).with_label("Trivy FS"))
            .add_adapter(clamav)
            .with_review_queue(Arc::clone(&reviews))
            .build()
            .unwrap();
        ScanService::new(dispatcher, reviews, dir.path().join("uploads"))
    }

    fn infected_clamav() -> MockAdapter {
        MockAdapter::new("clamav", ScannerKind::Av)
            .with_label("ClamAV")
            .with_stdout("/uploads/eicar.com: Eicar-Signature FOUND\n")
    }

    #[tokio::test]
    async fn test_upload_escalates_and_updates_status() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, infected_clamav());

        let report = service
            .handle_scan(ScanRequest::upload(vec![UploadedFile::new("eicar.com", b"X5O!P%@AP".to_vec())]))
            .await
            .unwrap();

        assert_eq!(report.file_scan_results.len(), 2);
        assert_eq!(report.escalated.len(), 1);
        let entry = &report.escalated[0];
        assert_eq!(entry.path, "eicar.com");
        assert_eq!(entry.scan_type, "ClamAV");
        assert!(entry.artifact_digest.as_deref().unwrap().starts_with("blake3:"));

        let status = service.status();
        assert!(status.scan_completed);
        assert!(status.findings_exist);
        assert_eq!(service.list_reviews().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_workspace_removed() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, MockAdapter::new("clamav", ScannerKind::Av));

        service
            .handle_scan(ScanRequest::upload(vec![
                UploadedFile::new("a.txt", b"alpha".to_vec()),
                UploadedFile::new("b.txt", b"beta".to_vec()),
            ]))
            .await
            .unwrap();

        let leftovers = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
        assert_eq!(leftovers, 0);
        assert!(!service.status().findings_exist);
    }

    #[tokio::test]
    async fn test_unsafe_filename_rejected() {
        let dir = TempDir::new().unwrap();
        let clamav = Arc::new(infected_clamav());
        let reviews = Arc::new(ReviewQueue::new(Arc::new(MemoryStore::new())));
        let dispatcher = ScanDispatcher::builder()
            .add_arc_adapter(clamav.clone())
            .build()
            .unwrap();
        let service = ScanService::new(dispatcher, reviews, dir.path());

        let err = service
            .handle_scan(ScanRequest::upload(vec![UploadedFile::new("../../etc/cron.d/x", b"x".to_vec())]))
            .await
            .unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(clamav.invocation_count(), 0);
        let status = service.status();
        assert!(status.scan_completed);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn test_dot_filename_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let clamav = Arc::new(infected_clamav());
        let reviews = Arc::new(ReviewQueue::new(Arc::new(MemoryStore::new())));
        let dispatcher = ScanDispatcher::builder()
            .add_arc_adapter(clamav.clone())
            .build()
            .unwrap();
        let service = ScanService::new(dispatcher, reviews, dir.path());

        let err = service
            .handle_scan(ScanRequest::upload(vec![UploadedFile::new(".", b"x".to_vec())]))
            .await
            .unwrap_err();

        assert!(err.is_invalid_input());
        assert_eq!(clamav.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, infected_clamav()).with_max_upload_size(4);

        let err = service
            .handle_scan(ScanRequest::upload(vec![UploadedFile::new("big.bin", vec![0u8; 5])]))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_missing_image_name_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, infected_clamav());

        let mut request = ScanRequest::image("alpine");
        request.image_name = None;
        assert!(service.handle_scan(request).await.unwrap_err().is_invalid_input());
    }

    #[tokio::test]
    async fn test_review_actions() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, infected_clamav());
        service
            .handle_scan(ScanRequest::upload(vec![UploadedFile::new("a.exe", b"MZ".to_vec())]))
            .await
            .unwrap();

        assert_eq!(
            service.mark_reviewed(0usize).await,
            ActionResponse::message("Item marked as reviewed.")
        );
        assert_eq!(service.list_reviews().await.unwrap()[0].status, ReviewStatus::Reviewed);

        let response = service.delete_review(5usize).await;
        assert!(!response.is_ok());
        assert_eq!(service.list_reviews().await.unwrap().len(), 1);

        assert!(service.delete_review(0usize).await.is_ok());
        assert!(service.list_reviews().await.unwrap().is_empty());
    }

    #[test]
    fn test_action_response_json() {
        let ok = serde_json::to_value(ActionResponse::message("Item deleted.")).unwrap();
        assert_eq!(ok, serde_json::json!({"message": "Item deleted."}));
        let err = serde_json::to_value(ActionResponse::error("nope")).unwrap();
        assert_eq!(err, serde_json::json!({"error": "nope"}));
    }

    #[test]
    fn test_request_deserializes_scan_type() {
        let request: ScanRequest =
            serde_json::from_str(r#"{"scan_type": "git", "repo_url": "https://github.com/o/r.git"}"#).unwrap();
        assert_eq!(request.scan_type, ArtifactKind::Repository);
        assert!(request.files.is_empty());
    }

    #[tokio::test]
    async fn test_from_config_wires_real_adapters() {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig::new()
            .with_upload_dir(dir.path().join("uploads"))
            .with_results_dir(dir.path().join("results"));

        let service = ScanService::from_config(&config).unwrap();
        let names: Vec<_> = service.dispatcher().adapters().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["trivy", "grype", "clamav", "yara"]);
        assert!(service.list_reviews().await.unwrap().is_empty());
    }
}

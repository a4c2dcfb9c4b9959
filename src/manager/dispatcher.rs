//! The artifact dispatcher: fan-out, normalization and escalation.

use crate::audit;
use crate::core::{
    ArcAdapter, ArtifactKind, ArtifactRef, FailureKind, RawOutput, ScanContext, ScanError,
    ScanReport, ScanResult, ScannerAdapter,
};
use crate::normalize::{self, ResultTree};
use crate::policy::EscalationPolicy;
use crate::review::{ReviewEntry, ReviewQueue};
use crate::workspace::{
    ArchiveExtractor, ImageExporter, LocalArchiveExtractor, RepositoryCloner, TempWorkspace,
};

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Outer time budget for one adapter invocation, on top of the adapter's own.
    pub adapter_timeout: Duration,

    /// Maximum number of adapters running at once. Defaults to the number
    /// of distinct scanner kinds registered.
    pub max_parallel_adapters: Option<usize>,

    /// Where transient workspaces are created; the system temp dir if unset.
    pub work_dir: Option<PathBuf>,

    /// Where raw tool output is written, if anywhere.
    pub report_dir: Option<PathBuf>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(900),
            max_parallel_adapters: None,
            work_dir: None,
            report_dir: None,
        }
    }
}

impl DispatcherConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-adapter guard timeout.
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Sets the maximum number of concurrently running adapters.
    pub fn with_max_parallel_adapters(mut self, max: usize) -> Self {
        self.max_parallel_adapters = Some(max.max(1));
        self
    }

    /// Sets the workspace root.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Enables raw report persistence into `dir`.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }
}

/// Builder for creating a `ScanDispatcher`.
pub struct ScanDispatcherBuilder {
    adapters: Vec<ArcAdapter>,
    extractor: Option<Arc<dyn ArchiveExtractor>>,
    exporter: Option<Arc<dyn ImageExporter>>,
    cloner: Option<Arc<dyn RepositoryCloner>>,
    policy: Option<EscalationPolicy>,
    reviews: Option<Arc<ReviewQueue>>,
    config: DispatcherConfig,
}

impl ScanDispatcherBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            extractor: None,
            exporter: None,
            cloner: None,
            policy: None,
            reviews: None,
            config: DispatcherConfig::default(),
        }
    }

    /// Adds an adapter.
    pub fn add_adapter<A: ScannerAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Adds an adapter wrapped in an Arc.
    pub fn add_arc_adapter(mut self, adapter: ArcAdapter) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Sets the archive extractor.
    pub fn with_extractor<E: ArchiveExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Sets the image exporter used for filesystem-only adapters.
    pub fn with_image_exporter<E: ImageExporter + 'static>(mut self, exporter: E) -> Self {
        self.exporter = Some(Arc::new(exporter));
        self
    }

    /// Sets the repository cloner.
    pub fn with_repository_cloner<C: RepositoryCloner + 'static>(mut self, cloner: C) -> Self {
        self.cloner = Some(Arc::new(cloner));
        self
    }

    /// Sets the escalation policy.
    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the queue escalated entries are appended to.
    pub fn with_review_queue(mut self, queue: Arc<ReviewQueue>) -> Self {
        self.reviews = Some(queue);
        self
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the dispatcher.
    pub fn build(self) -> Result<ScanDispatcher, ScanError> {
        if self.adapters.is_empty() {
            return Err(ScanError::configuration("At least one adapter is required"));
        }

        Ok(ScanDispatcher {
            adapters: self.adapters,
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(LocalArchiveExtractor::default())),
            exporter: self.exporter,
            cloner: self.cloner,
            policy: self.policy.unwrap_or_default(),
            reviews: self.reviews,
            config: self.config,
        })
    }
}

impl Default for ScanDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes an artifact to every applicable adapter and aggregates the results.
///
/// Adapter failures never abort a dispatch: each one becomes a result with
/// `succeeded = false`, and the dispatcher always waits for every adapter
/// before returning.
pub struct ScanDispatcher {
    adapters: Vec<ArcAdapter>,
    extractor: Arc<dyn ArchiveExtractor>,
    exporter: Option<Arc<dyn ImageExporter>>,
    cloner: Option<Arc<dyn RepositoryCloner>>,
    policy: EscalationPolicy,
    reviews: Option<Arc<ReviewQueue>>,
    config: DispatcherConfig,
}

impl ScanDispatcher {
    /// Creates a new builder.
    pub fn builder() -> ScanDispatcherBuilder {
        ScanDispatcherBuilder::new()
    }

    /// Returns the registered adapters.
    pub fn adapters(&self) -> &[ArcAdapter] {
        &self.adapters
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Returns a reference to the escalation policy.
    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Returns the adapters that accept `kind` directly.
    pub fn applicable(&self, kind: ArtifactKind) -> Vec<ArcAdapter> {
        self.adapters
            .iter()
            .filter(|a| a.supports(kind))
            .cloned()
            .collect()
    }

    /// Scans one artifact.
    ///
    /// # Errors
    ///
    /// Only request-level faults are errors: an artifact that fails
    /// validation is rejected with `InvalidInput` before anything runs.
    pub async fn dispatch(
        &self,
        artifact: &ArtifactRef,
        context: &ScanContext,
    ) -> Result<ScanReport, ScanError> {
        artifact.validate()?;

        let kind = artifact.kind();
        audit::emit_scan_started(artifact, context, self.adapters.len());
        tracing::info!(
            artifact = %artifact,
            request_id = ?context.request_id,
            "Dispatching scan"
        );

        let results = match artifact {
            ArtifactRef::FilesystemPath(path) => self.dispatch_path(path).await,
            ArtifactRef::ContainerImage(name) => self.dispatch_image(artifact, name).await,
            ArtifactRef::RepositoryLocation(url) => self.dispatch_repository(artifact, url).await,
        };

        for result in &results {
            audit::emit_scan_result(result, context);
        }

        let mut report = ScanReport::new();
        report.extend(kind, results);
        self.escalate(&mut report, context).await;

        tracing::info!(
            artifact = %artifact,
            result_count = report.result_count(),
            partial_failure = report.is_partial_failure(),
            escalated = report.escalated.len(),
            "Scan completed"
        );
        audit::emit_scan_report(&report, context);

        Ok(report)
    }

    /// Probes every adapter.
    pub async fn health_check(&self) -> Vec<(String, Result<(), ScanError>)> {
        let probes = self.adapters.iter().map(|adapter| async move {
            (adapter.name().to_string(), adapter.health_check().await)
        });
        futures::future::join_all(probes).await
    }

    async fn dispatch_path(&self, path: &Path) -> Vec<ScanResult> {
        let adapters = self.applicable(ArtifactKind::Filesystem);
        let artifact = ArtifactRef::path(path);
        let shown = path.display().to_string();

        if !path.exists() {
            tracing::warn!(path = %shown, "Scan target does not exist");
            return adapters
                .iter()
                .map(|a| {
                    ScanResult::failed(
                        a.kind(),
                        a.scan_label(&artifact),
                        &shown,
                        FailureKind::InvalidInput,
                        "path does not exist",
                    )
                })
                .collect();
        }

        let format = match self.extractor.detect(path).await {
            Ok(Some(format)) => format,
            Ok(None) => return self.run_adapters(&adapters, &artifact, &shown).await,
            Err(e) => return fail_all(&adapters, &artifact, &shown, &ScanError::Extraction(e)),
        };

        let workspace = match TempWorkspace::create(self.config.work_dir.as_deref(), "scan-extract-") {
            Ok(workspace) => workspace,
            Err(e) => return fail_all(&adapters, &artifact, &shown, &e),
        };
        let dest = workspace.join("extracted");

        let results = match self.extractor.extract(path, format, &dest).await {
            Ok(files) => {
                tracing::info!(path = %shown, format = ?format, files, "Scanning extracted archive");
                self.run_adapters(&adapters, &ArtifactRef::path(&dest), &shown).await
            }
            Err(e) => {
                tracing::warn!(path = %shown, error = %e, "Archive extraction failed");
                fail_all(&adapters, &artifact, &shown, &ScanError::Extraction(e))
            }
        };

        close_workspace(workspace);
        results
    }

    async fn dispatch_image(&self, artifact: &ArtifactRef, name: &str) -> Vec<ScanResult> {
        let (remote, local) = self.split_remote_local(ArtifactKind::Image);

        let (remote_results, local_results) = tokio::join!(
            self.run_adapters(&remote, artifact, name),
            self.scan_export(&local, name)
        );

        normalize::flatten(ResultTree::Group(vec![remote_results.into(), local_results.into()]))
    }

    /// Remote-capable adapters scan the URL; every filesystem adapter,
    /// remote-capable ones included, scans the checkout.
    async fn dispatch_repository(&self, artifact: &ArtifactRef, url: &str) -> Vec<ScanResult> {
        let remote = self.applicable(ArtifactKind::Repository);
        let local = self.applicable(ArtifactKind::Filesystem);

        let (remote_results, local_results) = tokio::join!(
            self.run_adapters(&remote, artifact, url),
            self.scan_clone(&local, url)
        );

        normalize::flatten(ResultTree::Group(vec![remote_results.into(), local_results.into()]))
    }

    /// Splits adapters into those taking `kind` directly and filesystem-only ones.
    fn split_remote_local(&self, kind: ArtifactKind) -> (Vec<ArcAdapter>, Vec<ArcAdapter>) {
        let remote = self.applicable(kind);
        let local = self
            .adapters
            .iter()
            .filter(|a| !a.supports(kind) && a.supports(ArtifactKind::Filesystem))
            .cloned()
            .collect();
        (remote, local)
    }

    async fn scan_export(&self, adapters: &[ArcAdapter], image: &str) -> Vec<ScanResult> {
        if adapters.is_empty() {
            return Vec::new();
        }
        let artifact = ArtifactRef::image(image);
        let Some(exporter) = &self.exporter else {
            let err = ScanError::engine_unavailable("image-export", "no image exporter configured");
            return fail_all(adapters, &artifact, image, &err);
        };

        let workspace = match TempWorkspace::create(self.config.work_dir.as_deref(), "scan-image-") {
            Ok(workspace) => workspace,
            Err(e) => return fail_all(adapters, &artifact, image, &e),
        };

        let results = match exporter.export(image, workspace.path()).await {
            Ok(path) => self.run_adapters(adapters, &ArtifactRef::path(path), image).await,
            Err(e) => {
                tracing::warn!(image = %image, error = %e, "Image export failed");
                fail_all(adapters, &artifact, image, &e)
            }
        };

        close_workspace(workspace);
        results
    }

    async fn scan_clone(&self, adapters: &[ArcAdapter], url: &str) -> Vec<ScanResult> {
        if adapters.is_empty() {
            return Vec::new();
        }
        // failures are labelled as checkout scans, e.g. "Trivy FS"
        let artifact = ArtifactRef::path(url);
        let Some(cloner) = &self.cloner else {
            let err = ScanError::engine_unavailable("git", "no repository cloner configured");
            return fail_all(adapters, &artifact, url, &err);
        };

        let workspace = match TempWorkspace::create(self.config.work_dir.as_deref(), "scan-clone-") {
            Ok(workspace) => workspace,
            Err(e) => return fail_all(adapters, &artifact, url, &e),
        };

        let results = match cloner.clone_repo(url, workspace.path()).await {
            Ok(checkout) => self.run_adapters(adapters, &ArtifactRef::path(checkout), url).await,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Repository clone failed");
                fail_all(adapters, &artifact, url, &e)
            }
        };

        close_workspace(workspace);
        results
    }

    /// Runs `adapters` against `target`, each in its own task, and
    /// normalizes the outputs in adapter order.
    ///
    /// `shown` is what results report as their target.
    async fn run_adapters(
        &self,
        adapters: &[ArcAdapter],
        target: &ArtifactRef,
        shown: &str,
    ) -> Vec<ScanResult> {
        if adapters.is_empty() {
            return Vec::new();
        }

        let parallelism = self
            .config
            .max_parallel_adapters
            .unwrap_or_else(|| distinct_kinds(&self.adapters))
            .max(1);
        let guard = self.config.adapter_timeout;

        stream::iter(adapters.iter().cloned())
            .map(|adapter| {
                let target = target.clone();
                let shown = shown.to_string();
                async move {
                    let kind = adapter.kind();
                    let label = adapter.scan_label(&target);

                    let task_adapter = Arc::clone(&adapter);
                    let task_target = target.clone();
                    let joined = tokio::spawn(async move {
                        match tokio::time::timeout(guard, task_adapter.invoke(&task_target)).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(ScanError::timeout(task_adapter.name(), guard)),
                        }
                    })
                    .await;

                    match joined {
                        Ok(Ok(raw)) => {
                            let result = normalize::normalize(kind, label, shown, &raw);
                            self.persist_raw(adapter.name(), &result, &raw).await;
                            result
                        }
                        Ok(Err(e)) => {
                            tracing::warn!(
                                engine = adapter.name(),
                                error = %e,
                                "Adapter failed, continuing with others"
                            );
                            ScanResult::from_error(kind, label, shown, &e)
                        }
                        Err(join_error) => {
                            tracing::error!(engine = adapter.name(), error = %join_error, "Adapter task aborted");
                            ScanResult::failed(
                                kind,
                                label,
                                shown,
                                FailureKind::Internal,
                                format!("adapter task failed: {}", join_error),
                            )
                        }
                    }
                }
            })
            .buffered(parallelism)
            .collect()
            .await
    }

    /// Writes raw tool output next to the results, best effort.
    async fn persist_raw(&self, engine: &str, result: &ScanResult, raw: &RawOutput) {
        let Some(dir) = &self.config.report_dir else {
            return;
        };
        let path = dir.join(format!("{}-{}.log", engine, result.id));
        let mut content = raw.stdout.clone();
        if !raw.stderr.is_empty() {
            content.push_str("\n--- stderr ---\n");
            content.push_str(&raw.stderr);
        }

        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, content).await
        }
        .await;
        match written {
            Ok(()) => tracing::debug!(path = %path.display(), "Saved raw scanner output"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save raw scanner output"),
        }
    }

    async fn escalate(&self, report: &mut ScanReport, context: &ScanContext) {
        let entries: Vec<ReviewEntry> = report
            .all_results()
            .filter_map(|result| {
                let entry = self.policy.evaluate(result, context)?;
                audit::emit_escalation(&entry, result);
                Some(entry)
            })
            .collect();

        for entry in entries {
            let Some(queue) = &self.reviews else {
                tracing::warn!(path = %entry.path, "No review queue configured; escalation not persisted");
                report.escalated.push(entry);
                continue;
            };
            match queue.append(entry).await {
                Ok(stored) => report.escalated.push(stored),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to enqueue review entry");
                    report.escalation_errors.push(e.to_string());
                }
            }
        }
    }
}

impl std::fmt::Debug for ScanDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanDispatcher")
            .field("adapter_count", &self.adapters.len())
            .field("has_exporter", &self.exporter.is_some())
            .field("has_cloner", &self.cloner.is_some())
            .field("config", &self.config)
            .finish()
    }
}

fn distinct_kinds(adapters: &[ArcAdapter]) -> usize {
    adapters.iter().map(|a| a.kind()).collect::<HashSet<_>>().len()
}

fn fail_all(
    adapters: &[ArcAdapter],
    target: &ArtifactRef,
    shown: &str,
    error: &ScanError,
) -> Vec<ScanResult> {
    adapters
        .iter()
        .map(|a| ScanResult::from_error(a.kind(), a.scan_label(target), shown, error))
        .collect()
}

fn close_workspace(workspace: TempWorkspace) {
    if let Err(e) = workspace.close() {
        tracing::warn!(error = %e, "Failed to remove workspace");
    }
}

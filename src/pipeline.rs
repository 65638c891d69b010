//! Build lifecycle: which stage runs when, and how documents are driven.

use crate::assets::{AssetHandle, AssetTable};
use crate::committer;
use crate::context::BuildContext;
use crate::diagnostics::{BuildReport, Warning};
use crate::discovery::{Document, HtmlPayload, ProducerHandle, find_html_assets};
use crate::engine::EngineHandle;
use crate::error::{Error, ErrorKind, Result};
use crate::invoker;
use crate::resolver::StylesheetPatterns;
use crate::{MAX_PROCESS_CONCURRENCY, lock};
use derive_more::Display;
use exn::ResultExt;
use fold_config::Config;
use fold_storage::BackendHandle;
use fold_storage::backend::LocalBackend;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::{Arc, Mutex};
use tracing::instrument;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Collecting,
    Processing,
    Pruning,
    Done,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Rewrite every document.
    Inline,
    /// Reduce or remove the stylesheets the documents no longer need.
    Prune,
}
impl Stage {
    /// The stage that must have completed before this one may start.
    pub fn depends_on(self) -> Option<Stage> {
        match self {
            Self::Inline => None,
            Self::Prune => Some(Self::Inline),
        }
    }
}

/// Stages of one build, in the order they run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    stages: Vec<Stage>,
}
impl Schedule {
    pub fn new(prune: bool) -> Self {
        let mut stages = vec![Stage::Inline];
        if prune {
            stages.push(Stage::Prune);
        }
        debug_assert!(
            stages.iter().enumerate().all(|(i, stage)| stage.depends_on().is_none_or(|dep| stages[..i].contains(&dep)))
        );
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// A configured inlining stage, reusable across builds.
pub struct Pipeline {
    config: Arc<Config>,
    patterns: Arc<StylesheetPatterns>,
    engine: EngineHandle,
    fs: BackendHandle,
    producers: Vec<ProducerHandle>,
}

impl Pipeline {
    pub fn new(config: Config, engine: EngineHandle, fs: BackendHandle) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let patterns = StylesheetPatterns::new(&config.additional_stylesheets)?;
        Ok(Self { config: Arc::new(config), patterns: Arc::new(patterns), engine, fs, producers: Vec::new() })
    }

    /// Pipeline reading and writing stylesheets under the configured `path`.
    pub fn with_output_dir(config: Config, engine: EngineHandle) -> Result<Self> {
        let fs = LocalBackend::new("output", &config.path).or_raise(|| ErrorKind::Config)?;
        Self::new(config, engine, Arc::new(fs))
    }

    pub fn register_producer(&mut self, producer: ProducerHandle) -> &mut Self {
        tracing::debug!(producer = producer.name(), "Document producer registered");
        self.producers.push(producer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a build over `assets`.
    ///
    /// Without an asset table the build can only process producer payloads,
    /// so starting one with neither is a setup error.
    pub fn begin(&self, assets: Option<AssetHandle>) -> Result<Build> {
        if assets.is_none() && self.producers.is_empty() {
            exn::bail!(ErrorKind::Setup);
        }
        let ctx = BuildContext::new(
            self.config.clone(),
            self.patterns.clone(),
            assets.unwrap_or_else(|| Arc::new(AssetTable::default())),
            self.fs.clone(),
            self.engine.clone(),
        );
        Ok(Build {
            ctx,
            producers: self.producers.clone(),
            schedule: Schedule::new(self.config.prune_source),
            state: Mutex::new(BuildState::Idle),
        })
    }
}

enum Task {
    Template(ProducerHandle, HtmlPayload),
    Asset(Document),
}

/// One build cycle. Dropping it drops every cache and ledger it owns.
pub struct Build {
    ctx: BuildContext,
    producers: Vec<ProducerHandle>,
    schedule: Schedule,
    state: Mutex<BuildState>,
}

impl Build {
    pub fn state(&self) -> BuildState {
        *lock(&self.state)
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Process a document handed over before the outputs are finalised.
    ///
    /// Never fails: on error the error is recorded and the payload comes
    /// back exactly as it went in.
    pub async fn on_html_generated(&self, payload: HtmlPayload) -> HtmlPayload {
        let mut document = Document::from_payload(payload);
        if let Err(e) = self.inline(&mut document).await {
            self.ctx.diagnostics.error(e);
        }
        document.into_payload()
    }

    /// Run every scheduled stage over the final asset table.
    #[instrument(skip_all)]
    pub async fn on_optimize_assets(&self) {
        for stage in self.schedule.stages() {
            tracing::debug!(%stage, "Stage started");
            match stage {
                Stage::Inline => self.inline_stage().await,
                Stage::Prune => {
                    self.transition(BuildState::Pruning);
                    committer::prune(&self.ctx).await;
                },
            }
        }
    }

    /// Finish the build. Runs regardless of how the stages went.
    pub fn after_emit(self) -> BuildReport {
        self.transition(BuildState::Done);
        self.ctx.cache.clear();
        let report = self.ctx.diagnostics.report(self.ctx.committed());
        tracing::info!(
            documents = report.documents,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Build finished"
        );
        report
    }

    fn transition(&self, next: BuildState) {
        let mut state = lock(&self.state);
        tracing::debug!(from = %*state, to = %next, "Build state changed");
        *state = next;
    }

    async fn inline_stage(&self) {
        self.transition(BuildState::Collecting);
        let mut tasks = Vec::new();
        for producer in &self.producers {
            match producer.produce().await {
                Ok(payloads) => {
                    tasks.extend(payloads.into_iter().map(|payload| Task::Template(producer.clone(), payload)))
                },
                Err(e) => self.ctx.diagnostics.error(e),
            }
        }
        let documents = find_html_assets(&self.ctx).await;
        if tasks.is_empty() && documents.is_empty() && self.producers.is_empty() && !self.ctx.has_processed() {
            self.ctx.diagnostics.warn(Warning::NoHtmlAssets);
        }
        tasks.extend(documents.into_iter().map(Task::Asset));

        self.transition(BuildState::Processing);
        let mut futures: Vec<_> = tasks.into_iter().map(|task| self.run(task)).collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(futures.drain(..MAX_PROCESS_CONCURRENCY.min(futures.len())));
        while processing.next().await.is_some() {
            // Pop-n-push, but FIFO instead of LIFO.
            if !futures.is_empty() {
                processing.push(futures.remove(0));
            }
        }
    }

    async fn run(&self, task: Task) {
        match task {
            Task::Template(producer, payload) => {
                let name = payload.output_name.clone();
                let payload = self.on_html_generated(payload).await;
                if let Err(e) = producer.commit(payload).await {
                    self.ctx.diagnostics.error(e.raise(ErrorKind::WriteBack(name)));
                }
            },
            Task::Asset(mut document) => {
                if let Err(e) = self.inline(&mut document).await {
                    self.ctx.diagnostics.error(e);
                }
            },
        }
    }

    /// Process and commit one document. A name already handled in this
    /// build is skipped. If anything fails, the stylesheets the document
    /// links to are left alone by the prune stage.
    async fn inline(&self, document: &mut Document) -> Result<()> {
        if !self.ctx.claim(&document.name) {
            tracing::debug!(document = %document.name, "Already processed in this build, skipped");
            return Ok(());
        }
        let result = async {
            let processed = invoker::process(&self.ctx, document).await?;
            if committer::commit_document(&self.ctx, document, processed.html).await? {
                committer::record(&self.ctx, &document.name, &processed.stylesheets);
            }
            Ok::<_, Error>(())
        }
        .await;
        if result.is_err() {
            committer::retain(&self.ctx, document);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FAIL_MARKER, RecordingProducer, SLOW_MARKER, ScriptedEngine, config};
    use fold_storage::backend::MockBackend;
    use rstest::rstest;
    use std::path::PathBuf;

    fn page(stylesheets: &[&str], body: &str) -> String {
        let links: String =
            stylesheets.iter().map(|href| format!(r#"<link rel="stylesheet" href="{href}">"#)).collect();
        format!("<html><head>{links}</head><body{body}><h1>Hi</h1></body></html>")
    }

    fn start(
        config: Config,
        engine: &Arc<ScriptedEngine>,
        fs: &Arc<MockBackend>,
        assets: impl IntoIterator<Item = (&'static str, String)>,
    ) -> Build {
        let pipeline = Pipeline::new(config, engine.clone(), fs.clone()).unwrap();
        pipeline.begin(Some(Arc::new(AssetTable::with_assets(assets)))).unwrap()
    }

    async fn text(build: &Build, name: &str) -> Option<String> {
        build.context().assets.get(name).await.map(|asset| asset.text())
    }

    #[test]
    fn test_schedule() {
        assert_eq!(Schedule::new(false).stages(), &[Stage::Inline]);
        assert_eq!(Schedule::new(true).stages(), &[Stage::Inline, Stage::Prune]);
        assert_eq!(Stage::Prune.depends_on(), Some(Stage::Inline));
        assert_eq!(Stage::Inline.depends_on(), None);
    }

    #[test]
    fn test_begin_without_assets_or_producers() {
        let pipeline =
            Pipeline::new(config(), Arc::new(ScriptedEngine::default()), Arc::new(MockBackend::default())).unwrap();
        let err = pipeline.begin(None).err().unwrap();
        assert_eq!(*err, ErrorKind::Setup);
    }

    #[rstest]
    #[case(Config { path: PathBuf::from("dist"), ..config() })]
    #[case(Config { additional_stylesheets: vec!["[".to_string()], ..config() })]
    fn test_invalid_config(#[case] config: Config) {
        let result = Pipeline::new(config, Arc::new(ScriptedEngine::default()), Arc::new(MockBackend::default()));
        assert_eq!(*result.err().unwrap(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_shared_filesystem_stylesheet_read_once() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::with_files([("shared.css", "h1{color:red}")]));
        let build = start(
            config(),
            &engine,
            &fs,
            [
                ("index.html", page(&["/shared.css"], "")),
                ("about.html", page(&["/shared.css"], "")),
                ("contact.html", page(&["shared.css"], "")),
            ],
        );

        build.on_optimize_assets().await;
        assert_eq!(fs.reads("shared.css").await, 1);
        assert_eq!(engine.calls(), 3);

        let report = build.after_emit();
        assert!(report.is_success());
        assert_eq!(report.documents, 3);
    }

    // Shared pipeline stylesheet fully consumed by two documents.
    #[tokio::test]
    async fn test_shared_stylesheet_consumed_everywhere_is_removed() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let build = start(
            config(),
            &engine,
            &fs,
            [
                ("a.html", page(&["main.css"], "")),
                ("b.html", page(&["main.css"], "")),
                ("main.css", "h1{color:red}".to_string()),
            ],
        );

        build.on_optimize_assets().await;
        assert_eq!(build.state(), BuildState::Pruning);
        assert!(!build.context().assets.contains("main.css").await);
        for name in ["a.html", "b.html"] {
            let html = text(&build, name).await.unwrap();
            assert!(html.contains("<style>h1{color:red}</style>"));
            assert!(!html.contains("<link"));
        }
        assert!(fs.operations().await.is_empty());
        assert!(build.after_emit().is_success());
    }

    #[tokio::test]
    async fn test_stylesheet_kept_if_any_document_needs_it() {
        let engine = Arc::new(ScriptedEngine::default().keep("main.css", "footer{}"));
        let fs = Arc::new(MockBackend::default());
        let build = start(
            config(),
            &engine,
            &fs,
            [("a.html", page(&["main.css"], "")), ("main.css", "h1{} footer{}".to_string())],
        );

        build.on_optimize_assets().await;
        assert_eq!(text(&build, "main.css").await.as_deref(), Some("footer{}"));
        assert!(text(&build, "a.html").await.unwrap().contains(r#"<link rel="stylesheet" href="main.css">"#));
    }

    // Additional pattern stylesheet offered to every document, never deleted.
    #[tokio::test]
    async fn test_additional_stylesheets_offered_but_never_removed() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let config = Config { additional_stylesheets: vec!["fonts/*.css".to_string()], ..config() };
        let build = start(
            config,
            &engine,
            &fs,
            [
                ("a.html", page(&[], "")),
                ("b.html", page(&[], "")),
                ("fonts/icons.css", ".icon{}".to_string()),
                ("main.css", "p{}".to_string()),
            ],
        );

        build.on_optimize_assets().await;
        assert_eq!(engine.offered(), vec![vec!["fonts/icons.css".to_string()]; 2]);
        assert_eq!(text(&build, "fonts/icons.css").await.as_deref(), Some(".icon{}"));
        assert!(build.after_emit().is_success());
    }

    // Filesystem-only stylesheet that cannot be read.
    #[tokio::test]
    async fn test_unreadable_stylesheet_is_a_warning() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let build = start(config(), &engine, &fs, [("index.html", page(&["/legacy.css"], ""))]);

        build.on_optimize_assets().await;
        assert_eq!(engine.offered(), vec![Vec::<String>::new()]);
        assert_eq!(fs.reads("legacy.css").await, 1);
        assert!(fs.deleted().await.is_empty());

        let report = build.after_emit();
        assert!(report.is_success());
        assert_eq!(report.documents, 1);
        assert_eq!(
            report.warnings,
            vec![Warning::StylesheetUnavailable {
                path: PathBuf::from("legacy.css"),
                document: "index.html".to_string(),
            }]
        );
    }

    // No HTML anywhere and nobody producing any.
    #[tokio::test]
    async fn test_no_html_assets() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let build = start(config(), &engine, &fs, [("main.css", "p{}".to_string())]);

        build.on_optimize_assets().await;
        let report = build.after_emit();
        assert_eq!(engine.calls(), 0);
        assert!(report.is_success());
        assert_eq!(report.warnings, vec![Warning::NoHtmlAssets]);
    }

    // HTML only ever arrived through the hook.
    #[tokio::test]
    async fn test_hook_documents_count_as_html() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let config = Config { prune_source: false, ..config() };
        let build = start(config, &engine, &fs, [("main.css", "h1{}".to_string())]);

        let payload = HtmlPayload { output_name: "index.html".to_string(), html: page(&["main.css"], "") };
        assert!(build.on_html_generated(payload).await.html.contains("<style>h1{}</style>"));
        build.on_optimize_assets().await;

        let report = build.after_emit();
        assert_eq!(engine.calls(), 1);
        assert_eq!(report.documents, 1);
        assert!(report.warnings.is_empty());
    }

    // One stylesheet linked twice under different hrefs.
    #[tokio::test]
    async fn test_stylesheet_linked_twice_is_detached_everywhere() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::with_files([("main.css", "h1{}")]));
        let build = start(config(), &engine, &fs, [("index.html", page(&["main.css", "/main.css?v=2"], ""))]);

        build.on_optimize_assets().await;
        assert_eq!(engine.offered(), vec![vec!["main.css".to_string()]]);
        assert_eq!(fs.deleted().await, vec![PathBuf::from("main.css")]);
        let html = text(&build, "index.html").await.unwrap();
        assert!(html.contains("<style>h1{}</style>"));
        assert!(!html.contains("<link"));
        assert!(build.after_emit().is_success());
    }

    #[tokio::test]
    async fn test_stylesheet_kept_when_engine_rewrites_its_link() {
        let engine = Arc::new(ScriptedEngine::default().preload());
        let fs = Arc::new(MockBackend::with_files([("main.css", "h1{}")]));
        let build = start(config(), &engine, &fs, [("index.html", page(&["main.css"], ""))]);

        build.on_optimize_assets().await;
        assert!(fs.deleted().await.is_empty());
        let html = text(&build, "index.html").await.unwrap();
        assert!(html.contains(r#"<link rel="preload" as="style" href="main.css">"#));
        assert!(build.after_emit().is_success());
    }

    #[tokio::test]
    async fn test_no_deletion_before_every_document_is_done() {
        let fs = Arc::new(MockBackend::with_files([("fast.css", "p{}")]));
        let engine = Arc::new(ScriptedEngine::default().observe(fs.clone()));
        let slow = format!(" {SLOW_MARKER}");
        let build = start(
            config(),
            &engine,
            &fs,
            [("fast.html", page(&["fast.css"], "")), ("slow.html", page(&[], &slow))],
        );

        build.on_optimize_assets().await;
        assert_eq!(engine.deletions_before_slow_finished(), Some(0));
        assert_eq!(fs.deleted().await, vec![PathBuf::from("fast.css")]);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_document() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let failing = page(&["main.css"], &format!(" {FAIL_MARKER}"));
        let build = start(
            config(),
            &engine,
            &fs,
            [("a.html", failing.clone()), ("b.html", page(&["main.css"], "")), ("main.css", "h1{}".to_string())],
        );

        build.on_optimize_assets().await;
        assert_eq!(text(&build, "a.html").await, Some(failing));
        let rewritten = text(&build, "b.html").await.unwrap();
        assert!(rewritten.contains("<style>h1{}</style>"));
        // a.html still needs main.css.
        assert!(rewritten.contains(r#"<link rel="stylesheet" href="main.css">"#));
        assert_eq!(text(&build, "main.css").await.as_deref(), Some("h1{}"));
        let report = build.after_emit();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(*report.errors[0], ErrorKind::Extraction("a.html".to_string()));
        assert_eq!(report.documents, 1);
    }

    #[tokio::test]
    async fn test_whitespace_remainder_removed_exactly_once() {
        let engine = Arc::new(ScriptedEngine::default().keep("main.css", " \n "));
        let fs = Arc::new(MockBackend::with_files([("main.css", "h1{}")]));
        let build = start(config(), &engine, &fs, [("index.html", page(&["main.css"], ""))]);

        build.on_optimize_assets().await;
        build.on_optimize_assets().await;
        assert_eq!(fs.deleted().await, vec![PathBuf::from("main.css")]);
        assert_eq!(engine.calls(), 1);
        assert!(!text(&build, "index.html").await.unwrap().contains("<link"));
        assert!(build.after_emit().is_success());
    }

    #[tokio::test]
    async fn test_prune_disabled_leaves_stylesheets_alone() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let config = Config { prune_source: false, ..config() };
        let build = start(config, &engine, &fs, [("a.html", page(&["main.css"], "")), ("main.css", "h1{}".to_string())]);

        assert_eq!(build.schedule().stages(), &[Stage::Inline]);
        build.on_optimize_assets().await;
        assert_eq!(build.state(), BuildState::Processing);
        assert_eq!(text(&build, "main.css").await.as_deref(), Some("h1{}"));
        assert!(build.context().ledger.is_empty());
    }

    #[tokio::test]
    async fn test_producer_documents() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let assets = Arc::new(AssetTable::with_assets([("main.css", "h1{}")]));
        let good = page(&["main.css"], "");
        let bad = page(&["main.css"], &format!(" {FAIL_MARKER}"));
        let producer = Arc::new(RecordingProducer::new(
            assets.clone(),
            vec![
                HtmlPayload { output_name: "index.html".to_string(), html: good },
                HtmlPayload { output_name: "broken.html".to_string(), html: bad.clone() },
            ],
        ));
        let mut pipeline = Pipeline::new(config(), engine.clone(), fs.clone()).unwrap();
        pipeline.register_producer(producer.clone());
        let build = pipeline.begin(Some(assets.clone())).unwrap();
        assert_eq!(build.state(), BuildState::Idle);

        build.on_optimize_assets().await;
        let committed = producer.committed();
        assert_eq!(committed.len(), 2);
        let broken = committed.iter().find(|p| p.output_name == "broken.html").unwrap();
        assert_eq!(broken.html, bad);
        let index = committed.iter().find(|p| p.output_name == "index.html").unwrap();
        assert!(index.html.contains("<style>h1{}</style>"));

        // Committed payloads were emitted; broken.html keeps main.css alive.
        assert_eq!(assets.get("broken.html").await.unwrap().text(), bad);
        assert!(assets.get("index.html").await.unwrap().text().contains("<link"));
        assert!(assets.contains("main.css").await);

        let report = build.after_emit();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(*report.errors[0], ErrorKind::Extraction("broken.html".to_string()));
    }

    #[tokio::test]
    async fn test_document_processed_once_per_build() {
        let engine = Arc::new(ScriptedEngine::default());
        let fs = Arc::new(MockBackend::default());
        let html = page(&["main.css"], "");
        let build = start(config(), &engine, &fs, [("index.html", html.clone()), ("main.css", "h1{}".to_string())]);

        let payload = HtmlPayload { output_name: "index.html".to_string(), html: html.clone() };
        let first = build.on_html_generated(payload.clone()).await;
        assert!(first.html.contains("<style>h1{}</style>"));
        assert_eq!(build.on_html_generated(payload.clone()).await, payload);

        build.on_optimize_assets().await;
        assert_eq!(engine.calls(), 1);
        assert_eq!(build.after_emit().documents, 1);
    }

    #[tokio::test]
    async fn test_output_dir_stylesheets_pruned_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("static.css"), "h1{}").unwrap();
        let config = Config { path: dir.path().to_path_buf(), ..config() };
        let pipeline = Pipeline::with_output_dir(config, Arc::new(ScriptedEngine::default())).unwrap();
        let assets = Arc::new(AssetTable::with_assets([("index.html", page(&["/static.css"], ""))]));
        let build = pipeline.begin(Some(assets.clone())).unwrap();

        build.on_optimize_assets().await;
        assert!(!dir.path().join("static.css").exists());
        assert!(assets.get("index.html").await.unwrap().text().contains("<style>h1{}</style>"));
        assert!(build.after_emit().is_success());
    }
}

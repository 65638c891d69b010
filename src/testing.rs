//! Test doubles shared by the unit tests of this crate.

use crate::assets::{AssetHandle, AssetTable};
use crate::context::BuildContext;
use crate::discovery::{DocumentProducer, HtmlPayload};
use crate::engine::{Candidate, Extraction, ExtractionEngine, StylesheetDelta};
use crate::error::{ErrorKind, Result};
use crate::lock;
use crate::resolver::StylesheetPatterns;
use async_trait::async_trait;
use fold_config::Config;
use fold_storage::backend::MockBackend;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Documents whose markup contains this attribute fail extraction.
pub const FAIL_MARKER: &str = "data-fail";
/// Documents whose markup contains this attribute take a while to extract.
pub const SLOW_MARKER: &str = "data-slow";

pub fn config() -> Config {
    Config { path: PathBuf::from("/dist"), prune_source: true, ..Config::default() }
}

/// Inlines every candidate in full into a `<style>` element.
///
/// Every candidate is reported [`StylesheetDelta::Consumed`] unless told
/// otherwise with [`keep`](Self::keep) or [`ignore`](Self::ignore).
#[derive(Default)]
pub struct ScriptedEngine {
    remainders: HashMap<String, String>,
    ignored: HashSet<String>,
    preload: bool,
    observed: Option<Arc<MockBackend>>,
    calls: AtomicUsize,
    offered: Mutex<Vec<Vec<String>>>,
    deletions_before_slow_finished: Mutex<Option<usize>>,
}

impl ScriptedEngine {
    pub fn keep(mut self, stylesheet: &str, remainder: &str) -> Self {
        self.remainders.insert(stylesheet.to_string(), remainder.to_string());
        self
    }

    pub fn ignore(mut self, stylesheet: &str) -> Self {
        self.ignored.insert(stylesheet.to_string());
        self
    }

    /// Turn stylesheet `<link>` elements into preload hints in the returned
    /// markup.
    pub fn preload(mut self) -> Self {
        self.preload = true;
        self
    }

    /// Watch `fs` so slow documents can report what was deleted while they ran.
    pub fn observe(mut self, fs: Arc<MockBackend>) -> Self {
        self.observed = Some(fs);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Candidate names per call, in call order.
    pub fn offered(&self) -> Vec<Vec<String>> {
        lock(&self.offered).clone()
    }

    pub fn deletions_before_slow_finished(&self) -> Option<usize> {
        *lock(&self.deletions_before_slow_finished)
    }
}

#[async_trait]
impl ExtractionEngine for ScriptedEngine {
    async fn extract(&self, html: &str, candidates: &[Candidate]) -> Result<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.offered).push(candidates.iter().map(|c| c.name.clone()).collect());
        if html.contains(FAIL_MARKER) {
            exn::bail!(ErrorKind::Engine);
        }
        if html.contains(SLOW_MARKER) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Some(fs) = &self.observed {
                let deleted = fs.deleted().await.len();
                *lock(&self.deletions_before_slow_finished) = Some(deleted);
            }
        }

        let css: String = candidates.iter().map(|c| c.content.content.as_str()).collect();
        let style = format!("<style>{css}</style>");
        let html = if self.preload {
            html.replace(r#"rel="stylesheet""#, r#"rel="preload" as="style""#)
        } else {
            html.to_string()
        };
        let html = match html.find("</head>") {
            Some(at) => format!("{}{style}{}", &html[..at], &html[at..]),
            None => format!("{style}{html}"),
        };
        let stylesheets = candidates
            .iter()
            .filter(|c| !self.ignored.contains(&c.name))
            .map(|c| {
                let delta = match self.remainders.get(&c.name) {
                    Some(remainder) => StylesheetDelta::from_remainder(remainder.as_str()),
                    None => StylesheetDelta::Consumed,
                };
                (c.name.clone(), delta)
            })
            .collect();
        Ok(Extraction { html, stylesheets })
    }
}

/// Hands out fixed payloads and records what comes back. Committed payloads
/// are emitted into `assets`, as a templating step would.
pub struct RecordingProducer {
    payloads: Vec<HtmlPayload>,
    assets: AssetHandle,
    committed: Mutex<Vec<HtmlPayload>>,
}

impl RecordingProducer {
    pub fn new(assets: AssetHandle, payloads: Vec<HtmlPayload>) -> Self {
        Self { payloads, assets, committed: Mutex::new(Vec::new()) }
    }

    pub fn committed(&self) -> Vec<HtmlPayload> {
        lock(&self.committed).clone()
    }
}

#[async_trait]
impl DocumentProducer for RecordingProducer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn produce(&self) -> Result<Vec<HtmlPayload>> {
        Ok(self.payloads.clone())
    }

    async fn commit(&self, payload: HtmlPayload) -> Result<()> {
        self.assets.insert(payload.output_name.clone(), payload.html.clone()).await;
        lock(&self.committed).push(payload);
        Ok(())
    }
}

pub fn context_with_engine(
    assets: impl IntoIterator<Item = (&'static str, &'static str)>,
    fs: impl Into<Arc<MockBackend>>,
    engine: Arc<ScriptedEngine>,
) -> BuildContext {
    build_context(config(), assets, fs, engine)
}

pub fn context_with(
    config: Config,
    assets: impl IntoIterator<Item = (&'static str, &'static str)>,
    fs: impl Into<Arc<MockBackend>>,
) -> BuildContext {
    build_context(config, assets, fs, Arc::new(ScriptedEngine::default()))
}

pub fn context(
    assets: impl IntoIterator<Item = (&'static str, &'static str)>,
    fs: impl Into<Arc<MockBackend>>,
) -> BuildContext {
    context_with(config(), assets, fs)
}

fn build_context(
    config: Config,
    assets: impl IntoIterator<Item = (&'static str, &'static str)>,
    fs: impl Into<Arc<MockBackend>>,
    engine: Arc<ScriptedEngine>,
) -> BuildContext {
    let patterns = StylesheetPatterns::new(&config.additional_stylesheets).unwrap();
    let fs: Arc<MockBackend> = fs.into();
    BuildContext::new(Arc::new(config), Arc::new(patterns), Arc::new(AssetTable::with_assets(assets)), fs, engine)
}

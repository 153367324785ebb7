//! Report ingestor.
//!
//! Loads the engine's report document from disk and parses it into a flat,
//! ordered tree of report nodes: an optional leading Project node followed by
//! one node per step, in document order. The tree is rebuilt wholesale on
//! every load and published atomically; a missing or malformed document is a
//! recoverable outcome (empty tree plus a warning), never an error.

pub mod schema;

use crate::model::ReportNode;
use crate::notify::ChangeNotifier;
use crate::tree::TreeSource;
use anyhow::{bail, Context, Result};
use schema::{ReportBlock, ReportDocument, PROJECT_MARKER, REPORT_VERSION};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

pub struct ReportIngestor {
    state: Arc<IngestorState>,
}

struct IngestorState {
    tree: Mutex<PublishedTree>,
    source: Mutex<Option<PathBuf>>,
    // Latest load sequence issued; older loads must not commit (a slow stale
    // read would otherwise overwrite a newer one).
    issued: AtomicU64,
    notifier: ChangeNotifier,
    warn_tx: Option<UnboundedSender<String>>,
}

/// The published tree, tagged with the sequence of the load that produced
/// it. The tag only moves forward.
#[derive(Default)]
struct PublishedTree {
    seq: u64,
    nodes: Vec<ReportNode>,
}

impl ReportIngestor {
    pub fn new(warn_tx: Option<UnboundedSender<String>>) -> Self {
        Self {
            state: Arc::new(IngestorState {
                tree: Mutex::new(PublishedTree::default()),
                source: Mutex::new(None),
                issued: AtomicU64::new(0),
                notifier: ChangeNotifier::new(),
                warn_tx,
            }),
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.state.notifier
    }

    /// Record the report path and start an asynchronous load of it. The
    /// returned handle resolves once the load has committed (or has been
    /// superseded by a newer `set_source`).
    pub fn set_source(&self, path: impl Into<PathBuf>) -> JoinHandle<()> {
        let path = path.into();
        let seq = self.state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.source.lock().unwrap() = Some(path.clone());
        let state = Arc::clone(&self.state);
        tokio::spawn(async move { state.load(seq, path).await })
    }

    /// Cloned snapshot of the current root-level report nodes.
    pub fn tree(&self) -> Vec<ReportNode> {
        self.state.tree.lock().unwrap().nodes.clone()
    }

    /// The most recently recorded report path, if any.
    pub fn source(&self) -> Option<PathBuf> {
        self.state.source.lock().unwrap().clone()
    }
}

impl TreeSource for ReportIngestor {
    fn children(&self, node: Option<&ReportNode>) -> Vec<ReportNode> {
        match node {
            None => self.tree(),
            Some(_) => Vec::new(),
        }
    }
}

impl IngestorState {
    async fn load(&self, seq: u64, path: PathBuf) {
        let nodes = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match parse(&content) {
                Ok(nodes) => nodes,
                Err(e) => {
                    self.warn(format!(
                        "failed to load migration report {}: {e:#}",
                        path.display()
                    ));
                    Vec::new()
                }
            },
            // Missing or unreadable report: empty view, not a fault.
            Err(_) => Vec::new(),
        };
        self.commit(seq, nodes);
    }

    /// Publish a loaded tree unless it has been superseded. The sequence
    /// check and the write happen under the same lock, so a slower stale
    /// load can never land after a newer one: the committed sequence only
    /// moves forward. Returns whether the tree was committed.
    fn commit(&self, seq: u64, nodes: Vec<ReportNode>) -> bool {
        {
            let mut tree = self.tree.lock().unwrap();
            if seq <= tree.seq || self.issued.load(Ordering::SeqCst) != seq {
                return false;
            }
            tree.seq = seq;
            tree.nodes = nodes;
        }
        self.notifier.fire();
        true
    }

    fn warn(&self, message: String) {
        if let Some(tx) = self.warn_tx.as_ref() {
            let _ = tx.send(message);
        }
    }
}

/// Deterministic extraction of report nodes from a report document.
///
/// The first paragraph starting with `Project:` becomes the leading Project
/// node, content trimmed with the marker stripped. Each step block becomes
/// one flat node in document order: label from its heading, or `Step <n>`
/// (1-based among steps) when the heading is absent or blank; content is the
/// detail lines joined with newlines.
pub fn parse(content: &str) -> Result<Vec<ReportNode>> {
    let doc: ReportDocument =
        serde_json::from_str(content).context("malformed report document")?;
    if doc.version != REPORT_VERSION {
        bail!("unsupported report document version {}", doc.version);
    }

    let mut nodes = Vec::new();
    for block in &doc.blocks {
        if let ReportBlock::Paragraph { text } = block {
            if let Some(rest) = text.strip_prefix(PROJECT_MARKER) {
                nodes.push(ReportNode::leaf("Project", rest.trim()));
                break;
            }
        }
    }

    let mut step_no = 0usize;
    for block in &doc.blocks {
        if let ReportBlock::Step { heading, details } = block {
            step_no += 1;
            let label = heading
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Step {step_no}"));
            nodes.push(ReportNode::leaf(label, details.join("\n")));
        }
    }
    Ok(nodes)
}

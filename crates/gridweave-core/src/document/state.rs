use std::path::PathBuf;

use gridweave_engine::engine::DependencyGraph;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::store::Snapshot;
use crate::template::TemplateLibrary;

/// Mutable session over an immutable [`Snapshot`].
///
/// Every edit computes a new snapshot with the pure functions of this crate,
/// updates the dependency graph and runs the recalculation cascade.
pub struct Document {
    /// Current structures and spatial index
    pub snapshot: Snapshot,
    /// Formulas and their reverse dependencies
    pub graph: DependencyGraph,
    /// Templates available to `instantiate_template`
    pub templates: TemplateLibrary,
    pub config: EngineConfig,
    /// Current file path
    pub file_path: Option<PathBuf>,
    /// Whether the document has been modified since load/save
    pub modified: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Document {
    /// Create an empty document. Does not touch the filesystem.
    pub fn new(config: EngineConfig) -> Self {
        Document {
            snapshot: Snapshot::new(),
            graph: DependencyGraph::new(),
            templates: TemplateLibrary::new(),
            config,
            file_path: None,
            modified: false,
        }
    }

    /// Create a document and load `path` when it exists.
    pub fn with_file(path: Option<PathBuf>, config: EngineConfig) -> Result<Self> {
        let mut doc = Self::new(config);
        if let Some(p) = path {
            if p.exists() {
                doc.load_file(&p)?;
            } else {
                doc.file_path = Some(p);
            }
        }
        Ok(doc)
    }

    /// Adopt an edited snapshot.
    pub(crate) fn commit(&mut self, next: Snapshot) {
        self.snapshot = next;
        self.modified = true;
    }
}

use std::path::{Path, PathBuf};

use log::debug;

use super::Document;
use crate::error::{GridweaveError, Result};
use crate::storage::{content_from_snapshot, read_content, snapshot_from_content, write_content, write_markdown};
use crate::template::TemplateLibrary;

impl Document {
    /// Save to current file path.
    /// Returns the path saved to.
    pub fn save_file(&mut self) -> Result<PathBuf> {
        let Some(path) = &self.file_path else {
            return Err(GridweaveError::NoFilePath);
        };
        write_content(path, &content_from_snapshot(&self.snapshot))?;
        self.modified = false;
        Ok(path.clone())
    }

    /// Load from file, replacing the current content.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let content = read_content(path)?;
        // Build the snapshot first so a bad file leaves the document untouched.
        let snapshot = snapshot_from_content(&content, self.config.bounds())?;

        self.snapshot = snapshot;
        self.graph.clear();
        let report = self.recalculate_all();
        debug!(
            "Loaded {} structure(s) from {}; recalculated in {} pass(es)",
            self.snapshot.store.len(),
            path.display(),
            report.iterations
        );

        self.file_path = Some(path.to_path_buf());
        self.modified = false;
        Ok(())
    }

    /// Load a template library, replacing the current one.
    /// Returns the number of templates loaded.
    pub fn load_templates(&mut self, path: &Path) -> Result<usize> {
        self.templates = TemplateLibrary::load(path)?;
        Ok(self.templates.len())
    }

    /// Export visible values as a markdown table.
    pub fn export_markdown(&self, path: &Path) -> Result<()> {
        write_markdown(path, &self.snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridweave_engine::engine::Position;
    use std::fs;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "gridweave_{tag}_{}_{:?}.json",
            std::process::id(),
            std::thread::current().id(),
        ))
    }

    struct Cleanup(PathBuf);
    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_save_and_reload_recomputes_formulas() {
        let path = temp_path("save");
        let _cleanup = Cleanup(path.clone());

        let mut doc = Document::default();
        doc.file_path = Some(path.clone());
        doc.set_cell(Position::new(0, 0), "4").unwrap();
        doc.set_cell(Position::new(0, 1), "=A1+1").unwrap();
        doc.save_file().unwrap();
        assert!(!doc.modified);

        let mut loaded = Document::default();
        loaded.load_file(&path).unwrap();
        assert_eq!(loaded.get_cell_value(Position::new(0, 1)), "5");
        loaded.set_cell(Position::new(0, 0), "9").unwrap();
        assert_eq!(loaded.get_cell_value(Position::new(0, 1)), "10");
    }

    #[test]
    fn test_save_without_path() {
        let mut doc = Document::default();
        assert!(matches!(doc.save_file(), Err(GridweaveError::NoFilePath)));
    }

    #[test]
    fn test_failed_load_keeps_document() {
        let path = temp_path("bad");
        let _cleanup = Cleanup(path.clone());
        fs::write(&path, "not json").unwrap();

        let mut doc = Document::default();
        doc.set_cell(Position::new(0, 0), "keep").unwrap();
        assert!(doc.load_file(&path).is_err());
        assert_eq!(doc.get_cell_value(Position::new(0, 0)), "keep");
    }
}

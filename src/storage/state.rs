//! JSONL storage for tracker state
//!
//! Nodes are stored in `.nstools/state.jsonl` with one JSON object per line.
//! Uses file locking for concurrent access safety.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::config::WORKSPACE_DIR;
use crate::domain::{NodeRecord, Registry};

/// Store for tracker state in JSONL format
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the default store for a workspace
    pub fn for_workspace(root: &Path) -> Self {
        Self::new(root.join(WORKSPACE_DIR).join("state.jsonl"))
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all node records; a missing file means no state
    ///
    /// Fails on a line that does not parse or that repeats a namespace.
    pub fn read_all(&self) -> Result<Vec<NodeRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open state store: {}", self.path.display()))?;

        // Shared lock, released when `file` drops
        file.lock_shared()
            .context("Failed to acquire read lock on state store")?;

        let mut records = Vec::new();
        let mut seen = BTreeSet::new();

        for (index, line) in BufReader::new(&file).lines().enumerate() {
            let line_no = index + 1;
            let line = line.with_context(|| format!("Failed to read line {}", line_no))?;
            if line.trim().is_empty() {
                continue;
            }

            let record: NodeRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse node at line {}", line_no))?;
            if !seen.insert(record.node.name.clone()) {
                anyhow::bail!("Duplicate node {} at line {}", record.node.name, line_no);
            }
            records.push(record);
        }

        Ok(records)
    }

    /// Writes all node records (full rewrite)
    pub fn write_all(&self, records: &[NodeRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        // Readers never see a half-written store: write a sibling temp file,
        // then rename it over the old one
        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            // Held until the temp file is closed at the end of this block
            file.lock_exclusive()
                .context("Failed to acquire write lock on state store")?;

            let mut writer = BufWriter::new(&file);

            for record in records {
                let line = serde_json::to_string(record).context("Failed to serialize node")?;
                writeln!(writer, "{}", line).context("Failed to write node")?;
            }

            writer.flush().context("Failed to flush state store")?;
        }

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }

    /// Loads the registry persisted by the previous invocation
    pub fn load(&self) -> Result<Registry> {
        let records = self.read_all()?;
        let count = records.len();
        let registry = Registry::restore(records)
            .with_context(|| format!("Corrupt tracker state in {}", self.path.display()))?;
        tracing::debug!(nodes = count, path = %self.path.display(), "loaded tracker state");
        Ok(registry)
    }

    /// Persists a registry
    pub fn save(&self, registry: &Registry) -> Result<()> {
        let records = registry.snapshot();
        self.write_all(&records)?;
        tracing::debug!(nodes = records.len(), path = %self.path.display(), "saved tracker state");
        Ok(())
    }

    /// Deletes the state file
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove state store: {}", self.path.display()))?;
        }
        Ok(())
    }
}

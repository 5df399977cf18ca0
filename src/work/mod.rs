//! Units of work handed to the checking workers
//!
//! A run checks two ordered collections: plain source files discovered on disk
//! and pre-parsed project entries (`FileSettings`) loaded from a manifest. Both
//! are wrapped in [`WorkItem`] when they leave the [`WorkQueue`].

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub mod queue;

pub use queue::{ProgressCounters, WorkQueue};

use crate::config::FilesConfig;

/// A source file queued for checking, with its size measured once up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// A pre-parsed project entry: one file checked under a named configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// File to check
    #[serde(alias = "file")]
    pub path: PathBuf,

    /// Name of the configuration this entry belongs to
    #[serde(default)]
    pub label: Option<String>,

    /// Pattern ids to run for this entry (empty = all enabled patterns)
    #[serde(default)]
    pub enable: Vec<String>,
}

/// One unit handed out by the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    SourceFile(SourceFile),
    ParsedConfig(FileSettings),
}

impl WorkItem {
    /// Path of the file this unit checks
    pub fn path(&self) -> &Path {
        match self {
            WorkItem::SourceFile(file) => &file.path,
            WorkItem::ParsedConfig(settings) => &settings.path,
        }
    }

    /// Bytes this unit contributes to progress accounting.
    /// Project entries are counted by unit only.
    pub fn size(&self) -> u64 {
        match self {
            WorkItem::SourceFile(file) => file.size,
            WorkItem::ParsedConfig(_) => 0,
        }
    }

    /// Pattern ids this unit is restricted to, if any
    pub fn enabled_ids(&self) -> &[String] {
        match self {
            WorkItem::SourceFile(_) => &[],
            WorkItem::ParsedConfig(settings) => &settings.enable,
        }
    }

    /// Human-readable name used in logs and findings
    pub fn display_name(&self) -> String {
        match self {
            WorkItem::SourceFile(file) => file.path.display().to_string(),
            WorkItem::ParsedConfig(settings) => match &settings.label {
                Some(label) => format!("{} ({})", settings.path.display(), label),
                None => settings.path.display().to_string(),
            },
        }
    }
}

/// Drop `.` components so `./src/a.c` and `src/a.c` name the same file
/// in findings and suppression scopes
pub fn normalize_path(path: &Path) -> PathBuf {
    let normalized: PathBuf = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

/// Load a JSON project manifest: an array of [`FileSettings`] objects.
/// Relative paths are resolved against the manifest's directory.
pub fn load_project(manifest: &Path) -> Result<Vec<FileSettings>> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read project file: {}", manifest.display()))?;
    let mut entries: Vec<FileSettings> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse project file: {}", manifest.display()))?;

    let base = manifest.parent().unwrap_or(Path::new(""));
    for entry in &mut entries {
        if entry.path.is_relative() {
            entry.path = base.join(&entry.path);
        }
        entry.path = normalize_path(&entry.path);
    }

    tracing::debug!(
        "Loaded {} project entries from {}",
        entries.len(),
        manifest.display()
    );
    Ok(entries)
}

/// Discovers source files under the given paths
pub struct FileDiscovery {
    config: FilesConfig,
    exclude: GlobSet,
}

impl FileDiscovery {
    pub fn new(config: &FilesConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude {
            let glob =
                Glob::new(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
            builder.add(glob);
        }
        let exclude = builder
            .build()
            .context("Failed to build exclude pattern globset")?;

        Ok(Self {
            config: config.clone(),
            exclude,
        })
    }

    /// Walk every path, returning checkable files sorted by path with sizes
    /// measured in parallel. Explicitly named files bypass the extension filter.
    pub fn discover(&self, paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
        let mut candidates = Vec::new();

        for root in paths {
            if root.is_file() {
                if !self.is_excluded(root) {
                    candidates.push(normalize_path(root));
                }
                continue;
            }
            if !root.exists() {
                anyhow::bail!("Path does not exist: {}", root.display());
            }

            let walker = WalkBuilder::new(root)
                .follow_links(self.config.follow_symlinks)
                .git_ignore(self.config.use_gitignore)
                .git_global(self.config.use_gitignore)
                .git_exclude(self.config.use_gitignore)
                .hidden(true)
                .build();

            for entry in walker {
                match entry {
                    Ok(entry) => {
                        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                            continue;
                        }
                        let path = entry.path();
                        if self.is_excluded(path) || !self.has_wanted_extension(path) {
                            continue;
                        }
                        candidates.push(normalize_path(path));
                    }
                    Err(e) => tracing::warn!("Walk error: {}", e),
                }
            }
        }

        candidates.sort();
        candidates.dedup();

        let max_bytes = self.config.max_file_size_mb.saturating_mul(1024 * 1024);
        let files: Vec<SourceFile> = candidates
            .par_iter()
            .filter_map(|path| match std::fs::metadata(path) {
                Ok(metadata) if max_bytes > 0 && metadata.len() > max_bytes => {
                    tracing::debug!("Skipping oversized file: {}", path.display());
                    None
                }
                Ok(metadata) => Some(SourceFile::new(path.clone(), metadata.len())),
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        tracing::info!("Discovered {} files to check", files.len());
        Ok(files)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.exclude.is_match(path) {
            return true;
        }
        path.file_name()
            .is_some_and(|name| self.exclude.is_match(Path::new(name)))
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        if self.config.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }
}

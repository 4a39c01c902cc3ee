//! Advisor catalog: the advisors directory as a name-addressed collection.
//!
//! `Product_Coach.md` is listed as "Product Coach". When both a `.md` and a
//! `.json` file exist for a name, the Markdown file wins.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use counsel_core::{AdvisorSpec, TemplateError};

use crate::advisor_file;

const EXTENSIONS: [&str; 2] = ["md", "json"];

#[derive(Debug, Clone)]
pub struct AdvisorCatalog {
    dir: PathBuf,
}

impl AdvisorCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Display names of every advisor file, sorted and deduplicated.
    pub fn list(&self) -> Result<Vec<String>, TemplateError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %self.dir.display(), "Advisors directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(TemplateError::Io {
                    path: self.dir.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| EXTENSIONS.contains(&e))
            })
            .filter_map(|path| path.file_stem()?.to_str().map(|s| s.replace('_', " ")))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Load an advisor by display name.
    pub fn load(&self, name: &str) -> Result<AdvisorSpec, TemplateError> {
        let stem = name.trim().replace(' ', "_");
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.starts_with('.') {
            return Err(TemplateError::AdvisorNotFound(name.to_string()));
        }

        for ext in EXTENSIONS {
            let path = self.dir.join(format!("{stem}.{ext}"));
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| TemplateError::Io {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let display_name = stem.replace('_', " ");
            debug!(advisor = %display_name, path = %path.display(), "Loading advisor");
            return match ext {
                "md" => advisor_file::parse_markdown(&display_name, &text),
                _ => advisor_file::parse_json(&display_name, &text),
            };
        }

        Err(TemplateError::AdvisorNotFound(name.to_string()))
    }
}

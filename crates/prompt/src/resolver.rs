//! Tag Resolver: expands inclusion tags into literal text.
//!
//! Resolution is a single pass: included content is never scanned again, so
//! a file that itself contains `<$...$>` is substituted verbatim.

use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use counsel_core::{ResolutionError, ResolvedPrompt};

use crate::tags::{self, Segment, Tag};

/// Format used by `<$datetime$>`.
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d";

/// Heading used between files of a directory inclusion.
pub const DEFAULT_FILE_DELIMITER: &str = "### {filename}";

/// What happens when a `<$path$>` inclusion cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingFilePolicy {
    /// Substitute empty text
    #[default]
    Ignore,
    /// Fail with [`ResolutionError::MissingFile`]
    Require,
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Inclusion paths are relative to this directory
    pub content_root: PathBuf,
    pub missing_file: MissingFilePolicy,
    /// `{filename}` is replaced by each included file's name
    pub file_delimiter: String,
}

impl ResolverOptions {
    pub fn new(content_root: impl Into<PathBuf>) -> Self {
        Self {
            content_root: content_root.into(),
            missing_file: MissingFilePolicy::default(),
            file_delimiter: DEFAULT_FILE_DELIMITER.into(),
        }
    }

    pub fn with_missing_file(mut self, policy: MissingFilePolicy) -> Self {
        self.missing_file = policy;
        self
    }

    pub fn with_file_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.file_delimiter = delimiter.into();
        self
    }
}

/// Expands `<$path$>`, `<$dir:path/*.ext$>` and `<$datetime[:FORMAT]$>`.
#[derive(Debug, Clone)]
pub struct TagResolver {
    options: ResolverOptions,
}

impl TagResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve every tag in `template`. The clock is injected so output is
    /// reproducible.
    pub fn resolve(
        &self,
        template: &str,
        now: &DateTime<FixedOffset>,
    ) -> Result<ResolvedPrompt, ResolutionError> {
        let mut out = String::with_capacity(template.len());

        for segment in tags::scan(template) {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Tag { raw, tag } => match tag {
                    Tag::File(path) => out.push_str(&self.include_file(path)?),
                    Tag::Dir { dir, ext } => out.push_str(&self.include_dir(dir, ext)),
                    Tag::MalformedDir(pattern) => {
                        warn!(pattern, "Unsupported directory pattern, substituting nothing");
                    }
                    Tag::Datetime(format) => out.push_str(&format_datetime(now, format)),
                    Tag::ConversationHistory => out.push_str(raw),
                },
            }
        }

        Ok(ResolvedPrompt::new(out))
    }

    fn include_file(&self, rel: &str) -> Result<String, ResolutionError> {
        let read = contained_path(&self.options.content_root, rel)
            .ok_or_else(|| "path escapes the content root".to_string())
            .and_then(|path| fs::read_to_string(&path).map_err(|e| e.to_string()));

        match read {
            Ok(content) => {
                debug!(path = rel, bytes = content.len(), "Included file");
                Ok(content)
            }
            Err(reason) => match self.options.missing_file {
                MissingFilePolicy::Ignore => {
                    warn!(path = rel, %reason, "Included file unavailable, substituting nothing");
                    Ok(String::new())
                }
                MissingFilePolicy::Require => Err(ResolutionError::MissingFile {
                    path: rel.to_string(),
                }),
            },
        }
    }

    fn include_dir(&self, rel_dir: &str, ext: Option<&str>) -> String {
        let Some(dir) = contained_path(&self.options.content_root, rel_dir) else {
            warn!(dir = rel_dir, "Directory escapes the content root, substituting nothing");
            return String::new();
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Directory not readable");
                return String::new();
            }
        };

        let suffix = ext.map(|e| format!(".{e}"));
        let mut files: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                match &suffix {
                    Some(s) if !name.ends_with(s.as_str()) => None,
                    _ => Some((name, entry.path())),
                }
            })
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut parts = Vec::with_capacity(files.len());
        for (name, path) in files {
            match fs::read_to_string(&path) {
                Ok(content) => {
                    let heading = self.options.file_delimiter.replace("{filename}", &name);
                    parts.push(format!("{heading}\n\n{content}"));
                }
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable file"),
            }
        }

        debug!(dir = rel_dir, files = parts.len(), "Included directory");
        parts.join("\n\n")
    }
}

/// Join `rel` onto `root`, refusing absolute paths and `..` components.
pub fn contained_path(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel = Path::new(rel);
    let safe = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    safe.then(|| root.join(rel))
}

/// Format `now` with a strftime pattern. An invalid pattern yields a
/// visible placeholder instead of failing.
pub fn format_datetime(now: &DateTime<FixedOffset>, format: Option<&str>) -> String {
    let format = format.unwrap_or(DEFAULT_DATETIME_FORMAT);
    let placeholder = || format!("[invalid datetime format: {format}]");

    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        warn!(format, "Invalid datetime format");
        return placeholder();
    }

    let mut out = String::new();
    match write!(out, "{}", now.format_with_items(StrftimeItems::new(format))) {
        Ok(()) => out,
        Err(_) => placeholder(),
    }
}

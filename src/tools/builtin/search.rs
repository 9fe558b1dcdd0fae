//! Filesystem search tools: glob for paths, grep for contents.
//!
//! Both walk the tree on the blocking pool with `ignore::WalkBuilder` (all
//! standard filters off, so results do not depend on .gitignore) and return
//! paths in sorted order.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tokio::fs;

use crate::tools::builtin::resolve_path;
use crate::tools::tool::{Tool, ToolError, ToolOutput, ToolParams};

pub const MAX_GLOB_RESULTS: usize = 1000;
pub const MAX_GREP_RESULTS: usize = 500;

/// Directory names grep never descends into.
const GREP_EXCLUDED_DIRS: &[&str] = &["vendor", "node_modules", "_output"];

/// Bytes inspected for a NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8192;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Deserialize)]
pub struct GlobParams {
    pub pattern: String,
    #[serde(default)]
    pub directory: Option<String>,
}

impl ToolParams for GlobParams {
    const REQUIRED: &'static [&'static str] = &["pattern"];
}

#[derive(Debug, Deserialize)]
pub struct GrepParams {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub glob_pattern: Option<String>,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default)]
    pub context_lines: usize,
}

impl ToolParams for GrepParams {
    const REQUIRED: &'static [&'static str] = &["pattern"];
}

/// Compiled recursive path pattern.
///
/// Bare patterns such as `*.go` are made recursive with a `**/` prefix. The
/// prefix-less form is also tried so top-level files always match.
struct PathMatcher {
    recursive: Pattern,
    top_level: Option<Pattern>,
    display: String,
}

impl PathMatcher {
    fn new(raw: &str) -> Result<Self, ToolError> {
        let effective = if raw.starts_with("**/") || raw.contains("**") {
            raw.to_string()
        } else {
            format!("**/{}", raw)
        };

        let compile = |p: &str| {
            Pattern::new(p)
                .map_err(|e| ToolError::ExecutionFailed(format!("Invalid glob pattern: {}", e)))
        };

        let recursive = compile(&effective)?;
        let top_level = match effective.strip_prefix("**/") {
            Some(rest) if !rest.is_empty() => Some(compile(rest)?),
            _ => None,
        };

        Ok(Self {
            recursive,
            top_level,
            display: effective,
        })
    }

    fn matches(&self, rel: &Path) -> bool {
        self.recursive.matches_path_with(rel, MATCH_OPTIONS)
            || self
                .top_level
                .as_ref()
                .is_some_and(|p| p.matches_path_with(rel, MATCH_OPTIONS))
    }
}

/// Every regular file under `base`, as paths relative to `base`, sorted.
fn walk_files(base: &Path, skip_dir: impl Fn(&OsStr) -> bool + Send + Sync + 'static) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(base)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| entry.depth() == 0 || !skip_dir(entry.file_name()))
        .build();

    let mut files: Vec<PathBuf> = walker
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| entry.path().strip_prefix(base).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

async fn run_blocking<T, F>(f: F) -> Result<T, ToolError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::ExecutionFailed(format!("Search task failed: {}", e)))
}

/// Find files by glob pattern.
#[derive(Debug)]
pub struct GlobTool {
    working_dir: PathBuf,
}

impl GlobTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl Tool for GlobTool {
    type Params = GlobParams;

    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern. \
         Returns file paths relative to the search directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (e.g., '**/*.go', '*_types.go')."
                },
                "directory": {
                    "type": "string",
                    "description": "Directory to search (default: working dir)."
                }
            },
            "required": GlobParams::REQUIRED
        })
    }

    async fn execute(&self, params: GlobParams) -> Result<ToolOutput, ToolError> {
        let base = match &params.directory {
            Some(dir) => resolve_path(&self.working_dir, dir),
            None => self.working_dir.clone(),
        };
        let is_dir = fs::metadata(&base).await.is_ok_and(|m| m.is_dir());
        if !is_dir {
            return Err(ToolError::ExecutionFailed(format!(
                "Directory not found: {}",
                base.display()
            )));
        }

        let matcher = PathMatcher::new(&params.pattern)?;

        run_blocking(move || {
            let files: Vec<String> = walk_files(&base, |_| false)
                .into_iter()
                .filter(|rel| matcher.matches(rel))
                .map(|rel| rel.display().to_string())
                .collect();

            if files.is_empty() {
                return ToolOutput::text(format!("No files match pattern: {}", matcher.display));
            }

            let total = files.len();
            let mut out = files
                .into_iter()
                .take(MAX_GLOB_RESULTS)
                .collect::<Vec<_>>()
                .join("\n");
            if total > MAX_GLOB_RESULTS {
                out.push_str(&format!(
                    "\n...[truncated, showing {} of {}]",
                    MAX_GLOB_RESULTS, total
                ));
            }
            ToolOutput::text(out)
        })
        .await
    }
}

/// Regex search across files.
#[derive(Debug)]
pub struct GrepTool {
    working_dir: PathBuf,
}

impl GrepTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

fn is_grep_skipped(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || GREP_EXCLUDED_DIRS.contains(&name.as_ref())
}

/// Search one file, appending formatted hits to `results`.
fn search_file(
    file: &Path,
    display: &str,
    regex: &Regex,
    context_lines: usize,
    results: &mut Vec<String>,
) {
    let Ok(bytes) = std::fs::read(file) else {
        return;
    };
    if bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0) {
        return;
    }

    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if !regex.is_match(line) {
            continue;
        }
        if context_lines == 0 {
            results.push(format!("{}:{}:{}", display, i + 1, line.trim_end()));
            continue;
        }

        let start = i.saturating_sub(context_lines);
        let end = (i + context_lines + 1).min(lines.len());
        for (j, ctx) in lines.iter().enumerate().take(end).skip(start) {
            let sep = if j == i { ':' } else { '-' };
            results.push(format!("{}{}{}{}{}", display, sep, j + 1, sep, ctx.trim_end()));
        }
        results.push("--".to_string());
    }
}

#[async_trait]
impl Tool for GrepTool {
    type Params = GrepParams;

    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search for a regex pattern in files. \
         Returns matching lines with file paths and line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for."
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search (default: working dir)."
                },
                "glob_pattern": {
                    "type": "string",
                    "description": "Filter files by glob pattern (e.g., '*.go')."
                },
                "ignore_case": {
                    "type": "boolean",
                    "description": "Case-insensitive search (default: false)."
                },
                "context_lines": {
                    "type": "integer",
                    "description": "Lines of context before/after match."
                }
            },
            "required": GrepParams::REQUIRED
        })
    }

    async fn execute(&self, params: GrepParams) -> Result<ToolOutput, ToolError> {
        let regex = RegexBuilder::new(&params.pattern)
            .case_insensitive(params.ignore_case)
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("Invalid regex pattern: {}", e)))?;

        let target = match &params.path {
            Some(p) => resolve_path(&self.working_dir, p),
            None => self.working_dir.clone(),
        };
        let target_is_file = match fs::metadata(&target).await {
            Ok(metadata) => metadata.is_file(),
            Err(_) => {
                return Err(ToolError::ExecutionFailed(format!(
                    "Path not found: {}",
                    target.display()
                )));
            }
        };

        let filter = PathMatcher::new(params.glob_pattern.as_deref().unwrap_or("**/*"))?;
        let working_dir = self.working_dir.clone();
        let pattern = params.pattern.clone();
        let context_lines = params.context_lines;

        run_blocking(move || {
            let display_for = |file: &Path| {
                file.strip_prefix(&working_dir)
                    .unwrap_or(file)
                    .display()
                    .to_string()
            };

            let mut results = Vec::new();
            let mut files_searched = 0usize;

            if target_is_file {
                search_file(&target, &display_for(&target), &regex, context_lines, &mut results);
                files_searched = 1;
            } else {
                for rel in walk_files(&target, is_grep_skipped) {
                    if !filter.matches(&rel) {
                        continue;
                    }
                    let file = target.join(&rel);
                    search_file(&file, &display_for(&file), &regex, context_lines, &mut results);
                    files_searched += 1;
                    if results.len() > MAX_GREP_RESULTS {
                        break;
                    }
                }
            }

            if results.is_empty() {
                return ToolOutput::text(format!(
                    "No matches found for pattern: {} (searched {} files)",
                    pattern, files_searched
                ));
            }

            let truncated = results.len() > MAX_GREP_RESULTS;
            results.truncate(MAX_GREP_RESULTS);
            let mut out = results.join("\n");
            if truncated {
                out.push_str(&format!("\n...[truncated to {} results]", MAX_GREP_RESULTS));
            }
            ToolOutput::text(out)
        })
        .await
    }
}

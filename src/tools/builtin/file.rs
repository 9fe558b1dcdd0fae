//! File operation tools for reading, writing, and editing files.
//!
//! Relative paths resolve against the job's working directory; absolute paths
//! are used as given. Messages quote the path exactly as the model passed it.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::tools::builtin::resolve_path;
use crate::tools::tool::{Tool, ToolError, ToolOutput, ToolParams};

/// Whole-file reads above this size are refused.
pub const MAX_READ_SIZE: u64 = 1_000_000;

#[derive(Debug, Deserialize)]
pub struct ReadFileParams {
    pub path: String,
    /// 1-indexed first line.
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ToolParams for ReadFileParams {
    const REQUIRED: &'static [&'static str] = &["path"];
}

#[derive(Debug, Deserialize)]
pub struct WriteFileParams {
    pub path: String,
    pub content: String,
}

impl ToolParams for WriteFileParams {
    const REQUIRED: &'static [&'static str] = &["path", "content"];
}

#[derive(Debug, Deserialize)]
pub struct EditFileParams {
    pub path: String,
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

impl ToolParams for EditFileParams {
    const REQUIRED: &'static [&'static str] = &["path", "old_string", "new_string"];
}

fn number_line(n: usize, line: &str) -> String {
    format!("{:6}|{}", n, line.trim_end())
}

/// Read file contents with line numbers.
#[derive(Debug)]
pub struct ReadFileTool {
    working_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }

    /// Stream only the requested lines, so ranges work on files of any size.
    async fn read_range(
        &self,
        path: &std::path::Path,
        start: usize,
        limit: Option<usize>,
    ) -> Result<String, ToolError> {
        let file = fs::File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut numbered = Vec::new();
        let mut index = 0usize;

        loop {
            if limit.is_some_and(|l| numbered.len() >= l) {
                break;
            }
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if index >= start {
                numbered.push(number_line(index + 1, &String::from_utf8_lossy(&buf)));
            }
            index += 1;
        }

        Ok(numbered.join("\n"))
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    type Params = ReadFileParams;

    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file. Returns numbered lines. \
         Use offset and limit for large files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path (relative to working dir or absolute)."
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-indexed)."
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of lines to read."
                }
            },
            "required": ReadFileParams::REQUIRED
        })
    }

    async fn execute(&self, params: ReadFileParams) -> Result<ToolOutput, ToolError> {
        let path = resolve_path(&self.working_dir, &params.path);

        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => {
                return Err(ToolError::ExecutionFailed(format!(
                    "File not found: {}",
                    params.path
                )));
            }
        };
        if !metadata.is_file() {
            return Err(ToolError::ExecutionFailed(format!(
                "Not a file: {}",
                params.path
            )));
        }

        if params.offset.is_some() || params.limit.is_some() {
            let start = params.offset.unwrap_or(1).saturating_sub(1);
            let content = self.read_range(&path, start, params.limit).await?;
            return Ok(ToolOutput::text(content));
        }

        if metadata.len() > MAX_READ_SIZE {
            return Err(ToolError::ExecutionFailed(format!(
                "File too large ({} bytes). Max: {} bytes. \
                 Use offset/limit parameters to read portions.",
                metadata.len(),
                MAX_READ_SIZE
            )));
        }

        let bytes = fs::read(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Error reading file: {}", e)))?;
        let text = String::from_utf8_lossy(&bytes);
        let numbered: Vec<String> = text
            .lines()
            .enumerate()
            .map(|(i, line)| number_line(i + 1, line))
            .collect();

        Ok(ToolOutput::text(numbered.join("\n")))
    }
}

/// Write content to a file, replacing whatever was there.
#[derive(Debug)]
pub struct WriteFileTool {
    working_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    type Params = WriteFileParams;

    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed. \
         Overwrites existing content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path (relative to working dir or absolute)."
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file."
                }
            },
            "required": WriteFileParams::REQUIRED
        })
    }

    async fn execute(&self, params: WriteFileParams) -> Result<ToolOutput, ToolError> {
        let path = resolve_path(&self.working_dir, &params.path);

        let write = async {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&path, params.content.as_bytes()).await
        };
        write
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Error writing file: {}", e)))?;

        Ok(ToolOutput::text(format!(
            "Successfully wrote {} bytes to {}",
            params.content.len(),
            params.path
        )))
    }
}

/// Search-and-replace edits.
#[derive(Debug)]
pub struct EditFileTool {
    working_dir: PathBuf,
}

impl EditFileTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    type Params = EditFileParams;

    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Edit a file by replacing text. The old_string must be unique \
         in the file unless replace_all is true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path (relative to working dir or absolute)."
                },
                "old_string": {
                    "type": "string",
                    "description": "Text to find and replace."
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text."
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)."
                }
            },
            "required": EditFileParams::REQUIRED
        })
    }

    async fn execute(&self, params: EditFileParams) -> Result<ToolOutput, ToolError> {
        let path = resolve_path(&self.working_dir, &params.path);

        if fs::metadata(&path).await.is_err() {
            return Err(ToolError::ExecutionFailed(format!(
                "File not found: {}",
                params.path
            )));
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Error editing file: {}", e)))?;

        // An empty needle matches everywhere; treat it as not found.
        let count = if params.old_string.is_empty() {
            0
        } else {
            content.matches(params.old_string.as_str()).count()
        };

        if count == 0 {
            let preview: String = params.old_string.chars().take(100).collect();
            return Err(ToolError::ExecutionFailed(format!(
                "String not found in file: {}...",
                preview
            )));
        }

        if count > 1 && !params.replace_all {
            return Err(ToolError::ExecutionFailed(format!(
                "String found {} times. Use replace_all=true to replace all, \
                 or provide more context to make the match unique.",
                count
            )));
        }

        let (updated, replaced) = if params.replace_all {
            (content.replace(&params.old_string, &params.new_string), count)
        } else {
            (content.replacen(&params.old_string, &params.new_string, 1), 1)
        };

        fs::write(&path, updated)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("Error editing file: {}", e)))?;

        Ok(ToolOutput::text(format!(
            "Successfully replaced {} occurrence(s) in {}",
            replaced, params.path
        )))
    }
}

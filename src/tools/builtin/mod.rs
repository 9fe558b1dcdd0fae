//! Built-in tools available to every job.

mod fetch;
mod file;
mod search;
mod shell;

use std::path::{Path, PathBuf};

pub use fetch::{MAX_RESPONSE_SIZE, WebFetchParams, WebFetchTool};
pub use file::{
    EditFileParams, EditFileTool, MAX_READ_SIZE, ReadFileParams, ReadFileTool, WriteFileParams,
    WriteFileTool,
};
pub use search::{GlobParams, GlobTool, GrepParams, GrepTool, MAX_GLOB_RESULTS, MAX_GREP_RESULTS};
pub use shell::{
    BashParams, CommandOutput, MAX_OUTPUT_SIZE, ShellTool, TIMEOUT_EXIT_CODE, TRUNCATION_MARKER,
};

/// Absolute paths pass through; relative ones are joined onto `working_dir`.
pub(crate) fn resolve_path(working_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        working_dir.join(candidate)
    }
}

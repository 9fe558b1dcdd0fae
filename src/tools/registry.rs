//! Tool registry: the fixed tool catalog and typed tool input.

use std::path::PathBuf;

use crate::config::ToolsConfig;
use crate::tools::builtin::{
    BashParams, EditFileParams, EditFileTool, GlobParams, GlobTool, GrepParams, GrepTool,
    ReadFileParams, ReadFileTool, ShellTool, WebFetchParams, WebFetchTool, WriteFileParams,
    WriteFileTool,
};
use crate::tools::tool::{Tool, ToolError, ToolOutput, ToolParams, ToolSpec};

/// A validated tool call, one variant per registered tool.
#[derive(Debug)]
pub enum ToolInput {
    Bash(BashParams),
    ReadFile(ReadFileParams),
    WriteFile(WriteFileParams),
    EditFile(EditFileParams),
    Glob(GlobParams),
    Grep(GrepParams),
    WebFetch(WebFetchParams),
}

impl ToolInput {
    /// Validate raw model input for the tool called `name`.
    pub fn parse(name: &str, input: &serde_json::Value) -> Result<Self, ToolError> {
        Ok(match name {
            "bash" => ToolInput::Bash(BashParams::from_input(input)?),
            "read_file" => ToolInput::ReadFile(ReadFileParams::from_input(input)?),
            "write_file" => ToolInput::WriteFile(WriteFileParams::from_input(input)?),
            "edit_file" => ToolInput::EditFile(EditFileParams::from_input(input)?),
            "glob" => ToolInput::Glob(GlobParams::from_input(input)?),
            "grep" => ToolInput::Grep(GrepParams::from_input(input)?),
            "web_fetch" => ToolInput::WebFetch(WebFetchParams::from_input(input)?),
            other => return Err(ToolError::UnknownTool(other.to_string())),
        })
    }
}

/// The tool set bound to one working directory.
#[derive(Debug)]
pub struct ToolRegistry {
    bash: ShellTool,
    read_file: ReadFileTool,
    write_file: WriteFileTool,
    edit_file: EditFileTool,
    glob: GlobTool,
    grep: GrepTool,
    web_fetch: WebFetchTool,
}

impl ToolRegistry {
    pub fn new(working_dir: PathBuf, config: &ToolsConfig) -> Result<Self, ToolError> {
        Ok(Self {
            bash: ShellTool::new(working_dir.clone())
                .with_timeout(config.command_timeout)
                .with_allowed_commands(config.allowed_commands.clone()),
            read_file: ReadFileTool::new(working_dir.clone()),
            write_file: WriteFileTool::new(working_dir.clone()),
            edit_file: EditFileTool::new(working_dir.clone()),
            glob: GlobTool::new(working_dir.clone()),
            grep: GrepTool::new(working_dir),
            web_fetch: WebFetchTool::with_timeout(config.fetch_timeout)?,
        })
    }

    /// Specs in the order they are offered to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![
            self.bash.spec(),
            self.read_file.spec(),
            self.write_file.spec(),
            self.edit_file.spec(),
            self.glob.spec(),
            self.grep.spec(),
            self.web_fetch.spec(),
        ]
    }

    /// Run a validated call on the matching tool.
    pub async fn run(&self, input: ToolInput) -> Result<ToolOutput, ToolError> {
        match input {
            ToolInput::Bash(p) => self.bash.execute(p).await,
            ToolInput::ReadFile(p) => self.read_file.execute(p).await,
            ToolInput::WriteFile(p) => self.write_file.execute(p).await,
            ToolInput::EditFile(p) => self.edit_file.execute(p).await,
            ToolInput::Glob(p) => self.glob.execute(p).await,
            ToolInput::Grep(p) => self.grep.execute(p).await,
            ToolInput::WebFetch(p) => self.web_fetch.execute(p).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specs_are_unique_and_complete() {
        let registry =
            ToolRegistry::new(std::env::temp_dir(), &ToolsConfig::default()).unwrap();
        let specs = registry.specs();

        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["bash", "read_file", "write_file", "edit_file", "glob", "grep", "web_fetch"]
        );

        for spec in &specs {
            assert_eq!(spec.input_schema["type"], "object");
            assert!(spec.input_schema["required"].is_array());
            assert!(!spec.description.is_empty());
        }
    }

    #[test]
    fn test_parse_routes_by_name() {
        let input = ToolInput::parse("edit_file", &serde_json::json!({
            "path": "a.go",
            "old_string": "x",
            "new_string": "y"
        }))
        .unwrap();
        assert!(matches!(input, ToolInput::EditFile(ref p) if !p.replace_all));

        let err = ToolInput::parse("teleport", &serde_json::json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: teleport");

        let err = ToolInput::parse("write_file", &serde_json::json!({"path": "a"})).unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: content");
    }
}

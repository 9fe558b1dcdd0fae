//! Supported OAPE commands and the system prompt assembled for each.
//!
//! Skill, instruction, and fixture files are opaque markdown read from the
//! plugins directory; nothing here interprets their content.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;

use crate::config::ContextConfig;
use crate::error::JobError;

/// One runnable command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Skill files (relative to `skills/`) loaded after the common ones.
    #[serde(skip)]
    pub skills: &'static [&'static str],
}

const COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        name: "init",
        description: "Clone and prepare an operator repository for development",
        skills: &[],
    },
    CommandInfo {
        name: "api-generate",
        description: "Generate API type definitions from an enhancement proposal",
        skills: &[],
    },
    CommandInfo {
        name: "api-generate-tests",
        description: "Generate integration tests for generated API types",
        skills: &[],
    },
    CommandInfo {
        name: "api-implement",
        description: "Generate controller/reconciler code from an enhancement proposal",
        skills: &[],
    },
    CommandInfo {
        name: "e2e-generate",
        description: "Generate end-to-end tests for an operator feature",
        skills: &["e2e-test-generator/SKILL.md"],
    },
    CommandInfo {
        name: "review",
        description: "Review operator code changes against OpenShift conventions",
        skills: &[],
    },
    CommandInfo {
        name: "implement-review-fixes",
        description: "Apply fixes for findings from a previous review",
        skills: &[],
    },
];

/// Skills every command gets.
const COMMON_SKILLS: &[&str] = &["effective-go/SKILL.md"];

/// Base context candidates, first readable one wins.
const BASE_CONTEXT_FILES: &[&str] = &["AGENTS.md", "CLAUDE.md"];

/// Prompt sent as the first user turn of a job.
pub fn build_prompt(command: &str, prompt: &str) -> String {
    format!("Execute: /oape:{} {}", command, prompt)
}

/// Command lookup plus context loading from the plugins tree.
#[derive(Debug, Clone)]
pub struct CommandCatalog {
    plugins_dir: PathBuf,
    root_dir: PathBuf,
}

impl CommandCatalog {
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            plugins_dir: config.plugins_dir.clone(),
            root_dir: config.root_dir.clone(),
        }
    }

    pub fn all(&self) -> &'static [CommandInfo] {
        COMMANDS
    }

    pub fn get(&self, name: &str) -> Option<&'static CommandInfo> {
        COMMANDS.iter().find(|c| c.name == name)
    }

    /// Look up `name`, failing with the list of valid commands.
    pub fn resolve(&self, name: &str) -> Result<&'static CommandInfo, JobError> {
        self.get(name).ok_or_else(|| JobError::UnknownCommand {
            command: name.to_string(),
            available: COMMANDS
                .iter()
                .map(|c| c.name)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Assemble the system prompt for `command`.
    ///
    /// Order: base context, team repos, common skills, command skills,
    /// command instructions, e2e fixtures, then the execution footer.
    pub async fn load_context(&self, command: &CommandInfo) -> String {
        let mut parts = Vec::new();

        if let Some(base) = self.load_base_context().await {
            parts.push(base);
        }

        if let Some(repos) = read_optional(&self.root_dir.join("team-repos.csv")).await {
            parts.push(format!("\n\n## Team Repositories\n\n```csv\n{}\n```\n", repos));
        }

        for skill in COMMON_SKILLS.iter().chain(command.skills) {
            if let Some(content) = read_optional(&self.skills_dir().join(skill)).await {
                tracing::info!("Loaded skill: {}", skill);
                parts.push(format!("\n\n---\n\n# Skill: {}\n\n{}", skill, content));
            }
        }

        let instructions = self.commands_dir().join(format!("{}.md", command.name));
        if let Some(content) = read_optional(&instructions).await {
            tracing::info!("Loaded command instructions: {}.md", command.name);
            parts.push(format!(
                "\n\n---\n\n# Command Instructions: {}\n\n{}",
                command.name, content
            ));
        }

        if command.name == "e2e-generate"
            && let Some(fixtures) = self.load_e2e_fixtures().await
        {
            parts.push(fixtures);
        }

        let mut context = parts.join("\n");
        context.push_str(&execution_footer(command.name));

        tracing::info!(
            command = command.name,
            chars = context.len(),
            "Loaded command context"
        );
        context
    }

    fn skills_dir(&self) -> PathBuf {
        self.plugins_dir.join("skills")
    }

    fn commands_dir(&self) -> PathBuf {
        self.plugins_dir.join("commands")
    }

    async fn load_base_context(&self) -> Option<String> {
        for name in BASE_CONTEXT_FILES {
            if let Some(content) = read_optional(&self.root_dir.join(name)).await {
                tracing::info!("Loaded base context from {}", name);
                return Some(content);
            }
        }
        tracing::warn!("No base context file found (AGENTS.md or CLAUDE.md)");
        None
    }

    async fn load_e2e_fixtures(&self) -> Option<String> {
        let mut dir = self.plugins_dir.join("e2e-test-generator/fixtures");
        if !is_dir(&dir).await {
            dir = self
                .plugins_dir
                .parent()
                .unwrap_or(&self.plugins_dir)
                .join("e2e-test-generator/fixtures");
        }
        if !is_dir(&dir).await {
            return None;
        }

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Error reading fixtures in {}: {}", dir.display(), e);
                return None;
            }
        };
        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            files.push(entry.path());
        }
        files.sort();

        let mut parts = Vec::new();
        for ext in ["md", "example"] {
            for path in files.iter().filter(|p| p.extension().is_some_and(|e| e == ext)) {
                let Some(content) = read_optional(path).await else {
                    continue;
                };
                let name = path.file_name().unwrap_or_default().to_string_lossy();
                if ext == "md" {
                    parts.push(format!("\n\n### Fixture: {}\n\n{}", name, content));
                } else {
                    parts.push(format!("\n\n### Example: {}\n\n```\n{}\n```", name, content));
                }
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(format!(
                "\n\n---\n\n# E2E Test Generator Fixtures\n{}",
                parts.concat()
            ))
        }
    }
}

fn execution_footer(command: &str) -> String {
    format!(
        "\n\n---\n\n# Execution Context\n\n\
         You are now executing the `{}` command. Follow the instructions above precisely.\n\n\
         - Execute each phase in order\n\
         - Use the provided tools (bash, read_file, write_file, etc.) as needed\n\
         - If any precheck fails, STOP and report the failure\n\
         - Provide clear output at each step\n\
         - End with a summary of what was accomplished\n",
        command
    )
}

/// Read a context file, treating missing or empty files as absent.
async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path).await {
        Ok(content) if !content.is_empty() => Some(content),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("File not found: {}", path.display());
            None
        }
        Err(e) => {
            tracing::error!("Error reading {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn layout() -> (TempDir, CommandCatalog) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let plugins = root.join("plugins/oape");
        std::fs::create_dir_all(plugins.join("commands")).unwrap();
        std::fs::create_dir_all(plugins.join("skills/effective-go")).unwrap();
        std::fs::create_dir_all(plugins.join("skills/e2e-test-generator")).unwrap();
        std::fs::create_dir_all(plugins.join("e2e-test-generator/fixtures")).unwrap();

        std::fs::write(root.join("CLAUDE.md"), "BASE CONTEXT").unwrap();
        std::fs::write(root.join("team-repos.csv"), "repo,branch\nfoo,main").unwrap();
        std::fs::write(plugins.join("skills/effective-go/SKILL.md"), "GO SKILL").unwrap();
        std::fs::write(plugins.join("skills/e2e-test-generator/SKILL.md"), "E2E SKILL").unwrap();
        std::fs::write(plugins.join("commands/api-implement.md"), "IMPLEMENT STEPS").unwrap();
        std::fs::write(plugins.join("commands/e2e-generate.md"), "E2E STEPS").unwrap();
        std::fs::write(plugins.join("e2e-test-generator/fixtures/b.md"), "FIXTURE B").unwrap();
        std::fs::write(plugins.join("e2e-test-generator/fixtures/a.example"), "EXAMPLE A").unwrap();

        let catalog = CommandCatalog::new(&ContextConfig {
            plugins_dir: plugins,
            root_dir: root.to_path_buf(),
        });
        (dir, catalog)
    }

    #[test]
    fn test_resolve() {
        let (_dir, catalog) = layout();
        assert_eq!(catalog.resolve("review").unwrap().name, "review");

        let err = catalog.resolve("deploy").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("deploy"));
        assert!(message.contains("api-implement"));
        assert_eq!(catalog.all().len(), 7);
    }

    #[test]
    fn test_build_prompt() {
        assert_eq!(
            build_prompt("api-implement", "https://github.com/openshift/enhancements/pull/1234"),
            "Execute: /oape:api-implement https://github.com/openshift/enhancements/pull/1234"
        );
    }

    #[tokio::test]
    async fn test_context_order() {
        let (_dir, catalog) = layout();
        let command = catalog.resolve("api-implement").unwrap();
        let context = catalog.load_context(command).await;

        let pos = |needle: &str| context.find(needle).unwrap_or_else(|| panic!("{} missing", needle));
        assert!(pos("BASE CONTEXT") < pos("```csv\nrepo,branch"));
        assert!(pos("```csv") < pos("# Skill: effective-go/SKILL.md"));
        assert!(pos("GO SKILL") < pos("# Command Instructions: api-implement"));
        assert!(pos("IMPLEMENT STEPS") < pos("# Execution Context"));
        assert!(context.contains("executing the `api-implement` command"));
        assert!(!context.contains("E2E SKILL"));
        assert!(!context.contains("FIXTURE B"));
    }

    #[tokio::test]
    async fn test_e2e_context_includes_skill_and_fixtures() {
        let (_dir, catalog) = layout();
        let command = catalog.resolve("e2e-generate").unwrap();
        let context = catalog.load_context(command).await;

        assert!(context.contains("# Skill: e2e-test-generator/SKILL.md"));
        assert!(context.contains("### Fixture: b.md\n\nFIXTURE B"));
        assert!(context.contains("### Example: a.example\n\n```\nEXAMPLE A\n```"));
        assert!(context.find("FIXTURE B").unwrap() < context.find("EXAMPLE A").unwrap());
    }

    #[tokio::test]
    async fn test_missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let catalog = CommandCatalog::new(&ContextConfig {
            plugins_dir: dir.path().join("nothing"),
            root_dir: dir.path().to_path_buf(),
        });
        let command = catalog.resolve("init").unwrap();
        let context = catalog.load_context(command).await;

        assert!(context.starts_with("\n\n---\n\n# Execution Context"));
    }
}

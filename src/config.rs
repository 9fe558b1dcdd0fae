//! Configuration loaded from the environment.
//!
//! `main` calls `dotenvy::dotenv()` first, so every key below may also live in
//! a `.env` file next to the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub vertex: VertexConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub context: ContextConfig,
    pub server: ServerConfig,
    pub pricing: PricingOverrides,
}

/// Claude-on-Vertex connection settings.
#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub project_id: String,
    pub region: String,
    pub model: String,
    /// Static bearer token. When absent the provider asks `gcloud` for one.
    pub access_token: Option<SecretString>,
}

/// Conversation engine limits.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_tokens: u32,
    pub max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            max_iterations: 50,
        }
    }
}

/// Tool executor limits.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub command_timeout: Duration,
    /// Allowed command prefixes; `None` allows everything.
    pub allowed_commands: Option<Vec<String>>,
    pub fetch_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(300),
            allowed_commands: None,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Where command instructions and skills are read from.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub plugins_dir: PathBuf,
    pub root_dir: PathBuf,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::detect()
    }
}

impl ContextConfig {
    /// Container deployments mount plugins at `/plugins/oape` and root files at `/`.
    fn detect() -> Self {
        let container_plugins = Path::new("/plugins/oape");
        if container_plugins.exists() {
            Self {
                plugins_dir: container_plugins.to_path_buf(),
                root_dir: PathBuf::from("/"),
            }
        } else {
            Self {
                plugins_dir: PathBuf::from("plugins/oape"),
                root_dir: PathBuf::from("."),
            }
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub keepalive: Duration,
    pub max_streams: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            keepalive: Duration::from_secs(30),
            max_streams: 100,
        }
    }
}

/// USD-per-million-token overrides for cost reporting.
#[derive(Debug, Clone, Default)]
pub struct PricingOverrides {
    pub input_per_million: Option<f64>,
    pub output_per_million: Option<f64>,
}

impl Config {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let project_id =
            get("ANTHROPIC_VERTEX_PROJECT_ID").ok_or_else(|| ConfigError::MissingRequired {
                key: "ANTHROPIC_VERTEX_PROJECT_ID".to_string(),
            })?;

        let vertex = VertexConfig {
            project_id,
            region: get("CLOUD_ML_REGION").unwrap_or_else(|| "us-east5".to_string()),
            model: get("ANTHROPIC_MODEL")
                .unwrap_or_else(|| "claude-3-5-sonnet-v2@20241022".to_string()),
            access_token: get("VERTEX_ACCESS_TOKEN").map(SecretString::from),
        };

        let agent_defaults = AgentConfig::default();
        let agent = AgentConfig {
            max_tokens: parse_or(&get, "OAPE_MAX_TOKENS", agent_defaults.max_tokens)?,
            max_iterations: parse_or(&get, "OAPE_MAX_ITERATIONS", agent_defaults.max_iterations)?,
        };
        if agent.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OAPE_MAX_ITERATIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let tools_defaults = ToolsConfig::default();
        let tools = ToolsConfig {
            command_timeout: Duration::from_secs(parse_or(
                &get,
                "OAPE_COMMAND_TIMEOUT_SECS",
                tools_defaults.command_timeout.as_secs(),
            )?),
            allowed_commands: get("OAPE_ALLOWED_COMMANDS").map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
            fetch_timeout: Duration::from_secs(parse_or(
                &get,
                "OAPE_FETCH_TIMEOUT_SECS",
                tools_defaults.fetch_timeout.as_secs(),
            )?),
        };

        let detected = ContextConfig::detect();
        let context = ContextConfig {
            plugins_dir: get("OAPE_PLUGINS_DIR")
                .map(PathBuf::from)
                .unwrap_or(detected.plugins_dir),
            root_dir: get("OAPE_ROOT_DIR")
                .map(PathBuf::from)
                .unwrap_or(detected.root_dir),
        };

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: get("OAPE_HOST").unwrap_or(server_defaults.host),
            port: parse_or(&get, "OAPE_PORT", server_defaults.port)?,
            keepalive: Duration::from_secs(parse_or(
                &get,
                "OAPE_KEEPALIVE_SECS",
                server_defaults.keepalive.as_secs(),
            )?),
            max_streams: parse_or(&get, "OAPE_MAX_STREAMS", server_defaults.max_streams)?,
        };
        if server.keepalive.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "OAPE_KEEPALIVE_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let pricing = PricingOverrides {
            input_per_million: parse_opt(&get, "OAPE_COST_INPUT_PER_1M")?,
            output_per_million: parse_opt(&get, "OAPE_COST_OUTPUT_PER_1M")?,
        };

        Ok(Self {
            vertex,
            agent,
            tools,
            context,
            server,
            pricing,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

fn parse_opt<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}': {}", raw, e),
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_requires_project_id() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { ref key } if key == "ANTHROPIC_VERTEX_PROJECT_ID"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("ANTHROPIC_VERTEX_PROJECT_ID", "proj")])).unwrap();

        assert_eq!(config.vertex.region, "us-east5");
        assert_eq!(config.agent.max_iterations, 50);
        assert_eq!(config.agent.max_tokens, 8192);
        assert_eq!(config.tools.command_timeout, Duration::from_secs(300));
        assert_eq!(config.tools.fetch_timeout, Duration::from_secs(30));
        assert!(config.tools.allowed_commands.is_none());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.keepalive, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides_and_allow_list() {
        let config = Config::from_lookup(lookup(&[
            ("ANTHROPIC_VERTEX_PROJECT_ID", "proj"),
            ("OAPE_MAX_ITERATIONS", "7"),
            ("OAPE_ALLOWED_COMMANDS", "git, make ,go"),
            ("OAPE_PORT", "9000"),
            ("OAPE_COST_INPUT_PER_1M", "2.5"),
        ]))
        .unwrap();

        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(
            config.tools.allowed_commands,
            Some(vec!["git".to_string(), "make".to_string(), "go".to_string()])
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.pricing.input_per_million, Some(2.5));
        assert_eq!(config.pricing.output_per_million, None);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("ANTHROPIC_VERTEX_PROJECT_ID", "proj"),
            ("OAPE_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "OAPE_PORT"));

        let err = Config::from_lookup(lookup(&[
            ("ANTHROPIC_VERTEX_PROJECT_ID", "proj"),
            ("OAPE_MAX_ITERATIONS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = Config::from_lookup(lookup(&[
            ("ANTHROPIC_VERTEX_PROJECT_ID", "proj"),
            ("OAPE_KEEPALIVE_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "OAPE_KEEPALIVE_SECS")
        );
    }
}

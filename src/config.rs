//! Planner and pipeline configuration.
//!
//! [`GraphConfig`] carries the defaults every join plan and every query pipeline
//! starts from. Applications load it from the `[graph]` section of
//! `config/config.toml` or from `LIFEGUARD__GRAPH__*` environment variables using
//! `GraphConfig::load()`; `GraphConfig::default()` gives the built-in values.

use config::{Config, ConfigError, Environment, File};
use sea_query::JoinType;
use serde::Deserialize;

/// PostgreSQL truncates identifiers longer than this
pub const DEFAULT_IDENTIFIER_MAX_LENGTH: usize = 63;

/// Hard cap on relation recursion when joining
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 64;

/// The SQL join used to attach a relation's rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
    Right,
    Full,
}

impl JoinKind {
    pub fn join_type(self) -> JoinType {
        match self {
            JoinKind::Left => JoinType::LeftJoin,
            JoinKind::Inner => JoinType::InnerJoin,
            JoinKind::Right => JoinType::RightJoin,
            JoinKind::Full => JoinType::FullOuterJoin,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GraphConfig {
    /// Separator between a table alias and a column name in flattened aliases
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Use short `_t<N>` table aliases instead of relation paths
    #[serde(default)]
    pub minimize: bool,
    /// Join used for relations that do not declare their own
    #[serde(default)]
    pub join_operation: JoinKind,
    #[serde(default = "default_identifier_max_length")]
    pub identifier_max_length: usize,
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,
    /// Strip key columns the caller did not select from materialized models
    #[serde(default = "default_true")]
    pub omit_implicit_join_columns: bool,
    /// Return the first `on_error` recovery value instead of the error
    #[serde(default)]
    pub capture_errors: bool,
}

fn default_separator() -> String {
    ":".to_string()
}

fn default_identifier_max_length() -> usize {
    DEFAULT_IDENTIFIER_MAX_LENGTH
}

fn default_max_recursion_depth() -> usize {
    DEFAULT_MAX_RECURSION_DEPTH
}

fn default_true() -> bool {
    true
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            minimize: false,
            join_operation: JoinKind::default(),
            identifier_max_length: default_identifier_max_length(),
            max_recursion_depth: default_max_recursion_depth(),
            omit_implicit_join_columns: true,
            capture_errors: false,
        }
    }
}

impl GraphConfig {
    /// Load the graph configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/config.toml")
    }

    /// Load from an explicit TOML path (optional) layered under `LIFEGUARD__GRAPH__*` env vars.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("LIFEGUARD").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // File present but unreadable: warn and retry with env only
                if std::path::Path::new(path).exists() {
                    log::warn!("failed to load config file {}, falling back to env: {}", path, err);
                }
                Config::builder()
                    .add_source(Environment::with_prefix("LIFEGUARD").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // A missing [graph] section means defaults, not an error
        match settings.get::<GraphConfig>("graph") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(GraphConfig::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Graph configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }
}

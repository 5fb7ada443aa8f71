use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};
use crate::maintenance::optimize::DEFAULT_OPTIMIZATION_THRESHOLD;
use crate::source::PathFilter;

/// How the apply loop is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every producer call drains the log before returning.
    #[default]
    Sync,
    /// A background worker drains the log; producers return once the record is durable.
    Async,
}

/// A content field copied into index documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default = "default_true")]
    pub stored: bool,
    #[serde(default = "default_true")]
    pub indexed: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        FieldDefinition {
            name: name.into(),
            sortable: false,
            stored: true,
            indexed: true,
        }
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }
}

/// Configuration for an [`Indexer`](crate::Indexer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Applies between automatic compactions.
    pub optimization_threshold: u64,
    pub run_mode: RunMode,
    /// Item types this indexer accepts.
    pub index_types: Vec<String>,
    pub fields: Vec<FieldDefinition>,
    /// When non-empty, only items with one of these aliases are indexed.
    pub include_aliases: Vec<String>,
    pub exclude_aliases: Vec<String>,
    /// Optional slash-path glob; see [`PathFilter`].
    pub path_filter: Option<String>,
    /// Namespace of the operation log inside the root storage.
    pub queue_prefix: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            optimization_threshold: DEFAULT_OPTIMIZATION_THRESHOLD,
            run_mode: RunMode::Sync,
            index_types: vec!["content".to_string(), "media".to_string()],
            fields: Vec::new(),
            include_aliases: Vec::new(),
            exclude_aliases: Vec::new(),
            path_filter: None,
            queue_prefix: "queue".to_string(),
        }
    }
}

impl IndexerConfig {
    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IndexerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.optimization_threshold == 0 {
            return Err(IndexerError::invalid_config(
                "optimization_threshold must be positive",
            ));
        }
        if self.index_types.is_empty() {
            return Err(IndexerError::invalid_config(
                "index_types must name at least one item type",
            ));
        }
        if self.queue_prefix.trim_matches('/').is_empty() {
            return Err(IndexerError::invalid_config("queue_prefix must not be empty"));
        }
        if let Some(expr) = &self.path_filter {
            PathFilter::parse(expr)
                .map_err(|e| IndexerError::invalid_config(format!("path_filter: {e}")))?;
        }
        Ok(())
    }

    pub(crate) fn compiled_path_filter(&self) -> Result<Option<PathFilter>> {
        self.path_filter.as_deref().map(PathFilter::parse).transpose()
    }
}

#[derive(Debug, Default)]
pub struct IndexerConfigBuilder {
    config: IndexerConfig,
}

impl IndexerConfigBuilder {
    pub fn optimization_threshold(mut self, threshold: u64) -> Self {
        self.config.optimization_threshold = threshold;
        self
    }

    pub fn run_mode(mut self, run_mode: RunMode) -> Self {
        self.config.run_mode = run_mode;
        self
    }

    pub fn index_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.index_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_field(mut self, field: FieldDefinition) -> Self {
        self.config.fields.push(field);
        self
    }

    pub fn include_alias(mut self, alias: impl Into<String>) -> Self {
        self.config.include_aliases.push(alias.into());
        self
    }

    pub fn exclude_alias(mut self, alias: impl Into<String>) -> Self {
        self.config.exclude_aliases.push(alias.into());
        self
    }

    pub fn path_filter(mut self, expression: impl Into<String>) -> Self {
        self.config.path_filter = Some(expression.into());
        self
    }

    pub fn queue_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.queue_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<IndexerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.optimization_threshold, 100);
        assert_eq!(config.run_mode, RunMode::Sync);
        assert_eq!(config.index_types, vec!["content", "media"]);
        assert_eq!(config.queue_prefix, "queue");
        config.validate().unwrap();
    }

    #[test]
    fn test_json_defaults_and_round_trip() {
        let config = IndexerConfig::from_json_str(
            r#"{"run_mode": "async", "fields": [{"name": "title", "sortable": true}]}"#,
        )
        .unwrap();
        assert_eq!(config.run_mode, RunMode::Async);
        assert_eq!(config.optimization_threshold, 100);
        assert!(config.fields[0].stored);
        assert!(config.fields[0].sortable);

        let json = config.to_json_string().unwrap();
        assert_eq!(IndexerConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            IndexerConfig::builder().optimization_threshold(0).build(),
            Err(IndexerError::InvalidConfig(_))
        ));
        assert!(
            IndexerConfig::builder()
                .index_types(Vec::<String>::new())
                .build()
                .is_err()
        );
        assert!(IndexerConfig::builder().path_filter("no-slash").build().is_err());
        assert!(IndexerConfig::builder().queue_prefix("/").build().is_err());

        let config = IndexerConfig::builder()
            .optimization_threshold(5)
            .path_filter("/1111/**")
            .add_field(FieldDefinition::new("title").sortable())
            .build()
            .unwrap();
        assert_eq!(config.optimization_threshold, 5);
        assert!(config.compiled_path_filter().unwrap().is_some());
    }
}

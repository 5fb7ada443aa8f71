//! Turning content items into index documents.

use crate::data::{
    ALIAS_FIELD, DataValue, Document, FieldOption, ID_FIELD, PATH_FIELD, SORT_FIELD_PREFIX,
    TYPE_FIELD,
};
use crate::error::Result;
use crate::indexer::config::{FieldDefinition, IndexerConfig};
use crate::source::{PathFilter, SourceItem};

/// Decides which items are indexed and how their documents look.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    index_types: Vec<String>,
    fields: Vec<FieldDefinition>,
    include_aliases: Vec<String>,
    exclude_aliases: Vec<String>,
    path_filter: Option<PathFilter>,
}

impl DocumentBuilder {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        Ok(DocumentBuilder {
            index_types: config.index_types.clone(),
            fields: config.fields.clone(),
            include_aliases: config.include_aliases.clone(),
            exclude_aliases: config.exclude_aliases.clone(),
            path_filter: config.compiled_path_filter()?,
        })
    }

    pub fn index_types(&self) -> &[String] {
        &self.index_types
    }

    pub fn path_filter(&self) -> Option<&PathFilter> {
        self.path_filter.as_ref()
    }

    pub fn accepts_type(&self, item_type: &str) -> bool {
        self.index_types.iter().any(|t| t == item_type)
    }

    /// Whether `item` passes the type, alias and path filters.
    pub fn accepts(&self, item: &SourceItem) -> bool {
        if !self.accepts_type(&item.identity.item_type) {
            return false;
        }
        if !self.include_aliases.is_empty() && !self.include_aliases.contains(&item.alias) {
            return false;
        }
        if self.exclude_aliases.contains(&item.alias) {
            return false;
        }
        self.path_filter
            .as_ref()
            .is_none_or(|filter| filter.matches(&item.path))
    }

    /// Build the index document for an accepted item.
    ///
    /// Reserved fields come first, then configured fields in configuration
    /// order. A sortable field is followed by its unstored `_sort_` copy.
    pub fn build(&self, item: &SourceItem) -> Document {
        let mut doc = Document::new()
            .add_keyword(ID_FIELD, item.identity.id.to_string())
            .add_keyword(TYPE_FIELD, item.identity.item_type.clone())
            .add_keyword(PATH_FIELD, item.path.clone())
            .add_keyword(ALIAS_FIELD, item.alias.clone());

        for definition in &self.fields {
            let Some(value) = item.field(&definition.name) else {
                continue;
            };
            let option = FieldOption {
                stored: definition.stored,
                indexed: definition.indexed,
                sortable: false,
            };
            doc = doc.add_field_with_option(definition.name.clone(), value.clone(), option);

            if definition.sortable {
                doc = doc.add_field_with_option(
                    format!("{SORT_FIELD_PREFIX}{}", definition.name),
                    DataValue::String(value.to_keyword().to_lowercase()),
                    FieldOption::sort_key(),
                );
            }
        }
        doc
    }
}

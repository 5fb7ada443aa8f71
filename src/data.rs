use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved field holding the string form of an item's id.
pub const ID_FIELD: &str = "_id";

/// Reserved field holding an item's type tag (`content`, `media`, ...).
pub const TYPE_FIELD: &str = "_type";

/// Reserved field holding an item's repository path.
pub const PATH_FIELD: &str = "_path";

/// Reserved field holding an item's alias (document type name).
pub const ALIAS_FIELD: &str = "_alias";

/// Prefix for the unstored, lowercased copy of a sortable field.
pub const SORT_FIELD_PREFIX: &str = "_sort_";

/// The identifier part of an [`ItemIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(i64),
    Str(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(i) => write!(f, "{i}"),
            ItemId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(v: i64) -> Self {
        ItemId::Int(v)
    }
}

impl From<i32> for ItemId {
    fn from(v: i32) -> Self {
        ItemId::Int(v as i64)
    }
}

impl From<&str> for ItemId {
    fn from(v: &str) -> Self {
        ItemId::Str(v.to_string())
    }
}

impl From<String> for ItemId {
    fn from(v: String) -> Self {
        ItemId::Str(v)
    }
}

/// Stable identity of a content item: its id plus its type tag.
///
/// Two operations touch the same index document exactly when their
/// identities are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemIdentity {
    pub id: ItemId,
    pub item_type: String,
}

impl ItemIdentity {
    pub fn new(id: impl Into<ItemId>, item_type: impl Into<String>) -> Self {
        ItemIdentity {
            id: id.into(),
            item_type: item_type.into(),
        }
    }
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type, self.id)
    }
}

/// The value of a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),

    /// Keyword content, matched as a single exact term.
    String(String),

    /// Full text, matched token by token.
    Text(String),

    /// List of keywords (e.g. tags).
    List(Vec<String>),

    /// Date and time in UTC.
    DateTime(chrono::DateTime<chrono::Utc>),
}

impl DataValue {
    /// Returns the text value if this is a Text or String variant.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DataValue::Text(s) | DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value if this is an Int64 variant.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the datetime value if this is a DateTime variant.
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            DataValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Render the value as the terms it is indexed under.
    ///
    /// Text is lowercased and split on non-alphanumeric characters; every
    /// other variant yields a single exact term.
    pub fn terms(&self) -> Vec<String> {
        match self {
            DataValue::Null => Vec::new(),
            DataValue::Text(s) => s
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(|t| t.to_lowercase())
                .collect(),
            DataValue::List(items) => items.clone(),
            other => vec![other.to_keyword()],
        }
    }

    /// Single-string form used for keyword matching and sort keys.
    pub fn to_keyword(&self) -> String {
        match self {
            DataValue::Null => String::new(),
            DataValue::Bool(b) => b.to_string(),
            DataValue::Int64(i) => i.to_string(),
            DataValue::Float64(f) => f.to_string(),
            DataValue::String(s) | DataValue::Text(s) => s.clone(),
            DataValue::List(items) => items.join(" "),
            DataValue::DateTime(dt) => dt.to_rfc3339(),
        }
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Text(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Text(v.to_string())
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int64(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int64(v as i64)
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float64(v)
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DataValue {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        DataValue::DateTime(dt)
    }
}

/// How a field is handled by the index engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Keep the original value retrievable from search hits.
    pub stored: bool,
    /// Make the value searchable.
    pub indexed: bool,
    /// The field is a sort key.
    pub sortable: bool,
}

impl Default for FieldOption {
    fn default() -> Self {
        FieldOption {
            stored: true,
            indexed: true,
            sortable: false,
        }
    }
}

impl FieldOption {
    /// Options for a field used only as a sort key.
    pub fn sort_key() -> Self {
        FieldOption {
            stored: false,
            indexed: true,
            sortable: true,
        }
    }
}

/// A named value with its indexing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: DataValue,
    pub option: FieldOption,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<DataValue>, option: FieldOption) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
            option,
        }
    }
}

/// An ordered collection of fields: the payload of an Add operation.
///
/// Field order is preserved from construction through the operation log
/// and into the index engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub fields: Vec<Field>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    /// Append a field with default options.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.fields
            .push(Field::new(name, value, FieldOption::default()));
        self
    }

    /// Append a keyword field with default options.
    pub fn add_keyword(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(Field::new(
            name,
            DataValue::String(value.into()),
            FieldOption::default(),
        ));
        self
    }

    /// Append a field with explicit options.
    pub fn add_field_with_option(
        mut self,
        name: impl Into<String>,
        value: impl Into<DataValue>,
        option: FieldOption,
    ) -> Self {
        self.fields.push(Field::new(name, value, option));
        self
    }

    /// Append an already-built field.
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Check if the document has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    /// Field names in insertion order, duplicates included.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// The identity encoded by the reserved `_id` and `_type` fields, if both are present.
    pub fn identity(&self) -> Option<ItemIdentity> {
        let id = self.get(ID_FIELD)?.to_keyword();
        let item_type = self.get(TYPE_FIELD)?.to_keyword();
        let id = match id.parse::<i64>() {
            Ok(i) => ItemId::Int(i),
            Err(_) => ItemId::Str(id),
        };
        Some(ItemIdentity::new(id, item_type))
    }

    /// A copy without unstored fields, as returned in search hits.
    pub fn stored_only(&self) -> Document {
        Document {
            fields: self
                .fields
                .iter()
                .filter(|f| f.option.stored)
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

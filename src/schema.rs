use rand::distributions::Alphanumeric;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Declared data type of a field.
///
/// Parsing is total: spellings that match none of the known types are kept
/// verbatim in [`DataType::Other`] so a round trip through storage never
/// loses what the user typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Datetime,
    Enum,
    Object,
    Array,
    Other(String),
}

impl DataType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "string" | "text" | "str" => DataType::String,
            "integer" | "int" => DataType::Integer,
            "number" | "float" | "double" | "decimal" => DataType::Number,
            "boolean" | "bool" => DataType::Boolean,
            "date" => DataType::Date,
            "datetime" | "timestamp" => DataType::Datetime,
            "enum" => DataType::Enum,
            "object" | "dict" | "map" => DataType::Object,
            "array" | "list" => DataType::Array,
            _ => DataType::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Enum => "enum",
            DataType::Object => "object",
            DataType::Array => "array",
            DataType::Other(raw) => raw,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, DataType::Array)
    }
}

impl From<String> for DataType {
    fn from(raw: String) -> Self {
        DataType::parse(&raw)
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.as_str().to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the field graph, in the record shape exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[schemars(description = "Opaque identifier, stable for the lifetime of the field")]
    pub id: String,

    #[schemars(
        description = "Symbolic key unique among siblings (e.g. 'invoice_no'). Dotted keys such as 'buyer_info.name' imply nesting when no parent id is present."
    )]
    pub field_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Human readable label shown to reviewers")]
    pub field_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Machine friendly alias used in extracted data. Falls back to fieldKey.")]
    pub data_name: Option<String>,

    #[serde(default)]
    #[schemars(
        with = "String",
        description = "One of string, integer, number, boolean, date, datetime, enum, object, array"
    )]
    pub data_type: DataType,

    #[serde(default)]
    #[schemars(description = "Whether the extraction model must always produce this field")]
    pub is_required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Free-form validation rule applied after extraction")]
    pub validation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Normalization rule applied to the extracted value")]
    pub normalize: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Extra hint passed to the prompt author for this field")]
    pub prompt_hint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Minimum model confidence (0.0 - 1.0) before the value is accepted")]
    pub confidence_threshold: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Position among siblings; ties are broken by depth, then by key")]
    pub sort_order: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Id of the owning field, absent for root fields")]
    pub parent_field_id: Option<String>,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(field_key: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: generate_field_id(),
            field_key: field_key.into(),
            field_name: None,
            data_name: None,
            data_type,
            is_required: false,
            description: None,
            example: None,
            validation: None,
            normalize: None,
            prompt_hint: None,
            confidence_threshold: None,
            sort_order: 0,
            parent_field_id: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_field_id.is_none()
    }

    /// Key used for this field inside an item object.
    pub fn output_key(&self) -> &str {
        self.data_name.as_deref().unwrap_or(&self.field_key)
    }

    pub fn record_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FieldDescriptor)
    }

    pub fn record_schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::record_schema())
    }
}

/// Synthesizes a fresh opaque field id.
pub fn generate_field_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("fld_{}", suffix)
}

/// Ordered, parent-linked collection of field descriptors.
///
/// This is a parent-pointer forest kept as a flat list; the id -> children
/// index is derived on demand and never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldGraph {
    fields: Vec<FieldDescriptor>,
}

impl FieldGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [FieldDescriptor] {
        &mut self.fields
    }

    pub fn into_fields(self) -> Vec<FieldDescriptor> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldDescriptor> {
        self.fields.iter()
    }

    pub fn push(&mut self, field: FieldDescriptor) {
        self.fields.push(field);
    }

    pub fn extend(&mut self, fields: impl IntoIterator<Item = FieldDescriptor>) {
        self.fields.extend(fields);
    }

    pub fn get(&self, id: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut FieldDescriptor> {
        self.fields.iter_mut().find(|f| f.id == id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_root())
    }

    /// Direct children of `id`, in graph order.
    pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a FieldDescriptor> {
        self.fields
            .iter()
            .filter(move |f| f.parent_field_id.as_deref() == Some(id))
    }

    /// Parent id -> positions of its direct children.
    pub fn children_index(&self) -> HashMap<&str, Vec<usize>> {
        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (pos, field) in self.fields.iter().enumerate() {
            if let Some(parent) = field.parent_field_id.as_deref() {
                index.entry(parent).or_default().push(pos);
            }
        }
        index
    }

    /// Removes a field and turns its direct children into roots.
    pub fn remove(&mut self, id: &str) -> Option<FieldDescriptor> {
        let pos = self.fields.iter().position(|f| f.id == id)?;
        let removed = self.fields.remove(pos);
        for field in &mut self.fields {
            if field.parent_field_id.as_deref() == Some(id) {
                field.parent_field_id = None;
            }
        }
        Some(removed)
    }

    /// Number of parent hops from `field` up to a root.
    pub fn depth_of(&self, field: &FieldDescriptor) -> usize {
        crate::hierarchy::parent_depth(field, self)
    }

    /// Copy of the graph ordered by `sortOrder`, then depth, then `fieldKey`.
    pub fn sorted(&self) -> FieldGraph {
        let mut keyed: Vec<(usize, &FieldDescriptor)> =
            self.fields.iter().map(|f| (self.depth_of(f), f)).collect();
        keyed.sort_by(|(depth_a, a), (depth_b, b)| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(depth_a.cmp(depth_b))
                .then_with(|| a.field_key.cmp(&b.field_key))
        });
        FieldGraph::from_fields(keyed.into_iter().map(|(_, f)| f.clone()).collect())
    }
}

impl From<Vec<FieldDescriptor>> for FieldGraph {
    fn from(fields: Vec<FieldDescriptor>) -> Self {
        Self::from_fields(fields)
    }
}

impl<'a> IntoIterator for &'a FieldGraph {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, key: &str, order: i64, parent: Option<&str>) -> FieldDescriptor {
        FieldDescriptor {
            id: id.to_string(),
            sort_order: order,
            parent_field_id: parent.map(str::to_string),
            ..FieldDescriptor::new(key, DataType::String)
        }
    }

    #[test]
    fn test_data_type_parsing_is_total() {
        assert_eq!(DataType::parse("Integer"), DataType::Integer);
        assert_eq!(DataType::parse(" bool "), DataType::Boolean);
        assert_eq!(DataType::parse("list"), DataType::Array);
        assert_eq!(
            DataType::parse("currency"),
            DataType::Other("currency".to_string())
        );
        assert_eq!(DataType::parse("currency").as_str(), "currency");
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let mut descriptor = field("f1", "invoice_no", 3, None);
        descriptor.is_required = true;
        let json = serde_json::to_value(&descriptor).unwrap();

        assert_eq!(json["fieldKey"], "invoice_no");
        assert_eq!(json["dataType"], "string");
        assert_eq!(json["isRequired"], true);
        assert_eq!(json["sortOrder"], 3);
        assert!(json.get("parentFieldId").is_none());

        let back: FieldDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_record_schema_mentions_fields() {
        let schema_json = FieldDescriptor::record_schema_as_json().unwrap();
        assert!(schema_json.contains("fieldKey"));
        assert!(schema_json.contains("parentFieldId"));
        assert!(schema_json.contains("confidenceThreshold"));
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = generate_field_id();
        let b = generate_field_id();
        assert!(a.starts_with("fld_"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_children_index_and_remove() {
        let mut graph = FieldGraph::from_fields(vec![
            field("p", "items", 0, None),
            field("c1", "name", 1, Some("p")),
            field("c2", "qty", 2, Some("p")),
        ]);

        let index = graph.children_index();
        assert_eq!(index.get("p"), Some(&vec![1, 2]));
        assert_eq!(graph.children_of("p").count(), 2);
        assert_eq!(graph.roots().count(), 1);

        let removed = graph.remove("p").unwrap();
        assert_eq!(removed.field_key, "items");
        assert_eq!(graph.len(), 2);
        assert!(graph.iter().all(|f| f.is_root()));
    }

    #[test]
    fn test_sorted_breaks_ties_by_depth_then_key() {
        let graph = FieldGraph::from_fields(vec![
            field("c", "zeta", 1, Some("r")),
            field("b", "beta", 1, None),
            field("a", "alpha", 1, None),
            field("r", "root", 0, None),
        ]);

        let sorted = graph.sorted();
        let keys: Vec<&str> = sorted.iter().map(|f| f.field_key.as_str()).collect();
        assert_eq!(keys, vec!["root", "alpha", "beta", "zeta"]);
    }
}

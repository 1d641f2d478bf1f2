//! Forward compilation: field graph -> example tree and schema document.
//!
//! Both builders walk the graph in the order given. Only one level of
//! array-item structure is materialized: an array root renders its direct
//! children and nothing below them.

use crate::schema::{FieldDescriptor, FieldGraph};
use crate::type_map::{example_type_for, to_schema_type, ENUM_EXAMPLE, NULLABLE_SUFFIX};
use log::debug;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const JSON_SCHEMA_DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";

/// Field key -> type string, or a one-element array holding the item shape.
pub type ExampleValueTree = Map<String, Value>;

/// Top-level schema document sent to the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaDocument {
    #[serde(rename = "$schema")]
    pub schema: String,
    #[serde(flatten)]
    pub body: ObjectSchema,
}

impl SchemaDocument {
    pub fn properties(&self) -> &[(String, FieldSchema)] {
        &self.body.properties
    }

    pub fn required(&self) -> &[String] {
        &self.body.required
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// `{ type: "object", properties, required }`, with properties kept in graph order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(serialize_with = "serialize_properties")]
    pub properties: Vec<(String, FieldSchema)>,
    pub required: Vec<String>,
}

impl ObjectSchema {
    fn empty() -> Self {
        Self {
            kind: "object".to_string(),
            properties: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&FieldSchema> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, schema)| schema)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldSchema {
    Scalar {
        kind: String,
        description: String,
        example: Option<String>,
    },
    Array {
        items: ObjectSchema,
    },
}

impl Serialize for FieldSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldSchema::Scalar {
                kind,
                description,
                example,
            } => {
                let len = if example.is_some() { 3 } else { 2 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("type", kind)?;
                map.serialize_entry("description", description)?;
                if let Some(example) = example {
                    map.serialize_entry("example", example)?;
                }
                map.end()
            }
            FieldSchema::Array { items } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "array")?;
                map.serialize_entry("items", items)?;
                map.end()
            }
        }
    }
}

fn serialize_properties<S: Serializer>(
    properties: &[(String, FieldSchema)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(properties.len()))?;
    for (key, schema) in properties {
        map.serialize_entry(key, schema)?;
    }
    map.end()
}

pub fn build_example_tree(graph: &FieldGraph) -> ExampleValueTree {
    let index = graph.children_index();
    let mut tree = Map::new();

    for root in graph.roots() {
        let value = if root.data_type.is_array() {
            let mut item = Map::new();
            for child in indexed_children(graph, &index, &root.id) {
                item.insert(
                    child.output_key().to_string(),
                    Value::String(example_type_for(&child.data_type, child.is_required)),
                );
            }
            if item.is_empty() {
                Value::Array(Vec::new())
            } else {
                Value::Array(vec![Value::Object(item)])
            }
        } else {
            Value::String(example_type_for(&root.data_type, root.is_required))
        };
        tree.insert(root.field_key.clone(), value);
    }

    debug!("Built example tree with {} root entries", tree.len());
    tree
}

pub fn build_schema_document(graph: &FieldGraph) -> SchemaDocument {
    let index = graph.children_index();
    let mut body = ObjectSchema::empty();

    for root in graph.roots() {
        let schema = if root.data_type.is_array() {
            FieldSchema::Array {
                items: item_object_schema(indexed_children(graph, &index, &root.id)),
            }
        } else {
            scalar_schema(root)
        };
        body.properties.push((root.field_key.clone(), schema));
        if root.is_required {
            body.required.push(root.field_key.clone());
        }
    }

    debug!(
        "Built schema document with {} properties ({} required)",
        body.properties.len(),
        body.required.len()
    );

    SchemaDocument {
        schema: JSON_SCHEMA_DRAFT_07.to_string(),
        body,
    }
}

/// Item schema of an array field, built from its direct children only.
pub fn build_nested_object_schema(parent: &FieldDescriptor, graph: &FieldGraph) -> ObjectSchema {
    item_object_schema(graph.children_of(&parent.id))
}

fn indexed_children<'a>(
    graph: &'a FieldGraph,
    index: &HashMap<&str, Vec<usize>>,
    id: &str,
) -> impl Iterator<Item = &'a FieldDescriptor> {
    let positions = index.get(id).cloned().unwrap_or_default();
    positions.into_iter().map(move |pos| &graph.fields()[pos])
}

fn item_object_schema<'a>(children: impl Iterator<Item = &'a FieldDescriptor>) -> ObjectSchema {
    let mut object = ObjectSchema::empty();
    for child in children {
        let key = child.output_key().to_string();
        if child.is_required {
            object.required.push(key.clone());
        }
        object.properties.push((key, scalar_schema(child)));
    }
    object
}

fn scalar_schema(field: &FieldDescriptor) -> FieldSchema {
    let description = non_empty(&field.description)
        .or_else(|| non_empty(&field.field_name))
        .unwrap_or(&field.field_key)
        .to_string();

    FieldSchema::Scalar {
        kind: to_schema_type(&field.data_type).to_string(),
        description,
        example: non_empty(&field.example).map(str::to_string),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Turns an example tree into an illustrative data instance.
pub fn instantiate_example(tree: &ExampleValueTree) -> Value {
    Value::Object(
        tree.iter()
            .map(|(key, value)| (key.clone(), instantiate_value(value)))
            .collect(),
    )
}

fn instantiate_value(value: &Value) -> Value {
    match value {
        Value::String(type_name) => sample_for(type_name),
        Value::Array(items) => Value::Array(items.iter().map(instantiate_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), instantiate_value(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sample_for(type_name: &str) -> Value {
    let base = type_name.strip_suffix(NULLABLE_SUFFIX).unwrap_or(type_name);
    match base {
        "integer" | "number" => json!(0),
        "boolean" => json!(false),
        "date" => json!("2024-01-01"),
        "datetime" => json!("2024-01-01T00:00:00Z"),
        "object" => json!({}),
        "array" => json!([]),
        ENUM_EXAMPLE => json!("pass"),
        _ => json!("text"),
    }
}

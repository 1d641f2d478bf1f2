//! Reverse compilation: infer a flat field list from a sample JSON document.

use crate::schema::{DataType, FieldDescriptor};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_EXAMPLE_MAX_LEN: usize = 200;

static DATE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").ok());

/// Known business terms, keyed by field key or final key segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelDictionary {
    labels: HashMap<String, String>,
}

impl LabelDictionary {
    pub fn empty() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(key.into(), label.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelDictionary {
    fn default() -> Self {
        [
            ("invoice_no", "Invoice Number"),
            ("invoice_code", "Invoice Code"),
            ("invoice_date", "Invoice Date"),
            ("buyer_info", "Buyer"),
            ("seller_info", "Seller"),
            ("tax_id", "Tax ID"),
            ("tax_rate", "Tax Rate"),
            ("tax_amount", "Tax Amount"),
            ("amount", "Amount"),
            ("total_amount", "Total Amount"),
            ("qty", "Quantity"),
            ("unit_price", "Unit Price"),
            ("items", "Line Items"),
            ("remark", "Remarks"),
            ("inspector", "Inspector"),
            ("result", "Inspection Result"),
        ]
        .into_iter()
        .fold(Self::empty(), |dict, (key, label)| dict.with_label(key, label))
    }
}

/// Best-effort label: dictionary lookup on the final segment, then the full
/// key, else title-cased underscore tokens.
pub fn humanize_key(key: &str, labels: &LabelDictionary) -> String {
    let last = key.rsplit('.').next().unwrap_or(key);
    if let Some(label) = labels.get(last).or_else(|| labels.get(key)) {
        return label.to_string();
    }

    last.split('_')
        .filter(|token| !token.is_empty())
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heuristic type of a sample value. Numeric strings stay strings.
pub fn infer_type(value: &Value) -> DataType {
    match value {
        Value::Null => DataType::String,
        Value::Bool(_) => DataType::Boolean,
        Value::Number(_) => DataType::Number,
        Value::String(s) if is_iso_date(s) => DataType::Date,
        Value::String(_) => DataType::String,
        Value::Array(_) => DataType::Array,
        Value::Object(_) => DataType::Object,
    }
}

fn is_iso_date(s: &str) -> bool {
    DATE_PATTERN
        .as_ref()
        .map(|re| re.is_match(s))
        .unwrap_or(false)
}

pub struct FieldInferrer<'a> {
    labels: &'a LabelDictionary,
    example_max_len: usize,
}

impl<'a> FieldInferrer<'a> {
    pub fn new(labels: &'a LabelDictionary) -> Self {
        Self {
            labels,
            example_max_len: DEFAULT_EXAMPLE_MAX_LEN,
        }
    }

    pub fn with_example_max_len(mut self, max_len: usize) -> Self {
        self.example_max_len = max_len;
        self
    }

    /// Depth-first inference producing a flat list. `id` and `parentFieldId`
    /// hold symbolic refs: the field key, suffixed with `#2`, `#3`, ... when
    /// an earlier field already uses it. Callers reconcile them into real ids.
    pub fn infer(
        &self,
        value: &Value,
        parent_key: &str,
        parent_ref: Option<&str>,
        start_order: i64,
    ) -> Vec<FieldDescriptor> {
        let mut out = Vec::new();
        self.infer_into(value, parent_key, parent_ref, start_order, false, &mut out);
        debug!("Inferred {} fields from sample", out.len());
        out
    }

    /// `in_item` is set below an array item; arrays found there stay leaves.
    fn infer_into(
        &self,
        value: &Value,
        parent_key: &str,
        parent_ref: Option<&str>,
        start_order: i64,
        in_item: bool,
        out: &mut Vec<FieldDescriptor>,
    ) {
        let base = out.len();
        let next_order = |len: usize| start_order + (len - base) as i64;

        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let field_key = if parent_key.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", parent_key, key)
                    };

                    let item_template = match child {
                        Value::Array(items) if !in_item => {
                            items.first().filter(|first| first.is_object())
                        }
                        _ => None,
                    };
                    let example = match child {
                        Value::Object(_) => None,
                        Value::Array(_) if item_template.is_some() => None,
                        other => self.stringify(other),
                    };

                    let order = next_order(out.len());
                    let child_ref = push_field(
                        out,
                        self.descriptor(
                            &field_key,
                            Some(key.as_str()),
                            infer_type(child),
                            example,
                            parent_ref,
                            order,
                        ),
                    );

                    if child.is_object() {
                        let order = next_order(out.len());
                        self.infer_into(child, &field_key, Some(child_ref.as_str()), order, in_item, out);
                    } else if let Some(template) = item_template {
                        let order = next_order(out.len());
                        self.infer_into(template, &field_key, Some(child_ref.as_str()), order, true, out);
                    }
                }
            }
            Value::Array(items) => {
                let field_key = root_key(parent_key);
                match items.first() {
                    Some(first) if first.is_object() && !in_item => {
                        let array_ref = push_field(
                            out,
                            self.descriptor(
                                &field_key,
                                None,
                                DataType::Array,
                                None,
                                parent_ref,
                                start_order,
                            ),
                        );
                        let order = next_order(out.len());
                        self.infer_into(first, &field_key, Some(array_ref.as_str()), order, true, out);
                    }
                    _ => {
                        push_field(
                            out,
                            self.descriptor(
                                &field_key,
                                None,
                                DataType::Array,
                                self.stringify(value),
                                parent_ref,
                                start_order,
                            ),
                        );
                    }
                }
            }
            leaf => {
                push_field(
                    out,
                    self.descriptor(
                        &root_key(parent_key),
                        None,
                        infer_type(leaf),
                        self.stringify(leaf),
                        parent_ref,
                        start_order,
                    ),
                );
            }
        }
    }

    fn descriptor(
        &self,
        field_key: &str,
        local_key: Option<&str>,
        data_type: DataType,
        example: Option<String>,
        parent_ref: Option<&str>,
        sort_order: i64,
    ) -> FieldDescriptor {
        FieldDescriptor {
            id: field_key.to_string(),
            field_key: field_key.to_string(),
            field_name: Some(humanize_key(field_key, self.labels)),
            data_name: local_key.map(str::to_string),
            data_type,
            is_required: false,
            description: None,
            example,
            validation: None,
            normalize: None,
            prompt_hint: None,
            confidence_threshold: None,
            sort_order,
            parent_field_id: parent_ref.map(str::to_string),
        }
    }

    fn stringify(&self, value: &Value) -> Option<String> {
        let text = match value {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Some(text.chars().take(self.example_max_len).collect())
    }
}

/// Appends `field`, making its symbolic id unique within `out`, and returns that id.
fn push_field(out: &mut Vec<FieldDescriptor>, mut field: FieldDescriptor) -> String {
    let taken = |id: &str| out.iter().any(|f| f.id == id);
    if taken(&field.id) {
        let mut n = 2;
        while taken(&format!("{}#{}", field.field_key, n)) {
            n += 1;
        }
        field.id = format!("{}#{}", field.field_key, n);
    }
    let id = field.id.clone();
    out.push(field);
    id
}

fn root_key(parent_key: &str) -> String {
    if parent_key.is_empty() {
        "root".to_string()
    } else {
        parent_key.to_string()
    }
}

/// Infers fields from a whole sample document with the default dictionary.
pub fn infer_field_graph(value: &Value) -> Vec<FieldDescriptor> {
    let labels = LabelDictionary::default();
    FieldInferrer::new(&labels).infer(value, "", None, 0)
}

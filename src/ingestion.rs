//! Import of externally supplied field definitions.
//!
//! Spreadsheet rows and JSON files are first normalized into [`FieldRecord`]s,
//! then merged into an existing [`FieldGraph`] by a [`Reconciler`], which
//! resolves parent links by symbolic `parentFieldKey` rather than by id.

use crate::error::{FieldSchemaError, Result};
use crate::repair::parse_lenient;
use crate::reverse::FieldInferrer;
use crate::schema::{generate_field_id, DataType, FieldDescriptor, FieldGraph};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Logical columns of a field-definition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Column {
    FieldKey,
    FieldName,
    DataName,
    DataType,
    IsRequired,
    Description,
    Example,
    ParentFieldKey,
    Validation,
    Normalize,
    PromptHint,
    ConfidenceThreshold,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::FieldKey,
        Column::FieldName,
        Column::DataName,
        Column::DataType,
        Column::IsRequired,
        Column::Description,
        Column::Example,
        Column::ParentFieldKey,
        Column::Validation,
        Column::Normalize,
        Column::PromptHint,
        Column::ConfidenceThreshold,
    ];

    /// Record key used on the wire, always accepted as a header.
    pub fn record_key(&self) -> &'static str {
        match self {
            Column::FieldKey => "fieldKey",
            Column::FieldName => "fieldName",
            Column::DataName => "dataName",
            Column::DataType => "dataType",
            Column::IsRequired => "isRequired",
            Column::Description => "description",
            Column::Example => "example",
            Column::ParentFieldKey => "parentFieldKey",
            Column::Validation => "validation",
            Column::Normalize => "normalize",
            Column::PromptHint => "promptHint",
            Column::ConfidenceThreshold => "confidenceThreshold",
        }
    }
}

/// Accepted header spellings per logical column, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSynonyms {
    synonyms: BTreeMap<Column, Vec<String>>,
}

impl HeaderSynonyms {
    pub fn empty() -> Self {
        Self {
            synonyms: BTreeMap::new(),
        }
    }

    pub fn with_synonyms<I, S>(mut self, column: Column, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms
            .entry(column)
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn resolve(&self, header: &str) -> Option<Column> {
        let wanted = header.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        Column::ALL.into_iter().find(|column| {
            column.record_key().to_lowercase() == wanted
                || self.synonyms.get(column).is_some_and(|names| {
                    names.iter().any(|name| name.trim().to_lowercase() == wanted)
                })
        })
    }
}

impl Default for HeaderSynonyms {
    fn default() -> Self {
        Self::empty()
            .with_synonyms(
                Column::FieldKey,
                ["field_key", "field key", "key", "identifier", "字段标识", "字段键", "字段编码"],
            )
            .with_synonyms(
                Column::FieldName,
                ["field_name", "field name", "name", "display name", "label", "字段名称", "字段名", "名称"],
            )
            .with_synonyms(
                Column::DataName,
                ["data_name", "data name", "alias", "数据名", "数据名称", "别名"],
            )
            .with_synonyms(
                Column::DataType,
                ["data_type", "data type", "type", "数据类型", "类型"],
            )
            .with_synonyms(
                Column::IsRequired,
                ["is_required", "required", "mandatory", "是否必填", "必填"],
            )
            .with_synonyms(Column::Description, ["desc", "描述", "说明"])
            .with_synonyms(Column::Example, ["sample", "example value", "示例", "样例"])
            .with_synonyms(
                Column::ParentFieldKey,
                ["parent_field_key", "parent key", "parent", "父字段", "父级字段"],
            )
            .with_synonyms(Column::Validation, ["validation rule", "校验规则"])
            .with_synonyms(Column::Normalize, ["normalization", "标准化"])
            .with_synonyms(Column::PromptHint, ["prompt_hint", "hint", "提示"])
            .with_synonyms(
                Column::ConfidenceThreshold,
                ["confidence_threshold", "confidence", "置信度阈值"],
            )
    }
}

/// A loosely-typed field definition as supplied by an import source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub field_key: Option<String>,
    pub field_name: Option<String>,
    pub data_name: Option<String>,
    pub data_type: Option<String>,
    pub is_required: Option<bool>,
    pub description: Option<String>,
    pub example: Option<String>,
    pub parent_field_key: Option<String>,
    pub validation: Option<String>,
    pub normalize: Option<String>,
    pub prompt_hint: Option<String>,
    pub confidence_threshold: Option<f64>,
    /// Batch-local name other records use as `parentFieldKey`; the field key
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_ref: Option<String>,
}

impl FieldRecord {
    pub fn new(field_key: impl Into<String>) -> Self {
        Self {
            field_key: Some(field_key.into()),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_field_key: impl Into<String>) -> Self {
        self.parent_field_key = Some(parent_field_key.into());
        self
    }

    /// Builds a record from an arbitrary object, mapping keys through `headers`.
    pub fn from_object(object: &Map<String, Value>, headers: &HeaderSynonyms) -> Self {
        let mut record = Self::default();
        for (key, value) in object {
            match headers.resolve(key) {
                Some(column) => record.set(column, value),
                None => debug!("Ignoring unrecognized record key '{}'", key),
            }
        }
        record
    }

    /// Converts a reverse-inferred descriptor, whose id and parent id are symbolic refs.
    pub fn from_inferred(field: FieldDescriptor) -> Self {
        Self {
            batch_ref: Some(field.id),
            field_key: Some(field.field_key),
            field_name: field.field_name,
            data_name: field.data_name,
            data_type: Some(field.data_type.to_string()),
            is_required: Some(field.is_required),
            description: field.description,
            example: field.example,
            parent_field_key: field.parent_field_id,
            validation: field.validation,
            normalize: field.normalize,
            prompt_hint: field.prompt_hint,
            confidence_threshold: field.confidence_threshold,
        }
    }

    fn set(&mut self, column: Column, value: &Value) {
        match column {
            Column::IsRequired => self.is_required = Some(is_truthy(value)),
            Column::ConfidenceThreshold => self.confidence_threshold = parse_threshold(value),
            _ => {
                let text = cell_text(value);
                let slot = match column {
                    Column::FieldKey => &mut self.field_key,
                    Column::FieldName => &mut self.field_name,
                    Column::DataName => &mut self.data_name,
                    Column::DataType => &mut self.data_type,
                    Column::Description => &mut self.description,
                    Column::Example => &mut self.example,
                    Column::ParentFieldKey => &mut self.parent_field_key,
                    Column::Validation => &mut self.validation,
                    Column::Normalize => &mut self.normalize,
                    Column::PromptHint => &mut self.prompt_hint,
                    Column::IsRequired | Column::ConfidenceThreshold => return,
                };
                *slot = text;
            }
        }
    }
}

fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_threshold(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("Ignoring non-numeric confidence threshold '{}'", s);
                None
            }
        },
        _ => None,
    }
}

/// Required-flag truthiness across spreadsheet and JSON spellings.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "required" | "是" | "必填"
        ),
        _ => false,
    }
}

/// Converts tabular rows (header row first) into records.
pub fn records_from_rows(rows: &[Vec<String>], headers: &HeaderSynonyms) -> Result<Vec<FieldRecord>> {
    let Some((header_row, data_rows)) = rows.split_first() else {
        return Ok(Vec::new());
    };

    let columns: Vec<Option<Column>> = header_row.iter().map(|h| headers.resolve(h)).collect();
    if !columns.contains(&Some(Column::FieldKey)) {
        return Err(FieldSchemaError::MissingColumn(
            Column::FieldKey.record_key().to_string(),
        ));
    }

    let mut records = Vec::new();
    for (line, row) in data_rows.iter().enumerate() {
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut record = FieldRecord::default();
        for (column, cell) in columns.iter().zip(row) {
            if let Some(column) = column {
                record.set(*column, &Value::String(cell.clone()));
            }
        }

        if record.field_key.is_none() {
            warn!("Skipping row {} without a field key", line + 2);
            continue;
        }
        records.push(record);
    }

    debug!(
        "Read {} records from {} tabular rows",
        records.len(),
        data_rows.len()
    );
    Ok(records)
}

/// Parses a JSON import file: an array of records, or a sample document that
/// is routed through the reverse compiler.
pub fn records_from_json(
    text: &str,
    headers: &HeaderSynonyms,
    inferrer: &FieldInferrer<'_>,
) -> Result<Vec<FieldRecord>> {
    let repaired = parse_lenient(text)?;

    match repaired.value {
        Value::Array(items) => {
            let mut records = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item.as_object() {
                    Some(object) => records.push(FieldRecord::from_object(object, headers)),
                    None => warn!("Skipping non-object entry #{} in field import", index),
                }
            }
            Ok(records)
        }
        sample @ Value::Object(_) => Ok(inferrer
            .infer(&sample, "", None, 0)
            .into_iter()
            .map(FieldRecord::from_inferred)
            .collect()),
        other => Err(FieldSchemaError::InvalidImport(format!(
            "expected an array of field records or a sample object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// What to do when an imported key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail the whole import before touching the graph.
    Reject,
    /// Update the existing field in place, keeping its id and position.
    Overwrite,
    /// Keep both fields.
    #[default]
    Coexist,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub added: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub unresolved_parents: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    policy: DuplicatePolicy,
}

impl Reconciler {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Merges `records` into `graph`.
    ///
    /// Pass one materializes descriptors with fresh ids and `sortOrder`
    /// continuing after the existing graph. Pass two links each record's
    /// `parentFieldKey` to a descriptor of the same batch; unresolved parents
    /// leave the field as a root.
    pub fn reconcile(&self, graph: &mut FieldGraph, records: Vec<FieldRecord>) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();

        let records: Vec<(String, FieldRecord)> = records
            .into_iter()
            .filter_map(|record| match record.field_key.clone() {
                Some(key) => Some((key, record)),
                None => {
                    summary.skipped += 1;
                    None
                }
            })
            .collect();

        if self.policy == DuplicatePolicy::Reject {
            let duplicates = duplicate_keys(graph, &records);
            if !duplicates.is_empty() {
                return Err(FieldSchemaError::DuplicateFieldKey(duplicates));
            }
        }

        // Pass one: materialize.
        let base_order = graph.len() as i64;
        let mut lookup: HashMap<String, String> = HashMap::new();
        let mut materialized: Vec<(FieldDescriptor, Option<String>)> = Vec::with_capacity(records.len());

        for (index, (field_key, record)) in records.into_iter().enumerate() {
            let batch_ref = record.batch_ref.unwrap_or_else(|| field_key.clone());
            let descriptor = FieldDescriptor {
                id: generate_field_id(),
                field_key,
                field_name: record.field_name,
                data_name: record.data_name,
                data_type: record
                    .data_type
                    .as_deref()
                    .map(DataType::parse)
                    .unwrap_or_default(),
                is_required: record.is_required.unwrap_or(false),
                description: record.description,
                example: record.example,
                validation: record.validation,
                normalize: record.normalize,
                prompt_hint: record.prompt_hint,
                confidence_threshold: record.confidence_threshold,
                sort_order: base_order + index as i64,
                parent_field_id: None,
            };
            lookup
                .entry(batch_ref)
                .or_insert_with(|| descriptor.id.clone());
            materialized.push((descriptor, record.parent_field_key));
        }

        // Pass two: link by symbolic key.
        let mut fresh: Vec<FieldDescriptor> = Vec::with_capacity(materialized.len());
        for (mut descriptor, parent_key) in materialized {
            if let Some(parent_key) = parent_key {
                match lookup.get(&parent_key) {
                    Some(parent_id) if *parent_id != descriptor.id => {
                        descriptor.parent_field_id = Some(parent_id.clone());
                    }
                    _ => {
                        debug!(
                            "Parent '{}' of '{}' not found in batch, importing as root",
                            parent_key, descriptor.field_key
                        );
                        summary.unresolved_parents.push(parent_key);
                    }
                }
            }
            fresh.push(descriptor);
        }

        if self.policy == DuplicatePolicy::Overwrite {
            fresh = overwrite_existing(graph, fresh, &mut summary);
            for (index, field) in fresh.iter_mut().enumerate() {
                field.sort_order = base_order + index as i64;
            }
        }

        summary.added = fresh.len();
        graph.extend(fresh);

        info!(
            "Imported {} fields ({} overwritten, {} skipped, {} unresolved parents)",
            summary.added,
            summary.overwritten,
            summary.skipped,
            summary.unresolved_parents.len()
        );
        Ok(summary)
    }
}

fn duplicate_keys(graph: &FieldGraph, records: &[(String, FieldRecord)]) -> Vec<String> {
    let mut seen: BTreeSet<&str> = graph.iter().map(|f| f.field_key.as_str()).collect();
    let mut duplicates = BTreeSet::new();
    for (key, _) in records {
        if !seen.insert(key.as_str()) {
            duplicates.insert(key.clone());
        }
    }
    duplicates.into_iter().collect()
}

/// Folds fresh descriptors whose key already exists into the existing node
/// and re-points batch children at the surviving id.
fn overwrite_existing(
    graph: &mut FieldGraph,
    fresh: Vec<FieldDescriptor>,
    summary: &mut ImportSummary,
) -> Vec<FieldDescriptor> {
    let existing_len = graph.len();
    let mut remap: HashMap<String, String> = HashMap::new();
    let mut remaining = Vec::with_capacity(fresh.len());

    for descriptor in fresh {
        let existing = graph.fields()[..existing_len]
            .iter()
            .position(|f| f.field_key == descriptor.field_key);

        match existing {
            Some(pos) => {
                let target = &mut graph.fields_mut()[pos];
                remap.insert(descriptor.id.clone(), target.id.clone());
                target.field_name = descriptor.field_name;
                target.data_name = descriptor.data_name;
                target.data_type = descriptor.data_type;
                target.is_required = descriptor.is_required;
                target.description = descriptor.description;
                target.example = descriptor.example;
                target.validation = descriptor.validation;
                target.normalize = descriptor.normalize;
                target.prompt_hint = descriptor.prompt_hint;
                target.confidence_threshold = descriptor.confidence_threshold;
                if descriptor.parent_field_id.is_some() {
                    target.parent_field_id = descriptor.parent_field_id;
                }
                summary.overwritten += 1;
            }
            None => remaining.push(descriptor),
        }
    }

    let repoint = |parent: &mut Option<String>| {
        if let Some(new_id) = parent.as_ref().and_then(|id| remap.get(id)) {
            *parent = Some(new_id.clone());
        }
    };
    for field in graph.fields_mut() {
        repoint(&mut field.parent_field_id);
    }
    for field in &mut remaining {
        repoint(&mut field.parent_field_id);
    }
    remaining
}

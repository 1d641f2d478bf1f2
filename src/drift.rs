//! Drift detection between a generated prompt and the field graph / schema
//! it was generated from.

use crate::error::Result;
use crate::schema::FieldGraph;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 over the canonical (fields, schema) document.
///
/// Fields are reduced to the properties that affect a generated prompt and
/// ordered by `sortOrder` (ties by key); object keys are serialized in sorted
/// order. Schema text that does not parse contributes `null`.
pub fn compute_digest(graph: &FieldGraph, schema: Option<&str>) -> Result<String> {
    let mut fields: Vec<&_> = graph.iter().collect();
    fields.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.field_key.cmp(&b.field_key))
    });

    let fields: Vec<Value> = fields
        .into_iter()
        .map(|f| {
            json!({
                "fieldKey": f.field_key,
                "fieldName": f.field_name,
                "dataType": f.data_type.as_str(),
                "isRequired": f.is_required,
                "description": f.description,
                "sortOrder": f.sort_order,
            })
        })
        .collect();

    let schema = schema
        .and_then(|text| serde_json::from_str::<Value>(text).ok())
        .unwrap_or(Value::Null);

    let canonical = canonicalize(&json!({ "fields": fields, "schema": schema }));
    let bytes = serde_json::to_vec(&canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());
    debug!("Computed digest {} over {} fields", digest, graph.len());
    Ok(digest)
}

/// Rebuilds `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Without a stored digest there is no baseline, so nothing is stale. A
/// failed digest computation skips detection for this cycle.
pub fn is_stale(stored: Option<&str>, graph: &FieldGraph, schema: Option<&str>) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    match compute_digest(graph, schema) {
        Ok(current) => current != stored,
        Err(e) => {
            warn!("Skipping staleness check, digest failed: {}", e);
            false
        }
    }
}

/// Snapshot stored next to a generated prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftRecord {
    pub digest: String,
    pub source_fields: FieldGraph,
    pub source_schema: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl DriftRecord {
    pub fn capture(graph: &FieldGraph, schema: Option<&str>) -> Result<Self> {
        Ok(Self {
            digest: compute_digest(graph, schema)?,
            source_fields: graph.clone(),
            source_schema: schema.map(str::to_string),
            generated_at: Utc::now(),
        })
    }

    pub fn is_stale(&self, graph: &FieldGraph, schema: Option<&str>) -> bool {
        is_stale(Some(self.digest.as_str()), graph, schema)
    }
}

/// The external prompt author: `generatePrompt(fieldDefs, schema) -> promptText`.
pub trait PromptGenerator {
    fn generate_prompt(&self, fields: &FieldGraph, schema: Option<&str>) -> Result<String>;
}

impl<F> PromptGenerator for F
where
    F: Fn(&FieldGraph, Option<&str>) -> Result<String>,
{
    fn generate_prompt(&self, fields: &FieldGraph, schema: Option<&str>) -> Result<String> {
        self(fields, schema)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub prompt: String,
    pub drift: DriftRecord,
}

/// Generates a prompt and pairs it with the digest of its inputs.
pub fn generate_artifact<G: PromptGenerator + ?Sized>(
    generator: &G,
    graph: &FieldGraph,
    schema: Option<&str>,
) -> Result<GeneratedArtifact> {
    let drift = DriftRecord::capture(graph, schema)?;
    let prompt = generator.generate_prompt(graph, schema)?;
    debug!(
        "Generated prompt of {} chars with digest {}",
        prompt.len(),
        drift.digest
    );
    Ok(GeneratedArtifact { prompt, drift })
}

/// Advisory stale flag for an editing session.
///
/// Digest results are applied in the order they are handed in; the last
/// one wins and nothing in flight is cancelled. A failed computation leaves
/// the flag as it was.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftMonitor {
    baseline: Option<String>,
    stale: bool,
}

impl DriftMonitor {
    pub fn new(baseline: Option<String>) -> Self {
        Self {
            baseline,
            stale: false,
        }
    }

    pub fn from_record(record: &DriftRecord) -> Self {
        Self::new(Some(record.digest.clone()))
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Recomputes the digest for the current inputs and updates the flag.
    pub fn observe(&mut self, graph: &FieldGraph, schema: Option<&str>) -> bool {
        self.apply(compute_digest(graph, schema))
    }

    /// Applies a digest computed elsewhere.
    pub fn apply(&mut self, digest: Result<String>) -> bool {
        let Some(baseline) = self.baseline.as_deref() else {
            self.stale = false;
            return false;
        };
        match digest {
            Ok(current) => self.stale = current != baseline,
            Err(e) => warn!("Digest computation failed, keeping stale flag: {}", e),
        }
        self.stale
    }

    /// A new artifact replaces the baseline wholesale.
    pub fn rebase(&mut self, record: &DriftRecord) {
        self.baseline = Some(record.digest.clone());
        self.stale = false;
    }
}

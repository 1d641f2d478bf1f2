//! # Field Schema Compiler
//!
//! Keeps the three representations of a document-extraction contract
//! consistent with one another:
//!
//! - **Field graph**: a flat, parent-linked list of typed field descriptors edited in a table
//! - **Example tree**: a nested preview of what extracted data will look like
//! - **Schema document**: a draft-07 shaped JSON Schema sent to the extraction model
//!
//! It also infers field graphs from sample documents, merges imported field
//! definitions, and detects when a generated prompt has drifted from the
//! fields and schema it was generated from.
//!
//! ## Example
//!
//! ```rust,ignore
//! use field_schema_compiler::*;
//!
//! let mut invoice_no = FieldDescriptor::new("invoice_no", DataType::String);
//! invoice_no.is_required = true;
//! let amount = FieldDescriptor::new("amount", DataType::Number);
//! let graph = FieldGraph::from_fields(vec![invoice_no, amount]);
//!
//! let compiler = ContractCompiler::default();
//! let tree = compiler.example_tree(&graph);
//! // { "invoice_no": "string", "amount": "number | null" }
//! let schema = compiler.schema_document(&graph).to_json_pretty().unwrap();
//! let digest = compiler.digest(&graph, Some(schema.as_str())).unwrap();
//! assert!(!compiler.is_stale(Some(digest.as_str()), &graph, Some(schema.as_str())));
//! ```

pub mod config;
pub mod drift;
pub mod error;
pub mod forward;
pub mod hierarchy;
pub mod ingestion;
pub mod repair;
pub mod reverse;
pub mod schema;
pub mod type_map;

pub use config::CompilerConfig;
pub use drift::{
    canonicalize, compute_digest, generate_artifact, is_stale, DriftMonitor, DriftRecord,
    GeneratedArtifact, PromptGenerator,
};
pub use error::{FieldSchemaError, Result};
pub use forward::{
    build_example_tree, build_nested_object_schema, build_schema_document, instantiate_example,
    ExampleValueTree, FieldSchema, ObjectSchema, SchemaDocument, JSON_SCHEMA_DRAFT_07,
};
pub use hierarchy::{display_all, display_info, parent_depth, DisplayInfo};
pub use ingestion::{
    is_truthy, records_from_json, records_from_rows, Column, DuplicatePolicy, FieldRecord,
    HeaderSynonyms, ImportSummary, Reconciler,
};
pub use repair::{parse_lenient, RepairStage, RepairedJson};
pub use reverse::{humanize_key, infer_field_graph, infer_type, FieldInferrer, LabelDictionary};
pub use schema::{generate_field_id, DataType, FieldDescriptor, FieldGraph};
pub use type_map::{example_type_for, to_example_type, to_schema_type};

use log::{debug, info};
use serde_json::Value;

/// Entry point that carries a [`CompilerConfig`] into every operation.
#[derive(Debug, Clone, Default)]
pub struct ContractCompiler {
    config: CompilerConfig,
}

impl ContractCompiler {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_config_json(text: &str) -> Result<Self> {
        Self::new(CompilerConfig::from_json_str(text)?)
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn example_tree(&self, graph: &FieldGraph) -> ExampleValueTree {
        build_example_tree(graph)
    }

    pub fn schema_document(&self, graph: &FieldGraph) -> SchemaDocument {
        build_schema_document(graph)
    }

    /// Regenerates both forward artifacts from the graph in display order.
    pub fn regenerate(&self, graph: &FieldGraph) -> (ExampleValueTree, SchemaDocument) {
        let sorted = graph.sorted();
        debug!("Regenerating contract for {} fields", sorted.len());
        (build_example_tree(&sorted), build_schema_document(&sorted))
    }

    pub fn inferrer(&self) -> FieldInferrer<'_> {
        FieldInferrer::new(&self.config.labels).with_example_max_len(self.config.example_max_len)
    }

    pub fn infer_fields(&self, sample: &Value) -> Vec<FieldDescriptor> {
        self.inferrer().infer(sample, "", None, 0)
    }

    pub fn humanize(&self, key: &str) -> String {
        humanize_key(key, &self.config.labels)
    }

    pub fn import_rows(&self, graph: &mut FieldGraph, rows: &[Vec<String>]) -> Result<ImportSummary> {
        let records = records_from_rows(rows, &self.config.headers)?;
        self.import_records(graph, records)
    }

    pub fn import_json(&self, graph: &mut FieldGraph, text: &str) -> Result<ImportSummary> {
        let records = records_from_json(text, &self.config.headers, &self.inferrer())?;
        self.import_records(graph, records)
    }

    pub fn import_records(
        &self,
        graph: &mut FieldGraph,
        records: Vec<FieldRecord>,
    ) -> Result<ImportSummary> {
        info!(
            "Importing {} records with {:?} duplicate policy",
            records.len(),
            self.config.duplicate_policy
        );
        Reconciler::new(self.config.duplicate_policy).reconcile(graph, records)
    }

    pub fn display_info(&self, field: &FieldDescriptor, graph: &FieldGraph) -> DisplayInfo {
        display_info(field, graph, self.config.indent_unit)
    }

    pub fn display_all(&self, graph: &FieldGraph) -> Vec<DisplayInfo> {
        display_all(graph, self.config.indent_unit)
    }

    pub fn digest(&self, graph: &FieldGraph, schema: Option<&str>) -> Result<String> {
        compute_digest(graph, schema)
    }

    pub fn is_stale(&self, stored: Option<&str>, graph: &FieldGraph, schema: Option<&str>) -> bool {
        is_stale(stored, graph, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_regenerate_uses_display_order() {
        let mut late = FieldDescriptor::new("late", DataType::String);
        late.sort_order = 5;
        let mut early = FieldDescriptor::new("early", DataType::Boolean);
        early.sort_order = 1;
        early.is_required = true;
        let graph = FieldGraph::from_fields(vec![late, early]);

        let (tree, schema) = ContractCompiler::default().regenerate(&graph);
        let keys: Vec<&String> = tree.keys().collect();
        assert_eq!(keys, vec!["early", "late"]);
        assert_eq!(schema.properties()[0].0, "early");
        assert_eq!(schema.required(), ["early".to_string()]);
    }

    #[test]
    fn test_configured_labels_and_indent() {
        let compiler = ContractCompiler::from_config_json(
            r#"{ "indentUnit": 4, "labels": { "po_no": "Purchase Order" } }"#,
        )
        .unwrap();

        let fields = compiler.infer_fields(&json!({ "po_no": "PO-1", "lines": [ { "sku": "A" } ] }));
        assert_eq!(fields[0].field_name.as_deref(), Some("Purchase Order"));
        assert_eq!(fields[2].field_name.as_deref(), Some("Sku"));

        let graph = FieldGraph::from_fields(fields);
        let info = compiler.display_info(&graph.fields()[2], &graph);
        assert_eq!(info.level, 1);
        assert_eq!(info.indent, 4);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CompilerConfig {
            indent_unit: 0,
            ..CompilerConfig::default()
        };
        assert!(ContractCompiler::new(config).is_err());
    }
}

use field_schema_compiler::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;

fn parse_csv(data: &str) -> anyhow::Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(data.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn field(id: &str, key: &str, data_type: DataType, required: bool, order: i64) -> FieldDescriptor {
    FieldDescriptor {
        id: id.to_string(),
        is_required: required,
        sort_order: order,
        ..FieldDescriptor::new(key, data_type)
    }
}

fn item_field(id: &str, key: &str, data_type: DataType, parent: &str, order: i64) -> FieldDescriptor {
    let local = key.rsplit('.').next().unwrap_or(key).to_string();
    FieldDescriptor {
        data_name: Some(local),
        parent_field_id: Some(parent.to_string()),
        ..field(id, key, data_type, true, order)
    }
}

fn invoice_graph() -> FieldGraph {
    FieldGraph::from_fields(vec![
        field("1", "invoice_no", DataType::String, true, 0),
        field("2", "issued", DataType::Date, true, 1),
        field("3", "paid", DataType::Boolean, false, 2),
        field("4", "total", DataType::Number, false, 3),
        field("5", "items", DataType::Array, true, 4),
        item_field("6", "items.name", DataType::String, "5", 5),
        item_field("7", "items.qty", DataType::Number, "5", 6),
    ])
}

fn keys_and_types<'a>(fields: impl IntoIterator<Item = &'a FieldDescriptor>) -> BTreeSet<(String, String)> {
    fields
        .into_iter()
        .map(|f| (f.field_key.clone(), f.data_type.to_string()))
        .collect()
}

#[test]
fn test_forward_then_reverse_round_trip() {
    let graph = invoice_graph();

    let instance = instantiate_example(&build_example_tree(&graph));
    let inferred = infer_field_graph(&instance);

    assert_eq!(keys_and_types(&inferred), keys_and_types(&graph));
}

#[test]
fn test_concrete_invoice_contract() -> anyhow::Result<()> {
    let graph = FieldGraph::from_fields(vec![
        field("a", "invoice_no", DataType::String, true, 0),
        field("b", "amount", DataType::Number, false, 1),
    ]);

    assert_eq!(
        Value::Object(build_example_tree(&graph)),
        json!({ "invoice_no": "string", "amount": "number | null" })
    );
    assert_eq!(
        build_schema_document(&graph).to_value()?,
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "invoice_no": { "type": "string", "description": "invoice_no" },
                "amount": { "type": "number", "description": "amount" }
            },
            "required": ["invoice_no"]
        })
    );
    Ok(())
}

#[test]
fn test_digest_determinism_and_staleness() -> anyhow::Result<()> {
    let graph = invoice_graph();
    let schema = build_schema_document(&graph).to_json_pretty()?;

    let digest = compute_digest(&graph, Some(schema.as_str()))?;
    assert_eq!(digest, compute_digest(&graph, Some(schema.as_str()))?);
    assert_eq!(digest, compute_digest(&graph.sorted(), Some(schema.as_str()))?);

    let shuffled = FieldGraph::from_fields(graph.fields().iter().rev().cloned().collect());
    assert_eq!(digest, compute_digest(&shuffled, Some(schema.as_str()))?);
    assert!(!is_stale(Some(digest.as_str()), &graph, Some(schema.as_str())));

    let mut changed_type = graph.clone();
    changed_type.fields_mut()[3].data_type = DataType::Integer;
    assert!(is_stale(Some(digest.as_str()), &changed_type, Some(schema.as_str())));

    let mut changed_required = graph.clone();
    changed_required.fields_mut()[2].is_required = true;
    assert!(is_stale(Some(digest.as_str()), &changed_required, Some(schema.as_str())));

    let mut changed_key = graph.clone();
    changed_key.fields_mut()[0].field_key = "invoice_number".to_string();
    assert!(is_stale(Some(digest.as_str()), &changed_key, Some(schema.as_str())));

    let edited_schema = schema.replace("\"items\"", "\"lines\"");
    assert!(is_stale(Some(digest.as_str()), &graph, Some(edited_schema.as_str())));
    Ok(())
}

#[test]
fn test_array_items_expand_one_level() {
    let fields = infer_field_graph(&json!({ "items": [ { "name": "x", "tags": ["a", "b"] } ] }));

    let keys: Vec<(&str, &str)> = fields
        .iter()
        .map(|f| (f.field_key.as_str(), f.data_type.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![("items", "array"), ("items.name", "string"), ("items.tags", "array")]
    );
}

#[test]
fn test_import_links_parent_by_key() -> anyhow::Result<()> {
    let mut graph = FieldGraph::new();
    let summary = Reconciler::default().reconcile(
        &mut graph,
        vec![
            FieldRecord::new("parent"),
            FieldRecord::new("child").with_parent("parent"),
        ],
    )?;

    assert_eq!(summary.added, 2);
    assert_eq!(graph.len(), 2);
    assert_eq!(
        graph.fields()[1].parent_field_id.as_deref(),
        Some(graph.fields()[0].id.as_str())
    );
    Ok(())
}

#[test]
fn test_spreadsheet_import_to_contract() -> anyhow::Result<()> {
    let csv_data = "\
字段标识,字段名称,数据名,数据类型,是否必填,父字段
invoice_no,发票号码,,string,是,
lines,明细,,array,否,
lines.sku,SKU,sku,string,是,lines
lines.amount,金额,amount,number,,lines
,,,,,
";
    let rows = parse_csv(csv_data)?;

    let compiler = ContractCompiler::default();
    let mut graph = FieldGraph::new();
    let summary = compiler.import_rows(&mut graph, &rows)?;
    assert_eq!(summary.added, 4);

    let schema = compiler.schema_document(&graph).to_value()?;
    assert_eq!(schema["required"], json!(["invoice_no"]));
    assert_eq!(
        schema["properties"]["lines"],
        json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "sku": { "type": "string", "description": "SKU" },
                    "amount": { "type": "number", "description": "金额" }
                },
                "required": ["sku"]
            }
        })
    );

    let levels: Vec<usize> = compiler.display_all(&graph).iter().map(|d| d.level).collect();
    assert_eq!(levels, vec![0, 0, 1, 1]);
    Ok(())
}

#[test]
fn test_sample_json_import_and_prompt_drift() -> anyhow::Result<()> {
    let compiler = ContractCompiler::default();
    let mut graph = FieldGraph::from_fields(vec![field("x", "remark", DataType::String, false, 0)]);

    let sample = r#"{
        "invoice_no": "INV-001",
        "invoice_date": "2024-05-01",
        "buyer_info": { "name": "ACME", "tax_id": "91310000" },
        "items": [ { "sku": "A-1", "qty": 2 }, { "sku": "B-2", "qty": 1 } ],
    }"#;
    let summary = compiler.import_json(&mut graph, sample)?;
    assert_eq!(summary.added, 8);
    assert!(summary.unresolved_parents.is_empty());

    let buyer = graph
        .iter()
        .find(|f| f.field_key == "buyer_info")
        .map(|f| f.id.clone())
        .ok_or_else(|| anyhow::anyhow!("buyer_info missing"))?;
    let tax_id = graph
        .iter()
        .find(|f| f.field_key == "buyer_info.tax_id")
        .ok_or_else(|| anyhow::anyhow!("tax_id missing"))?;
    assert_eq!(tax_id.parent_field_id.as_deref(), Some(buyer.as_str()));
    assert_eq!(tax_id.field_name.as_deref(), Some("Tax ID"));
    assert_eq!(tax_id.sort_order, 5);

    let date = graph
        .iter()
        .find(|f| f.field_key == "invoice_date")
        .ok_or_else(|| anyhow::anyhow!("invoice_date missing"))?;
    assert_eq!(date.data_type, DataType::Date);

    let (_, schema) = compiler.regenerate(&graph);
    let schema_text = schema.to_json_pretty()?;
    let generator = |fields: &FieldGraph, _schema: Option<&str>| -> Result<String> {
        Ok(format!("Extract {} fields from the invoice.", fields.len()))
    };
    let artifact = generate_artifact(&generator, &graph, Some(schema_text.as_str()))?;

    let mut monitor = DriftMonitor::from_record(&artifact.drift);
    assert!(!monitor.observe(&graph, Some(schema_text.as_str())));

    let remark = graph
        .get_mut("x")
        .ok_or_else(|| anyhow::anyhow!("remark missing"))?;
    remark.is_required = true;
    assert!(monitor.observe(&graph, Some(schema_text.as_str())));
    Ok(())
}

#[test]
fn test_malformed_import_surfaces_parser_error() {
    let compiler = ContractCompiler::default();
    let mut graph = FieldGraph::new();

    let err = compiler
        .import_json(&mut graph, "[{\"fieldKey\": \"a\"")
        .unwrap_err();
    assert!(matches!(err, FieldSchemaError::MalformedJson { .. }));
    assert!(graph.is_empty());
}

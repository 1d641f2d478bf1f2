use crate::schema::{FieldDescriptor, FieldGraph};
use log::error;
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_INDENT_UNIT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub level: usize,
    pub indent: u32,
    pub is_nested: bool,
}

/// Counts parent hops up to a root. A dangling parent id ends the walk.
/// The walk is capped at the graph size; hitting the cap means the parent
/// chain is cyclic and is logged rather than reported.
pub fn parent_depth(field: &FieldDescriptor, graph: &FieldGraph) -> usize {
    walk_depth(field, graph.len(), |id| graph.get(id))
}

fn walk_depth<'a, F>(field: &'a FieldDescriptor, cap: usize, lookup: F) -> usize
where
    F: Fn(&str) -> Option<&'a FieldDescriptor>,
{
    let mut level = 0;
    let mut current = field.parent_field_id.as_deref();

    while let Some(parent_id) = current {
        if level >= cap {
            error!(
                "Parent chain of field '{}' exceeds {} hops; the graph contains a cycle",
                field.field_key, cap
            );
            break;
        }
        match lookup(parent_id) {
            Some(parent) => {
                level += 1;
                current = parent.parent_field_id.as_deref();
            }
            None => break,
        }
    }
    level
}

fn derive_info(field: &FieldDescriptor, walked: usize, indent_unit: u32) -> DisplayInfo {
    let dotted = field.field_key.contains('.');
    let level = if walked == 0 && dotted {
        field.field_key.split('.').count() - 1
    } else {
        walked
    };

    DisplayInfo {
        level,
        indent: level as u32 * indent_unit,
        is_nested: dotted || level > 0,
    }
}

pub fn display_info(field: &FieldDescriptor, graph: &FieldGraph, indent_unit: u32) -> DisplayInfo {
    derive_info(field, parent_depth(field, graph), indent_unit)
}

/// Display info for every field, in graph order, sharing one id index.
pub fn display_all(graph: &FieldGraph, indent_unit: u32) -> Vec<DisplayInfo> {
    let by_id: HashMap<&str, &FieldDescriptor> =
        graph.iter().map(|f| (f.id.as_str(), f)).collect();

    graph
        .iter()
        .map(|field| {
            let walked = walk_depth(field, graph.len(), |id| by_id.get(id).copied());
            derive_info(field, walked, indent_unit)
        })
        .collect()
}

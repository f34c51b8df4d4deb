//! Structural contract for the published documents.
//!
//! Both validators walk the assembled JSON rather than the typed documents so
//! they check exactly what will be written. Every problem is collected; an
//! empty list means the document conforms.

use lifegraph_schemas::{NodeType, Visibility};
use serde_json::{Map, Value};
use std::collections::HashSet;

const GRAPH_KEYS: [&str; 3] = ["nodes", "edges", "epochs"];
const LAYOUT_KEYS: [&str; 3] = ["positions", "helixParams", "bounds"];
const ENTITY_KEYS: [&str; 5] = ["people", "places", "tags", "clients", "projects"];
const NODE_STRING_KEYS: [&str; 6] = ["id", "title", "date", "epoch", "description", "source"];
const HELIX_KEYS: [&str; 5] = ["radius", "pitch", "epochGap", "jitterRadius", "seed"];

pub fn validate_graph(doc: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(root) = doc.as_object() else {
        return vec!["graph: document is not an object".to_string()];
    };
    check_keys(root, &GRAPH_KEYS, "graph", &mut errors);

    let mut ids = HashSet::new();
    for (i, node) in array(root, "nodes", "graph", &mut errors).iter().enumerate() {
        let path = format!("nodes[{}]", i);
        if let Some(id) = validate_node(node, &path, &mut errors) {
            if !ids.insert(id.to_string()) {
                errors.push(format!("{}: duplicate id {}", path, id));
            }
        }
    }

    for (i, edge) in array(root, "edges", "graph", &mut errors).iter().enumerate() {
        validate_edge(edge, &format!("edges[{}]", i), &ids, &mut errors);
    }

    for (i, epoch) in array(root, "epochs", "graph", &mut errors).iter().enumerate() {
        let path = format!("epochs[{}]", i);
        let Some(obj) = object(epoch, &path, &mut errors) else {
            continue;
        };
        for key in ["label", "start", "end"] {
            string(obj, key, &path, &mut errors);
        }
        if !obj.get("count").is_some_and(Value::is_u64) {
            errors.push(format!("{}.count: expected a non-negative integer", path));
        }
    }

    errors
}

fn validate_node<'a>(node: &'a Value, path: &str, errors: &mut Vec<String>) -> Option<&'a str> {
    let obj = object(node, path, errors)?;

    for key in NODE_STRING_KEYS {
        string(obj, key, path, errors);
    }
    string(obj, "sourceId", path, errors);

    match obj.get("type").and_then(Value::as_str) {
        Some(kind) if NodeType::parse(kind).is_some() => {}
        Some(kind) => errors.push(format!("{}.type: unknown type {:?}", path, kind)),
        None => errors.push(format!("{}.type: missing", path)),
    }
    match obj.get("visibility").and_then(Value::as_str) {
        Some(tier) if Visibility::parse(tier).is_some() => {}
        Some(tier) => errors.push(format!("{}.visibility: unknown tier {:?}", path, tier)),
        None => errors.push(format!("{}.visibility: missing", path)),
    }

    string_list(obj, "media", path, errors);
    string_list(obj, "connections", path, errors);
    number(obj, "size", path, errors);
    for key in ["isHub", "isMinor"] {
        if !obj.get(key).is_some_and(Value::is_boolean) {
            errors.push(format!("{}.{}: expected a boolean", path, key));
        }
    }

    let entities_path = format!("{}.entities", path);
    match obj.get("entities") {
        Some(Value::Object(entities)) => {
            check_keys(entities, &ENTITY_KEYS, &entities_path, errors);
            for key in ENTITY_KEYS {
                string_list(entities, key, &entities_path, errors);
            }
        }
        _ => errors.push(format!("{}: expected an object", entities_path)),
    }

    let location_path = format!("{}.location", path);
    match obj.get("location") {
        Some(Value::Null) => {}
        Some(Value::Object(location)) => {
            check_keys(location, &["lat", "lng"], &location_path, errors);
            number(location, "lat", &location_path, errors);
            number(location, "lng", &location_path, errors);
        }
        Some(_) => errors.push(format!("{}: expected null or {{lat, lng}}", location_path)),
        None => errors.push(format!("{}: missing", location_path)),
    }

    obj.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
}

fn validate_edge(edge: &Value, path: &str, ids: &HashSet<String>, errors: &mut Vec<String>) {
    let Some(obj) = object(edge, path, errors) else {
        return;
    };

    let source = string(obj, "source", path, errors);
    let target = string(obj, "target", path, errors);
    for (key, endpoint) in [("source", source), ("target", target)] {
        if let Some(id) = endpoint {
            if !ids.contains(id) {
                errors.push(format!("{}.{}: unknown node {}", path, key, id));
            }
        }
    }
    if let (Some(source), Some(target)) = (source, target) {
        if source >= target {
            errors.push(format!("{}: source must sort before target", path));
        }
    }

    number(obj, "weight", path, errors);

    let evidence = array(obj, "evidence", path, errors);
    if evidence.is_empty() {
        errors.push(format!("{}.evidence: must not be empty", path));
    }
    for (i, item) in evidence.iter().enumerate() {
        let item_path = format!("{}.evidence[{}]", path, i);
        let Some(item) = object(item, &item_path, errors) else {
            continue;
        };
        for key in ["type", "signal", "description"] {
            string(item, key, &item_path, errors);
        }
        number(item, "weight", &item_path, errors);
    }
}

pub fn validate_layout(doc: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(root) = doc.as_object() else {
        return vec!["layout: document is not an object".to_string()];
    };
    check_keys(root, &LAYOUT_KEYS, "layout", &mut errors);

    match root.get("positions") {
        Some(Value::Object(positions)) => {
            for (id, position) in positions {
                let path = format!("positions.{}", id);
                if let Some(obj) = object(position, &path, &mut errors) {
                    for key in ["x", "y", "z"] {
                        number(obj, key, &path, &mut errors);
                    }
                }
            }
        }
        _ => errors.push("layout.positions: expected an object".to_string()),
    }

    match root.get("helixParams") {
        Some(Value::Object(params)) => {
            for key in HELIX_KEYS {
                number(params, key, "helixParams", &mut errors);
            }
        }
        _ => errors.push("layout.helixParams: expected an object".to_string()),
    }

    match root.get("bounds") {
        Some(Value::Object(bounds)) => {
            number(bounds, "minY", "bounds", &mut errors);
            number(bounds, "maxY", "bounds", &mut errors);
        }
        _ => errors.push("layout.bounds: expected an object".to_string()),
    }

    errors
}

// ============================================================================
// Shape helpers
// ============================================================================

fn check_keys(obj: &Map<String, Value>, expected: &[&str], path: &str, errors: &mut Vec<String>) {
    for key in expected {
        if !obj.contains_key(*key) {
            errors.push(format!("{}: missing key {}", path, key));
        }
    }
}

fn object<'a>(
    value: &'a Value,
    path: &str,
    errors: &mut Vec<String>,
) -> Option<&'a Map<String, Value>> {
    let obj = value.as_object();
    if obj.is_none() {
        errors.push(format!("{}: expected an object", path));
    }
    obj
}

fn array<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<String>,
) -> &'a [Value] {
    match obj.get(key) {
        Some(Value::Array(items)) => items,
        Some(_) => {
            errors.push(format!("{}.{}: expected an array", path, key));
            &[]
        }
        // reported by check_keys
        None => &[],
    }
}

fn string<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<String>,
) -> Option<&'a str> {
    let value = obj.get(key).and_then(Value::as_str);
    if value.is_none() {
        errors.push(format!("{}.{}: expected a string", path, key));
    }
    value
}

fn number(obj: &Map<String, Value>, key: &str, path: &str, errors: &mut Vec<String>) {
    if !obj.get(key).is_some_and(Value::is_number) {
        errors.push(format!("{}.{}: expected a number", path, key));
    }
}

fn string_list(obj: &Map<String, Value>, key: &str, path: &str, errors: &mut Vec<String>) {
    match obj.get(key) {
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => {}
        _ => errors.push(format!("{}.{}: expected a list of strings", path, key)),
    }
}

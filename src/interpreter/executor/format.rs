//! Value display and coercions
//!
//! Console output follows the usual devtools conventions: strings print raw
//! at the top level and quoted inside composites, arrays as `[1, 2]`, objects
//! as `{ a: 1 }`, functions as `[Function: name]`.

use std::collections::HashSet;

use crate::state::{HeapId, HeapPayload, RuntimeStore, Value};

/// Console form of a top-level argument
pub fn display(store: &RuntimeStore, value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => display_nested(store, other, &mut HashSet::new()),
    }
}

fn display_nested(store: &RuntimeStore, value: &Value, seen: &mut HashSet<HeapId>) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Num(n) => format_number(*n),
        Value::Str(s) => format!("{:?}", s),
        Value::Ref(id) => display_object(store, *id, seen),
    }
}

fn display_object(store: &RuntimeStore, id: HeapId, seen: &mut HashSet<HeapId>) -> String {
    let Some(object) = store.heap_object(id) else {
        return "[Object]".to_string();
    };
    if !seen.insert(id) {
        return "[Circular]".to_string();
    }

    let out = match &object.payload {
        HeapPayload::Function(f) => match &f.def.name {
            Some(name) => format!("[Function: {}]", name),
            None => "[Function (anonymous)]".to_string(),
        },
        HeapPayload::Array(items) => {
            if items.is_empty() {
                "[]".to_string()
            } else {
                let parts: Vec<String> = items.iter().map(|v| display_nested(store, v, seen)).collect();
                format!("[{}]", parts.join(", "))
            }
        }
        HeapPayload::Object { class, properties } => {
            let prefix = class.as_ref().map(|c| format!("{} ", c)).unwrap_or_default();
            if properties.is_empty() {
                format!("{}{{}}", prefix)
            } else {
                let parts: Vec<String> = properties
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, display_nested(store, v, seen)))
                    .collect();
                format!("{}{{ {} }}", prefix, parts.join(", "))
            }
        }
    };

    seen.remove(&id);
    out
}

/// Number formatting: integral values without a fraction, JS spellings for
/// the non-finite ones
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/* ===================== Coercions ===================== */

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => false,
        Value::Bool(b) => *b,
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !s.is_empty(),
        Value::Ref(_) => true,
    }
}

pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Num(n) => *n,
        Value::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Ref(_) => f64::NAN,
    }
}

/// String conversion used by `+` and template literals
pub fn to_js_string(store: &RuntimeStore, value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Ref(id) => match store.heap_object(*id).map(|o| &o.payload) {
            Some(HeapPayload::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => to_js_string(store, other),
                })
                .collect::<Vec<_>>()
                .join(","),
            Some(HeapPayload::Object { .. }) | None => "[object Object]".to_string(),
            Some(HeapPayload::Function(f)) => {
                format!("function {}() {{ {} }}", f.def.name.as_deref().unwrap_or(""), f.def.body_source)
            }
        },
        other => display(store, other),
    }
}

pub fn type_of(store: &RuntimeStore, value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Num(_) => "number",
        Value::Str(_) => "string",
        Value::Ref(id) => match store.heap_object(*id).map(|o| &o.payload) {
            Some(HeapPayload::Function(_)) => "function",
            _ => "object",
        },
    }
}

pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => x == y,
        _ => a == b,
    }
}

pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
        (Value::Ref(x), Value::Ref(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => to_number(a) == to_number(b),
    }
}

//! Declarative field extraction
//!
//! A schema is a list of named CSS selectors plus an optional repeated
//! container. Top-level fields are evaluated against the whole document; the
//! container's fields are evaluated once per matched container element and
//! produce one record each.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::url::resolve_link;

/// Attributes whose values are URLs and are resolved against the page
const URL_ATTRIBUTES: &[&str] = &["href", "src", "data-src", "action", "poster"];

/// Caller-supplied extraction schema, immutable for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    #[serde(default)]
    pub fields: Vec<SchemaField>,

    #[serde(default)]
    pub container: Option<ContainerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub selector: String,

    /// Attribute to read instead of the element's text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Collect every match into an array instead of taking the first
    #[serde(default)]
    pub multiple: bool,

    #[serde(default)]
    pub required: bool,
}

/// Repeated-container pattern: one record per element matching `selector`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub selector: String,

    /// Key under which the records are stored
    #[serde(default = "default_container_name")]
    pub name: String,

    pub fields: Vec<SchemaField>,
}

fn default_container_name() -> String {
    "items".to_string()
}

impl ExtractionSchema {
    /// Parses a schema produced by an external schema builder
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Result of applying a schema to one page
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaResult {
    pub data: Value,

    /// Paths of required fields that produced no value, e.g. `items[2].price`
    pub missing_required: Vec<String>,
}

/// Applies a schema to a parsed document
///
/// Never fails: unmatched fields become `null` (or `[]` when `multiple`) and
/// required ones are listed in `missing_required`.
pub fn apply_schema(document: &Html, base_url: &Url, schema: &ExtractionSchema) -> SchemaResult {
    let mut missing_required = Vec::new();
    let root = document.root_element();

    let mut data = evaluate_fields(root, base_url, &schema.fields, "", &mut missing_required);

    if let Some(container) = &schema.container {
        let records = match Selector::parse(&container.selector) {
            Ok(selector) => root
                .select(&selector)
                .enumerate()
                .map(|(index, element)| {
                    let prefix = format!("{}[{}].", container.name, index);
                    Value::Object(evaluate_fields(
                        element,
                        base_url,
                        &container.fields,
                        &prefix,
                        &mut missing_required,
                    ))
                })
                .collect(),
            Err(_) => {
                tracing::warn!("Skipping container with invalid selector: {}", container.selector);
                Vec::new()
            }
        };

        data.insert(container.name.clone(), Value::Array(records));
    }

    SchemaResult {
        data: Value::Object(data),
        missing_required,
    }
}

fn evaluate_fields(
    scope: ElementRef<'_>,
    base_url: &Url,
    fields: &[SchemaField],
    prefix: &str,
    missing_required: &mut Vec<String>,
) -> Map<String, Value> {
    let mut record = Map::new();

    for field in fields {
        let value = evaluate_field(scope, base_url, field);

        if field.required && is_empty_value(&value) {
            missing_required.push(format!("{}{}", prefix, field.name));
        }

        record.insert(field.name.clone(), value);
    }

    record
}

fn evaluate_field(scope: ElementRef<'_>, base_url: &Url, field: &SchemaField) -> Value {
    let Ok(selector) = Selector::parse(&field.selector) else {
        tracing::warn!(
            "Skipping field '{}' with invalid selector: {}",
            field.name,
            field.selector
        );
        return if field.multiple {
            Value::Array(Vec::new())
        } else {
            Value::Null
        };
    };

    let mut values = scope
        .select(&selector)
        .filter_map(|element| read_value(element, base_url, field.attribute.as_deref()));

    if field.multiple {
        Value::Array(values.map(Value::String).collect())
    } else {
        values.next().map(Value::String).unwrap_or(Value::Null)
    }
}

fn read_value(element: ElementRef<'_>, base_url: &Url, attribute: Option<&str>) -> Option<String> {
    match attribute {
        Some(name) => {
            let raw = element.value().attr(name)?.trim();
            if raw.is_empty() {
                return None;
            }
            if URL_ATTRIBUTES.contains(&name) {
                Some(
                    resolve_link(base_url, raw)
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| raw.to_string()),
                )
            } else {
                Some(raw.to_string())
            }
        }
        None => {
            let text = element.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            (!text.is_empty()).then_some(text)
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

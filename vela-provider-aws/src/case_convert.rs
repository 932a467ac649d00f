//! Conversion of core attribute values to CloudFormation JSON
//!
//! Core resources use snake_case attribute names (e.g., `cidr_block`,
//! `map_public_ip_on_launch`); CloudFormation uses PascalCase
//! (e.g., `CidrBlock`, `MapPublicIpOnLaunch`).
//!
//! References render as intrinsic functions: the `id` attribute becomes
//! `Ref`, any other attribute becomes `Fn::GetAtt`.

use std::collections::HashMap;

use heck::ToUpperCamelCase;
use serde_json::{Map, Value as Json, json};
use vela_core::resource::Value;

/// Convert snake_case to PascalCase
/// e.g., "enable_dns_hostnames" -> "EnableDnsHostnames"
pub fn to_pascal_case(s: &str) -> String {
    s.to_upper_camel_case()
}

/// Render a reference to `attribute` of `logical_id`
pub fn reference(logical_id: &str, attribute: &str) -> Json {
    if attribute == "id" {
        json!({ "Ref": logical_id })
    } else {
        json!({ "Fn::GetAtt": [logical_id, to_pascal_case(attribute)] })
    }
}

/// Recursively render a value, converting map keys to PascalCase
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Int(n) => Json::from(*n),
        Value::Bool(b) => Json::Bool(*b),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => Json::Object(attributes_to_json(map)),
        Value::ResourceRef(logical_id, attribute) => reference(logical_id, attribute),
        Value::AvailabilityZoneIndex(index) => {
            json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
        }
    }
}

/// Render an attribute map as CloudFormation properties
pub fn attributes_to_json(attributes: &HashMap<String, Value>) -> Map<String, Json> {
    let mut keys: Vec<_> = attributes.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| (to_pascal_case(k), value_to_json(&attributes[k])))
        .collect()
}

//! YAML to JSON conversion for rendered manifests
//!
//! Rendered templates are YAML; the cluster client and field-path lookups
//! work on `serde_json::Value`. Conversion goes through yaml-rust2 so that
//! scalar strings survive exactly as written (slashes, dots, `*`, CIDRs).

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

/// Parse a YAML string into a single JSON value.
///
/// Multi-document input yields the first document; empty input yields
/// `Value::Null`.
pub fn parse_yaml(input: &str) -> Result<Value> {
    let docs = load(input)?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

fn load(input: &str) -> Result<Vec<Yaml>> {
    YamlLoader::load_from_str(input).map_err(|e| Error::serialization(e.to_string()))
}

fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|_| Error::serialization(format!("invalid float {s:?}")))?;
            Ok(Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(items) => items
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| Ok((key_to_string(k)?, yaml_to_json(v)?)))
            .collect::<Result<Map<String, Value>>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(Error::serialization("YAML aliases not supported")),
        Yaml::BadValue => Err(Error::serialization("bad YAML value")),
    }
}

fn key_to_string(key: Yaml) -> Result<String> {
    match key {
        Yaml::String(s) | Yaml::Real(s) => Ok(s),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        _ => Err(Error::serialization("unsupported YAML key type")),
    }
}

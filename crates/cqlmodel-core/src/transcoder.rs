//! Encoding of attribute values to their wire representation and back.
//!
//! Native CQL values pass through untouched. Values of a [`CqlType::Custom`]
//! type go through the object mapper (`serde_json`) and travel as JSON text.

use crate::error::{Error, Result, ValidationErrorKind};
use crate::metadata::PropertyMeta;
use crate::types::CqlType;
use crate::value::Value;

/// Transcoder attached to each property, chosen from its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transcoder {
    Simple,
    Compound,
    List,
    Set,
    Map,
}

impl Transcoder {
    /// Encode an in-memory attribute value.
    pub fn encode(&self, pm: &PropertyMeta, value: Value) -> Result<Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Transcoder::Simple, value) => encode_internal(pm.cql_type(), value),
            (Transcoder::List, Value::List(items)) => {
                Ok(Value::List(encode_all(pm.cql_type().element_type(), items)?))
            }
            (Transcoder::Set, Value::Set(items) | Value::List(items)) => {
                Ok(Value::Set(encode_all(pm.cql_type().element_type(), items)?))
            }
            (Transcoder::Map, Value::Map(entries)) => {
                let key_type = pm.cql_type().key_type();
                let value_type = pm.cql_type().element_type();
                let mut encoded = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    encoded.push((encode_opt(key_type, k)?, encode_opt(value_type, v)?));
                }
                Ok(Value::Map(encoded))
            }
            (Transcoder::Compound, Value::List(components)) => {
                Ok(Value::List(self.encode_components(pm, &components)?))
            }
            (_, other) => Err(Error::Type(crate::error::TypeError {
                expected: self.expected_kind(),
                actual: other.type_name().to_string(),
                column: Some(pm.name().to_string()),
            })),
        }
    }

    /// Decode a wire value back to its in-memory form.
    pub fn decode(&self, pm: &PropertyMeta, value: Value) -> Result<Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (Transcoder::List, Value::List(items)) => {
                Ok(Value::List(decode_all(pm.cql_type().element_type(), items)?))
            }
            (Transcoder::Set, Value::Set(items) | Value::List(items)) => {
                Ok(Value::Set(decode_all(pm.cql_type().element_type(), items)?))
            }
            (Transcoder::Map, Value::Map(entries)) => {
                let key_type = pm.cql_type().key_type();
                let value_type = pm.cql_type().element_type();
                let mut decoded = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    decoded.push((decode_opt(key_type, k)?, decode_opt(value_type, v)?));
                }
                Ok(Value::Map(decoded))
            }
            (_, value) => decode_internal(pm.cql_type(), value),
        }
    }

    /// Encode the components of a primary key.
    ///
    /// Every component must be present; a missing or null component is a
    /// validation error.
    pub fn encode_components(&self, pm: &PropertyMeta, components: &[Value]) -> Result<Vec<Value>> {
        let names = pm.column_names();
        let types: Vec<&CqlType> = match pm.compound_key() {
            Some(key) => key.components().iter().map(|c| c.cql_type()).collect(),
            None => vec![pm.cql_type()],
        };

        tracing::trace!(
            property = pm.name(),
            count = components.len(),
            "Encoding primary key components"
        );

        if components.len() != names.len() {
            return Err(Error::validation(
                pm.name(),
                ValidationErrorKind::MissingKeyComponent,
                format!(
                    "The primary key of entity '{}' expects {} component(s) ({}), got {}",
                    pm.entity_class(),
                    names.len(),
                    names.join(","),
                    components.len()
                ),
            ));
        }

        let mut encoded = Vec::with_capacity(components.len());
        for ((name, ty), value) in names.iter().zip(types).zip(components) {
            if value.is_null() {
                return Err(Error::validation(
                    *name,
                    ValidationErrorKind::MissingKeyComponent,
                    format!(
                        "The primary key component '{}' of entity '{}' should not be null",
                        name,
                        pm.entity_class()
                    ),
                ));
            }
            encoded.push(encode_internal(ty, value.clone())?);
        }
        Ok(encoded)
    }

    fn expected_kind(&self) -> &'static str {
        match self {
            Transcoder::Simple => "scalar",
            Transcoder::Compound => "key components",
            Transcoder::List => "list",
            Transcoder::Set => "set",
            Transcoder::Map => "map",
        }
    }
}

fn encode_internal(cql_type: &CqlType, value: Value) -> Result<Value> {
    match value {
        Value::Json(json) if cql_type.is_custom() => Ok(Value::Text(serde_json::to_string(&json)?)),
        other => Ok(other),
    }
}

fn decode_internal(cql_type: &CqlType, value: Value) -> Result<Value> {
    match value {
        Value::Text(text) if cql_type.is_custom() => Ok(Value::Json(serde_json::from_str(&text)?)),
        other => Ok(other),
    }
}

fn encode_opt(cql_type: Option<&CqlType>, value: Value) -> Result<Value> {
    match cql_type {
        Some(ty) => encode_internal(ty, value),
        None => Ok(value),
    }
}

fn decode_opt(cql_type: Option<&CqlType>, value: Value) -> Result<Value> {
    match cql_type {
        Some(ty) => decode_internal(ty, value),
        None => Ok(value),
    }
}

fn encode_all(cql_type: Option<&CqlType>, items: Vec<Value>) -> Result<Vec<Value>> {
    items.into_iter().map(|v| encode_opt(cql_type, v)).collect()
}

fn decode_all(cql_type: Option<&CqlType>, items: Vec<Value>) -> Result<Vec<Value>> {
    items.into_iter().map(|v| decode_opt(cql_type, v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CompoundKeyDescriptor, KeyComponent, PropertyKind, PropertyMeta};
    use serde_json::json;

    fn property(kind: PropertyKind, cql_type: CqlType) -> PropertyMeta {
        PropertyMeta::builder("prop", kind, cql_type)
            .build("Bean")
            .unwrap()
    }

    #[test]
    fn test_simple_native_passthrough() {
        let pm = property(PropertyKind::Simple, CqlType::Text);
        assert_eq!(
            pm.encode(Value::Text("DuyHai".into())).unwrap(),
            Value::Text("DuyHai".into())
        );
        assert_eq!(pm.encode(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_custom_goes_through_object_mapper() {
        let pm = property(PropertyKind::Simple, CqlType::Custom("Address"));
        let encoded = pm.encode(Value::Json(json!({"street": "rue"}))).unwrap();
        assert_eq!(encoded, Value::Text("{\"street\":\"rue\"}".into()));
        assert_eq!(pm.decode(encoded).unwrap(), Value::Json(json!({"street": "rue"})));
    }

    #[test]
    fn test_collections_encode_elements() {
        let pm = property(
            PropertyKind::List,
            CqlType::List(Box::new(CqlType::Custom("Tag"))),
        );
        let encoded = pm
            .encode(Value::List(vec![Value::Json(json!(1)), Value::Json(json!(2))]))
            .unwrap();
        assert_eq!(
            encoded,
            Value::List(vec![Value::Text("1".into()), Value::Text("2".into())])
        );

        let pm = property(
            PropertyKind::Map,
            CqlType::Map(Box::new(CqlType::Int), Box::new(CqlType::Text)),
        );
        let map = Value::Map(vec![(Value::Int(1), Value::Text("FR".into()))]);
        assert_eq!(pm.encode(map.clone()).unwrap(), map);

        let pm = property(PropertyKind::Set, CqlType::Set(Box::new(CqlType::Text)));
        assert!(pm.encode(Value::Int(3)).is_err());
    }

    #[test]
    fn test_encode_components_requires_every_component() {
        let pm = PropertyMeta::builder("id", PropertyKind::EmbeddedId, CqlType::Custom("TweetKey"))
            .compound_key(CompoundKeyDescriptor::new(vec![
                KeyComponent::partition("user_id", CqlType::BigInt),
                KeyComponent::clustering("date", CqlType::Timestamp),
            ]))
            .build("Tweet")
            .unwrap();

        let encoded = pm
            .transcoder()
            .encode_components(&pm, &[Value::BigInt(1), Value::Timestamp(5)])
            .unwrap();
        assert_eq!(encoded, vec![Value::BigInt(1), Value::Timestamp(5)]);

        let err = pm
            .transcoder()
            .encode_components(&pm, &[Value::BigInt(1)])
            .unwrap_err();
        assert_eq!(
            err.validation_kind(),
            Some(ValidationErrorKind::MissingKeyComponent)
        );

        let err = pm
            .transcoder()
            .encode_components(&pm, &[Value::BigInt(1), Value::Null])
            .unwrap_err();
        assert!(err.to_string().contains("'date'"));
    }
}

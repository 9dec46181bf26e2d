//! CQL type definitions.

/// CQL data types supported by CQLModel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlType {
    Boolean,
    Int,
    BigInt,
    Float,
    Double,
    Decimal,
    Text,
    Blob,
    Uuid,
    TimeUuid,
    Timestamp,

    // Distributed counter column
    Counter,

    // Collections
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),

    // Values serialized as JSON text by the object mapper
    Custom(&'static str),
}

impl CqlType {
    /// Get the CQL type name for this type.
    pub fn cql_name(&self) -> String {
        match self {
            CqlType::Boolean => "boolean".to_string(),
            CqlType::Int => "int".to_string(),
            CqlType::BigInt => "bigint".to_string(),
            CqlType::Float => "float".to_string(),
            CqlType::Double => "double".to_string(),
            CqlType::Decimal => "decimal".to_string(),
            CqlType::Text | CqlType::Custom(_) => "text".to_string(),
            CqlType::Blob => "blob".to_string(),
            CqlType::Uuid => "uuid".to_string(),
            CqlType::TimeUuid => "timeuuid".to_string(),
            CqlType::Timestamp => "timestamp".to_string(),
            CqlType::Counter => "counter".to_string(),
            CqlType::List(inner) => format!("list<{}>", inner.cql_name()),
            CqlType::Set(inner) => format!("set<{}>", inner.cql_name()),
            CqlType::Map(k, v) => format!("map<{},{}>", k.cql_name(), v.cql_name()),
        }
    }

    /// Whether values of this type go through the object mapper.
    pub const fn is_custom(&self) -> bool {
        matches!(self, CqlType::Custom(_))
    }

    /// Whether this is a collection type.
    pub const fn is_collection(&self) -> bool {
        matches!(self, CqlType::List(_) | CqlType::Set(_) | CqlType::Map(_, _))
    }

    /// The element type of a list or set, or the value type of a map.
    pub fn element_type(&self) -> Option<&CqlType> {
        match self {
            CqlType::List(inner) | CqlType::Set(inner) | CqlType::Map(_, inner) => Some(inner),
            _ => None,
        }
    }

    /// The key type of a map.
    pub fn key_type(&self) -> Option<&CqlType> {
        match self {
            CqlType::Map(k, _) => Some(k),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cql_names() {
        assert_eq!(CqlType::BigInt.cql_name(), "bigint");
        assert_eq!(CqlType::Custom("Address").cql_name(), "text");
        assert_eq!(
            CqlType::Map(Box::new(CqlType::Int), Box::new(CqlType::Text)).cql_name(),
            "map<int,text>"
        );
        assert_eq!(CqlType::List(Box::new(CqlType::Uuid)).cql_name(), "list<uuid>");
    }

    #[test]
    fn test_collection_accessors() {
        let map = CqlType::Map(Box::new(CqlType::Int), Box::new(CqlType::Custom("Tag")));
        assert!(map.is_collection());
        assert_eq!(map.key_type(), Some(&CqlType::Int));
        assert!(map.element_type().is_some_and(CqlType::is_custom));
        assert!(!CqlType::Counter.is_collection());
        assert_eq!(CqlType::Text.element_type(), None);
    }
}

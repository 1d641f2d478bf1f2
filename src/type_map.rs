use crate::schema::DataType;

/// Example-tree rendering of an enumeration field.
pub const ENUM_EXAMPLE: &str = "pass | fail | unknown";

/// Suffix appended to example types of optional fields.
pub const NULLABLE_SUFFIX: &str = " | null";

/// Type string shown in the example tree. Enumerations show their value set;
/// unknown types fall back to `string`.
pub fn to_example_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Enum => ENUM_EXAMPLE,
        other => known_name(other),
    }
}

/// Primitive kind emitted in the schema document. Enumerations only carry
/// their base type here.
pub fn to_schema_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Enum => "string",
        other => known_name(other),
    }
}

/// Example type with the nullable suffix applied for optional fields.
pub fn example_type_for(data_type: &DataType, is_required: bool) -> String {
    let base = to_example_type(data_type);
    if is_required {
        base.to_string()
    } else {
        format!("{}{}", base, NULLABLE_SUFFIX)
    }
}

fn known_name(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::String => "string",
        DataType::Integer => "integer",
        DataType::Number => "number",
        DataType::Boolean => "boolean",
        DataType::Date => "date",
        DataType::Datetime => "datetime",
        DataType::Enum => "enum",
        DataType::Object => "object",
        DataType::Array => "array",
        DataType::Other(_) => "string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_mapping_differs_per_target() {
        assert_eq!(to_example_type(&DataType::Enum), "pass | fail | unknown");
        assert_eq!(to_schema_type(&DataType::Enum), "string");
    }

    #[test]
    fn test_known_types_map_to_themselves() {
        for data_type in [
            DataType::String,
            DataType::Integer,
            DataType::Number,
            DataType::Boolean,
            DataType::Date,
            DataType::Datetime,
            DataType::Object,
            DataType::Array,
        ] {
            assert_eq!(to_example_type(&data_type), data_type.as_str());
            assert_eq!(to_schema_type(&data_type), data_type.as_str());
        }
    }

    #[test]
    fn test_unknown_types_default_to_string() {
        let unknown = DataType::parse("currency");
        assert_eq!(to_example_type(&unknown), "string");
        assert_eq!(to_schema_type(&unknown), "string");
    }

    #[test]
    fn test_nullable_suffix() {
        assert_eq!(example_type_for(&DataType::Number, false), "number | null");
        assert_eq!(example_type_for(&DataType::Number, true), "number");
        assert_eq!(
            example_type_for(&DataType::Enum, false),
            "pass | fail | unknown | null"
        );
    }
}

//! Strict validation of model output against explicit field schemas.
//!
//! The model is asked for an exact JSON shape; whatever comes back is checked field by
//! field before it is deserialized. Nothing is coerced: `90.0` is not an integer and
//! `"90"` is not a number.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{NimbyError, Result};
use crate::schema::{AnalysisResult, EvaluationVerdict};

/// Validated fields of a response, restricted to the ones the schema declares.
pub type StructuredValue = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    StringList,
}

impl FieldType {
    fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::StringList => "array of strings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    /// Inclusive bounds, only meaningful for integers.
    pub range: Option<(i64, i64)>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
            range: None,
        }
    }

    pub const fn with_range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }
}

/// Target shape for one structured model call.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
    /// JSON Schema handed to the provider alongside the prompt.
    pub json_schema: Value,
}

impl ResponseSchema {
    pub fn for_type<T: StructuredOutput>() -> Self {
        let json_schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
        Self {
            name: T::NAME,
            fields: T::fields(),
            json_schema,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A type the model can be asked to produce.
pub trait StructuredOutput: DeserializeOwned + JsonSchema {
    const NAME: &'static str;

    fn fields() -> Vec<FieldSpec>;

    fn response_schema() -> ResponseSchema
    where
        Self: Sized,
    {
        ResponseSchema::for_type::<Self>()
    }
}

impl StructuredOutput for AnalysisResult {
    const NAME: &'static str = "AnalysisResult";

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::required("header", FieldType::String),
            FieldSpec::required("nimby_score", FieldType::Integer),
            FieldSpec::required("certainty", FieldType::Integer).with_range(0, 100),
            FieldSpec::required("certainty_meta", FieldType::String),
            FieldSpec::required("interesting_information", FieldType::StringList),
        ]
    }
}

impl StructuredOutput for EvaluationVerdict {
    const NAME: &'static str = "EvaluationVerdict";

    fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::required("accuracy", FieldType::String),
            FieldSpec::required("reasoning", FieldType::String),
        ]
    }
}

/// Parses `raw` and checks it against `schema`. Extra fields are dropped.
pub fn validate(raw: &str, schema: &ResponseSchema) -> Result<StructuredValue> {
    let parsed: Value = serde_json::from_str(raw.trim())
        .map_err(|e| NimbyError::schema("$", "JSON object", format!("invalid JSON ({})", e)))?;

    let Value::Object(mut object) = parsed else {
        return Err(NimbyError::schema("$", "JSON object", describe(&parsed)));
    };

    let mut validated = Map::new();
    for spec in &schema.fields {
        match object.remove(spec.name) {
            None | Some(Value::Null) if !spec.required => continue,
            None => return Err(NimbyError::schema(spec.name, spec.field_type.describe(), "missing")),
            Some(value) => {
                check_field(spec, &value)?;
                validated.insert(spec.name.to_string(), value);
            }
        }
    }

    Ok(validated)
}

/// Validates `raw` against `T`'s schema and deserializes it.
pub fn validate_as<T: StructuredOutput>(raw: &str) -> Result<T> {
    let schema = T::response_schema();
    let fields = validate(raw, &schema)?;
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| NimbyError::schema("$", schema.name, e.to_string()))
}

fn check_field(spec: &FieldSpec, value: &Value) -> Result<()> {
    let type_ok = match spec.field_type {
        FieldType::String => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::StringList => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
    };
    if !type_ok {
        return Err(NimbyError::schema(
            spec.name,
            spec.field_type.describe(),
            describe(value),
        ));
    }

    if let Some((min, max)) = spec.range {
        let in_range = value.as_i64().is_some_and(|n| (min..=max).contains(&n));
        if !in_range {
            return Err(NimbyError::schema(
                spec.name,
                format!("integer in {}..={}", min, max),
                value.to_string(),
            ));
        }
    }

    Ok(())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(n) if n.is_f64() => format!("float {}", n),
        Value::Number(n) => format!("integer {}", n),
        Value::String(_) => "string".to_string(),
        Value::Array(items) if items.iter().all(Value::is_string) => "array of strings".to_string(),
        Value::Array(_) => "array with non-string items".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> AnalysisResult {
        AnalysisResult {
            header: "Wind farm sunk by a parish petition".to_string(),
            nimby_score: 7,
            certainty: 65,
            certainty_meta: "Refusal reasons are not in the dataset".to_string(),
            interesting_information: vec![
                "Visual impact cited".to_string(),
                "Two appeals lodged".to_string(),
            ],
        }
    }

    fn schema_error_field(err: NimbyError) -> String {
        match err {
            NimbyError::Schema { field, .. } => field,
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_round_trip_analysis() {
        let original = sample_analysis();
        let raw = serde_json::to_string(&original).unwrap();
        let parsed: AnalysisResult = validate_as(&raw).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_round_trip_verdict() {
        let original = EvaluationVerdict {
            accuracy: "medium".to_string(),
            reasoning: "Plausible but unsourced.".to_string(),
        };
        let raw = serde_json::to_string_pretty(&original).unwrap();
        let parsed: EvaluationVerdict = validate_as(&raw).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let raw = r#"{"accuracy": "high", "reasoning": "ok", "confidence": 3}"#;
        let fields = validate(raw, &EvaluationVerdict::response_schema()).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(!fields.contains_key("confidence"));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = r#"{"header": "h", "nimby_score": 1, "certainty": 50, "interesting_information": []}"#;
        let err = validate_as::<AnalysisResult>(raw).unwrap_err();
        match err {
            NimbyError::Schema { field, got, .. } => {
                assert_eq!(field, "certainty_meta");
                assert_eq!(got, "missing");
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_float_is_not_an_integer() {
        let raw = r#"{"header": "h", "nimby_score": 1.0, "certainty": 50, "certainty_meta": "m", "interesting_information": []}"#;
        let err = validate_as::<AnalysisResult>(raw).unwrap_err();
        assert_eq!(schema_error_field(err), "nimby_score");
    }

    #[test]
    fn test_numeric_string_is_not_an_integer() {
        let raw = r#"{"header": "h", "nimby_score": 1, "certainty": "50", "certainty_meta": "m", "interesting_information": []}"#;
        let err = validate_as::<AnalysisResult>(raw).unwrap_err();
        assert_eq!(schema_error_field(err), "certainty");
    }

    #[test]
    fn test_certainty_out_of_range() {
        let raw = r#"{"header": "h", "nimby_score": 1, "certainty": 101, "certainty_meta": "m", "interesting_information": []}"#;
        let err = validate_as::<AnalysisResult>(raw).unwrap_err();
        match err {
            NimbyError::Schema { field, expected, got } => {
                assert_eq!(field, "certainty");
                assert_eq!(expected, "integer in 0..=100");
                assert_eq!(got, "101");
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_list_with_non_strings_is_rejected() {
        let raw = r#"{"header": "h", "nimby_score": 1, "certainty": 5, "certainty_meta": "m", "interesting_information": ["a", 2]}"#;
        let err = validate_as::<AnalysisResult>(raw).unwrap_err();
        assert_eq!(schema_error_field(err), "interesting_information");
    }

    #[test]
    fn test_non_object_and_invalid_json() {
        let schema = EvaluationVerdict::response_schema();
        assert_eq!(schema_error_field(validate("[1, 2]", &schema).unwrap_err()), "$");
        assert_eq!(
            schema_error_field(validate("accuracy: high", &schema).unwrap_err()),
            "$"
        );
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let raw = "\n  {\"accuracy\": \"low\", \"reasoning\": \"no evidence\"}  \n";
        let verdict: EvaluationVerdict = validate_as(raw).unwrap();
        assert_eq!(verdict.accuracy, "low");
    }

    #[test]
    fn test_response_schema_carries_json_schema() {
        let schema = AnalysisResult::response_schema();
        assert_eq!(schema.name, "AnalysisResult");
        assert_eq!(schema.field("certainty").unwrap().range, Some((0, 100)));
        let properties = schema.json_schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("certainty_meta"));
    }
}

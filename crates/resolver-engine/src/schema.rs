//! Structural validation of extracted model output.
//!
//! A [`Shape`] describes the expected JSON. [`validate`] walks a value against
//! it and reports every violation with its field path; [`validate_as`] then
//! deserializes into the typed value. Extra fields are ignored. Nothing is
//! coerced: `"severity": 3` is rejected rather than stringified.

use resolver_core::{
    CodeChange, ImprovementKind, ResolverError, ReviewFeedback, SecuritySeverity, Severity,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Expected shape of a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// A string; `non_empty` also rejects `""` and whitespace-only strings.
    String { non_empty: bool },
    /// A non-negative integer.
    Integer,
    /// A string from a closed set.
    Enum(&'static [&'static str]),
    Array(Box<Shape>),
    Object(Vec<Field>),
}

/// A named member of a [`Shape::Object`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub shape: Shape,
    /// Optional fields may be absent or `null`.
    pub required: bool,
}

impl Field {
    pub fn required(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: true,
        }
    }

    pub fn optional(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            shape,
            required: false,
        }
    }
}

impl Shape {
    pub fn string() -> Self {
        Shape::String { non_empty: false }
    }

    pub fn non_empty_string() -> Self {
        Shape::String { non_empty: true }
    }

    pub fn array_of(item: Shape) -> Self {
        Shape::Array(Box::new(item))
    }

    /// Render as a JSON Schema fragment, for embedding in prompts.
    ///
    /// # Examples
    ///
    /// ```
    /// use resolver_engine::schema::{Field, Shape};
    ///
    /// let shape = Shape::Object(vec![Field::required("path", Shape::non_empty_string())]);
    /// let schema = shape.to_json_schema();
    /// assert_eq!(schema["type"], "object");
    /// assert_eq!(schema["required"][0], "path");
    /// ```
    pub fn to_json_schema(&self) -> Value {
        match self {
            Shape::String { non_empty: true } => {
                serde_json::json!({ "type": "string", "minLength": 1 })
            }
            Shape::String { non_empty: false } => serde_json::json!({ "type": "string" }),
            Shape::Integer => serde_json::json!({ "type": "integer", "minimum": 0 }),
            Shape::Enum(values) => serde_json::json!({ "type": "string", "enum": values }),
            Shape::Array(item) => {
                serde_json::json!({ "type": "array", "items": item.to_json_schema() })
            }
            Shape::Object(fields) => {
                let properties: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.name.to_string(), f.shape.to_json_schema()))
                    .collect();
                let required: Vec<&str> = fields
                    .iter()
                    .filter(|f| f.required)
                    .map(|f| f.name)
                    .collect();
                serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
        }
    }
}

/// A type with a fixed JSON shape that model output must match.
pub trait Schema: DeserializeOwned {
    fn shape() -> Shape;
}

/// `[{ path, content, message }, ...]`
impl Schema for Vec<CodeChange> {
    fn shape() -> Shape {
        Shape::array_of(Shape::Object(vec![
            Field::required("path", Shape::non_empty_string()),
            Field::required("content", Shape::string()),
            Field::required("message", Shape::non_empty_string()),
        ]))
    }
}

impl Schema for ReviewFeedback {
    fn shape() -> Shape {
        Shape::Object(vec![
            Field::required(
                "qualityIssues",
                Shape::array_of(Shape::Object(vec![
                    Field::required("file", Shape::string()),
                    Field::optional("line", Shape::Integer),
                    Field::required("description", Shape::string()),
                    Field::required("severity", Shape::Enum(Severity::VALUES)),
                ])),
            ),
            Field::required(
                "securityIssues",
                Shape::array_of(Shape::Object(vec![
                    Field::required("file", Shape::string()),
                    Field::required("description", Shape::string()),
                    Field::required("severity", Shape::Enum(SecuritySeverity::VALUES)),
                ])),
            ),
            Field::required(
                "improvements",
                Shape::array_of(Shape::Object(vec![
                    Field::required("file", Shape::string()),
                    Field::required("description", Shape::string()),
                    Field::required("type", Shape::Enum(ImprovementKind::VALUES)),
                ])),
            ),
            Field::required(
                "testingSuggestions",
                Shape::array_of(Shape::Object(vec![
                    Field::required("file", Shape::string()),
                    Field::required("description", Shape::string()),
                ])),
            ),
        ])
    }
}

/// Check `value` against `shape`.
///
/// # Errors
///
/// Returns [`ResolverError::SchemaValidation`] listing every violation, each
/// prefixed with its path (`$` for the root, `[2].message` for a field of the
/// third element).
///
/// # Examples
///
/// ```
/// use resolver_engine::schema::{validate, Shape};
///
/// let shape = Shape::array_of(Shape::Integer);
/// assert!(validate(&serde_json::json!([1, 2]), &shape).is_ok());
/// assert!(validate(&serde_json::json!([1, "2"]), &shape).is_err());
/// ```
pub fn validate(value: &Value, shape: &Shape) -> Result<(), ResolverError> {
    let mut violations = Vec::new();
    check(value, shape, "", &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ResolverError::SchemaValidation { violations })
    }
}

/// Validate `value` against `T`'s shape and deserialize it.
///
/// # Errors
///
/// Returns [`ResolverError::SchemaValidation`] when the shape does not match.
pub fn validate_as<T: Schema>(value: Value) -> Result<T, ResolverError> {
    validate(&value, &T::shape())?;
    Ok(serde_json::from_value(value)?)
}

fn check(value: &Value, shape: &Shape, path: &str, violations: &mut Vec<String>) {
    let at = if path.is_empty() { "$" } else { path };
    match shape {
        Shape::String { non_empty } => match value.as_str() {
            Some(s) if *non_empty && s.trim().is_empty() => {
                violations.push(format!("{at}: must not be empty"));
            }
            Some(_) => {}
            None => violations.push(format!("{at}: expected string, found {}", kind(value))),
        },
        Shape::Integer => {
            if !value.is_u64() {
                violations.push(format!(
                    "{at}: expected non-negative integer, found {}",
                    kind(value)
                ));
            }
        }
        Shape::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            Some(s) => violations.push(format!(
                "{at}: '{s}' is not one of {}",
                allowed.join(", ")
            )),
            None => violations.push(format!("{at}: expected string, found {}", kind(value))),
        },
        Shape::Array(item) => match value.as_array() {
            Some(items) => {
                for (i, element) in items.iter().enumerate() {
                    check(element, item, &format!("{path}[{i}]"), violations);
                }
            }
            None => violations.push(format!("{at}: expected array, found {}", kind(value))),
        },
        Shape::Object(fields) => {
            let Some(map) = value.as_object() else {
                violations.push(format!("{at}: expected object, found {}", kind(value)));
                return;
            };
            for field in fields {
                let field_path = if path.is_empty() {
                    field.name.to_string()
                } else {
                    format!("{path}.{}", field.name)
                };
                match map.get(field.name) {
                    None if field.required => {
                        violations.push(format!("{field_path}: missing required field"));
                    }
                    Some(Value::Null) if !field.required => {}
                    None => {}
                    Some(v) => check(v, &field.shape, &field_path, violations),
                }
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

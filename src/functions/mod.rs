//! Declared functions the assistant may call.
//!
//! Functions are declared at configuration time and immutable for the life of
//! a session. Each declares an ordered parameter list; every parameter has a
//! closed [`ParameterKind`], and coercion from streamed JSON arguments is
//! dispatched by exhaustive pattern matching (see [`coerce`]) so adding a kind
//! is a compile error until every consumer handles it.

pub mod coerce;
pub mod dispatch;

pub use dispatch::{FunctionCallBuffer, process_response_calls};

use serde::{Deserialize, Serialize};

/// A function the assistant is allowed to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Unique function name, as exposed in the tool schema
    pub name: String,

    /// Natural-language description handed to the model
    #[serde(default)]
    pub description: String,

    /// Ordered parameter declarations
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

/// One declared parameter of a [`FunctionDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name; argument keys are matched case-insensitively
    pub name: String,

    /// Declared kind
    #[serde(flatten)]
    pub kind: ParameterKind,
}

/// The closed set of parameter kinds a function may declare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Verbatim string
    String,
    /// 32-bit float, invariant-culture parse
    Float,
    /// 64-bit integer, invariant-culture parse
    Int,
    /// Boolean; accepts JSON booleans, "true"/"false" and "1"/"0"
    Bool,
    /// Two comma-separated floats, parentheses optional
    Vector2,
    /// Three comma-separated floats, parentheses optional
    Vector3,
    /// Four comma-separated floats, parentheses optional
    Vector4,
    /// Four floats, parsed exactly like [`ParameterKind::Vector4`]
    Quaternion,
    /// Hex color string; `#` prefix added when missing
    Color,
    /// Hex color string with alpha; `#` prefix added when missing
    Color32,
    /// Closed value list; matched by name first, then by numeric index
    Enum {
        /// Declared values, in index order
        values: Vec<String>,
    },
}

impl ParameterKind {
    /// Short kind name used in logs and coercion errors.
    pub fn name(&self) -> &'static str {
        match self {
            ParameterKind::String => "string",
            ParameterKind::Float => "float",
            ParameterKind::Int => "int",
            ParameterKind::Bool => "bool",
            ParameterKind::Vector2 => "vector2",
            ParameterKind::Vector3 => "vector3",
            ParameterKind::Vector4 => "vector4",
            ParameterKind::Quaternion => "quaternion",
            ParameterKind::Color => "color",
            ParameterKind::Color32 => "color32",
            ParameterKind::Enum { .. } => "enum",
        }
    }

    /// JSON-schema type string used when declaring the tool to the server.
    pub fn schema_type(&self) -> &'static str {
        match self {
            ParameterKind::String | ParameterKind::Enum { .. } => "string",
            ParameterKind::Float => "number",
            ParameterKind::Int => "integer",
            ParameterKind::Bool => "boolean",
            // Composite kinds travel as formatted strings the model fills in
            ParameterKind::Vector2
            | ParameterKind::Vector3
            | ParameterKind::Vector4
            | ParameterKind::Quaternion
            | ParameterKind::Color
            | ParameterKind::Color32 => "string",
        }
    }
}

/// A coerced, typed parameter value emitted to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    /// Verbatim string
    Str(String),
    /// Parsed float
    Float(f32),
    /// Parsed integer
    Int(i64),
    /// Parsed boolean
    Bool(bool),
    /// Two-component vector
    Vector2([f32; 2]),
    /// Three-component vector
    Vector3([f32; 3]),
    /// Four-component vector
    Vector4([f32; 4]),
    /// Quaternion (x, y, z, w)
    Quaternion([f32; 4]),
    /// Normalized hex color, `#` prefixed
    Color(String),
    /// Normalized hex color with alpha, `#` prefixed
    Color32(String),
    /// Resolved enum member; both index and name are reported
    Enum {
        /// Index into the declared value list
        index: usize,
        /// Resolved member name from the declared value list
        name: String,
    },
}

/// The immutable table of declared functions for one session.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: Vec<FunctionDefinition>,
}

impl FunctionRegistry {
    /// Build a registry from declared definitions.
    pub fn new(functions: Vec<FunctionDefinition>) -> Self {
        Self { functions }
    }

    /// Look up a declared function by name.
    pub fn lookup(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Number of declared functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry declares no functions.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Iterate over the declared functions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.functions.iter()
    }

    /// Render the tool schema sent in the session-configuration message.
    pub fn tool_schemas(&self) -> Vec<crate::protocol::messages::ToolDef> {
        self.functions
            .iter()
            .map(|f| {
                let mut properties = serde_json::Map::new();
                let mut required = Vec::with_capacity(f.parameters.len());
                for p in &f.parameters {
                    let mut prop = serde_json::Map::new();
                    prop.insert(
                        "type".to_string(),
                        serde_json::Value::String(p.kind.schema_type().to_string()),
                    );
                    if let ParameterKind::Enum { values } = &p.kind {
                        prop.insert(
                            "enum".to_string(),
                            serde_json::Value::Array(
                                values
                                    .iter()
                                    .map(|v| serde_json::Value::String(v.clone()))
                                    .collect(),
                            ),
                        );
                    }
                    properties.insert(p.name.clone(), serde_json::Value::Object(prop));
                    required.push(serde_json::Value::String(p.name.clone()));
                }

                crate::protocol::messages::ToolDef {
                    tool_type: "function".to_string(),
                    name: f.name.clone(),
                    description: if f.description.is_empty() {
                        None
                    } else {
                        Some(f.description.clone())
                    },
                    parameters: Some(serde_json::json!({
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    })),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> FunctionRegistry {
        FunctionRegistry::new(vec![FunctionDefinition {
            name: "set_door".to_string(),
            description: "Open or close the door".to_string(),
            parameters: vec![ParameterSpec {
                name: "state".to_string(),
                kind: ParameterKind::Enum {
                    values: vec!["Closed".to_string(), "Open".to_string()],
                },
            }],
        }])
    }

    #[test]
    fn test_lookup_is_exact() {
        let reg = sample_registry();
        assert!(reg.lookup("set_door").is_some());
        assert!(reg.lookup("Set_Door").is_none());
        assert!(reg.lookup("missing").is_none());
    }

    #[test]
    fn test_tool_schema_shape() {
        let reg = sample_registry();
        let tools = reg.tool_schemas();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "set_door");
        assert_eq!(tools[0].tool_type, "function");

        let params = tools[0].parameters.as_ref().unwrap();
        assert_eq!(params["type"], "object");
        assert_eq!(params["properties"]["state"]["type"], "string");
        assert_eq!(params["properties"]["state"]["enum"][1], "Open");
        assert_eq!(params["required"][0], "state");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ParameterKind::Quaternion.name(), "quaternion");
        assert_eq!(ParameterKind::Enum { values: vec![] }.name(), "enum");
    }
}

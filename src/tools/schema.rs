//! Translation of remote JSON Schema into the function-calling schema the
//! model runtime consumes.
//!
//! Translation is pure: properties are kept in a `BTreeMap` so the same
//! input always yields the same output, whatever order the remote used.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Maps a JSON Schema `type`; unknown or missing types become `String`.
    pub fn from_json_type(value: Option<&Value>) -> Self {
        let name = match value {
            Some(Value::String(s)) => s.as_str(),
            // `["string", "null"]` style unions: first non-null member wins.
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .find(|s| *s != "null")
                .unwrap_or("string"),
            _ => "string",
        };
        match name {
            "number" => ParamType::Number,
            "integer" => ParamType::Integer,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            "object" => ParamType::Object,
            _ => ParamType::String,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParamSchema>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, ParamSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

/// Parameter schema of one callable function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSchema {
    #[serde(rename = "type")]
    pub schema_type: ParamType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub properties: BTreeMap<String, ParamSchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl CallSchema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Renders as a JSON Schema object for OpenAI-style tool lists.
    pub fn to_json_schema(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "type": "object", "properties": {} }))
    }
}

/// What the model sees for one bound tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: CallSchema,
}

pub fn translate(json_schema: &Value) -> CallSchema {
    let Some(obj) = json_schema.as_object().filter(|o| !o.is_empty()) else {
        return CallSchema {
            schema_type: ParamType::Object,
            description: String::new(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        };
    };

    let schema_type = match obj.get("type") {
        None => ParamType::Object,
        t => ParamType::from_json_type(t),
    };

    CallSchema {
        schema_type,
        description: str_field(obj, "description"),
        properties: translate_properties(obj),
        required: required_list(obj),
    }
}

fn translate_properties(obj: &Map<String, Value>) -> BTreeMap<String, ParamSchema> {
    obj.get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), translate_param(prop)))
                .collect()
        })
        .unwrap_or_default()
}

fn translate_param(prop: &Value) -> ParamSchema {
    let empty = Map::new();
    let obj = prop.as_object().unwrap_or(&empty);
    let param_type = ParamType::from_json_type(obj.get("type"));

    let items = (param_type == ParamType::Array).then(|| {
        let item = match obj.get("items") {
            Some(items @ Value::Object(_)) => translate_param(items),
            _ => translate_param(&serde_json::json!({ "type": "string" })),
        };
        Box::new(item)
    });

    let (properties, required) = if param_type == ParamType::Object {
        (translate_properties(obj), required_list(obj))
    } else {
        (BTreeMap::new(), Vec::new())
    };

    ParamSchema {
        param_type,
        description: str_field(obj, "description"),
        items,
        properties,
        required,
        enum_values: obj
            .get("enum")
            .and_then(Value::as_array)
            .map(|vals| vals.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn required_list(obj: &Map<String, Value>) -> Vec<String> {
    obj.get("required")
        .and_then(Value::as_array)
        .map(|req| req.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

// XML-RPC wire format used by the WuBook "wired" endpoint
//
// Requests and responses are (de)serialized through serde-annotated wire structs,
// the same way the availability XML documents are handled, and converted to and
// from the public `Value` model.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDateTime;
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// dateTime.iso8601 as emitted by most XML-RPC servers
const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";
const DATETIME_DECODE_FORMATS: [&str; 3] = ["%Y%m%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M%S"];

#[derive(Error, Debug)]
pub enum XmlRpcError {
    #[error("XML parse error: {0}")]
    XmlParseError(String),

    #[error("XML serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid method response: {0}")]
    InvalidResponse(String),
}

// A single XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    String(String),
    Double(f64),
    DateTime(NaiveDateTime),
    Base64(Vec<u8>),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(f64::from(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    // Struct member lookup, None for anything that is not a struct
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct().and_then(|members| members.get(key))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Nil => "nil",
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Struct(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Nil, Into::into)
    }
}

// JSON bridge, handy for logging responses or feeding them to serde models
impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Int(i) => serde_json::Value::from(i),
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::String(s) => serde_json::Value::String(s),
            Value::Double(d) => serde_json::Number::from_f64(d)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            Value::Base64(bytes) => serde_json::Value::String(STANDARD.encode(bytes)),
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .into_iter()
                    .map(|(name, value)| (name, value.into()))
                    .collect(),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Nil => serde_json::Value::Null,
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = XmlRpcError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    let int = i32::try_from(i).map_err(|_| {
                        XmlRpcError::InvalidValue(format!("{} does not fit in an XML-RPC int", i))
                    })?;
                    Value::Int(int)
                } else if let Some(f) = n.as_f64() {
                    Value::Double(f)
                } else {
                    return Err(XmlRpcError::InvalidValue(format!(
                        "{} does not fit in an XML-RPC int",
                        n
                    )));
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(members) => Value::Struct(
                members
                    .into_iter()
                    .map(|(name, value)| Ok((name, Value::try_from(value)?)))
                    .collect::<Result<_, XmlRpcError>>()?,
            ),
        })
    }
}

// Outcome of a remote call as carried by `<methodResponse>`.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault { code: i32, message: String },
}

// Wire structures
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename = "methodCall")]
struct WireCall {
    #[serde(rename = "methodName")]
    method_name: String,
    #[serde(default)]
    params: WireParams,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename = "methodResponse")]
struct WireResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<WireParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fault: Option<WireFault>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct WireParams {
    #[serde(rename = "param")]
    params: Vec<WireParam>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct WireParam {
    value: WireValue,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct WireFault {
    value: WireValue,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct WireValue {
    #[serde(rename = "$value", default)]
    kind: Option<WireKind>,
}

#[derive(Debug, Deserialize, Serialize)]
enum WireKind {
    #[serde(rename = "i4")]
    I4(i32),
    #[serde(rename = "int")]
    Int(i32),
    #[serde(rename = "boolean")]
    Boolean(u8),
    #[serde(rename = "string")]
    String(String),
    #[serde(rename = "double")]
    Double(f64),
    #[serde(rename = "dateTime.iso8601")]
    DateTime(String),
    #[serde(rename = "base64")]
    Base64(String),
    #[serde(rename = "struct")]
    Struct(WireStruct),
    #[serde(rename = "array")]
    Array(WireArray),
    #[serde(rename = "nil")]
    Nil,
    // <value>text</value> without a type element is a string
    #[serde(rename = "$text")]
    Text(String),
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct WireStruct {
    #[serde(rename = "member")]
    members: Vec<WireMember>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct WireMember {
    name: String,
    value: WireValue,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct WireArray {
    data: WireData,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct WireData {
    #[serde(rename = "value")]
    values: Vec<WireValue>,
}

impl From<&Value> for WireValue {
    fn from(value: &Value) -> Self {
        let kind = match value {
            Value::Int(i) => WireKind::Int(*i),
            Value::Bool(b) => WireKind::Boolean(u8::from(*b)),
            Value::String(s) => WireKind::String(s.clone()),
            Value::Double(d) => WireKind::Double(*d),
            Value::DateTime(dt) => WireKind::DateTime(dt.format(DATETIME_FORMAT).to_string()),
            Value::Base64(bytes) => WireKind::Base64(STANDARD.encode(bytes)),
            Value::Struct(members) => WireKind::Struct(WireStruct {
                members: members
                    .iter()
                    .map(|(name, value)| WireMember {
                        name: name.clone(),
                        value: value.into(),
                    })
                    .collect(),
            }),
            Value::Array(items) => WireKind::Array(WireArray {
                data: WireData {
                    values: items.iter().map(WireValue::from).collect(),
                },
            }),
            Value::Nil => WireKind::Nil,
        };

        WireValue { kind: Some(kind) }
    }
}

impl TryFrom<WireValue> for Value {
    type Error = XmlRpcError;

    fn try_from(wire: WireValue) -> Result<Self, Self::Error> {
        let kind = match wire.kind {
            Some(kind) => kind,
            // <value/> is an empty untyped string
            None => return Ok(Value::String(String::new())),
        };

        Ok(match kind {
            WireKind::I4(i) | WireKind::Int(i) => Value::Int(i),
            WireKind::Boolean(0) => Value::Bool(false),
            WireKind::Boolean(1) => Value::Bool(true),
            WireKind::Boolean(other) => {
                return Err(XmlRpcError::InvalidValue(format!(
                    "boolean must be 0 or 1, got {}",
                    other
                )))
            }
            WireKind::String(s) | WireKind::Text(s) => Value::String(s),
            WireKind::Double(d) => Value::Double(d),
            WireKind::DateTime(raw) => Value::DateTime(parse_datetime(&raw)?),
            WireKind::Base64(raw) => {
                let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = STANDARD
                    .decode(compact)
                    .map_err(|e| XmlRpcError::InvalidValue(format!("base64: {}", e)))?;
                Value::Base64(bytes)
            }
            WireKind::Struct(wire_struct) => {
                let mut members = BTreeMap::new();
                for member in wire_struct.members {
                    members.insert(member.name, Value::try_from(member.value)?);
                }
                Value::Struct(members)
            }
            WireKind::Array(array) => Value::Array(
                array
                    .data
                    .values
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            WireKind::Nil => Value::Nil,
        })
    }
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, XmlRpcError> {
    let raw = raw.trim();
    DATETIME_DECODE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| XmlRpcError::InvalidValue(format!("unrecognised dateTime.iso8601 {}", raw)))
}

fn to_wire_params(params: &[Value]) -> WireParams {
    WireParams {
        params: params
            .iter()
            .map(|value| WireParam {
                value: value.into(),
            })
            .collect(),
    }
}

// Serialize a `<methodCall>` document.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, XmlRpcError> {
    let call = WireCall {
        method_name: method.to_string(),
        params: to_wire_params(params),
    };

    let body = quick_xml::se::to_string(&call)
        .map_err(|e| XmlRpcError::SerializationError(e.to_string()))?;
    Ok(format!("{}{}", XML_DECLARATION, body))
}

// Parse a <methodCall> document back into its method name and params
pub fn decode_call(xml: &str) -> Result<(String, Vec<Value>), XmlRpcError> {
    let call: WireCall = from_str(xml).map_err(|e| XmlRpcError::XmlParseError(e.to_string()))?;
    let params = call
        .params
        .params
        .into_iter()
        .map(|param| Value::try_from(param.value))
        .collect::<Result<_, _>>()?;
    Ok((call.method_name, params))
}

// Serialize a `<methodResponse>` document, either params or fault.
pub fn encode_response(response: &MethodResponse) -> Result<String, XmlRpcError> {
    let wire = match response {
        MethodResponse::Success(value) => WireResponse {
            params: Some(to_wire_params(std::slice::from_ref(value))),
            fault: None,
        },
        MethodResponse::Fault { code, message } => {
            let mut members = BTreeMap::new();
            members.insert("faultCode".to_string(), Value::Int(*code));
            members.insert("faultString".to_string(), Value::String(message.clone()));
            WireResponse {
                params: None,
                fault: Some(WireFault {
                    value: (&Value::Struct(members)).into(),
                }),
            }
        }
    };

    let body = quick_xml::se::to_string(&wire)
        .map_err(|e| XmlRpcError::SerializationError(e.to_string()))?;
    Ok(format!("{}{}", XML_DECLARATION, body))
}

// Parse a `<methodResponse>` body.
pub fn decode_response(body: &[u8]) -> Result<MethodResponse, XmlRpcError> {
    let xml = std::str::from_utf8(body)
        .map_err(|e| XmlRpcError::XmlParseError(format!("response is not UTF-8: {}", e)))?;
    let wire: WireResponse =
        from_str(xml).map_err(|e| XmlRpcError::XmlParseError(e.to_string()))?;

    if let Some(fault) = wire.fault {
        let fault = Value::try_from(fault.value)?;
        let code = fault
            .get("faultCode")
            .and_then(Value::as_i32)
            .ok_or_else(|| XmlRpcError::InvalidResponse("fault without faultCode".to_string()))?;
        let message = fault
            .get("faultString")
            .and_then(Value::as_str)
            .ok_or_else(|| XmlRpcError::InvalidResponse("fault without faultString".to_string()))?
            .to_string();
        return Ok(MethodResponse::Fault { code, message });
    }

    match wire.params {
        Some(params) => {
            let value = match params.params.into_iter().next() {
                Some(param) => Value::try_from(param.value)?,
                None => Value::Nil,
            };
            Ok(MethodResponse::Success(value))
        }
        None => Err(XmlRpcError::InvalidResponse(
            "methodResponse carries neither params nor fault".to_string(),
        )),
    }
}

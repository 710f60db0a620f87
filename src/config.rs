// Credentials and client configuration

use crate::error::WuBookError;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

pub const DEFAULT_ENDPOINT: &str = "https://wired.wubook.net/xrws/";

const REQUIRED_KEYS: [&str; 4] = ["username", "password", "provider_key", "lcode"];

// Section name used by framework-style config files: {"wubook": {...}}
const CONFIG_SECTION: &str = "wubook";

// Validated WuBook account credentials.
//
// Built once from a raw configuration mapping; every later operation can rely on
// all four strings being present and non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    provider_key: String,
    lcode: String,
    cache_token: bool,
}

impl Credentials {
    pub fn new(
        username: &str,
        password: &str,
        provider_key: &str,
        lcode: &str,
        cache_token: bool,
    ) -> Result<Self, WuBookError> {
        let mut map = Map::new();
        map.insert("username".to_string(), username.into());
        map.insert("password".to_string(), password.into());
        map.insert("provider_key".to_string(), provider_key.into());
        map.insert("lcode".to_string(), lcode.into());
        map.insert("cache_token".to_string(), cache_token.into());
        Self::from_map(&map)
    }

    // Extract the recognised keys, ignore everything else
    pub fn from_map(map: &Map<String, JsonValue>) -> Result<Self, WuBookError> {
        let required = |key: &str| -> Result<String, WuBookError> {
            // the value is kept verbatim, whitespace only counts as missing
            let value = match map.get(key) {
                Some(JsonValue::String(s)) if s.trim().is_empty() => String::new(),
                Some(JsonValue::String(s)) => s.clone(),
                // lcodes are often written as bare numbers
                Some(JsonValue::Number(n)) => n.to_string(),
                Some(JsonValue::Null) | None => String::new(),
                Some(other) => {
                    return Err(WuBookError::ConfigurationError(format!(
                        "{} must be a string, got {}",
                        key, other
                    )))
                }
            };
            if value.is_empty() {
                return Err(WuBookError::ConfigurationError(format!(
                    "Credentials are required: missing {}",
                    key
                )));
            }
            Ok(value)
        };

        let [username, password, provider_key, lcode] = REQUIRED_KEYS;
        Ok(Self {
            username: required(username)?,
            password: required(password)?,
            provider_key: required(provider_key)?,
            lcode: required(lcode)?,
            cache_token: parse_flag("cache_token", map.get("cache_token"))?,
        })
    }

    // Accepts either the credential object or a document with a "wubook" section
    pub fn from_json(json: &str) -> Result<Self, WuBookError> {
        let document: JsonValue = serde_json::from_str(json)
            .map_err(|e| WuBookError::ConfigurationError(format!("invalid JSON: {}", e)))?;

        let section = match document.get(CONFIG_SECTION) {
            Some(section) => section,
            None => &document,
        };

        match section {
            JsonValue::Object(map) => Self::from_map(map),
            _ => Err(WuBookError::ConfigurationError(
                "credentials must be a JSON object".to_string(),
            )),
        }
    }

    pub fn from_env() -> Result<Self, WuBookError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, WuBookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut map = Map::new();
        for key in REQUIRED_KEYS.iter().chain(std::iter::once(&"cache_token")) {
            let name = format!("WUBOOK_{}", key.to_uppercase());
            if let Some(value) = lookup(&name) {
                map.insert(key.to_string(), JsonValue::String(value));
            }
        }
        Self::from_map(&map)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    pub fn lcode(&self) -> &str {
        &self.lcode
    }

    pub fn cache_token(&self) -> bool {
        self.cache_token
    }
}

// Secrets stay out of logs and panic messages
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("provider_key", &"<redacted>")
            .field("lcode", &self.lcode)
            .field("cache_token", &self.cache_token)
            .finish()
    }
}

fn parse_flag(key: &str, value: Option<&JsonValue>) -> Result<bool, WuBookError> {
    match value {
        None | Some(JsonValue::Null) => Ok(false),
        Some(JsonValue::Bool(b)) => Ok(*b),
        Some(JsonValue::Number(n)) if n.as_u64() == Some(0) => Ok(false),
        Some(JsonValue::Number(n)) if n.as_u64() == Some(1) => Ok(true),
        Some(JsonValue::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" | "" => Ok(false),
            other => Err(WuBookError::ConfigurationError(format!(
                "{} must be a boolean, got {}",
                key, other
            ))),
        },
        Some(other) => Err(WuBookError::ConfigurationError(format!(
            "{} must be a boolean, got {}",
            key, other
        ))),
    }
}

// Transport configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_ms: 30000,
            user_agent: format!("wubook_client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    // Defaults overridden by WUBOOK_ENDPOINT / WUBOOK_TIMEOUT_MS when set
    pub fn from_env() -> Result<Self, WuBookError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, WuBookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("WUBOOK_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(timeout) = lookup("WUBOOK_TIMEOUT_MS") {
            config.timeout_ms = timeout.trim().parse().map_err(|_| {
                WuBookError::ConfigurationError(format!(
                    "WUBOOK_TIMEOUT_MS must be a number of milliseconds, got {}",
                    timeout
                ))
            })?;
        }

        Ok(config)
    }
}

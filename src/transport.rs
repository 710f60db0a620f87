// Transport: moves XML-RPC calls to the WuBook endpoint and back

use crate::config::ClientConfig;
use crate::xmlrpc::{self, MethodResponse, Value};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// Keep HTTP error bodies short in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Remote fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {status_code} - {body}")]
    HttpStatus { status_code: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Cannot encode request: {0}")]
    EncodingError(String),
}

// Remote procedure call client used by the session manager
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    // Call `method` with the ordered params and return the decoded result
    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError>;
}

// XML-RPC over HTTP(S), backed by `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    fn map_reqwest_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout_ms)
        } else {
            TransportError::NetworkError(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
        let body = xmlrpc::encode_call(method, params)
            .map_err(|e| TransportError::EncodingError(e.to_string()))?;

        debug!(method, endpoint = %self.endpoint, "sending XML-RPC call");

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        let status = response.status();
        let payload: Bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_reqwest_error(e))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&payload);
            warn!(method, status = status.as_u16(), "XML-RPC endpoint returned an HTTP error");
            return Err(TransportError::HttpStatus {
                status_code: status.as_u16(),
                body: Self::truncate_body(&text),
            });
        }

        match xmlrpc::decode_response(&payload)
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))?
        {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault { code, message } => {
                debug!(method, code, "XML-RPC fault");
                Err(TransportError::Fault { code, message })
            }
        }
    }
}

// In-process transport for tests; speaks the WuBook [code, payload] envelope
#[cfg(test)]
pub mod mock_transport {
    use super::*;
    use crate::session::LOGIN_METHOD;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockTransport {
        login_count: AtomicUsize,
        calls: Mutex<Vec<(String, Vec<Value>)>>,
        responses: Mutex<HashMap<String, Result<Value, TransportError>>>,
        login_failure: Mutex<Option<TransportError>>,
        token_prefix: String,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::with_token_prefix("token")
        }

        pub fn with_token_prefix(prefix: &str) -> Self {
            Self {
                login_count: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(HashMap::new()),
                login_failure: Mutex::new(None),
                token_prefix: prefix.to_string(),
            }
        }

        // Raw value returned by the transport for `method`
        pub fn respond(&self, method: &str, value: Value) {
            self.responses.lock().insert(method.to_string(), Ok(value));
        }

        // Successful WuBook envelope [0, payload]
        pub fn respond_ok(&self, method: &str, payload: Value) {
            self.respond(method, Value::Array(vec![Value::Int(0), payload]));
        }

        pub fn fail(&self, method: &str, error: TransportError) {
            self.responses.lock().insert(method.to_string(), Err(error));
        }

        pub fn fail_login(&self, error: TransportError) {
            *self.login_failure.lock() = Some(error);
        }

        pub fn login_count(&self) -> usize {
            self.login_count.load(Ordering::SeqCst)
        }

        pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
            self.calls.lock().clone()
        }

        pub fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
            self.calls
                .lock()
                .iter()
                .filter(|(name, _)| name == method)
                .map(|(_, params)| params.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn call(&self, method: &str, params: &[Value]) -> Result<Value, TransportError> {
            self.calls
                .lock()
                .push((method.to_string(), params.to_vec()));

            if method == LOGIN_METHOD {
                if let Some(error) = self.login_failure.lock().clone() {
                    return Err(error);
                }
                let count = self.login_count.fetch_add(1, Ordering::SeqCst) + 1;
                return Ok(Value::Array(vec![
                    Value::Int(0),
                    Value::String(format!("{}-{}", self.token_prefix, count)),
                ]));
            }

            match self.responses.lock().get(method) {
                Some(response) => response.clone(),
                None => Ok(Value::Array(vec![Value::Int(0), Value::Nil])),
            }
        }
    }
}

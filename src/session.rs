// Session manager: obtains (and optionally caches) the WuBook token and
// dispatches every business call through the transport with that token.

use crate::cache::{token_cache_key, TokenCache};
use crate::config::Credentials;
use crate::error::WuBookError;
use crate::transport::Transport;
use crate::xmlrpc::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// Remote procedure that exchanges credentials for a token
pub const LOGIN_METHOD: &str = "acquire_token";

// Opaque session token returned by `acquire_token`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Token(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Token> for Value {
    fn from(token: Token) -> Self {
        Value::String(token.0)
    }
}

// Notification emitted after every business call.
//
// Carries both the token and the remote method name; older consumers that only
// looked at the token keep working by ignoring `method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSent {
    pub token: String,
    pub method: String,
}

impl RequestSent {
    pub const VERSION: u32 = 2;
}

pub type RequestListener = Arc<dyn Fn(&RequestSent) + Send + Sync>;

pub struct SessionManager {
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn TokenCache>>,
    cache_key: String,
    listeners: RwLock<Vec<RequestListener>>,
}

impl SessionManager {
    pub fn new(
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        cache: Option<Arc<dyn TokenCache>>,
    ) -> Result<Self, WuBookError> {
        if credentials.cache_token() && cache.is_none() {
            return Err(WuBookError::ConfigurationError(
                "cache_token is enabled but no token cache was supplied".to_string(),
            ));
        }

        Ok(Self {
            cache_key: token_cache_key(&credentials),
            credentials,
            transport,
            cache,
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    // Register an observer called synchronously after each business call
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&RequestSent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    // Log in with the stored credentials. Never consults the cache.
    pub async fn authenticate(&self) -> Result<Token, WuBookError> {
        info!(
            username = self.credentials.username(),
            lcode = self.credentials.lcode(),
            "acquiring WuBook token"
        );

        let params = [
            Value::from(self.credentials.username()),
            Value::from(self.credentials.password()),
            Value::from(self.credentials.provider_key()),
        ];

        let response = self
            .transport
            .call(LOGIN_METHOD, &params)
            .await
            .map_err(|e| {
                warn!(error = %e, "WuBook login failed");
                WuBookError::authentication(e)
            })?;

        match unwrap_envelope(response) {
            Ok(Value::String(token)) if !token.is_empty() => Ok(Token(token)),
            Ok(other) => Err(WuBookError::AuthenticationError {
                code: None,
                message: format!("expected a token string, got {}", other.type_name()),
            }),
            Err((code, message)) => {
                warn!(code, %message, "WuBook rejected the credentials");
                Err(WuBookError::AuthenticationError {
                    code: Some(code),
                    message,
                })
            }
        }
    }

    // Token for the next call: cached when `cache_token` is on, fresh otherwise.
    pub async fn get_token(&self) -> Result<Token, WuBookError> {
        let cache = match (&self.cache, self.credentials.cache_token()) {
            (Some(cache), true) => cache,
            _ => return self.authenticate().await,
        };

        if let Some(token) = cache.get(&self.cache_key).await {
            debug!(key = %self.cache_key, "token cache hit");
            return Ok(Token(token));
        }

        debug!(key = %self.cache_key, "token cache miss");
        let token = self.authenticate().await?;
        cache.set(&self.cache_key, token.0.clone()).await;
        Ok(token)
    }

    // Raw remote call with the session token prepended; the result is returned untouched
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, WuBookError> {
        if method == LOGIN_METHOD {
            return self
                .transport
                .call(method, &args)
                .await
                .map_err(WuBookError::authentication);
        }

        let token = self.get_token().await?;
        self.invoke_with_token(&token, method, args).await
    }

    pub async fn invoke_with_token(
        &self,
        token: &Token,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, WuBookError> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(Value::from(token.as_str()));
        params.extend(args);

        debug!(method, params = params.len(), "dispatching WuBook call");
        let result = self.transport.call(method, &params).await;

        self.notify(&RequestSent {
            token: token.as_str().to_string(),
            method: method.to_string(),
        });

        result.map_err(|e| {
            warn!(method, error = %e, "WuBook call failed");
            WuBookError::remote(method, e)
        })
    }

    // `invoke` plus unwrapping of the WuBook [code, payload] envelope
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, WuBookError> {
        let response = self.invoke(method, args).await?;
        into_payload(method, response)
    }

    pub async fn call_with_token(
        &self,
        token: &Token,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, WuBookError> {
        let response = self.invoke_with_token(token, method, args).await?;
        into_payload(method, response)
    }

    fn notify(&self, event: &RequestSent) {
        // Listeners run outside the lock so they may subscribe others
        let listeners: Vec<RequestListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

fn into_payload(method: &str, response: Value) -> Result<Value, WuBookError> {
    unwrap_envelope(response).map_err(|(code, message)| {
        warn!(method, code, %message, "WuBook returned an error code");
        WuBookError::RemoteCallError {
            method: method.to_string(),
            code,
            message,
        }
    })
}

// WuBook answers [0, payload] on success and [code, message] otherwise.
// Anything that is not shaped like that is passed through as the payload.
pub(crate) fn unwrap_envelope(response: Value) -> Result<Value, (i32, String)> {
    let mut items = match response {
        Value::Array(items) => items,
        other => return Ok(other),
    };

    let code = match items.first() {
        Some(Value::Int(code)) => *code,
        _ => return Ok(Value::Array(items)),
    };

    let payload = if items.len() > 1 {
        items.swap_remove(1)
    } else {
        Value::Nil
    };

    if code == 0 {
        return Ok(payload);
    }

    let message = match payload {
        Value::String(message) => message,
        Value::Nil => format!("WuBook error {}", code),
        other => serde_json::Value::from(other).to_string(),
    };
    Err((code, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTokenCache;
    use crate::transport::mock_transport::MockTransport;
    use crate::transport::TransportError;
    use parking_lot::Mutex;
    use tokio_test::assert_ok;

    fn credentials(cache_token: bool) -> Credentials {
        Credentials::new("hotelier", "secret", "pkey", "1234567890", cache_token).unwrap()
    }

    fn manager(
        cache_token: bool,
        transport: &Arc<MockTransport>,
        cache: Option<&Arc<MemoryTokenCache>>,
    ) -> SessionManager {
        SessionManager::new(
            credentials(cache_token),
            transport.clone(),
            cache.map(|c| c.clone() as Arc<dyn TokenCache>),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_sends_credentials() {
        let transport = Arc::new(MockTransport::new());
        let session = manager(false, &transport, None);

        let token = assert_ok!(session.authenticate().await);
        assert_eq!(token, Token::new("token-1"));

        let calls = transport.calls_to(LOGIN_METHOD);
        assert_eq!(
            calls,
            vec![vec![
                Value::from("hotelier"),
                Value::from("secret"),
                Value::from("pkey")
            ]]
        );
    }

    #[tokio::test]
    async fn test_authenticate_fault() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_login(TransportError::Fault {
            code: -1,
            message: "Authentication failed".to_string(),
        });
        let session = manager(false, &transport, None);

        match session.authenticate().await {
            Err(WuBookError::AuthenticationError { code, message }) => {
                assert_eq!(code, Some(-1));
                assert_eq!(message, "Authentication failed");
            }
            other => panic!("Expected AuthenticationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authenticate_unreachable() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_login(TransportError::NetworkError("connection refused".to_string()));
        let session = manager(false, &transport, None);

        let error = session.authenticate().await.unwrap_err();
        assert!(matches!(
            error,
            WuBookError::AuthenticationError { code: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_call_with_failed_login_skips_business_method() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_login(TransportError::Fault {
            code: -1,
            message: "Authentication failed".to_string(),
        });
        let session = manager(false, &transport, None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(move |event: &RequestSent| sink.lock().push(event.clone()));

        let invoked = session.invoke("fetch_rooms", vec![]).await;
        assert!(matches!(
            invoked,
            Err(WuBookError::AuthenticationError { code: Some(-1), .. })
        ));
        let called = session.call("fetch_rooms", vec![]).await;
        assert!(matches!(
            called,
            Err(WuBookError::AuthenticationError { code: Some(-1), .. })
        ));

        assert!(transport.calls_to("fetch_rooms").is_empty());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_get_token_without_cache_always_logs_in() {
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryTokenCache::new());
        let session = manager(false, &transport, Some(&cache));

        let first = session.get_token().await.unwrap();
        let second = session.get_token().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(transport.login_count(), 2);

        // the cache is never read nor written
        let stats = cache.stats();
        assert_eq!(stats.hit_count + stats.miss_count + stats.write_count, 0);
    }

    #[tokio::test]
    async fn test_get_token_with_cache_logs_in_once() {
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryTokenCache::new());
        let session = manager(true, &transport, Some(&cache));

        let first = session.get_token().await.unwrap();
        assert_eq!(transport.login_count(), 1);
        assert_eq!(cache.stats().write_count, 1);
        assert_eq!(cache.len(), 1);

        let second = session.get_token().await.unwrap();
        assert_eq!(transport.login_count(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.stats().write_count, 1);
    }

    #[tokio::test]
    async fn test_cache_token_requires_cache() {
        let transport = Arc::new(MockTransport::new());
        let result = SessionManager::new(credentials(true), transport, None);
        assert!(matches!(result, Err(WuBookError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_invoke_puts_token_first() {
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryTokenCache::new());
        cache
            .set("wubook:token:1234567890:hotelier", "cached-token".to_string())
            .await;
        let rooms = Value::Array(vec![Value::Int(0), Value::Array(vec![])]);
        transport.respond("fetch_rooms", rooms.clone());
        let session = manager(true, &transport, Some(&cache));

        let result = session
            .invoke("fetch_rooms", vec![Value::from("1234567890")])
            .await
            .unwrap();

        assert_eq!(result, rooms, "transport result is returned unmodified");
        assert_eq!(transport.login_count(), 0);
        assert_eq!(
            transport.calls_to("fetch_rooms"),
            vec![vec![Value::from("cached-token"), Value::from("1234567890")]]
        );
    }

    #[tokio::test]
    async fn test_invoke_login_method_skips_token() {
        let transport = Arc::new(MockTransport::new());
        let session = manager(false, &transport, None);

        let args = vec![Value::from("u"), Value::from("p"), Value::from("k")];
        session.invoke(LOGIN_METHOD, args.clone()).await.unwrap();

        assert_eq!(transport.calls(), vec![(LOGIN_METHOD.to_string(), args)]);
    }

    #[tokio::test]
    async fn test_fault_keeps_cache_untouched() {
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryTokenCache::new());
        let session = manager(true, &transport, Some(&cache));
        let token = session.get_token().await.unwrap();

        transport.fail(
            "fetch_rooms",
            TransportError::Fault {
                code: -100,
                message: "Invalid token".to_string(),
            },
        );

        match session.invoke("fetch_rooms", vec![]).await {
            Err(WuBookError::RemoteCallError {
                method,
                code,
                message,
            }) => {
                assert_eq!(method, "fetch_rooms");
                assert_eq!(code, -100);
                assert_eq!(message, "Invalid token");
            }
            other => panic!("Expected RemoteCallError, got {:?}", other),
        }

        // no re-authentication and no invalidation
        assert_eq!(transport.login_count(), 1);
        assert_eq!(
            cache.get(session.cache_key()).await,
            Some(token.as_str().to_string())
        );
    }

    #[tokio::test]
    async fn test_shared_cache_converges() {
        let transport = Arc::new(MockTransport::new());
        let cache = Arc::new(MemoryTokenCache::new());
        let first = manager(true, &transport, Some(&cache));
        let second = manager(true, &transport, Some(&cache));

        let first_token = first.get_token().await.unwrap();
        let second_token = second.get_token().await.unwrap();

        assert_eq!(first_token, second_token);
        assert_eq!(transport.login_count(), 1);
    }

    #[tokio::test]
    async fn test_call_unwraps_envelope() {
        let transport = Arc::new(MockTransport::new());
        transport.respond_ok("fetch_rooms", Value::Array(vec![Value::from("room")]));
        let session = manager(false, &transport, None);

        let payload = session.call("fetch_rooms", vec![]).await.unwrap();
        assert_eq!(payload, Value::Array(vec![Value::from("room")]));
    }

    #[tokio::test]
    async fn test_call_error_code() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            "fetch_rooms",
            Value::Array(vec![Value::Int(-2), Value::from("Unknown lcode")]),
        );
        let session = manager(false, &transport, None);

        let error = session.call("fetch_rooms", vec![]).await.unwrap_err();
        assert_eq!(error.fault_code(), Some(-2));
        assert!(error.to_string().contains("Unknown lcode"));
    }

    #[tokio::test]
    async fn test_observers_receive_token_and_method() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(
            "del_room",
            TransportError::Fault {
                code: 1,
                message: "boom".to_string(),
            },
        );
        let session = manager(false, &transport, None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(move |event: &RequestSent| sink.lock().push(event.clone()));

        session.invoke("fetch_rooms", vec![]).await.unwrap();
        let _ = session.invoke("del_room", vec![]).await;

        let events = seen.lock().clone();
        assert_eq!(
            events,
            vec![
                RequestSent {
                    token: "token-1".to_string(),
                    method: "fetch_rooms".to_string()
                },
                RequestSent {
                    token: "token-2".to_string(),
                    method: "del_room".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_invoke_with_explicit_token() {
        let transport = Arc::new(MockTransport::new());
        let session = manager(false, &transport, None);

        session
            .invoke_with_token(&Token::new("given"), "fetch_rooms", vec![Value::Int(1)])
            .await
            .unwrap();

        assert_eq!(transport.login_count(), 0);
        assert_eq!(
            transport.calls_to("fetch_rooms"),
            vec![vec![Value::from("given"), Value::Int(1)]]
        );
    }

    #[test]
    fn test_unwrap_envelope_passthrough() {
        assert_eq!(unwrap_envelope(Value::from("x")), Ok(Value::from("x")));
        assert_eq!(
            unwrap_envelope(Value::Array(vec![Value::Int(0)])),
            Ok(Value::Nil)
        );
        assert_eq!(
            unwrap_envelope(Value::Array(vec![Value::Int(-5)])),
            Err((-5, "WuBook error -5".to_string()))
        );
    }
}

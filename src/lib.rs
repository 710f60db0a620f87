// WuBook client library: credentialed XML-RPC access to the WuBook wired API

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod facets;
pub mod session;
pub mod transport;
pub mod xmlrpc;

// Re-export key types for convenience
pub use cache::{token_cache_key, CacheStatsReport, MemoryTokenCache, TokenCache};
pub use client::WuBook;
pub use config::{ClientConfig, Credentials};
pub use error::WuBookError;
pub use facets::{Facet, FacetKind, Operation};
pub use session::{RequestSent, SessionManager, Token};
pub use transport::{HttpTransport, Transport, TransportError};
pub use xmlrpc::{MethodResponse, Value, XmlRpcError};

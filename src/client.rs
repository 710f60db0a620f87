// WuBook client: owns the session manager and hands out the API facets

use crate::cache::TokenCache;
use crate::config::{ClientConfig, Credentials};
use crate::error::WuBookError;
use crate::facets::{Facet, FacetKind};
use crate::session::{RequestSent, SessionManager};
use crate::transport::{HttpTransport, Transport};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

pub struct WuBook {
    session: SessionManager,
}

impl WuBook {
    // Client talking XML-RPC over HTTP to `config.endpoint`.
    pub fn new(
        credentials: Credentials,
        config: &ClientConfig,
        cache: Option<Arc<dyn TokenCache>>,
    ) -> Result<Self, WuBookError> {
        let transport = HttpTransport::new(config).map_err(|e| {
            WuBookError::ConfigurationError(format!("cannot build HTTP transport: {}", e))
        })?;
        Self::with_transport(credentials, Arc::new(transport), cache)
    }

    pub fn with_transport(
        credentials: Credentials,
        transport: Arc<dyn Transport>,
        cache: Option<Arc<dyn TokenCache>>,
    ) -> Result<Self, WuBookError> {
        Ok(Self {
            session: SessionManager::new(credentials, transport, cache)?,
        })
    }

    // Validate a raw configuration mapping and build an HTTP client from it
    pub fn from_config_map(
        map: &Map<String, JsonValue>,
        config: &ClientConfig,
        cache: Option<Arc<dyn TokenCache>>,
    ) -> Result<Self, WuBookError> {
        Self::new(Credentials::from_map(map)?, config, cache)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&RequestSent) + Send + Sync + 'static,
    {
        self.session.subscribe(listener);
    }

    pub fn facet(&self, kind: FacetKind) -> Facet<'_> {
        Facet::new(kind, &self.session)
    }

    pub fn auth(&self) -> Facet<'_> {
        self.facet(FacetKind::Auth)
    }

    pub fn availability(&self) -> Facet<'_> {
        self.facet(FacetKind::Availability)
    }

    pub fn cancellation_policies(&self) -> Facet<'_> {
        self.facet(FacetKind::CancellationPolicies)
    }

    pub fn channel_manager(&self) -> Facet<'_> {
        self.facet(FacetKind::ChannelManager)
    }

    pub fn corporate_functions(&self) -> Facet<'_> {
        self.facet(FacetKind::Corporate)
    }

    pub fn extras(&self) -> Facet<'_> {
        self.facet(FacetKind::Extras)
    }

    pub fn prices(&self) -> Facet<'_> {
        self.facet(FacetKind::Prices)
    }

    pub fn reservations(&self) -> Facet<'_> {
        self.facet(FacetKind::Reservations)
    }

    pub fn restrictions(&self) -> Facet<'_> {
        self.facet(FacetKind::Restrictions)
    }

    pub fn rooms(&self) -> Facet<'_> {
        self.facet(FacetKind::Rooms)
    }

    pub fn transactions(&self) -> Facet<'_> {
        self.facet(FacetKind::Transactions)
    }
}

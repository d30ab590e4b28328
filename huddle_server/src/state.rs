//! Shared server state handed to every request and connection

use crate::credentials::CredentialIssuer;
use crate::gateway::ConnectionGateway;
use crate::relay::{ConnectionHub, SignalRelay};
use crate::rooms::DEFAULT_ROOM_CAPACITY;
use std::sync::Arc;

/// Cheap-to-clone handle on the process-wide registries and collaborators
#[derive(Clone)]
pub struct ServerState {
    pub gateway: Arc<ConnectionGateway>,
    pub hub: Arc<ConnectionHub>,
    pub credentials: Option<Arc<dyn CredentialIssuer>>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl ServerState {
    /// Create empty registries whose rooms admit `room_capacity` members
    pub fn new(room_capacity: usize) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let relay = SignalRelay::new(hub.clone());
        Self {
            gateway: Arc::new(ConnectionGateway::new(relay, room_capacity)),
            hub,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, issuer: Arc<dyn CredentialIssuer>) -> Self {
        self.credentials = Some(issuer);
        self
    }
}

pub mod auth;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod location;
pub mod publicize;
pub mod push;
pub mod session;
pub mod sockets;
pub mod store;
pub mod sync;
pub mod types;
pub mod users;
pub mod view;
pub mod workflow;

use std::sync::Arc;

use auth::IdentityProvider;
use backend::{AdminBackend, HttpAdminBackend, LocalBackend};
use config::Config;
use push::PushSender;
use sockets::broadcast::ConnectionSink;
use store::DataStore;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DataStore>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Serves the backend endpoints of this deployment.
    pub local: Arc<LocalBackend>,
    /// What dashboard actions call: `local`, or a remote backend when one is configured.
    pub backend: Arc<dyn AdminBackend>,
    pub sink: Option<Arc<dyn ConnectionSink>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DataStore>,
        identity: Arc<dyn IdentityProvider>,
        push: Option<Arc<dyn PushSender>>,
        sink: Option<Arc<dyn ConnectionSink>>,
    ) -> Arc<Self> {
        let local = Arc::new(LocalBackend::new(store.clone(), identity.clone(), push));
        let backend: Arc<dyn AdminBackend> =
            match (&config.admin_backend_url, &config.admin_backend_key) {
                (Some(url), Some(key)) => {
                    tracing::info!("Using remote admin backend at {}", url);
                    Arc::new(HttpAdminBackend::new(url.clone(), key.clone()))
                }
                _ => local.clone(),
            };

        Arc::new(Self {
            config,
            store,
            identity,
            local,
            backend,
            sink,
        })
    }
}

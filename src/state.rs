use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AttachmentService, AuthService, AuthThrottle, BlobStore, HttpBlobStore, LocalBlobStore,
    LogNotifier, MailNotifier, Notifier, SeaOrmAuthService, TicketService,
};

/// Build a shared HTTP client with reasonable defaults for outbound calls.
/// Reused across services to enable connection pooling.
fn build_shared_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent("Helpdesk/1.0")
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

/// Everything wired once at startup and shared by every request.
pub struct SharedState {
    pub config: Config,

    pub store: Store,

    pub tickets: TicketService,

    pub attachments: AttachmentService,

    pub auth: Arc<dyn AuthService>,

    pub throttle: Arc<AuthThrottle>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?
        .with_security(config.security.clone());

        let http_client = build_shared_http_client()?;

        let blob: Arc<dyn BlobStore> = match &config.storage.remote_endpoint {
            Some(endpoint) => Arc::new(HttpBlobStore::new(
                http_client.clone(),
                endpoint.clone(),
                config.storage.remote_access_token.clone(),
            )),
            None => Arc::new(LocalBlobStore::new(&config.storage.upload_path)),
        };

        let notifier: Arc<dyn Notifier> = match &config.mail.endpoint {
            Some(endpoint) => Arc::new(MailNotifier::new(
                http_client,
                endpoint.clone(),
                config.mail.from.clone(),
            )),
            None => Arc::new(LogNotifier),
        };

        let tickets = TicketService::new(store.clone(), blob.clone());
        let attachments = AttachmentService::new(store.clone(), blob);
        let auth: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            notifier,
            config.general.public_base_url.clone(),
        ));
        let throttle = Arc::new(AuthThrottle::new(&config.security.auth_throttle));

        Ok(Self {
            config,
            store,
            tickets,
            attachments,
            auth,
            throttle,
        })
    }
}

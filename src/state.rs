use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, DispatchService, ProbeService};

/// Application context constructed once at startup and handed to every
/// handler. There is no ambient global state.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub auth: Arc<AuthService>,

    pub dispatcher: Arc<DispatchService>,

    pub prober: Arc<ProbeService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::new(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        store.bootstrap_admin(&config.security).await?;

        let auth = Arc::new(AuthService::new(store.clone(), &config.security)?);

        let dispatcher = Arc::new(DispatchService::new(
            config.transfer.clone(),
            config.general.staging_path.clone(),
        ));

        let prober = Arc::new(ProbeService::new(
            config.inspect.clone(),
            config.general.staging_path.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            auth,
            dispatcher,
            prober,
        })
    }
}

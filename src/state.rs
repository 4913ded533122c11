use crate::backend::{Backend, MemoryBackend, RestBackend};
use crate::config::{BackendConfig, Config};
use crate::picker::{PhotosClient, PickerRegistry};
use crate::storage::{FlagStore, load_flags};
use crate::sync::EntrySync;
use reqwest::Client;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<EntrySync>,
    pub photos: Arc<PhotosClient>,
    pub pickers: PickerRegistry,
    pub picker_poll_interval: Duration,
    pub flags_path: PathBuf,
    pub flags: Arc<Mutex<FlagStore>>,
}

impl AppState {
    pub fn new(
        sync: EntrySync,
        photos: PhotosClient,
        picker_poll_interval: Duration,
        flags_path: PathBuf,
        flags: FlagStore,
    ) -> Self {
        Self {
            sync: Arc::new(sync),
            photos: Arc::new(photos),
            pickers: PickerRegistry::default(),
            picker_poll_interval,
            flags_path,
            flags: Arc::new(Mutex::new(flags)),
        }
    }

    pub async fn from_config(config: &Config) -> reqwest::Result<Self> {
        let client = http_client(config.http_timeout)?;
        let backend = match &config.backend {
            BackendConfig::Rest { url, api_key } => {
                info!(%url, "using hosted backend");
                Backend::Rest(RestBackend::new(client.clone(), url, api_key))
            }
            BackendConfig::Memory { access_token } => {
                let memory = MemoryBackend::new();
                let user = memory.register_user(access_token, None).await;
                info!(%user, "using in-memory backend");
                Backend::Memory(memory)
            }
        };

        let flags = load_flags(&config.data_path).await;
        Ok(Self::new(
            EntrySync::with_ttl(backend, config.cache_ttl),
            PhotosClient::new(client, &config.photos_api_url),
            config.picker_poll_interval,
            config.data_path.clone(),
            flags,
        ))
    }
}

/// Shared by the hosted backend and the photo picker.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

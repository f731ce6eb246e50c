//! Application state wiring all services together.
//!
//! The core is generic over its ports; AppState pins them to the concrete
//! infra implementations. The encryption backend depends on the `e2ee`
//! feature.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chessbot_core::chess::PngBoardRenderer;
use chessbot_core::delivery::{DeliveryPipeline, RetryPolicy};
use chessbot_core::dispatch::{EventRouter, RoomDispatcher};
use chessbot_core::session::GameController;
use chessbot_infra::matrix::{MatrixClient, SyncLoop};
use chessbot_infra::sqlite::{
    DatabasePool, SqliteDeviceStore, SqliteRoomStateStore, SqliteSessionStore, SqliteSyncTokenStore,
};
use chessbot_types::config::BotConfig;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "e2ee")]
pub type AppCrypto = chessbot_infra::matrix::OlmCrypto;

#[cfg(not(feature = "e2ee"))]
pub type AppCrypto = chessbot_infra::matrix::DisabledCrypto;

/// Concrete type aliases for the core generics pinned to infra implementations.
pub type ConcreteDelivery = DeliveryPipeline<MatrixClient, AppCrypto, SqliteRoomStateStore>;

pub type ConcreteController =
    GameController<SqliteSessionStore, MatrixClient, AppCrypto, SqliteRoomStateStore>;

pub type ConcreteDispatcher = RoomDispatcher<ConcreteController>;

pub type ConcreteSyncLoop = SyncLoop<ConcreteController, AppCrypto, SqliteRoomStateStore>;

pub struct AppState {
    pub config: BotConfig,
    pub device_id: String,
    pub dispatcher: Arc<ConcreteDispatcher>,
    pub sync: ConcreteSyncLoop,
    pub db_pool: DatabasePool,
    /// Stops the sync loop and refuses new dispatches; queued messages are
    /// still drained by [`RoomDispatcher::shutdown`].
    pub cancel: CancellationToken,
}

impl AppState {
    /// Open the database, log in (reusing the stored device), load the
    /// encryption backend and wire delivery, controller and router.
    pub async fn init(config: BotConfig, db_path: &Path, password: &SecretString) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::open(db_path)
            .await
            .with_context(|| format!("failed to open database {}", db_path.display()))?;

        let sync_timeout = Duration::from_millis(config.sync_timeout_ms);
        let client = Arc::new(
            MatrixClient::new(&config.homeserver, sync_timeout)
                .context("failed to create matrix client")?,
        );
        let retry = RetryPolicy::from(&config.retry);

        let devices = SqliteDeviceStore::new(db_pool.clone());
        let stored_device = devices
            .get_device_id(&config.username)
            .await
            .context("failed to read stored device id")?;
        let device_id = retry
            .run("login", |_| {
                client.login(
                    &config.username,
                    password,
                    stored_device.as_deref(),
                    &config.device_display_name,
                )
            })
            .await
            .context("login failed")?;
        devices
            .set_device_id(&config.username, &device_id)
            .await
            .context("failed to store device id")?;

        let crypto = Arc::new(load_crypto(&config, &client, &device_id).await?);
        let rooms = Arc::new(SqliteRoomStateStore::new(db_pool.clone()));
        let sessions = Arc::new(SqliteSessionStore::new(db_pool.clone()));

        let delivery: Arc<ConcreteDelivery> = Arc::new(DeliveryPipeline::new(
            Arc::clone(&client),
            Arc::clone(&crypto),
            Arc::clone(&rooms),
            retry,
        ));

        let controller = Arc::new(
            GameController::new(
                config.username.clone(),
                sessions,
                Arc::clone(&delivery),
                Arc::new(PngBoardRenderer::default()),
                env!("CARGO_PKG_VERSION"),
            )
            .with_source_url(config.source_url.clone()),
        );

        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(RoomDispatcher::new(controller, cancel.clone()));

        let router = Arc::new(EventRouter::new(
            config.username.clone(),
            Arc::clone(&dispatcher),
            delivery,
            Arc::clone(&crypto),
            rooms,
        ));

        let sync = SyncLoop::new(
            client,
            router,
            crypto,
            SqliteSyncTokenStore::new(db_pool.clone()),
            config.username.clone(),
            sync_timeout,
            retry,
        );

        Ok(Self {
            config,
            device_id,
            dispatcher,
            sync,
            db_pool,
            cancel,
        })
    }
}

#[cfg(feature = "e2ee")]
async fn load_crypto(config: &BotConfig, client: &Arc<MatrixClient>, device_id: &str) -> anyhow::Result<AppCrypto> {
    let crypto = AppCrypto::open(Arc::clone(client), &config.username, device_id, &config.crypto_store)
        .await
        .with_context(|| format!("failed to open crypto store {}", config.crypto_store.display()))?;
    // Publish device keys before the first sync.
    crypto
        .flush_outgoing()
        .await
        .context("failed to upload device keys")?;
    Ok(crypto)
}

#[cfg(not(feature = "e2ee"))]
async fn load_crypto(_config: &BotConfig, _client: &Arc<MatrixClient>, _device_id: &str) -> anyhow::Result<AppCrypto> {
    tracing::warn!("built without the e2ee feature; encrypted rooms will not work");
    Ok(AppCrypto::default())
}

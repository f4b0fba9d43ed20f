use std::sync::Arc;

use tracing::info;

use chat_service::config::Config;
use chat_service::db::init_pool;
use chat_service::error::AppError;
use chat_service::logging::init_tracing;
use chat_service::routes::build_router;
use chat_service::services::push::{DisabledPush, FcmPush, PushNotifier};
use chat_service::services::user_directory::PgUserDirectory;
use chat_service::migrations;
use chat_service::state::AppState;
use chat_service::websocket::RoomRegistry;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_tracing();

    let config = Config::from_env()?;
    let db = init_pool(&config.database_url).await?;
    migrations::run_all(&db).await?;

    let push: Arc<dyn PushNotifier> = match config.fcm_server_key.clone() {
        Some(key) => Arc::new(FcmPush::new(key)),
        None => {
            info!("FCM_SERVER_KEY not set; push delivery disabled");
            Arc::new(DisabledPush)
        }
    };

    let state = AppState {
        db: db.clone(),
        registry: RoomRegistry::new(),
        config: Arc::new(config.clone()),
        users: Arc::new(PgUserDirectory::new(db)),
        push,
    };

    let app = build_router(state.clone()).with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    info!(%addr, "chat service listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}

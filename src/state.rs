use crate::{
    config::Config,
    services::{push::PushNotifier, user_directory::UserDirectory},
    websocket::RoomRegistry,
};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: RoomRegistry,
    pub config: Arc<Config>,
    pub users: Arc<dyn UserDirectory>,
    pub push: Arc<dyn PushNotifier>,
}

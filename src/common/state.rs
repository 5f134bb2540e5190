// Application state shared across all handlers

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::SessionOrchestrator;

/// Application state containing database pool and the auth core
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub sessions: Arc<SessionOrchestrator>,
}

impl AppState {
    pub fn new(db: SqlitePool, sessions: SessionOrchestrator) -> Self {
        Self {
            db,
            sessions: Arc::new(sessions),
        }
    }
}

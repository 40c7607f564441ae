use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::db::{schema::ALL_TABLES, MemoryStore, Store};
use crate::posts::PostService;
use crate::users::UserService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub users: UserService,
    pub posts: PostService,
    pub auth: AuthService,
}

impl AppState {
    /// Services are built once here and shared by every request.
    pub fn new(store: Arc<dyn Store>, config: Arc<AppConfig>) -> Self {
        let users = UserService::new(store.clone());
        let auth = AuthService::new(users.clone(), store.clone(), &config.auth);
        Self {
            posts: PostService::new(store.clone()),
            users,
            auth,
            store,
            config,
        }
    }

    /// State over a fresh in-process store; no database needed.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new(ALL_TABLES)), Arc::new(config))
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::in_memory(AppConfig::for_tests())
    }
}

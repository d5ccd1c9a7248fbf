use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::config::Settings;
use crate::presence::PresenceRegistry;
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_keys: Arc<JwtKeys>,
    pub users: Arc<UserStore>,
    pub registry: Arc<PresenceRegistry>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jwt_keys = Arc::new(JwtKeys::new(&settings.jwt));
        let users = Arc::new(UserStore::new());
        let registry = Arc::new(PresenceRegistry::new());

        Self {
            settings: Arc::new(settings),
            jwt_keys,
            users,
            registry,
        }
    }
}

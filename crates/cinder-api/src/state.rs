use std::sync::Arc;

use cinder_engine::PasteService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: Arc<PasteService>,
    pub jwt_secret: String,
    /// Base for links handed back to creators, without a trailing slash.
    pub public_url: String,
    pub max_paste_bytes: usize,
}

impl AppStateInner {
    pub fn paste_url(&self, short_id: &str) -> String {
        format!("{}/pastes/{}", self.public_url.trim_end_matches('/'), short_id)
    }

    /// Link that carries a random-key paste's capability.
    pub fn access_link(&self, short_id: &str, key: &str) -> String {
        format!("{}?key={}", self.paste_url(short_id), key)
    }
}

pub mod config;
pub mod error;
pub mod hub;
pub mod page;
pub mod websocket;

use std::sync::Arc;
use actix_web::web;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use hub::{Hub, HubHandle};
pub use page::LandingPage;

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub page: Arc<LandingPage>,
}

impl AppState {
    pub fn new(config: &Settings, hub: HubHandle) -> Result<Self> {
        let page = LandingPage::load(&config.page.template)?;

        Ok(Self {
            hub,
            page: Arc::new(page),
        })
    }
}

/// The relay's two routes: the landing page and the websocket upgrade.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(page::home)))
        .service(web::resource("/ws").route(web::get().to(websocket::relay_route)));
}

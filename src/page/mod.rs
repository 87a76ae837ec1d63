//! Landing page served at `/`

use actix_web::{web, HttpRequest, HttpResponse};
use handlebars::Handlebars;
use serde_json::json;
use std::path::Path;
use tracing::info;

use crate::{AppState, Result};

const TEMPLATE_NAME: &str = "index";

pub struct LandingPage {
    registry: Handlebars<'static>,
}

impl LandingPage {
    /// Registers the template file. Missing or invalid templates fail here, at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut registry = Self::registry();
        registry.register_template_file(TEMPLATE_NAME, path.as_ref())?;
        info!("Landing page template loaded from {}", path.as_ref().display());
        Ok(Self { registry })
    }

    pub fn from_source(source: &str) -> Result<Self> {
        let mut registry = Self::registry();
        registry.register_template_string(TEMPLATE_NAME, source)?;
        Ok(Self { registry })
    }

    fn registry() -> Handlebars<'static> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry
    }

    pub fn render(&self, host: &str) -> Result<String> {
        Ok(self.registry.render(TEMPLATE_NAME, &json!({ "host": host }))?)
    }
}

/// `GET /`: the landing page with the requesting host filled in.
pub async fn home(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let body = state.page.render(req.connection_info().host())?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

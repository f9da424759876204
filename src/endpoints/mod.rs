use std::sync::Arc;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, HttpRequest, HttpResponse};

use crate::service::{RecommendationResult, RecommendationService};

pub mod index_resource;
pub mod recommend_resource;

/// State shared by all actix workers.
pub struct SharedHandlesAndConfig {
    pub service: Arc<RecommendationService>,
    pub qty_workers: usize,
}

/// Malformed or incomplete JSON bodies get the structured failure body with a 400.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        let body = RecommendationResult::rejected(format!("invalid request: {}", err));
        InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
    })
}

/// Registers the recommendation and status routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(recommend_resource::recommend_user)
        .service(recommend_resource::recommend_product)
        .service(index_resource::health)
        .service(index_resource::internal)
        .service(index_resource::reload);
}

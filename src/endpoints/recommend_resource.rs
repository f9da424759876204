use actix_web::{post, web, HttpResponse};
use serde::Deserialize;

use crate::endpoints::SharedHandlesAndConfig;
use crate::hybrid::MAX_ITEMS_TO_RECOMMEND;
use crate::io::UserId;
use crate::service::RecommendationResult;

#[derive(Debug, Deserialize)]
pub struct UserRecommendationRequest {
    user_id: UserId,
    n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProductRecommendationRequest {
    product_name: String,
    n: Option<usize>,
}

fn reject_oversized(how_many: Option<usize>) -> Option<HttpResponse> {
    match how_many {
        Some(n) if n > MAX_ITEMS_TO_RECOMMEND => Some(HttpResponse::BadRequest().json(
            RecommendationResult::rejected(format!(
                "n must not exceed {}, got {}",
                MAX_ITEMS_TO_RECOMMEND, n
            )),
        )),
        _ => None,
    }
}

fn respond(result: RecommendationResult) -> HttpResponse {
    if result.is_internal_failure() {
        HttpResponse::InternalServerError().json(result)
    } else {
        HttpResponse::Ok().json(result)
    }
}

#[post("/recommend/user")]
pub async fn recommend_user(
    data: web::Data<SharedHandlesAndConfig>,
    request: web::Json<UserRecommendationRequest>,
) -> HttpResponse {
    if let Some(response) = reject_oversized(request.n) {
        return response;
    }
    let service = data.service.clone();
    let user_id = request.user_id;
    let how_many = request.n;
    match web::block(move || service.recommend_for_user(user_id, how_many)).await {
        Ok(result) => respond(result),
        Err(e) => HttpResponse::InternalServerError()
            .json(RecommendationResult::rejected(e.to_string())),
    }
}

// Product names are matched case-insensitively against the catalog.
#[post("/recommend/product")]
pub async fn recommend_product(
    data: web::Data<SharedHandlesAndConfig>,
    request: web::Json<ProductRecommendationRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    if request.product_name.trim().is_empty() {
        return HttpResponse::BadRequest().json(RecommendationResult::rejected(
            "product_name must not be empty".to_string(),
        ));
    }
    if let Some(response) = reject_oversized(request.n) {
        return response;
    }
    let service = data.service.clone();
    match web::block(move || service.recommend_for_product(&request.product_name, request.n))
        .await
    {
        Ok(result) => respond(result),
        Err(e) => HttpResponse::InternalServerError()
            .json(RecommendationResult::rejected(e.to_string())),
    }
}

use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use num_format::{Locale, ToFormattedString};
use serde_json::json;

use crate::endpoints::SharedHandlesAndConfig;
use crate::service::RecommendationResult;
use web::Data;

#[get("/health")]
pub async fn health(data: Data<SharedHandlesAndConfig>) -> HttpResponse {
    let model = data.service.snapshot();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "users": model.user_index.len(),
        "products": model.catalog.len(),
        "trained_at": model.stats.trained_at,
    }))
}

#[post("/internal/reload")]
pub async fn reload(data: Data<SharedHandlesAndConfig>) -> HttpResponse {
    let service = data.service.clone();
    match web::block(move || service.reload()).await {
        Ok(Ok(())) => HttpResponse::Ok().json(json!({"success": true})),
        Ok(Err(e)) => HttpResponse::InternalServerError().json(RecommendationResult::failed(&e)),
        Err(e) => HttpResponse::InternalServerError()
            .json(RecommendationResult::rejected(e.to_string())),
    }
}

#[get("/internal")]
pub async fn internal(data: Data<SharedHandlesAndConfig>) -> HttpResponse {
    let fmt = |qty: usize| qty.to_formatted_string(&Locale::en);
    let model = data.service.snapshot();
    let stats = &model.stats;
    let params = data.service.params();

    let mut html = "<html>basketknn: hybrid grocery recommendations.<br />".to_string();

    html.push_str("<h3>Training data</h3>");
    html.push_str("Loaded: ");
    html.push_str(&stats.descriptive_name);
    html.push_str("<br />Qty order item records: ");
    html.push_str(&fmt(stats.qty_records));
    html.push_str("<br />Qty records after activity filter: ");
    html.push_str(&fmt(stats.qty_filtered_records));
    html.push_str("<br />Qty unique user ids: ");
    html.push_str(&fmt(stats.qty_unique_user_ids));
    html.push_str("<br />Qty unique product ids: ");
    html.push_str(&fmt(stats.qty_unique_product_ids));
    html.push_str("<br />Qty interactions: ");
    html.push_str(&fmt(stats.qty_interactions));
    html.push_str("<br />Catalog products: ");
    html.push_str(&fmt(stats.qty_catalog_products));
    html.push_str("<br />Vocabulary terms: ");
    html.push_str(&fmt(stats.qty_vocabulary_terms));
    html.push_str("<br />Trained at: ");
    html.push_str(&stats.trained_at.to_string());
    html.push_str("<br />Age (hours): ");
    let age_hours = (Utc::now().naive_utc() - stats.trained_at).num_hours();
    html.push_str(&age_hours.to_string());

    html.push_str("<h3>Model</h3>");
    html.push_str("<br />k : ");
    html.push_str(&params.neighborhood_size_k.to_string());
    html.push_str(" (closest users whose baskets become candidates)");
    html.push_str("<br />Max distinct aisles: ");
    html.push_str(&params.max_distinct_aisles.to_string());
    html.push_str("<br />Content similarity threshold: ");
    html.push_str(&params.content_similarity_threshold.to_string());
    html.push_str("<br />Candidate scoring: ");
    html.push_str(&format!("{:?}", params.candidate_scoring));
    html.push_str("<br />Qty items to recommend: ");
    html.push_str(&data.service.default_how_many().to_string());

    html.push_str("<h3>Machine instance</h3>");
    html.push_str("<br />Qty CPU's detected: ");
    html.push_str(&sys_info::cpu_num().unwrap_or(0).to_string());
    html.push_str("<br />Qty actix workers set: ");
    html.push_str(&data.qty_workers.to_string());
    html.push_str("<br />CPU speed: ");
    html.push_str(&sys_info::cpu_speed().unwrap_or(0).to_string());
    html.push_str("MHz");
    html.push_str("<br />Active processes on instance: ");
    html.push_str(&sys_info::proc_total().unwrap_or(0).to_string());
    html.push_str("<h3>Metrics</h3>");
    html.push_str("<a href=\"/internal/prometheus\">prometheus</a>");
    html.push_str("</html>");

    HttpResponse::Ok().content_type("text/html").body(html)
}

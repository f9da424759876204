use chrono::{NaiveDateTime, Utc};
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataStats {
    pub descriptive_name: String,
    pub qty_records: usize,
    pub qty_filtered_records: usize,
    pub qty_unique_user_ids: usize,
    pub qty_unique_product_ids: usize,
    pub qty_interactions: usize,
    pub qty_catalog_products: usize,
    pub qty_vocabulary_terms: usize,
    pub trained_at: NaiveDateTime,
}

pub struct DatasetShape {
    pub qty_records: usize,
    pub qty_filtered_records: usize,
    pub qty_unique_user_ids: usize,
    pub qty_unique_product_ids: usize,
    pub qty_interactions: usize,
    pub qty_catalog_products: usize,
    pub qty_vocabulary_terms: usize,
}

pub fn determine_training_data_statistics(
    descriptive_name: &str,
    shape: DatasetShape,
) -> TrainingDataStats {
    let stats = TrainingDataStats {
        descriptive_name: descriptive_name.to_string(),
        qty_records: shape.qty_records,
        qty_filtered_records: shape.qty_filtered_records,
        qty_unique_user_ids: shape.qty_unique_user_ids,
        qty_unique_product_ids: shape.qty_unique_product_ids,
        qty_interactions: shape.qty_interactions,
        qty_catalog_products: shape.qty_catalog_products,
        qty_vocabulary_terms: shape.qty_vocabulary_terms,
        trained_at: Utc::now().naive_utc(),
    };
    log_training_data_statistics(&stats);
    stats
}

pub fn log_training_data_statistics(stats: &TrainingDataStats) {
    let fmt = |qty: usize| qty.to_formatted_string(&Locale::en);
    info!("Loaded {}", stats.descriptive_name);
    info!(
        "\tRecords: {} (after filtering: {})",
        fmt(stats.qty_records),
        fmt(stats.qty_filtered_records)
    );
    info!(
        "\tMatrix: {} users x {} products, {} interactions",
        fmt(stats.qty_unique_user_ids),
        fmt(stats.qty_unique_product_ids),
        fmt(stats.qty_interactions)
    );
    info!(
        "\tCatalog: {} products, {} terms",
        fmt(stats.qty_catalog_products),
        fmt(stats.qty_vocabulary_terms)
    );
    info!("\tTrained at: {}", stats.trained_at);
}

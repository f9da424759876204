use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{RecoError, Result};
use crate::hybrid::fitted_model::FittedHybridModel;
use crate::hybrid::{self, RankingParams, Recommendation};
use crate::io::{self, UserId};

/// Outcome of a recommendation call. `recommendations` is present on success,
/// `message` carries the diagnostic otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<Recommendation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    internal_failure: bool,
}

impl RecommendationResult {
    pub fn ok(recommendations: Vec<Recommendation>) -> Self {
        RecommendationResult {
            success: true,
            recommendations: Some(recommendations),
            message: None,
            internal_failure: false,
        }
    }

    pub fn failed(error: &RecoError) -> Self {
        RecommendationResult {
            success: false,
            recommendations: None,
            message: Some(error.to_string()),
            internal_failure: !error.is_not_found(),
        }
    }

    pub fn rejected(message: String) -> Self {
        RecommendationResult {
            success: false,
            recommendations: None,
            message: Some(message),
            internal_failure: false,
        }
    }

    /// True when the failure was not caused by the request (unknown ids are).
    pub fn is_internal_failure(&self) -> bool {
        self.internal_failure
    }
}

/// Serves recommendations from the current model. Requests clone the `Arc` under a short
/// read lock, `reload` swaps in a fully loaded replacement.
pub struct RecommendationService {
    model: RwLock<Arc<FittedHybridModel>>,
    model_dir: PathBuf,
    params: RankingParams,
    default_how_many: usize,
}

impl RecommendationService {
    pub fn new(
        model: FittedHybridModel,
        model_dir: &Path,
        params: RankingParams,
        default_how_many: usize,
    ) -> Self {
        RecommendationService {
            model: RwLock::new(Arc::new(model)),
            model_dir: model_dir.to_path_buf(),
            params,
            default_how_many,
        }
    }

    pub fn from_model_dir(
        model_dir: &Path,
        params: RankingParams,
        default_how_many: usize,
    ) -> Result<Self> {
        let model = FittedHybridModel::load(model_dir)?;
        Ok(RecommendationService::new(
            model,
            model_dir,
            params,
            default_how_many,
        ))
    }

    /// Like `from_model_dir`, but hands back the structured failure to report when the
    /// artifact cannot be loaded.
    pub fn load_or_failure(
        model_dir: &Path,
        params: RankingParams,
        default_how_many: usize,
    ) -> std::result::Result<Self, RecommendationResult> {
        RecommendationService::from_model_dir(model_dir, params, default_how_many).map_err(|e| {
            error!("could not load model from {}: {}", model_dir.display(), e);
            RecommendationResult::failed(&e)
        })
    }

    pub fn snapshot(&self) -> Arc<FittedHybridModel> {
        Arc::clone(&self.model.read())
    }

    pub fn params(&self) -> &RankingParams {
        &self.params
    }

    pub fn default_how_many(&self) -> usize {
        self.default_how_many
    }

    pub fn recommend_for_user(
        &self,
        user_id: UserId,
        how_many: Option<usize>,
    ) -> RecommendationResult {
        let model = self.snapshot();
        let how_many = how_many.unwrap_or(self.default_how_many);
        into_result(hybrid::recommend_for_user(
            &model,
            user_id,
            how_many,
            &self.params,
        ))
    }

    pub fn recommend_for_product(
        &self,
        product_name: &str,
        how_many: Option<usize>,
    ) -> RecommendationResult {
        let model = self.snapshot();
        let how_many = how_many.unwrap_or(self.default_how_many);
        into_result(hybrid::recommend_for_product(
            &model,
            product_name,
            how_many,
            &self.params,
        ))
    }

    /// Loads the artifact from the model directory and replaces the served model. On
    /// failure the current model keeps serving.
    pub fn reload(&self) -> Result<()> {
        let replacement = FittedHybridModel::load(&self.model_dir).map_err(|e| {
            error!("reload from {} failed: {}", self.model_dir.display(), e);
            e
        })?;
        *self.model.write() = Arc::new(replacement);
        info!("reloaded model from {}", self.model_dir.display());
        Ok(())
    }
}

fn into_result(outcome: Result<Vec<Recommendation>>) -> RecommendationResult {
    match outcome {
        Ok(recommendations) => RecommendationResult::ok(recommendations),
        Err(e) => {
            if !e.is_not_found() {
                warn!("recommendation failed: {}", e);
            }
            RecommendationResult::failed(&e)
        }
    }
}

/// Loads and filters the training tables, fits the model and persists it to the model
/// directory.
pub fn train(config: &AppConfig) -> Result<FittedHybridModel> {
    let data_dir = config.training_data_path();
    let tables = io::read_training_tables(&data_dir, config.sample_limits())?;
    let filtered = io::merge_and_filter(&tables, config.activity_thresholds())?;

    // records are the purchase rows that joined with an order and a catalog product
    let model = FittedHybridModel::fit_with_catalog(
        &filtered.observations,
        filtered.catalog,
        &data_dir.display().to_string(),
        filtered.qty_merged_rows,
    )?;
    model.save(&config.model_dir())?;
    Ok(model)
}

use std::cmp::Ordering;
use std::str::FromStr;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::error::{RecoError, Result};
use crate::hybrid::fitted_model::FittedHybridModel;
use crate::hybrid::similarity::NeighborSearch;
use crate::io::{ProductId, ProductName, UserId};

pub mod catalog;
pub mod content_index;
pub mod fitted_model;
pub mod interaction_matrix;
pub mod neighbor_index;
pub mod similarity;

pub const DEFAULT_NEIGHBORHOOD_SIZE_K: usize = 20;
pub const DEFAULT_NUM_ITEMS_TO_RECOMMEND: usize = 10;
pub const DEFAULT_MAX_DISTINCT_AISLES: usize = 5;
pub const DEFAULT_CONTENT_SIMILARITY_THRESHOLD: f64 = 0.75;
/// Upper bound on `n` accepted from clients.
pub const MAX_ITEMS_TO_RECOMMEND: usize = 1_000;
const CANDIDATE_POOL_FACTOR: usize = 2;
const CONSTANT_CANDIDATE_SCORE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    pub product_name: ProductName,
    pub aisle: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateScoring {
    /// Every neighbour product scores 1.0.
    Constant,
    /// Sum of `1 - distance` over the neighbours that bought the product.
    DistanceWeighted,
}

impl FromStr for CandidateScoring {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(CandidateScoring::Constant),
            "distance_weighted" => Ok(CandidateScoring::DistanceWeighted),
            other => Err(format!("unknown candidate scoring: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RankingParams {
    pub neighborhood_size_k: usize,
    pub max_distinct_aisles: usize,
    pub content_similarity_threshold: f64,
    pub candidate_scoring: CandidateScoring,
}

impl Default for RankingParams {
    fn default() -> Self {
        RankingParams {
            neighborhood_size_k: DEFAULT_NEIGHBORHOOD_SIZE_K,
            max_distinct_aisles: DEFAULT_MAX_DISTINCT_AISLES,
            content_similarity_threshold: DEFAULT_CONTENT_SIMILARITY_THRESHOLD,
            candidate_scoring: CandidateScoring::Constant,
        }
    }
}

fn by_descending_score(left: &Recommendation, right: &Recommendation) -> Ordering {
    right
        .score
        .partial_cmp(&left.score)
        .unwrap_or(Ordering::Equal)
}

/// Products bought by the users closest to `user_id`, diversified by aisle.
pub fn recommend_for_user(
    model: &FittedHybridModel,
    user_id: UserId,
    how_many: usize,
    params: &RankingParams,
) -> Result<Vec<Recommendation>> {
    let user_row = model
        .user_index
        .position(&user_id)
        .ok_or(RecoError::UserNotFound(user_id))?;

    let neighbors = model
        .neighbor_index
        .kneighbors(user_row, params.neighborhood_size_k)?;

    // Candidates in neighbour order (closest first) and column order within a neighbour.
    let mut candidate_order: Vec<usize> = Vec::new();
    let mut candidate_scores: HashMap<usize, f64> = HashMap::new();
    for neighbor in neighbors.iter() {
        let basket = model.matrix.row(neighbor.row).ok_or_else(|| {
            RecoError::InternalComputation(format!("neighbor row {} missing", neighbor.row))
        })?;
        let contribution = match params.candidate_scoring {
            CandidateScoring::Constant => CONSTANT_CANDIDATE_SCORE,
            CandidateScoring::DistanceWeighted => 1.0 - neighbor.distance,
        };
        for column in basket.indices.iter() {
            let column = *column as usize;
            match candidate_scores.get_mut(&column) {
                Some(score) => {
                    if params.candidate_scoring == CandidateScoring::DistanceWeighted {
                        *score += contribution;
                    }
                }
                None => {
                    candidate_scores.insert(column, contribution);
                    candidate_order.push(column);
                }
            }
        }
    }
    let pool_size = how_many.saturating_mul(CANDIDATE_POOL_FACTOR);
    if params.candidate_scoring == CandidateScoring::Constant {
        // equal scores keep discovery order, so the pool can be cut before ranking
        candidate_order.truncate(pool_size);
    }

    let mut candidates: Vec<Recommendation> = candidate_order
        .into_iter()
        .filter_map(|column| {
            let product_id = model.product_index.id_at(column)?;
            let entry = model.catalog.get(product_id)?;
            Some(Recommendation {
                product_id,
                product_name: entry.product_name.clone(),
                aisle: entry.aisle.clone(),
                score: candidate_scores.get(&column).copied().unwrap_or_default(),
            })
        })
        .collect();
    candidates.sort_by(by_descending_score);
    candidates.truncate(pool_size);

    Ok(diversify_by_aisle(
        candidates,
        how_many,
        params.max_distinct_aisles,
    ))
}

/// Keeps candidates (already in descending score order) whose aisle is not yet represented,
/// until `max_distinct_aisles` aisles are represented; after that repeats are accepted.
pub fn diversify_by_aisle(
    candidates: Vec<Recommendation>,
    how_many: usize,
    max_distinct_aisles: usize,
) -> Vec<Recommendation> {
    let mut seen_aisles: HashSet<String> = HashSet::new();
    let mut accepted = Vec::new();
    for candidate in candidates.into_iter() {
        if accepted.len() >= how_many {
            break;
        }
        if !seen_aisles.contains(&candidate.aisle) || seen_aisles.len() >= max_distinct_aisles {
            seen_aisles.insert(candidate.aisle.clone());
            accepted.push(candidate);
        }
    }
    accepted
}

/// Products whose names are most similar to `product_name`, above the similarity threshold.
pub fn recommend_for_product(
    model: &FittedHybridModel,
    product_name: &str,
    how_many: usize,
    params: &RankingParams,
) -> Result<Vec<Recommendation>> {
    let product_row = model.catalog.find_by_name(product_name)?;
    let similarities = model.content_index.similarity(product_row)?;

    let mut ranked: Vec<usize> = (0..similarities.len()).collect();
    ranked.sort_by(|left, right| {
        similarities[*right]
            .partial_cmp(&similarities[*left])
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.cmp(right))
    });
    ranked.truncate(how_many.saturating_add(1));

    let recommendations = ranked
        .into_iter()
        .filter(|row| *row != product_row)
        .take(how_many)
        .filter(|row| similarities[*row] > params.content_similarity_threshold)
        .filter_map(|row| {
            model.catalog.entry_at(row).map(|entry| Recommendation {
                product_id: entry.product_id,
                product_name: entry.product_name.clone(),
                aisle: entry.aisle.clone(),
                score: similarities[row],
            })
        })
        .collect();
    Ok(recommendations)
}

#[cfg(test)]
mod hybrid_test {
    use float_cmp::approx_eq;

    use super::*;
    use crate::hybrid::catalog::CatalogEntry;
    use crate::io::Observation;

    fn entry(product_id: ProductId, product_name: &str, aisle: &str) -> CatalogEntry {
        CatalogEntry {
            product_id,
            product_name: product_name.to_string(),
            aisle_id: 0,
            aisle: aisle.to_string(),
            department_id: 0,
        }
    }

    fn obs(user_id: UserId, product_id: ProductId) -> Observation {
        Observation {
            user_id,
            product_id,
            reordered: false,
        }
    }

    fn rec(product_id: ProductId, aisle: &str) -> Recommendation {
        Recommendation {
            product_id,
            product_name: format!("product {}", product_id),
            aisle: aisle.to_string(),
            score: 1.0,
        }
    }

    fn grocery_model() -> FittedHybridModel {
        let catalog = vec![
            entry(1, "Organic Bananas", "Fresh Fruits"),
            entry(2, "Banana Chips", "Snacks"),
            entry(3, "Bananas, Organic", "Fresh Fruits"),
            entry(4, "Whole Milk", "Milk"),
        ];
        let observations = vec![obs(10, 1), obs(10, 2), obs(20, 1), obs(20, 3), obs(20, 4)];
        FittedHybridModel::fit(&observations, catalog, "unittest", observations.len()).unwrap()
    }

    #[test]
    fn should_fail_for_unknown_user() {
        let model = grocery_model();
        let result = recommend_for_user(&model, 99, 10, &RankingParams::default());
        assert!(matches!(result, Err(RecoError::UserNotFound(99))));
    }

    #[test]
    fn should_return_partial_list_for_single_neighbor() {
        let model = grocery_model();
        let recommendations =
            recommend_for_user(&model, 10, 10, &RankingParams::default()).unwrap();

        // the only neighbour (user 20) bought products 1, 3 and 4
        assert!(recommendations.len() <= 3);
        let product_ids: Vec<ProductId> = recommendations.iter().map(|r| r.product_id).collect();
        assert_eq!(vec![1, 4], product_ids);
        assert!(recommendations.iter().all(|r| r.score == 1.0));
    }

    fn shared_basket_model() -> FittedHybridModel {
        let product_ids = [100, 101, 1, 2, 3, 4, 9];
        let catalog = product_ids
            .iter()
            .map(|id| entry(*id, &format!("item {}", id), &format!("aisle {}", id)))
            .collect();
        // user 2 is the closest neighbour of user 1, users 3 to 6 all bought product 9
        let mut observations = vec![obs(1, 100), obs(1, 101)];
        for product_id in [100, 101, 1, 2, 3, 4] {
            observations.push(obs(2, product_id));
        }
        for user_id in 3..=6 {
            observations.push(obs(user_id, 100));
            observations.push(obs(user_id, 9));
        }
        FittedHybridModel::fit(&observations, catalog, "unittest", observations.len()).unwrap()
    }

    #[test]
    fn should_rank_products_shared_by_many_neighbors_when_weighted() {
        let model = shared_basket_model();
        let params = RankingParams {
            candidate_scoring: CandidateScoring::DistanceWeighted,
            ..RankingParams::default()
        };

        let top_two = recommend_for_user(&model, 1, 2, &params).unwrap();
        let product_ids: Vec<ProductId> = top_two.iter().map(|r| r.product_id).collect();
        assert_eq!(vec![100, 9], product_ids);
        // user 2 has similarity 1/sqrt(3), users 3 to 6 have similarity 0.5 each
        let closest_similarity = 1.0 / 3.0_f64.sqrt();
        assert!(approx_eq!(f64, 2.0 + closest_similarity, top_two[0].score, epsilon = 1e-9));
        assert!(approx_eq!(f64, 2.0, top_two[1].score, epsilon = 1e-9));

        let top_five = recommend_for_user(&model, 1, 5, &params).unwrap();
        let product_ids: Vec<ProductId> = top_five.iter().map(|r| r.product_id).collect();
        assert_eq!(vec![100, 9, 101, 1, 2], product_ids);
        assert!(top_five[2..]
            .iter()
            .all(|r| approx_eq!(f64, closest_similarity, r.score, epsilon = 1e-9)));
    }

    #[test]
    fn should_keep_discovery_order_with_constant_scores() {
        let model = shared_basket_model();
        let recommendations =
            recommend_for_user(&model, 1, 2, &RankingParams::default()).unwrap();
        let product_ids: Vec<ProductId> = recommendations.iter().map(|r| r.product_id).collect();
        assert_eq!(vec![100, 101], product_ids);
    }

    #[test]
    fn should_bound_results_for_huge_requested_length() {
        let model = grocery_model();
        let params = RankingParams::default();

        let for_user = recommend_for_user(&model, 10, usize::MAX, &params).unwrap();
        assert_eq!(2, for_user.len());

        let for_product =
            recommend_for_product(&model, "organic bananas", usize::MAX, &params).unwrap();
        assert_eq!(1, for_product.len());

        let candidates = vec![rec(1, "a"), rec(2, "b")];
        assert_eq!(2, diversify_by_aisle(candidates, usize::MAX, 5).len());
    }

    #[test]
    fn should_diversify_until_the_aisle_cap() {
        let candidates = vec![
            rec(1, "a"),
            rec(2, "a"),
            rec(3, "b"),
            rec(4, "c"),
            rec(5, "b"),
            rec(6, "d"),
            rec(7, "e"),
            rec(8, "a"),
            rec(9, "f"),
            rec(10, "c"),
        ];
        let accepted = diversify_by_aisle(candidates, 10, 5);
        let product_ids: Vec<ProductId> = accepted.iter().map(|r| r.product_id).collect();
        assert_eq!(vec![1, 3, 4, 6, 7, 8, 9, 10], product_ids);

        let first_five: HashSet<&str> = accepted[..5].iter().map(|r| r.aisle.as_str()).collect();
        assert_eq!(5, first_five.len());
    }

    #[test]
    fn should_stop_at_requested_length() {
        let candidates = (0..10).map(|id| rec(id, &id.to_string())).collect();
        assert_eq!(3, diversify_by_aisle(candidates, 3, 5).len());
    }

    #[test]
    fn should_match_product_name_ignoring_case_and_exclude_itself() {
        let model = grocery_model();
        let recommendations =
            recommend_for_product(&model, "organic bananas", 10, &RankingParams::default())
                .unwrap();

        assert!(recommendations.len() <= 10);
        assert!(recommendations.iter().all(|r| r.product_id != 1));
        assert!(recommendations.iter().all(|r| r.score > 0.75));
        let product_ids: Vec<ProductId> = recommendations.iter().map(|r| r.product_id).collect();
        assert_eq!(vec![3], product_ids);
    }

    #[test]
    fn should_return_empty_list_when_nothing_clears_the_threshold() {
        let model = grocery_model();
        let recommendations =
            recommend_for_product(&model, "WHOLE MILK", 10, &RankingParams::default()).unwrap();
        assert!(recommendations.is_empty());
    }

    #[test]
    fn should_fail_for_unknown_product() {
        let model = grocery_model();
        let result = recommend_for_product(&model, "kale", 10, &RankingParams::default());
        assert!(matches!(result, Err(RecoError::ProductNotFound(_))));
    }

    #[test]
    fn should_parse_candidate_scoring() {
        assert_eq!(
            Ok(CandidateScoring::DistanceWeighted),
            "Distance_Weighted".parse::<CandidateScoring>()
        );
        assert!("nearest".parse::<CandidateScoring>().is_err());
    }
}

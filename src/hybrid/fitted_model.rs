use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataframeutils::{determine_training_data_statistics, DatasetShape, TrainingDataStats};
use crate::error::{RecoError, Result};
use crate::hybrid::catalog::{CatalogEntry, ProductCatalog};
use crate::hybrid::content_index::ContentIndex;
use crate::hybrid::interaction_matrix::{
    build_interaction_matrix, CsrMatrix, ProductIndex, UserIndex,
};
use crate::hybrid::neighbor_index::NeighborIndex;
use crate::hybrid::similarity::NeighborSearch;
use crate::io::Observation;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;
pub const MODEL_FILE: &str = "hybrid_model.bin";
pub const MAPPINGS_FILE: &str = "mappings.bin";
pub const MATRIX_FILE: &str = "interaction_matrix.bin";

/// Everything a recommendation call reads. Never mutated after `fit` or `load`.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedHybridModel {
    pub neighbor_index: NeighborIndex,
    pub content_index: ContentIndex,
    pub catalog: ProductCatalog,
    pub matrix: CsrMatrix,
    pub user_index: UserIndex,
    pub product_index: ProductIndex,
    pub stats: TrainingDataStats,
}

#[derive(Serialize)]
struct ModelBundleRef<'a> {
    format_version: u32,
    neighbor_index: &'a NeighborIndex,
    content_index: &'a ContentIndex,
    catalog: &'a ProductCatalog,
    stats: &'a TrainingDataStats,
}

#[derive(Deserialize)]
struct ModelBundle {
    format_version: u32,
    neighbor_index: NeighborIndex,
    content_index: ContentIndex,
    catalog: ProductCatalog,
    stats: TrainingDataStats,
}

#[derive(Serialize)]
struct MappingsRef<'a> {
    user_index: &'a UserIndex,
    product_index: &'a ProductIndex,
}

#[derive(Deserialize)]
struct Mappings {
    user_index: UserIndex,
    product_index: ProductIndex,
}

impl FittedHybridModel {
    pub fn fit(
        observations: &[Observation],
        catalog_entries: Vec<CatalogEntry>,
        descriptive_name: &str,
        qty_records: usize,
    ) -> Result<Self> {
        Self::fit_with_catalog(
            observations,
            ProductCatalog::new(catalog_entries),
            descriptive_name,
            qty_records,
        )
    }

    pub fn fit_with_catalog(
        observations: &[Observation],
        catalog: ProductCatalog,
        descriptive_name: &str,
        qty_records: usize,
    ) -> Result<Self> {
        let start_time = Instant::now();
        let (matrix, user_index, product_index) = build_interaction_matrix(observations)?;
        info!(
            "interaction matrix: {:?}, {} interactions, {} ms",
            matrix.shape(),
            matrix.nnz(),
            start_time.elapsed().as_millis()
        );

        let start_time = Instant::now();
        let neighbor_index = NeighborIndex::fit(&matrix);
        info!("neighbor index fitted: {} ms", start_time.elapsed().as_millis());

        let start_time = Instant::now();
        let content_index = ContentIndex::fit(catalog.product_names());
        info!(
            "content index fitted: {} terms, {} ms",
            content_index.vocabulary_size(),
            start_time.elapsed().as_millis()
        );

        let stats = determine_training_data_statistics(
            descriptive_name,
            DatasetShape {
                qty_records,
                qty_filtered_records: observations.len(),
                qty_unique_user_ids: user_index.len(),
                qty_unique_product_ids: product_index.len(),
                qty_interactions: matrix.nnz(),
                qty_catalog_products: catalog.len(),
                qty_vocabulary_terms: content_index.vocabulary_size(),
            },
        );

        Ok(FittedHybridModel {
            neighbor_index,
            content_index,
            catalog,
            matrix,
            user_index,
            product_index,
            stats,
        })
    }

    /// Writes the three artifact files. Each file is written under a temporary name and
    /// renamed into place.
    pub fn save(&self, model_dir: &Path) -> Result<()> {
        fs::create_dir_all(model_dir)?;
        write_artifact(
            &model_dir.join(MODEL_FILE),
            &ModelBundleRef {
                format_version: ARTIFACT_FORMAT_VERSION,
                neighbor_index: &self.neighbor_index,
                content_index: &self.content_index,
                catalog: &self.catalog,
                stats: &self.stats,
            },
        )?;
        write_artifact(
            &model_dir.join(MAPPINGS_FILE),
            &MappingsRef {
                user_index: &self.user_index,
                product_index: &self.product_index,
            },
        )?;
        write_artifact(&model_dir.join(MATRIX_FILE), &self.matrix)?;
        info!("saved model artifacts to {}", model_dir.display());
        Ok(())
    }

    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let mappings_path = model_dir.join(MAPPINGS_FILE);
        let matrix_path = model_dir.join(MATRIX_FILE);
        for path in [&model_path, &mappings_path, &matrix_path] {
            if !path.is_file() {
                return Err(RecoError::ArtifactMissing(path.to_path_buf()));
            }
        }

        let bundle: ModelBundle = read_artifact(&model_path)?;
        if bundle.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(RecoError::InconsistentArtifact(format!(
                "format version {} is not supported (expected {})",
                bundle.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        let mappings: Mappings = read_artifact(&mappings_path)?;
        let matrix: CsrMatrix = read_artifact(&matrix_path)?;

        let model = FittedHybridModel {
            neighbor_index: bundle.neighbor_index,
            content_index: bundle.content_index,
            catalog: bundle.catalog,
            matrix,
            user_index: mappings.user_index,
            product_index: mappings.product_index,
            stats: bundle.stats,
        };
        model.check_consistency()?;
        info!(
            "loaded model artifacts from {} (trained at {})",
            model_dir.display(),
            model.stats.trained_at
        );
        Ok(model)
    }

    fn check_consistency(&self) -> Result<()> {
        if self.user_index.is_empty() || self.catalog.is_empty() {
            return Err(RecoError::InconsistentArtifact(format!(
                "artifact holds {} users and {} catalog products",
                self.user_index.len(),
                self.catalog.len()
            )));
        }
        let (num_users, num_products) = self.matrix.shape();
        if self.neighbor_index.shape() != self.matrix.shape()
            || self.neighbor_index.num_rows() != num_users
        {
            return Err(RecoError::InconsistentArtifact(format!(
                "neighbor index shape {:?} does not match matrix shape {:?}",
                self.neighbor_index.shape(),
                self.matrix.shape()
            )));
        }
        if self.user_index.len() != num_users || self.product_index.len() != num_products {
            return Err(RecoError::InconsistentArtifact(format!(
                "mappings ({} users, {} products) do not match matrix shape {:?}",
                self.user_index.len(),
                self.product_index.len(),
                self.matrix.shape()
            )));
        }
        if self.content_index.num_products() != self.catalog.len() {
            return Err(RecoError::InconsistentArtifact(format!(
                "content index has {} rows for a catalog of {} products",
                self.content_index.num_products(),
                self.catalog.len()
            )));
        }
        Ok(())
    }
}

fn write_artifact<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = temporary_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        bincode::serialize_into(&mut writer, value)?;
        std::io::Write::flush(&mut writer)?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

#[cfg(test)]
mod fitted_model_test {
    use super::*;
    use crate::hybrid::{recommend_for_product, recommend_for_user, RankingParams};

    fn fixture() -> FittedHybridModel {
        let names = [
            ("Organic Bananas", "fresh fruits"),
            ("Bananas Organic", "fresh fruits"),
            ("Banana Chips", "chips pretzels"),
            ("Whole Milk", "milk"),
            ("Organic Whole Milk", "milk"),
            ("Sourdough Bread", "bread"),
        ];
        let catalog = names
            .iter()
            .enumerate()
            .map(|(idx, (name, aisle))| CatalogEntry {
                product_id: 100 + idx as u32,
                product_name: name.to_string(),
                aisle_id: idx as u32,
                aisle: aisle.to_string(),
                department_id: 1,
            })
            .collect();
        let observations: Vec<Observation> = (0..30_u32)
            .map(|i| Observation {
                user_id: i % 5,
                product_id: 100 + (i * 7 % 6),
                reordered: i % 3 == 0,
            })
            .collect();
        FittedHybridModel::fit(&observations, catalog, "unittest", observations.len()).unwrap()
    }

    #[test]
    fn should_round_trip_through_artifact_files() {
        let dir = tempfile::tempdir().unwrap();
        let model = fixture();
        model.save(dir.path()).unwrap();
        let reloaded = FittedHybridModel::load(dir.path()).unwrap();
        assert_eq!(model, reloaded);

        let params = RankingParams::default();
        for user_id in 0..5 {
            assert_eq!(
                recommend_for_user(&model, user_id, 10, &params).unwrap(),
                recommend_for_user(&reloaded, user_id, 10, &params).unwrap()
            );
        }
        assert_eq!(
            recommend_for_product(&model, "organic bananas", 10, &params).unwrap(),
            recommend_for_product(&reloaded, "organic bananas", 10, &params).unwrap()
        );
        assert!(!dir.path().join("hybrid_model.bin.tmp").exists());
    }

    #[test]
    fn should_report_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        fixture().save(dir.path()).unwrap();
        fs::remove_file(dir.path().join(MAPPINGS_FILE)).unwrap();

        match FittedHybridModel::load(dir.path()) {
            Err(RecoError::ArtifactMissing(path)) => assert!(path.ends_with(MAPPINGS_FILE)),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn should_reject_mismatched_artifacts() {
        let first = tempfile::tempdir().unwrap();
        let model = fixture();
        model.save(first.path()).unwrap();

        let small_matrix = CsrMatrix::from_triplets(1, 1, &[(0, 0, 1.0)]).unwrap();
        write_artifact(&first.path().join(MATRIX_FILE), &small_matrix).unwrap();

        assert!(matches!(
            FittedHybridModel::load(first.path()),
            Err(RecoError::InconsistentArtifact(_))
        ));
    }

    #[test]
    fn should_reject_artifact_without_users() {
        let dir = tempfile::tempdir().unwrap();
        let model = fixture();
        model.save(dir.path()).unwrap();

        let no_users = UserIndex::new();
        write_artifact(
            &dir.path().join(MAPPINGS_FILE),
            &MappingsRef {
                user_index: &no_users,
                product_index: &model.product_index,
            },
        )
        .unwrap();

        match FittedHybridModel::load(dir.path()) {
            Err(RecoError::InconsistentArtifact(reason)) => {
                assert!(reason.contains("0 users"), "{}", reason)
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}

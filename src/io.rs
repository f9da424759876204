use std::path::Path;

use hashbrown::{HashMap, HashSet};
use num_format::{Locale, ToFormattedString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::error::{RecoError, Result};
use crate::hybrid::catalog::{CatalogEntry, ProductCatalog};

pub type OrderId = u32;
pub type UserId = u32;
pub type ProductId = u32;
pub type AisleId = u32;
pub type DepartmentId = u32;
pub type ProductName = String;

pub const ORDERS_FILE: &str = "orders.csv";
pub const ORDER_ITEMS_FILE: &str = "order_products__prior.csv";
pub const PRODUCTS_FILE: &str = "products.csv";
pub const AISLES_FILE: &str = "aisles.csv";

/// A single purchase of a product by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub reordered: bool,
}

#[derive(Debug, Deserialize)]
pub struct OrderRow {
    pub order_id: OrderId,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRow {
    pub order_id: OrderId,
    pub product_id: ProductId,
    #[serde(deserialize_with = "deserialize_flag")]
    pub reordered: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProductRow {
    pub product_id: ProductId,
    pub product_name: ProductName,
    pub aisle_id: AisleId,
    pub department_id: DepartmentId,
}

#[derive(Debug, Deserialize)]
pub struct AisleRow {
    pub aisle_id: AisleId,
    pub aisle: String,
}

pub struct TrainingTables {
    pub orders: Vec<OrderRow>,
    pub order_items: Vec<OrderItemRow>,
    pub products: Vec<ProductRow>,
    pub aisles: Vec<AisleRow>,
}

/// Row caps used to train on a sample of the (large) orders and order-item files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleLimits {
    pub max_order_rows: Option<usize>,
    pub max_order_item_rows: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityThresholds {
    pub min_user_orders: usize,
    pub min_product_purchases: usize,
}

pub struct FilteredTrainingData {
    pub observations: Vec<Observation>,
    pub catalog: ProductCatalog,
    pub qty_merged_rows: usize,
}

pub fn read_training_tables(data_dir: &Path, limits: SampleLimits) -> Result<TrainingTables> {
    let orders = read_csv_table(
        &data_dir.join(ORDERS_FILE),
        &["order_id", "user_id"],
        limits.max_order_rows,
    )?;
    let order_items = read_csv_table(
        &data_dir.join(ORDER_ITEMS_FILE),
        &["order_id", "product_id", "reordered"],
        limits.max_order_item_rows,
    )?;
    let products = read_csv_table(
        &data_dir.join(PRODUCTS_FILE),
        &["product_id", "product_name", "aisle_id", "department_id"],
        None,
    )?;
    let aisles = read_csv_table(&data_dir.join(AISLES_FILE), &["aisle_id", "aisle"], None)?;

    Ok(TrainingTables {
        orders,
        order_items,
        products,
        aisles,
    })
}

/// Reads a headered csv file into rows of `T`, ignoring columns `T` does not name.
pub fn read_csv_table<T: DeserializeOwned>(
    path: &Path,
    required_columns: &[&str],
    max_rows: Option<usize>,
) -> Result<Vec<T>> {
    let file_name = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let missing = required_columns
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(RecoError::Schema {
            file: file_name,
            reason: format!("missing columns: {}", missing.join(", ")),
        });
    }

    let mut rows = Vec::new();
    let mut qty_skipped = 0_usize;
    for result in reader
        .deserialize::<T>()
        .take(max_rows.unwrap_or(usize::MAX))
    {
        match result {
            Ok(row) => rows.push(row),
            Err(_) => qty_skipped += 1,
        }
    }
    if qty_skipped > 0 {
        warn!(file = %file_name, qty_skipped, "unable to parse some input rows");
    }
    info!(
        "read {} rows from {}",
        rows.len().to_formatted_string(&Locale::en),
        file_name
    );
    Ok(rows)
}

/// Joins order items with orders, products and aisles, then drops inactive users and
/// rarely bought products. Both activity counts are taken on the same joined table.
pub fn merge_and_filter(
    tables: &TrainingTables,
    thresholds: ActivityThresholds,
) -> Result<FilteredTrainingData> {
    let catalog = build_catalog(&tables.products, &tables.aisles);

    let mut user_for_order: HashMap<OrderId, UserId> = HashMap::with_capacity(tables.orders.len());
    for order in tables.orders.iter() {
        user_for_order.entry(order.order_id).or_insert(order.user_id);
    }

    let merged: Vec<(OrderId, Observation)> = tables
        .order_items
        .iter()
        .filter(|item| catalog.contains(item.product_id))
        .filter_map(|item| {
            user_for_order.get(&item.order_id).map(|user_id| {
                (
                    item.order_id,
                    Observation {
                        user_id: *user_id,
                        product_id: item.product_id,
                        reordered: item.reordered,
                    },
                )
            })
        })
        .collect();

    let mut orders_per_user: HashMap<UserId, HashSet<OrderId>> = HashMap::new();
    let mut purchases_per_product: HashMap<ProductId, usize> = HashMap::new();
    for (order_id, observation) in merged.iter() {
        orders_per_user
            .entry(observation.user_id)
            .or_default()
            .insert(*order_id);
        *purchases_per_product.entry(observation.product_id).or_insert(0) += 1;
    }

    let active_users: HashSet<UserId> = orders_per_user
        .into_iter()
        .filter(|(_, orders)| orders.len() >= thresholds.min_user_orders)
        .map(|(user_id, _)| user_id)
        .collect();
    let active_products: HashSet<ProductId> = purchases_per_product
        .into_iter()
        .filter(|(_, qty)| *qty >= thresholds.min_product_purchases)
        .map(|(product_id, _)| product_id)
        .collect();

    let qty_merged_rows = merged.len();
    let observations: Vec<Observation> = merged
        .into_iter()
        .map(|(_, observation)| observation)
        .filter(|observation| {
            active_users.contains(&observation.user_id)
                && active_products.contains(&observation.product_id)
        })
        .collect();

    info!(
        "filtered data: {} rows ({} users, {} products)",
        observations.len().to_formatted_string(&Locale::en),
        active_users.len().to_formatted_string(&Locale::en),
        active_products.len().to_formatted_string(&Locale::en),
    );

    if observations.is_empty() {
        return Err(RecoError::EmptyDataset);
    }

    Ok(FilteredTrainingData {
        observations,
        catalog,
        qty_merged_rows,
    })
}

/// Products joined with their aisle names, in products-file order.
pub fn build_catalog(products: &[ProductRow], aisles: &[AisleRow]) -> ProductCatalog {
    let aisle_names: HashMap<AisleId, &str> = aisles
        .iter()
        .map(|row| (row.aisle_id, row.aisle.as_str()))
        .collect();

    let entries = products
        .iter()
        .filter_map(|product| {
            aisle_names
                .get(&product.aisle_id)
                .map(|aisle| CatalogEntry {
                    product_id: product.product_id,
                    product_name: product.product_name.clone(),
                    aisle_id: product.aisle_id,
                    aisle: aisle.to_string(),
                    department_id: product.department_id,
                })
        })
        .collect();

    ProductCatalog::new(entries)
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid reordered flag: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod io_test {
    use std::fs;

    use super::*;

    fn write_fixture(dir: &Path) {
        fs::write(
            dir.join(ORDERS_FILE),
            "order_id,user_id,eval_set,order_number\n\
             1,10,prior,1\n2,10,prior,2\n3,10,prior,3\n\
             4,20,prior,1\n5,20,prior,2\n\
             6,30,prior,1\n7,30,prior,2\n8,30,prior,3\n",
        )
        .unwrap();
        fs::write(
            dir.join(ORDER_ITEMS_FILE),
            "order_id,product_id,add_to_cart_order,reordered\n\
             1,100,1,0\n2,100,1,1\n3,100,1,1\n\
             4,100,1,0\n5,100,2,1\n\
             6,100,1,0\n7,200,1,0\n8,200,2,1\n\
             8,999,3,0\n",
        )
        .unwrap();
        fs::write(
            dir.join(PRODUCTS_FILE),
            "product_id,product_name,aisle_id,department_id\n\
             100,Organic Bananas,24,4\n\
             200,\"Banana Chips, Salted\",50,19\n",
        )
        .unwrap();
        fs::write(
            dir.join(AISLES_FILE),
            "aisle_id,aisle\n24,fresh fruits\n50,chips pretzels\n",
        )
        .unwrap();
    }

    #[test]
    fn should_filter_inactive_users_and_rare_products() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let tables = read_training_tables(dir.path(), SampleLimits::default()).unwrap();
        assert_eq!(2, tables.products.len());
        assert!(tables.order_items[1].reordered);

        let thresholds = ActivityThresholds {
            min_user_orders: 3,
            min_product_purchases: 5,
        };
        let filtered = merge_and_filter(&tables, thresholds).unwrap();

        // item 999 is not in the catalog, user 20 has two orders, product 200 two purchases
        assert_eq!(8, filtered.qty_merged_rows);
        assert_eq!(4, filtered.observations.len());
        assert!(filtered
            .observations
            .iter()
            .all(|observation| observation.product_id == 100 && observation.user_id != 20));
        assert_eq!(2, filtered.catalog.len());
    }

    #[test]
    fn should_fail_with_schema_error_on_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        fs::write(dir.path().join(AISLES_FILE), "aisle_id,name\n24,fresh fruits\n").unwrap();

        let result = read_training_tables(dir.path(), SampleLimits::default());
        assert!(matches!(result, Err(RecoError::Schema { .. })));
    }

    #[test]
    fn should_fail_with_empty_dataset_when_everything_is_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let tables = read_training_tables(dir.path(), SampleLimits::default()).unwrap();
        let thresholds = ActivityThresholds {
            min_user_orders: 10,
            min_product_purchases: 5,
        };
        assert!(matches!(
            merge_and_filter(&tables, thresholds),
            Err(RecoError::EmptyDataset)
        ));
    }

    #[test]
    fn should_respect_sample_limits() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let limits = SampleLimits {
            max_order_rows: Some(3),
            max_order_item_rows: Some(2),
        };
        let tables = read_training_tables(dir.path(), limits).unwrap();
        assert_eq!(3, tables.orders.len());
        assert_eq!(2, tables.order_items.len());
    }
}

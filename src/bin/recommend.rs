use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::info;

use basketknn::config::AppConfig;
use basketknn::init_tracing;
use basketknn::io::UserId;
use basketknn::service::{train, RecommendationService};

/// Without arguments, trains the model and prints sample recommendations.
#[derive(Parser, Debug)]
#[command(author, version, about = "Hybrid grocery recommendations from the command line")]
struct Args {
    #[arg(short, long, default_value = "")]
    config: String,

    /// Recommend for this user id.
    #[arg(short, long, conflicts_with = "product_name")]
    user: Option<UserId>,

    /// Recommend products with a similar name.
    #[arg(trailing_var_arg = true)]
    product_name: Vec<String>,

    #[arg(short, long)]
    n: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::new(&args.config).context("loading configuration failed")?;
    init_tracing(&config.log.level);

    let model_dir = config.model_dir();
    let params = config.ranking_params();
    let how_many = config.model.num_items_to_recommend;

    if args.user.is_some() || !args.product_name.is_empty() {
        let service = match RecommendationService::load_or_failure(&model_dir, params, how_many)
        {
            Ok(service) => service,
            Err(failure) => return print_json(&failure),
        };
        let result = match args.user {
            Some(user_id) => service.recommend_for_user(user_id, args.n),
            None => service.recommend_for_product(&args.product_name.join(" "), args.n),
        };
        return print_json(&result);
    }

    info!(
        "training from {} into {}",
        config.data.training_data_path,
        model_dir.display()
    );
    let model = train(&config).context("training failed")?;
    let sample_user = model.user_index.id_at(0);
    let sample_product = model
        .catalog
        .entry_at(0)
        .map(|entry| entry.product_name.clone());

    let service = RecommendationService::new(model, &model_dir, params, how_many);
    let user_sample = sample_user.map(|user_id| {
        json!({
            "user_id": user_id,
            "result": service.recommend_for_user(user_id, args.n),
        })
    });
    let product_sample = sample_product.map(|product_name| {
        let result = service.recommend_for_product(&product_name, args.n);
        json!({
            "product_name": product_name,
            "result": result,
        })
    });
    print_json(&json!({
        "user_sample": user_sample,
        "product_sample": product_sample,
    }))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("could not render result")?;
    println!("{}", rendered);
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use actix_web::http::header;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use actix_web_prom::PrometheusMetricsBuilder;
use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;

use basketknn::config::AppConfig;
use basketknn::endpoints::{configure, SharedHandlesAndConfig};
use basketknn::init_tracing;
use basketknn::service::RecommendationService;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serves hybrid grocery recommendations over HTTP")]
struct Args {
    /// Optional justconfig file, every key has a default.
    #[arg(default_value = "")]
    config: String,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::new(&args.config).context("loading configuration failed")?;
    init_tracing(&config.log.level);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let qty_workers = config.server.num_workers;
    let model_dir: PathBuf = config.model_dir();

    info!("loading model from {}", model_dir.display());
    let service = Arc::new(
        RecommendationService::from_model_dir(
            &model_dir,
            config.ranking_params(),
            config.model.num_items_to_recommend,
        )
        .with_context(|| format!("could not load model from {}", model_dir.display()))?,
    );

    info!("start metrics");
    let prometheus = PrometheusMetricsBuilder::new("api")
        .endpoint("/internal/prometheus")
        .build()
        .map_err(|e| anyhow!("could not build prometheus middleware: {}", e))?;

    let shared = web::Data::new(SharedHandlesAndConfig {
        service,
        qty_workers,
    });

    info!("Done. start httpd at http://{}", &bind_address);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(prometheus.clone())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("Cache-Control", "no-cache, no-store, must-revalidate"))
                    .add(("Pragma", "no-cache"))
                    .add(("Expires", "0")),
            )
            .app_data(shared.clone())
            .configure(configure)
            .service(web::resource("/").route(web::get().to(|| async {
                HttpResponse::Found()
                    .insert_header((header::LOCATION, "/internal"))
                    .finish()
            })))
    })
    .workers(qty_workers)
    .bind(&bind_address)
    .with_context(|| format!("could not bind server to address {}", &bind_address))?
    .run()
    .await
    .context("http server stopped with an error")
}

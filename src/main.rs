//! Text summarization and sentiment analysis web server

use tokio_text_inference_api::api;
use tokio_text_inference_api::core::sentiment::SentimentFeature;
use tokio_text_inference_api::core::summarize::SummarizeFeature;
use tokio_text_inference_api::infrastructure::documents::StaticDocumentSource;
use tokio_text_inference_api::infrastructure::pipelines::RemotePipelineFactory;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::response::Html;
use axum::routing::get;
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    let web_task_handle = runtime.spawn(web_server_task());

    runtime.block_on(async {
        web_task_handle
            .await
            .expect("failed to join web_task_handle");
    });

    Ok(())
}

async fn web_server_task() {
    let provider = ServiceCollection::new()
        .add(StaticDocumentSource::singleton())
        .add(RemotePipelineFactory::singleton())
        .add(SummarizeFeature::singleton())
        .add(SentimentFeature::singleton())
        .build_provider()
        .unwrap();

    let app = Router::new()
        .route("/", get(index))
        .nest_service(
            "/static",
            ServiceBuilder::new().service(ServeDir::new("static")),
        )
        .nest("/summarize", api::summarize::router())
        .nest("/sentiment", api::sentiment::router())
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_origin([
                    "http://localhost:3000".parse::<HeaderValue>().unwrap(),
                    "http://localhost:5173".parse::<HeaderValue>().unwrap(),
                ]),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
    info!("Shutting down...");
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

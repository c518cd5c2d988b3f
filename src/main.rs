use actix_web::{middleware::Logger, web, App, HttpServer};
use std::io;
use std::sync::Arc;

use todone::auth::AuthMiddleware;
use todone::blob::DiskBlobStore;
use todone::classifier::{Classifier, DisabledClassifier, OpenAiClassifier};
use todone::config::Config;
use todone::ingest::worker;
use todone::routes::{self, health};
use todone::store::PgStore;
use todone::AppState;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(io::Error::other)?;

    let store = PgStore::connect(&config.database_url)
        .await
        .map_err(io::Error::other)?;
    store.migrate().await.map_err(io::Error::other)?;
    log::info!("Database ready");

    let blobs = DiskBlobStore::open(&config.upload_dir)?;
    log::info!("Storing attachments in {}", blobs.root().display());

    let classifier: Arc<dyn Classifier> = match OpenAiClassifier::new(&config.classifier) {
        Ok(classifier) => {
            log::info!("Classifying emails with {}", config.classifier.model);
            Arc::new(classifier)
        }
        Err(e) => {
            log::warn!("{}; every email will become a todo titled by its subject", e);
            Arc::new(DisabledClassifier)
        }
    };

    let state = AppState::new(Arc::new(store), Arc::new(blobs), classifier, &config.app);
    worker::spawn(Arc::clone(&state.ingestor), config.worker_poll_interval);

    let frontend_url = config.frontend_url.clone();
    let payload_limit = config.app.max_upload_bytes;
    log::info!("Starting ToDone server at {}", config.server_url());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().limit(payload_limit))
            .wrap(routes::cors(frontend_url.as_deref()))
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}

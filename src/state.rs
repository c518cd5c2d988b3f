use std::sync::Arc;

use crate::blob::BlobStore;
use crate::classifier::Classifier;
use crate::config::AppSettings;
use crate::ingest::Ingestor;
use crate::store::{AccountStore, JobQueue, MailStore, TaskStore};

/// Handles shared by every request handler, registered as `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub mail: Arc<dyn MailStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub ingestor: Arc<Ingestor>,
    pub settings: AppSettings,
}

impl AppState {
    /// Wires every handle to one store implementing all storage traits.
    pub fn new<S>(
        store: Arc<S>,
        blobs: Arc<dyn BlobStore>,
        classifier: Arc<dyn Classifier>,
        settings: &AppSettings,
    ) -> Self
    where
        S: AccountStore + MailStore + TaskStore + JobQueue + 'static,
    {
        let accounts: Arc<dyn AccountStore> = store.clone();
        let mail: Arc<dyn MailStore> = store.clone();
        let tasks: Arc<dyn TaskStore> = store.clone();
        let jobs: Arc<dyn JobQueue> = store;

        let ingestor = Ingestor::new(
            Arc::clone(&accounts),
            Arc::clone(&mail),
            jobs,
            Arc::clone(&blobs),
            classifier,
            settings.worker,
        );

        Self {
            accounts,
            mail,
            tasks,
            blobs,
            ingestor: Arc::new(ingestor),
            settings: settings.clone(),
        }
    }
}

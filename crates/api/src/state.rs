use std::sync::Arc;

use amora_domain::integrity::IntegrityService;
use amora_domain::services::{cache::EventCache, telemetry::TelemetryGuard};
use amora_domain::storage::ObjectStore;
use amora_domain::webhook::{Reconciler, WebhookVerifier};
use amora_storage::SeaOrmStorage;

#[derive(Clone)]
pub struct AppState {
    reconciler: Arc<Reconciler<SeaOrmStorage>>,
    integrity: Arc<IntegrityService<SeaOrmStorage>>,
    telemetry: TelemetryGuard,
    admin_token: Arc<str>,
}

impl AppState {
    pub fn new(
        storage: SeaOrmStorage,
        verifier: WebhookVerifier,
        cache: Arc<dyn EventCache>,
        objects: Option<Arc<dyn ObjectStore>>,
        telemetry: TelemetryGuard,
        admin_token: &str,
    ) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(storage.clone(), verifier, cache)),
            integrity: Arc::new(IntegrityService::new(storage, objects)),
            telemetry,
            admin_token: Arc::from(admin_token),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<SeaOrmStorage> {
        self.reconciler.as_ref()
    }

    pub fn integrity(&self) -> &IntegrityService<SeaOrmStorage> {
        self.integrity.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }
}

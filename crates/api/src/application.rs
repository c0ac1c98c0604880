use std::{path::Path, sync::Arc};

#[cfg(unix)]
use std::fs;

use actix_web::{middleware::Logger, web, App, HttpServer};
use amora_domain::config::{ApiConfig, ConfigError};
use amora_domain::services::{
    cache::InMemoryEventCache,
    telemetry::{init_telemetry, TelemetryConfig, TelemetryError},
};
use amora_domain::storage::ObjectStore;
use amora_domain::webhook::WebhookVerifier;
use amora_storage::{HttpObjectStore, ObjectStoreError, SeaOrmStorage};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    handlers::{
        data_integrity_fix_handler, data_integrity_scan_handler, match_integrity_fix_handler,
        match_integrity_scan_handler, metrics_handler, stripe_webhook_handler,
    },
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    let objects: Option<Arc<dyn ObjectStore>> =
        match HttpObjectStore::from_config(config.object_storage())? {
            Some(store) => Some(Arc::new(store)),
            None => {
                warn!("object storage not configured; gallery existence checks are skipped");
                None
            }
        };

    let verifier = WebhookVerifier::new(config.stripe_webhook_secret(), config.webhook_tolerance());
    let cache = Arc::new(InMemoryEventCache::default());
    let state = AppState::new(
        storage,
        verifier,
        cache,
        objects,
        telemetry,
        config.admin_api_token(),
    );

    // Admin routes and metrics move to the internal listener when one exists.
    let admin_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let mut public_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(public_routes);
        if admin_on_public {
            app = app.configure(admin_routes);
        }
        app
    });

    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    info!(
        bind = config.api_unix_socket().unwrap_or(config.api_bind_address()),
        admin_on_public, "public listener ready"
    );
    let public_server = public_server.run();

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .configure(admin_routes)
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        info!("internal listener ready");
        Some(internal_server.run())
    } else {
        None
    };

    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

pub fn public_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/api/webhooks/stripe",
        web::post().to(stripe_webhook_handler),
    );
}

pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route(
            "/api/admin/data-integrity",
            web::get().to(data_integrity_scan_handler),
        )
        .route(
            "/api/admin/data-integrity",
            web::post().to(data_integrity_fix_handler),
        )
        .route(
            "/api/admin/match-integrity",
            web::get().to(match_integrity_scan_handler),
        )
        .route(
            "/api/admin/match-integrity",
            web::post().to(match_integrity_fix_handler),
        );
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] amora_domain::storage::StorageError),
    #[error("object storage error: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Removes a stale socket file left behind by an unclean shutdown.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    #[cfg(unix)]
    #[actix_web::test]
    async fn cleanup_socket_removes_stale_file() {
        use super::cleanup_socket;

        let path = std::env::temp_dir().join(format!(
            "amora-test-{}-{}.sock",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::write(&path, b"stub").expect("write socket file");
        cleanup_socket(path.to_str().unwrap()).expect("cleanup succeeds");
        assert!(!path.exists());
    }
}

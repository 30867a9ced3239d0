//! Infrastructure wiring: credential store selection and the auth service.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use gatekeeper_auth::{AuthService, CredentialStore};
use gatekeeper_infra::{InMemoryCredentialStore, PostgresCredentialStore, Settings, seed};

pub async fn build_services(settings: &Settings) -> anyhow::Result<Arc<AuthService>> {
    let service = if settings.use_persistent_stores {
        build_persistent_services(settings).await?
    } else {
        build_in_memory_services(settings).await?
    };

    let policy = service.policy();
    tracing::info!(
        lockout_threshold = policy.lockout_threshold,
        token_ttl_secs = policy.token_ttl.num_seconds(),
        bcrypt_cost = policy.bcrypt_cost,
        "auth service ready"
    );
    Ok(service)
}

/// In-memory store with the dev role catalog (and admin, if configured).
pub async fn build_in_memory_services(settings: &Settings) -> anyhow::Result<Arc<AuthService>> {
    let store = Arc::new(InMemoryCredentialStore::new());
    let service = Arc::new(AuthService::with_policy(
        store.clone(),
        settings.jwt_secret.as_bytes(),
        settings.auth_policy(),
    ));

    seed::seed_dev_catalog(&store, &service, settings.seed_admin_password.as_deref()).await?;
    Ok(service)
}

async fn build_persistent_services(settings: &Settings) -> anyhow::Result<Arc<AuthService>> {
    let database_url = settings
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store: Arc<dyn CredentialStore> = Arc::new(PostgresCredentialStore::new(pool));
    tracing::info!("using Postgres credential store");

    Ok(Arc::new(AuthService::with_policy(
        store,
        settings.jwt_secret.as_bytes(),
        settings.auth_policy(),
    )))
}

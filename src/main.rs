// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use authgate::{
    api::router,
    auth::{HttpKeySource, KeyResolver, PolicyTable, TokenVerifier},
    config::{LogFormat, Settings, DEFAULT_LOG_FILTER},
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn load_policies(path: Option<&str>) -> Result<PolicyTable, BoxError> {
    match path {
        Some(path) => {
            let document = std::fs::read_to_string(path)?;
            let table = PolicyTable::from_json(&document)?;
            info!(path, policies = table.all().len(), "loaded route policies");
            Ok(table)
        }
        None => Ok(PolicyTable::standard()),
    }
}

async fn run() -> Result<(), BoxError> {
    let settings = Settings::from_env()?;
    init_tracing(settings.log_format);

    let auth = &settings.auth;
    let source = HttpKeySource::new(auth.jwks_url.clone(), auth.fetch_timeout)?;
    let keys = KeyResolver::new(Arc::new(source))
        .with_fetch_timeout(auth.fetch_timeout)
        .with_miss_ttl(auth.miss_ttl);
    let verifier = TokenVerifier::new(Arc::new(keys), auth.verifier_settings());
    let state = AppState::new(verifier, load_policies(settings.policy_file.as_deref())?);

    // Warm the key cache; verification fetches on demand if this fails.
    match state.keys().prime().await {
        Ok(count) => info!(keys = count, jwks_url = %auth.jwks_url, "signing keys loaded"),
        Err(e) => warn!(error = %e, jwks_url = %auth.jwks_url, "signing keys unavailable at startup"),
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    info!(addr = %settings.bind, issuer = %auth.issuer, "authgate listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("authgate failed: {e}");
        std::process::exit(1);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::Request,
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{authenticate, enforce, policy::KEYS_MANAGE, Role, RoleRequirement, RoutePolicy},
    error::ErrorBody,
    state::AppState,
};

pub mod health;
pub mod identity;
pub mod keys;

pub fn router(state: AppState) -> Router {
    let keys_requirement = state
        .policies
        .get(KEYS_MANAGE)
        .map(|policy| policy.requirement.clone())
        .unwrap_or(RoleRequirement::Single(Role::Admin));

    let admin_routes = Router::new()
        .route("/admin/keys", get(keys::list_keys))
        .route("/admin/keys/reload", post(keys::reload_keys))
        .route_layer(from_fn(move |req: Request, next: Next| enforce(keys_requirement.clone(), req, next)))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let v1_routes = Router::new()
        .route("/me", get(identity::me))
        .route("/policies", get(identity::list_policies))
        .route("/authorize/{policy}", get(identity::authorize_policy))
        .merge(admin_routes)
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        identity::me,
        identity::authorize_policy,
        identity::list_policies,
        keys::list_keys,
        keys::reload_keys
    ),
    components(
        schemas(
            ErrorBody,
            RoutePolicy,
            RoleRequirement,
            Role,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            identity::MeResponse,
            identity::AuthorizeResponse,
            identity::PolicyListResponse,
            keys::KeyCacheResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and key availability"),
        (name = "Identity", description = "Caller identity and forward-auth policy checks"),
        (name = "Admin", description = "Signing key cache administration")
    )
)]
struct ApiDoc;

use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auth::require_bearer;
use crate::error::panic_response;
use crate::state::AppState;
use crate::users;

pub fn build_app(state: AppState) -> Router {
    let mut user_routes = users::router();
    if state.config.jwt.required {
        tracing::info!("bearer authentication required on user routes");
        user_routes = user_routes.route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));
    }

    let router = Router::new()
        .route("/", get(root))
        .nest(
            "/api/v1",
            Router::new()
                .merge(user_routes)
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state);
    with_layers(router)
}

/// Outer middleware shared by every route: panic guard, CORS, request tracing.
fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

async fn root() -> Json<Value> {
    tracing::info!("root endpoint hit");
    Json(json!({ "message": "Bienvenido a la API de Gestión de Usuarios" }))
}

pub async fn serve(app: Router, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

pub mod auth;
mod cors;
pub mod error;
mod menu;
mod orders;
mod validation;
mod ws;


use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};

use crate::uploads::IMAGE_ROUTE;
use crate::AppState;

use self::error::ApiError;

/// Room for the text fields and multipart framing around an image
const FORM_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Session routes (public)
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/Login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout));

    // Public reads; the WebSocket handler authenticates the upgrade itself
    let public_routes = Router::new()
        .route("/menu", get(menu::list_menu_items))
        .route("/menu/:id", get(menu::get_menu_item))
        .route("/ws", get(ws::order_events_ws));

    // Any signed-in user
    let user_routes = Router::new()
        .route("/check-auth", get(auth::check_auth))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route(
            "/clientorders",
            get(orders::list_client_orders).post(orders::create_client_order),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    // Admin only
    let admin_routes = Router::new()
        .route("/menu", post(menu::create_menu_item))
        .route(
            "/menu/:id",
            put(menu::update_menu_item).delete(menu::delete_menu_item),
        )
        .route("/orders/:id", put(orders::update_order))
        .layer(DefaultBodyLimit::max(
            state.images.max_file_size() + FORM_OVERHEAD,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let api_routes = auth_routes
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .nest_service(IMAGE_ROUTE, ServeDir::new(state.images.dir()))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            cors::enforce_origin,
        ))
        .layer(cors::cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, exam, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, banks, grading dispatcher).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let exam_routes = Router::new()
        .route("/tests", get(exam::available_tests))
        .route("/results", get(exam::my_results))
        .route("/results/{id}", get(exam::result_detail))
        .route("/tests/{id}/start", post(exam::start_test))
        .route("/tests/{id}/finish", post(exam::finish_test))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/stats", get(admin::stats))
        .route("/tests", get(admin::list_tests).post(admin::create_test))
        .route("/tests/{id}", put(admin::update_test).delete(admin::delete_test))
        .route("/results", get(admin::list_results))
        .route("/results/{id}", get(admin::result_detail))
        .route("/results/{id}/override", post(admin::override_score))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exam", exam_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

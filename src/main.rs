use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use hiring_portal::{
    config::{get_config, init_config},
    database::pool::create_pool,
    middleware::auth,
    routes, signalling, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    app_state.user_service.ensure_default_admin().await?;

    // One-shot repair of artifact paths written by earlier releases.
    match app_state
        .artifact_service
        .normalize_stored_paths(&app_state.pool)
        .await
    {
        Ok(0) => {}
        Ok(n) => info!("Normalized {} legacy artifact paths", n),
        Err(e) => tracing::warn!("Artifact path normalization failed: {:?}", e),
    }

    let public_routes = Router::new()
        .route("/", get(routes::auth_routes::landing))
        .route("/health", get(routes::health::health))
        .route("/login", post(routes::auth_routes::login))
        .route("/logout", post(routes::auth_routes::logout))
        .route(
            "/register",
            get(routes::auth_routes::register_info).post(routes::auth_routes::register),
        )
        .route("/forgot-password", post(routes::auth_routes::forgot_password))
        .route(
            "/reset-password",
            get(routes::auth_routes::reset_password_form).post(routes::auth_routes::reset_password),
        );

    let admin_routes = Router::new()
        .route("/admin/dashboard", get(routes::admin_routes::dashboard))
        .route("/admin/invite", post(routes::auth_routes::invite))
        .route(
            "/admin/users/:id/deactivate",
            post(routes::admin_routes::deactivate_user),
        )
        .layer(axum::middleware::from_fn(auth::require_admin));

    let hr_routes = Router::new()
        .route("/hr/dashboard", get(routes::hr_routes::dashboard))
        .route("/hr/candidate", post(routes::hr_routes::create_candidate))
        .route("/hr/assign_candidate", post(routes::hr_routes::assign_candidate))
        .route(
            "/hr/reassign_candidate",
            post(routes::hr_routes::reassign_candidate),
        )
        .route(
            "/hr/reject_candidate",
            post(routes::hr_routes::reject_candidate),
        )
        .route(
            "/hr/candidate/:id",
            get(routes::hr_routes::candidate_detail)
                .patch(routes::hr_routes::update_candidate)
                .delete(routes::hr_routes::delete_candidate),
        )
        .layer(axum::middleware::from_fn(auth::require_hr));

    let manager_routes = Router::new()
        .route("/manager/dashboard", get(routes::manager_routes::dashboard))
        .route(
            "/manager/candidate/:id",
            get(routes::manager_routes::candidate_detail),
        )
        .route(
            "/manager/review/:id",
            post(routes::manager_routes::review_candidate),
        )
        .route(
            "/manager/reject/:id",
            post(routes::manager_routes::reject_candidate),
        )
        .layer(axum::middleware::from_fn(auth::require_manager));

    info!("Serving uploads from: {}", config.uploads_dir);

    let app = public_routes
        .merge(admin_routes)
        .merge(hr_routes)
        .merge(manager_routes)
        .route("/ws", get(signalling::ws::ws_handler))
        .nest_service(
            "/uploads",
            tower_http::services::ServeDir::new(&config.uploads_dir),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        // Intake carries two files at up to 10 MB each plus form overhead.
        .layer(DefaultBodyLimit::max(24 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    bill_sync::{
        AppState,
        adapters::{self, notifier::TracingNotifier, stripe_gateway::StripeGateway, verify::EventVerifier},
    },
    sqlx::postgres::PgPoolOptions,
    std::{env, sync::Arc, time::Duration},
    tokio::signal,
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let stripe_secret_key =
        env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set");
    // Optional on purpose: a missing webhook secret surfaces as a 5xx from
    // the verifier instead of a crash loop at boot.
    let stripe_webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").ok();
    if stripe_webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
    }

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let state = AppState {
        pool,
        verifier: EventVerifier::new(stripe_webhook_secret),
        gateway: Arc::new(StripeGateway::new(&stripe_secret_key)),
        notifier: Arc::new(TracingNotifier),
    };

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/webhook", post(adapters::webhook::webhook_handler))
        .route(
            "/users/{user_id}/subscription",
            get(adapters::api::get_subscription)
                .post(adapters::api::create_subscription)
                .put(adapters::api::update_subscription)
                .delete(adapters::api::delete_subscription),
        )
        .layer(DefaultBodyLimit::max(64 * 1024)) // 64 KB — processor events are typically <20 KB
        .layer(TimeoutLayer::new(Duration::from_secs(15)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!("listening on 0.0.0.0:3000");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

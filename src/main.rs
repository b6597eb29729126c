//! Lumina Payments - Mock KHQR Payment Service

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lumina_payments::{AppConfig, PaymentCreated, PaymentError, PaymentService, StatusReport, TransactionRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

#[derive(Clone)]
struct AppState {
    payments: Arc<PaymentService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let payments = Arc::new(config.build_service());

    // Maintenance loop: expire overdue records, surface ledger events.
    {
        let payments = payments.clone();
        let nats = match &config.nats_url {
            Some(url) => match async_nats::connect(url).await {
                Ok(client) => {
                    tracing::info!("connected to NATS at {}", url);
                    Some(client)
                }
                Err(e) => {
                    tracing::warn!("NATS connect failed ({}), events will only be logged: {}", url, e);
                    None
                }
            },
            None => None,
        };
        let every = Duration::from_secs(config.sweep_interval_secs);
        tokio::spawn(async move { run_maintenance(payments, nats, every).await });
    }

    let state = AppState { payments };
    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "lumina-payments"})) }))
        .route("/api/v1/payments/qr", post(create_payment_qr))
        .route("/api/v1/payments/status", post(check_payment_status))
        .route("/api/v1/payments/:identifier", get(get_payment_info))
        .route("/api/v1/payments/:identifier/qr-image", get(get_qr_image))
        .route("/api/v1/payments/:identifier/simulate", post(simulate_payment))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🚀 Lumina payments listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}

async fn run_maintenance(
    payments: Arc<PaymentService>,
    nats: Option<async_nats::Client>,
    every: Duration,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match payments.sweep_expired().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(expired = n, "swept overdue pending records"),
            Err(e) => tracing::error!("sweep failed: {}", e),
        }
        // drained regardless of NATS so the buffer stays bounded
        for event in payments.drain_events().await {
            let Some(client) = &nats else { continue };
            match serde_json::to_vec(&event) {
                Ok(body) => {
                    if let Err(e) = client.publish(event.subject().to_string(), body.into()).await {
                        tracing::warn!("event publish failed: {}", e);
                    }
                }
                Err(e) => tracing::warn!("event serialization failed: {}", e),
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct CreateQrRequest {
    #[validate(length(min = 1))]
    order_id: String,
    amount: Decimal,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String { "USD".to_string() }

#[derive(Debug, Deserialize, Validate)]
struct StatusRequest {
    #[validate(length(min = 1))]
    identifier: String,
}

async fn create_payment_qr(
    State(s): State<AppState>,
    Json(r): Json<CreateQrRequest>,
) -> Result<(StatusCode, Json<PaymentCreated>), (StatusCode, String)> {
    r.validate().map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let created = s
        .payments
        .create_payment(&r.order_id, r.amount, &r.currency)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn check_payment_status(
    State(s): State<AppState>,
    Json(r): Json<StatusRequest>,
) -> Result<Json<StatusReport>, (StatusCode, String)> {
    r.validate().map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let report = s.payments.check_status(&r.identifier).await.map_err(error_response)?;
    Ok(Json(report))
}

async fn get_payment_info(
    State(s): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<TransactionRecord>, (StatusCode, String)> {
    s.payments.payment_info(&identifier).await.map(Json).map_err(error_response)
}

async fn get_qr_image(
    State(s): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let url = s.payments.display_payload(&identifier).await.map_err(error_response)?;
    Ok(Json(serde_json::json!({ "url": url })))
}

async fn simulate_payment(
    State(s): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let success = s.payments.force_paid(&identifier).await.map_err(error_response)?;
    Ok(Json(serde_json::json!({ "success": success })))
}

fn error_response(err: PaymentError) -> (StatusCode, String) {
    let status = match err {
        PaymentError::InvalidAmount | PaymentError::UnsupportedCurrency(_) => StatusCode::BAD_REQUEST,
        PaymentError::NotFound => StatusCode::NOT_FOUND,
        PaymentError::DuplicateIdentifier => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

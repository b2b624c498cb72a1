//! Fundcore Server
//!
//! Thin HTTP surface over the settlement core: the gateway webhook entry
//! point, payment initiation, and the administrative distribution triggers.
//! No settlement logic lives here.
//!
//! The webhook route always acknowledges a syntactically accepted payload
//! with HTTP 200 (whether or not a matching intention was found), so the
//! gateway is never driven into a retry storm; only authenticity and parse
//! failures are rejected outright.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fundcore_allocation::{
    Allocator, InMemoryOpportunityDirectory, InvestmentBook, OpportunityDirectory,
};
use fundcore_distribution::DistributionEngine;
use fundcore_events::TracingSink;
use fundcore_gateway::{GatewayAdapter, GatewayNotification};
use fundcore_intentions::IntentionStore;
use fundcore_ledger::Ledger;
use fundcore_settlement::{SettlementEngine, SettlementOutcome};
use fundcore_types::{
    Currency, FundcoreError, IntentionId, IntentionPurpose, Investment, InvestmentId,
    InvestmentMode, Money, Opportunity, OpportunityId, OpportunityStatus, ProfileId,
};

use crate::config::ServerConfig;

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
struct AppState {
    adapter: GatewayAdapter,
    engine: SettlementEngine,
    intentions: IntentionStore,
    ledger: Ledger,
    directory: Arc<InMemoryOpportunityDirectory>,
    distribution: DistributionEngine,
    intention_ttl: chrono::Duration,
}

// ============================================================================
// Error Mapping
// ============================================================================

struct ApiError(FundcoreError);

impl From<FundcoreError> for ApiError {
    fn from(e: FundcoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use FundcoreError::*;
        let status = match &self.0 {
            SignatureInvalid => StatusCode::UNAUTHORIZED,
            MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            IntentionNotFound { .. }
            | PaymentNotFound { .. }
            | WalletNotFound { .. }
            | OpportunityNotFound { .. }
            | InvestmentNotFound { .. } => StatusCode::NOT_FOUND,
            AlreadyExecuted { .. }
            | InvalidTransition { .. }
            | WrongInvestmentMode { .. }
            | ProfitAlreadyRecorded { .. }
            | ProfitNotRecorded { .. } => StatusCode::CONFLICT,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Full detail stays in the log; callers get the generic message.
            error!(error = ?self.0, "internal error");
            return (
                status,
                Json(json!({ "error": "Processing failed", "code": "PROCESSING_FAILED" })),
            )
                .into_response();
        }

        (
            status,
            Json(json!({ "error": self.0.to_string(), "code": self.0.error_code() })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WalletChargeRequest {
    owner: ProfileId,
    amount_minor: i64,
    currency: Currency,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct InvestmentChargeRequest {
    investor: ProfileId,
    opportunity: OpportunityId,
    shares: u32,
    mode: InvestmentMode,
    currency: Currency,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct GatewaySessionRequest {
    gateway_order_id: String,
    gateway_intention_id: String,
}

#[derive(Debug, Deserialize)]
struct SeedOpportunityRequest {
    owner: ProfileId,
    total_shares: u32,
    min_shares: u32,
    max_shares: u32,
    share_price: Decimal,
    service_fee_per_share: Decimal,
    expected_profit_per_share: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ActualProfitRequest {
    profit_per_share: Decimal,
    net_profit_per_share: Decimal,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get("x-gateway-signature")
        .and_then(|h| h.to_str().ok())
    else {
        return ApiError(FundcoreError::SignatureInvalid).into_response();
    };

    let notification = match state.adapter.verify_and_normalize(&body, signature) {
        Ok(notification) => notification,
        Err(e) => return ApiError(e).into_response(),
    };

    match notification {
        GatewayNotification::Token { token_id } => {
            info!(token = %token_id, "token notification acknowledged");
            (StatusCode::OK, Json(json!({ "status": "ignored" }))).into_response()
        }
        GatewayNotification::Transaction(result) => match state.engine.settle(result).await {
            Ok(outcome) => {
                let (processed, status) = match &outcome {
                    SettlementOutcome::Completed { .. } => (true, "completed"),
                    SettlementOutcome::Failed { .. } => (true, "failed"),
                    SettlementOutcome::AlreadyFinalized { .. } => (true, "already_finalized"),
                    SettlementOutcome::NotMatched { .. } => (false, "not_matched"),
                };
                (
                    StatusCode::OK,
                    Json(json!({ "processed": processed, "status": status })),
                )
                    .into_response()
            }
            // The payload was accepted; a pre-commit failure is reported in
            // the body and the gateway's retry will re-enter settlement.
            Err(e) => {
                error!(error = %e, code = e.error_code(), "settlement attempt failed");
                (
                    StatusCode::OK,
                    Json(json!({ "processed": false, "code": e.error_code() })),
                )
                    .into_response()
            }
        },
    }
}

async fn create_wallet_charge(
    State(state): State<AppState>,
    Json(request): Json<WalletChargeRequest>,
) -> ApiResult<impl IntoResponse> {
    let intention = state
        .intentions
        .create(
            request.owner,
            IntentionPurpose::WalletCharge,
            Money::new(request.amount_minor, request.currency),
            request.reference,
            state.intention_ttl,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(intention)))
}

async fn create_investment_charge(
    State(state): State<AppState>,
    Json(request): Json<InvestmentChargeRequest>,
) -> ApiResult<impl IntoResponse> {
    let opportunity = state.directory.get(&request.opportunity).await?;

    let total = Investment::payment_required(
        request.shares,
        opportunity.share_price,
        opportunity.service_fee_per_share,
        request.mode,
    );
    let minor = (total * Decimal::from(100))
        .to_i64()
        .ok_or_else(|| FundcoreError::InvalidAmount {
            message: "Total payment does not fit in minor units".to_string(),
        })?;

    let intention = state
        .intentions
        .create(
            request.investor,
            IntentionPurpose::Investment {
                opportunity: opportunity.id,
                shares: request.shares,
                mode: request.mode,
                share_price: opportunity.share_price,
            },
            Money::new(minor, request.currency),
            request.reference,
            state.intention_ttl,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(intention)))
}

async fn register_gateway_session(
    State(state): State<AppState>,
    Path(id): Path<IntentionId>,
    Json(request): Json<GatewaySessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let intention = state
        .intentions
        .mark_active(&id, request.gateway_order_id, request.gateway_intention_id)
        .await?;
    Ok(Json(intention))
}

async fn get_wallet(
    State(state): State<AppState>,
    Path(profile): Path<ProfileId>,
) -> ApiResult<impl IntoResponse> {
    let balance = state.ledger.balance(&profile).await;
    let entries = state.ledger.account_entries(&profile).await;
    Ok(Json(json!({ "balance": balance, "entries": entries })))
}

async fn seed_opportunity(
    State(state): State<AppState>,
    Json(request): Json<SeedOpportunityRequest>,
) -> ApiResult<impl IntoResponse> {
    // Stand-in for the opportunity collaborator so the pipeline can be
    // driven end-to-end.
    let opportunity = Opportunity {
        id: OpportunityId::new(),
        owner: request.owner,
        status: OpportunityStatus::Open,
        total_shares: request.total_shares,
        reserved_shares: 0,
        min_shares: request.min_shares,
        max_shares: request.max_shares,
        share_price: request.share_price,
        service_fee_per_share: request.service_fee_per_share,
        expected_profit_per_share: request.expected_profit_per_share,
        actual_profit_per_share: None,
        actual_net_profit_per_share: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    state.directory.insert(opportunity.clone()).await;
    Ok((StatusCode::CREATED, Json(opportunity)))
}

async fn record_actual_profit(
    State(state): State<AppState>,
    Path(id): Path<OpportunityId>,
    Json(request): Json<ActualProfitRequest>,
) -> ApiResult<impl IntoResponse> {
    let updated = state
        .distribution
        .record_actual_profit(&id, request.profit_per_share, request.net_profit_per_share)
        .await?;
    Ok(Json(json!({ "investments_updated": updated })))
}

async fn distribute_profits(
    State(state): State<AppState>,
    Path(id): Path<OpportunityId>,
) -> ApiResult<impl IntoResponse> {
    let report = state.distribution.distribute_profits(&id).await?;
    Ok(Json(json!({
        "distributed": report.distributed,
        "skipped": report.skipped,
        "total_credited": report.total_credited,
    })))
}

async fn confirm_merchandise_arrival(
    State(state): State<AppState>,
    Path(id): Path<InvestmentId>,
) -> ApiResult<impl IntoResponse> {
    let investment = state.distribution.confirm_merchandise_arrival(&id).await?;
    Ok(Json(investment))
}

// ============================================================================
// Router & Main
// ============================================================================

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/payment", post(payment_webhook))
        .route("/payments/wallet-charges", post(create_wallet_charge))
        .route("/payments/investments", post(create_investment_charge))
        .route("/payments/:id/session", post(register_gateway_session))
        .route("/wallets/:profile", get(get_wallet))
        .route("/admin/opportunities", post(seed_opportunity))
        .route(
            "/admin/opportunities/:id/actual-profit",
            post(record_actual_profit),
        )
        .route("/admin/opportunities/:id/distribute", post(distribute_profits))
        .route(
            "/admin/investments/:id/merchandise-arrival",
            post(confirm_merchandise_arrival),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let intentions = IntentionStore::new();
    let ledger = Ledger::new();
    let directory = Arc::new(InMemoryOpportunityDirectory::new());
    let book = InvestmentBook::new();
    let events = Arc::new(TracingSink);

    let allocator = Allocator::new(directory.clone(), book.clone());
    let engine = SettlementEngine::with_lease_ttl(
        intentions.clone(),
        ledger.clone(),
        allocator,
        events.clone(),
        config.lease_ttl,
    );
    let distribution =
        DistributionEngine::new(directory.clone(), book, ledger.clone(), events);

    let state = AppState {
        adapter: GatewayAdapter::new(&config.gateway_secret),
        engine,
        intentions: intentions.clone(),
        ledger,
        directory,
        distribution,
        intention_ttl: config.intention_ttl,
    };

    // Background sweep: overdue intentions become Expired; terminal and
    // in-flight ones are left alone.
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let expired = intentions.expire_overdue(Utc::now()).await;
            if !expired.is_empty() {
                info!(count = expired.len(), "expired overdue payment intentions");
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "fundcore server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

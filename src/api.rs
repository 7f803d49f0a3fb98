// 🌐 REST API - axum router over the ledger
//
// Every response uses the same envelope. Form payloads carry the raw text a
// user typed; validation failures come back as 422 with per-field errors.
// SQLite work runs on the blocking pool.

use crate::cap_table::Position;
use crate::entities::{CapTransaction, Shareholder, ShareholderRegistry};
use crate::forms::{FieldError, FieldErrorKind, FundingRoundForm, ShareholderForm, TransactionForm};
use crate::ledger::{ActionError, CreateError, Ledger, TransactionActions};
use crate::lifecycle::{LifecycleAction, LifecycleError, Milestone};
use crate::tax_id::{self, HolderKind};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

// ============================================================================
// ENVELOPE & ERRORS
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub field_errors: Vec<FieldError>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            field_errors: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    field_errors: Vec<FieldError>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            field_errors: Vec::new(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::NOT_FOUND, message)
    }

    fn invalid(field_errors: Vec<FieldError>) -> Self {
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Validation failed".to_string(),
            field_errors,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
            field_errors: self.field_errors,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("request failed: {:#}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::NotFound(_) => ApiError::not_found(err.to_string()),
            ActionError::IllegalAction(LifecycleError::IllegalAction { .. }) | ActionError::InFlight(_) => {
                ApiError::new(StatusCode::CONFLICT, err.to_string())
            }
            ActionError::IllegalAction(other) => ApiError::new(StatusCode::BAD_REQUEST, other.to_string()),
            ActionError::Storage(e) => e.into(),
        }
    }
}

impl From<CreateError> for ApiError {
    fn from(err: CreateError) -> Self {
        match err {
            CreateError::Invalid(errors) => ApiError::invalid(errors),
            CreateError::Storage(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run ledger work on the blocking pool
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    F: FnOnce(&Ledger) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let ledger = state.ledger.clone();
    tokio::task::spawn_blocking(move || work(&ledger))
        .await
        .map_err(|e| ApiError::from(anyhow::Error::from(e)))?
}

// ============================================================================
// VIEWS
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareholderView {
    #[serde(flatten)]
    pub shareholder: Shareholder,
    pub formatted_tax_id: Option<String>,
}

impl From<Shareholder> for ShareholderView {
    fn from(shareholder: Shareholder) -> Self {
        ShareholderView {
            formatted_tax_id: shareholder.formatted_tax_id(),
            shareholder,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionView {
    pub action: LifecycleAction,
    pub label: String,
    pub confirmation_title: String,
    pub confirmation_message: String,
}

impl From<LifecycleAction> for ActionView {
    fn from(action: LifecycleAction) -> Self {
        ActionView {
            action,
            label: action.label().to_string(),
            confirmation_title: action.confirmation_title().to_string(),
            confirmation_message: action.confirmation_message().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub transaction: CapTransaction,
    pub milestones: Vec<Milestone>,
    pub available_actions: Vec<ActionView>,
    pub total_value: Option<f64>,
}

impl From<CapTransaction> for TransactionDetail {
    fn from(transaction: CapTransaction) -> Self {
        TransactionDetail {
            milestones: transaction.milestones(),
            available_actions: transaction
                .available_actions()
                .into_iter()
                .map(ActionView::from)
                .collect(),
            total_value: transaction.total_value(),
            transaction,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResult {
    pub message: String,
    pub detail: TransactionDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StakeView {
    pub shareholder_id: String,
    pub name: String,
    pub shares: u64,
    pub percent: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CapTableView {
    pub total_shares: u64,
    pub positions: Vec<Position>,
    pub ownership: Vec<StakeView>,
}

#[derive(Debug, Deserialize)]
pub struct TaxIdRequest {
    /// "cpf" / "cnpj" / "individual" / "organization"
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaxIdView {
    pub kind: HolderKind,
    pub digits: String,
    pub formatted: String,
    pub complete: bool,
    pub valid: bool,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/shareholders
async fn list_shareholders(State(state): State<AppState>) -> ApiResult<Vec<ShareholderView>> {
    let shareholders = blocking(&state, |ledger| Ok(ledger.shareholders()?)).await?;
    Ok(Json(ApiResponse::ok(
        shareholders.into_iter().map(ShareholderView::from).collect(),
    )))
}

/// POST /api/shareholders
async fn create_shareholder(
    State(state): State<AppState>,
    payload: Result<Json<ShareholderForm>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ShareholderView>>), ApiError> {
    let Json(form) = payload?;
    let input = form.validate().map_err(ApiError::invalid)?;
    let shareholder = blocking(&state, move |ledger| Ok(ledger.create_shareholder(input)?)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(shareholder.into()))))
}

/// GET /api/shareholders/:id
async fn get_shareholder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ShareholderView> {
    let shareholder = blocking(&state, move |ledger| {
        ledger
            .shareholder(&id)?
            .ok_or_else(|| ApiError::not_found(format!("shareholder {} not found", id)))
    })
    .await?;
    Ok(Json(ApiResponse::ok(shareholder.into())))
}

/// GET /api/rounds
async fn list_rounds(State(state): State<AppState>) -> ApiResult<Vec<crate::entities::FundingRound>> {
    let rounds = blocking(&state, |ledger| Ok(ledger.funding_rounds()?)).await?;
    Ok(Json(ApiResponse::ok(rounds)))
}

/// POST /api/rounds
async fn create_round(
    State(state): State<AppState>,
    payload: Result<Json<FundingRoundForm>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<crate::entities::FundingRound>>), ApiError> {
    let Json(form) = payload?;
    let input = form.validate().map_err(ApiError::invalid)?;
    let round = blocking(&state, move |ledger| Ok(ledger.create_funding_round(input)?)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(round))))
}

/// GET /api/transactions
async fn list_transactions(State(state): State<AppState>) -> ApiResult<Vec<CapTransaction>> {
    let transactions = blocking(&state, |ledger| Ok(ledger.transactions()?)).await?;
    Ok(Json(ApiResponse::ok(transactions)))
}

/// POST /api/transactions - new DRAFT
async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<TransactionForm>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionDetail>>), ApiError> {
    let Json(form) = payload?;
    let draft = form.validate().map_err(ApiError::invalid)?;
    let tx = blocking(&state, move |ledger| Ok(ledger.create_transaction(draft)?)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(tx.into()))))
}

/// GET /api/transactions/:id - with milestones and available actions
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TransactionDetail> {
    let tx = blocking(&state, move |ledger| {
        ledger
            .transaction(&id)?
            .ok_or_else(|| ApiError::from(ActionError::NotFound(id)))
    })
    .await?;
    Ok(Json(ApiResponse::ok(tx.into())))
}

/// POST /api/transactions/:id/:action - submit, approve, confirm, retry, cancel
async fn transaction_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> ApiResult<ActionResult> {
    let action: LifecycleAction = action
        .parse()
        .map_err(|e: LifecycleError| ApiError::not_found(e.to_string()))?;

    let tx = blocking(&state, move |ledger| Ok(ledger.perform(&id, action)?)).await?;
    Ok(Json(ApiResponse::ok(ActionResult {
        message: action.success_message().to_string(),
        detail: tx.into(),
    })))
}

/// GET /api/transactions/:id/events - audit trail, oldest first
async fn transaction_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<crate::db::Event>> {
    let events = blocking(&state, move |ledger| {
        if ledger.transaction(&id)?.is_none() {
            return Err(ActionError::NotFound(id).into());
        }
        Ok(ledger.transaction_events(&id)?)
    })
    .await?;
    Ok(Json(ApiResponse::ok(events)))
}

/// GET /api/cap-table
async fn cap_table(State(state): State<AppState>) -> ApiResult<CapTableView> {
    let view = blocking(&state, |ledger| {
        let table = ledger.cap_table()?;
        let registry = ShareholderRegistry::from_shareholders(ledger.shareholders()?);
        Ok(CapTableView {
            total_shares: table.total_shares(),
            positions: table.positions(),
            ownership: table
                .ownership()
                .into_iter()
                .map(|stake| StakeView {
                    name: registry.display_name(&stake.shareholder_id),
                    shareholder_id: stake.shareholder_id,
                    shares: stake.shares,
                    percent: stake.percent,
                })
                .collect(),
        })
    })
    .await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// POST /api/tax-id/format - mask and check a CPF/CNPJ as typed
async fn format_tax_id(payload: Result<Json<TaxIdRequest>, JsonRejection>) -> ApiResult<TaxIdView> {
    let Json(request) = payload?;
    let kind = HolderKind::parse(&request.kind).ok_or_else(|| {
        ApiError::invalid(vec![FieldError::new(
            "kind",
            FieldErrorKind::InvalidFormat,
            "Expected cpf or cnpj",
        )])
    })?;

    let formatted = tax_id::format(&request.value, kind);
    let digits = tax_id::digits_only(&formatted);
    Ok(Json(ApiResponse::ok(TaxIdView {
        kind,
        complete: digits.len() == kind.digit_count(),
        valid: tax_id::validate_checksum(&digits, kind),
        digits,
        formatted,
    })))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(ledger: Arc<Ledger>) -> Router {
    let state = AppState { ledger };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/shareholders", get(list_shareholders).post(create_shareholder))
        .route("/shareholders/:id", get(get_shareholder))
        .route("/rounds", get(list_rounds).post(create_round))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/:id", get(get_transaction))
        .route("/transactions/:id/events", get(transaction_events))
        .route("/transactions/:id/:action", post(transaction_action))
        .route("/cap-table", get(cap_table))
        .route("/tax-id/format", post(format_tax_id))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TransactionStatus;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(Ledger::in_memory("api_test").unwrap()))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create_holder(app: &Router, name: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/shareholders",
            Some(json!({"name": name, "shareholder_type": "INDIVIDUAL", "tax_id": "529.982.247-25"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_create_shareholder_validation() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/shareholders",
            Some(json!({"name": "", "tax_id": "529.982.247-00"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        let fields: Vec<&str> = body["field_errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["name", "tax_id"]);
    }

    #[tokio::test]
    async fn test_transaction_lifecycle_over_http() {
        let app = app();
        let alice = create_holder(&app, "Alice").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/transactions",
            Some(json!({
                "transaction_type": "ISSUANCE",
                "to_shareholder_id": alice,
                "share_class": "COMMON",
                "quantity": "1000",
                "requires_board_approval": true,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["transaction"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["available_actions"][0]["action"], "submit");

        let (status, body) = send(&app, "POST", &format!("/api/transactions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["detail"]["transaction"]["status"], "PENDING_APPROVAL");
        assert_eq!(body["data"]["message"], "Transaction submitted");

        let (status, _) = send(&app, "POST", &format!("/api/transactions/{}/confirm", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "POST", &format!("/api/transactions/{}/approve", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "POST", &format!("/api/transactions/{}/confirm", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["detail"]["transaction"]["status"],
            json!(TransactionStatus::Confirmed)
        );

        let (_, body) = send(&app, "GET", "/api/cap-table", None).await;
        assert_eq!(body["data"]["total_shares"], 1000);
        assert_eq!(body["data"]["ownership"][0]["name"], "Alice");

        let (_, body) = send(&app, "GET", &format!("/api/transactions/{}/events", id), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_retry_outside_failed_is_conflict() {
        let app = app();
        let alice = create_holder(&app, "Alice").await;
        let (_, body) = send(
            &app,
            "POST",
            "/api/transactions",
            Some(json!({
                "transaction_type": "ISSUANCE",
                "to_shareholder_id": alice,
                "share_class": "COMMON",
                "quantity": "10",
            })),
        )
        .await;
        let id = body["data"]["transaction"]["id"].as_str().unwrap().to_string();
        send(&app, "POST", &format!("/api/transactions/{}/submit", id), None).await;

        let (status, body) = send(&app, "POST", &format!("/api/transactions/{}/retry", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (_, body) = send(&app, "GET", &format!("/api/transactions/{}", id), None).await;
        assert_eq!(body["data"]["transaction"]["status"], "SUBMITTED");
    }

    #[tokio::test]
    async fn test_not_found_and_unknown_action() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/transactions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, "POST", "/api/transactions/missing/submit", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "POST", "/api/transactions/missing/explode", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_in_flight_conflict() {
        let ledger = Arc::new(Ledger::in_memory("api_test").unwrap());
        let app = router(ledger.clone());
        let alice = create_holder(&app, "Alice").await;

        let (_, body) = send(
            &app,
            "POST",
            "/api/transactions",
            Some(json!({
                "transaction_type": "ISSUANCE",
                "to_shareholder_id": alice,
                "share_class": "COMMON",
                "quantity": "10",
            })),
        )
        .await;
        let id = body["data"]["transaction"]["id"].as_str().unwrap().to_string();

        let _guard = ledger.in_flight().begin(&id).unwrap();
        let (status, body) = send(&app, "POST", &format!("/api/transactions/{}/submit", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("in progress"));
    }

    #[tokio::test]
    async fn test_tax_id_format() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/tax-id/format",
            Some(json!({"kind": "cnpj", "value": "11222333000181"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["formatted"], "11.222.333/0001-81");
        assert_eq!(body["data"]["valid"], true);

        let (_, body) = send(
            &app,
            "POST",
            "/api/tax-id/format",
            Some(json!({"kind": "cpf", "value": "5299"})),
        )
        .await;
        assert_eq!(body["data"]["formatted"], "529.9");
        assert_eq!(body["data"]["complete"], false);

        let (status, _) = send(
            &app,
            "POST",
            "/api/tax-id/format",
            Some(json!({"kind": "passport", "value": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

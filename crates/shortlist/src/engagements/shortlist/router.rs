use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{CompanyId, OperatorId, RequestId};
use super::notifications::{NotificationDispatcher, NotificationKind};
use super::repository::RequestRepository;
use super::service::{Caller, DeliveryOutcome, ShortlistService};
use crate::engagements::events::EventStore;
use crate::engagements::matching::{CandidateProfile, RoleRequirements};
use crate::engagements::payments::domain::{Money, PaymentId, PaymentRail};
use crate::engagements::payments::settlement::PaymentStore;

/// Router builder exposing the shortlist lifecycle over HTTP. Callers
/// identify themselves with `x-actor-kind` (`operator` or `company`) and
/// `x-actor-id`; there is no authentication layer here, the service sits
/// behind one.
pub fn shortlist_router<R, S, E, N>(service: Arc<ShortlistService<R, S, E, N>>) -> Router
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route("/api/v1/shortlists", post(create_handler::<R, S, E, N>))
        .route(
            "/api/v1/shortlists/:request_id",
            get(get_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/events",
            get(events_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/process",
            post(process_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/scope",
            post(propose_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/scope/approve",
            post(approve_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/scope/decline",
            post(decline_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/payment/authorize",
            post(authorize_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/payment/confirm",
            post(confirm_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/deliver",
            post(deliver_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/no-match",
            post(no_match_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/adjustment",
            post(adjustment_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/resume",
            post(resume_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/extend",
            post(extend_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/cancel",
            post(cancel_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/candidates/re-include",
            post(re_include_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/shortlists/:request_id/notifications/resend",
            post(resend_handler::<R, S, E, N>),
        )
        .route(
            "/api/v1/payments/:payment_id",
            get(payment_handler::<R, S, E, N>),
        )
        .with_state(service)
}

fn caller(headers: &HeaderMap) -> Result<Caller, Response> {
    let actor_id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty());
    let kind = headers
        .get("x-actor-kind")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match (kind, actor_id) {
        ("operator", Some(id)) => Ok(Caller::Operator(OperatorId(id))),
        ("company", Some(id)) => {
            let company = headers
                .get("x-company-id")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .unwrap_or(id);
            Ok(Caller::Company(CompanyId(company)))
        }
        _ => Err(forbidden("missing or unrecognized actor headers")),
    }
}

fn operator(headers: &HeaderMap) -> Result<OperatorId, Response> {
    match caller(headers)? {
        Caller::Operator(id) => Ok(id),
        Caller::Company(_) => Err(forbidden("operator role required")),
    }
}

fn company(headers: &HeaderMap) -> Result<CompanyId, Response> {
    match caller(headers)? {
        Caller::Company(id) => Ok(id),
        Caller::Operator(_) => Err(forbidden("company role required")),
    }
}

fn forbidden(message: &str) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateShortlistBody {
    pub(crate) requirements: RoleRequirements,
    #[serde(default)]
    pub(crate) previous_request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessBody {
    pub(crate) pool: Vec<CandidateProfile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProposeScopeBody {
    pub(crate) price: Money,
    pub(crate) candidate_count: u32,
    #[serde(default)]
    pub(crate) notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReasonBody {
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorizeBody {
    pub(crate) rail: PaymentRail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConfirmBody {
    #[serde(default)]
    pub(crate) provider_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub(crate) enum DeliverBody {
    Fulfilled {
        #[serde(default)]
        reason: Option<String>,
    },
    Partial {
        discount_percent: u8,
        #[serde(default)]
        reason: Option<String>,
    },
    NoMatch {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdjustmentBody {
    pub(crate) note: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExtendBody {
    pub(crate) additional_days: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReIncludeBody {
    pub(crate) profile: CandidateProfile,
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResendBody {
    pub(crate) kind: NotificationKind,
}

async fn create_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CreateShortlistBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let company = match company(&headers) {
        Ok(company) => company,
        Err(response) => return response,
    };
    let previous = body.previous_request_id.map(RequestId);
    match service.create(&company, body.requirements, previous, Utc::now()) {
        Ok(request) => (StatusCode::CREATED, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.get(&caller, &RequestId(request_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn events_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.events(&operator, &RequestId(request_id)) {
        Ok(events) => (StatusCode::OK, axum::Json(events)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn process_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ProcessBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.start_processing(&operator, &RequestId(request_id), &body.pool, Utc::now()) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn propose_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ProposeScopeBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.propose_scope(
        &operator,
        &RequestId(request_id),
        body.price,
        body.candidate_count,
        body.notes,
        Utc::now(),
    ) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn approve_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let company = match company(&headers) {
        Ok(company) => company,
        Err(response) => return response,
    };
    match service.approve_scope(&company, &RequestId(request_id), Utc::now()) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn decline_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ReasonBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let company = match company(&headers) {
        Ok(company) => company,
        Err(response) => return response,
    };
    match service.decline_scope(&company, &RequestId(request_id), body.reason, Utc::now()) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn authorize_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<AuthorizeBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let company = match company(&headers) {
        Ok(company) => company,
        Err(response) => return response,
    };
    match service.authorize_payment(&company, &RequestId(request_id), body.rail, Utc::now()) {
        Ok(authorization) => {
            let payload = json!({
                "payment": authorization.payment.view(),
                "approval": authorization.handle,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn confirm_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ConfirmBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let company = match company(&headers) {
        Ok(company) => company,
        Err(response) => return response,
    };
    match service.confirm_authorization(
        &company,
        &RequestId(request_id),
        body.provider_reference,
        Utc::now(),
    ) {
        Ok(performed) => {
            let payload = json!({ "confirmed": performed });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn deliver_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<DeliverBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    let (outcome, reason) = match body {
        DeliverBody::Fulfilled { reason } => (DeliveryOutcome::Fulfilled, reason),
        DeliverBody::Partial {
            discount_percent,
            reason,
        } => (DeliveryOutcome::Partial { discount_percent }, reason),
        DeliverBody::NoMatch { reason } => (DeliveryOutcome::NoMatch, reason),
    };
    match service.deliver(&operator, &RequestId(request_id), outcome, reason, Utc::now()) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn no_match_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ReasonBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.mark_no_match(&operator, &RequestId(request_id), body.reason, Utc::now()) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn adjustment_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<AdjustmentBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.suggest_adjustment(&operator, &RequestId(request_id), body.note, Utc::now()) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn resume_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.resume_processing(&operator, &RequestId(request_id), Utc::now()) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn extend_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ExtendBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.extend_search(
        &operator,
        &RequestId(request_id),
        body.additional_days,
        Utc::now(),
    ) {
        Ok(()) => {
            let payload = json!({ "extended_by_days": body.additional_days });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn cancel_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ReasonBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.cancel(&caller, &RequestId(request_id), body.reason, Utc::now()) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn re_include_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ReIncludeBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.re_include_candidate(
        &operator,
        &RequestId(request_id),
        &body.profile,
        body.reason,
        Utc::now(),
    ) {
        Ok(row) => (StatusCode::OK, axum::Json(row)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn payment_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let caller = match caller(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    match service.payment_view(&caller, &PaymentId(payment_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn resend_handler<R, S, E, N>(
    State(service): State<Arc<ShortlistService<R, S, E, N>>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<ResendBody>,
) -> Response
where
    R: RequestRepository + 'static,
    S: PaymentStore + 'static,
    E: EventStore + 'static,
    N: NotificationDispatcher + 'static,
{
    let operator = match operator(&headers) {
        Ok(operator) => operator,
        Err(response) => return response,
    };
    match service.resend_notification(&operator, &RequestId(request_id), body.kind, Utc::now()) {
        Ok(()) => {
            let payload = json!({ "resent": body.kind.label() });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

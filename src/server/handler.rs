//! Per-route challenge/verify handler.

use crate::amount::AtomicAmount;
use crate::config::{RequestContext, RouteConfig};
use crate::context::Context;
use crate::event::{ServerEvent, ServerEventsSender};
use crate::payment::{ExpectedPayment, ReplayCheck};
use crate::wire::{
    encode_settlement_receipt, parse_payment_header, Address, PaymentRequiredResponse,
    PaymentRequirements, Verdict, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER, SCHEME_EXACT,
};
use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Largest request body passed to dynamic responses.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Seconds a client is given to settle.
const MAX_TIMEOUT_SECONDS: u64 = 60;

/// State shared by every route.
pub(crate) struct AppState {
    pub(crate) ctx: Arc<Context>,
    pub(crate) network: String,
    pub(crate) recipient: Address,
    pub(crate) asset: Address,
    pub(crate) port: u16,
    pub(crate) events: ServerEventsSender,
}

/// A configured route with its price resolved to atomic units.
pub(crate) struct PricedRoute {
    pub(crate) path: String,
    pub(crate) price: AtomicAmount,
    pub(crate) config: RouteConfig,
}

pub(crate) async fn handle(state: Arc<AppState>, route: Arc<PricedRoute>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    debug!("{} {}", parts.method, parts.uri.path());

    let Some(raw) = parts.headers.get(PAYMENT_HEADER) else {
        return challenge(&state, &route, &parts, None);
    };
    debug!("X-PAYMENT header present");

    let proof = match raw
        .to_str()
        .map_err(|e| e.to_string())
        .and_then(|text| parse_payment_header(text).map_err(|e| e.to_string()))
    {
        Ok(proof) => proof,
        Err(detail) => {
            warn!("Invalid X-PAYMENT header format on {}: {detail}", route.path);
            let _ = state.events.send(ServerEvent::MalformedProof {
                path: route.path.clone(),
            });
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid X-PAYMENT header format", "detail": detail })),
            )
                .into_response();
        }
    };

    let expected = ExpectedPayment {
        recipient: state.recipient.clone(),
        min_amount: route.price,
        asset: state.asset.clone(),
    };
    let replay = ReplayCheck::Enforce {
        endpoint: route.path.clone(),
    };
    let verdict = state
        .ctx
        .verify(proof.payload.signature.as_str(), &expected, &replay)
        .await;

    let settled = match &verdict {
        Verdict::Valid(settled) => settled,
        Verdict::Invalid { reason } => {
            warn!("Payment verification failed on {}: {reason}", route.path);
            let _ = state.events.send(ServerEvent::PaymentRejected {
                path: route.path.clone(),
                reason: reason.clone(),
            });
            return challenge(&state, &route, &parts, Some(reason.clone()));
        }
    };

    let receipt = match encode_settlement_receipt(&verdict, &state.network) {
        Ok(receipt) => receipt,
        Err(e) => {
            error!("Cannot encode settlement receipt: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to encode settlement receipt" })),
            )
                .into_response();
        }
    };
    let _ = state.events.send(ServerEvent::PaymentAccepted {
        path: route.path.clone(),
        signature: settled.signature.clone(),
        amount: settled.amount.to_string(),
    });

    let request = request_context(&parts, body).await;
    let status = StatusCode::from_u16(route.config.status).unwrap_or(StatusCode::OK);
    (
        status,
        [(PAYMENT_RESPONSE_HEADER, receipt)],
        Json(route.config.response.render(&request)),
    )
        .into_response()
}

fn challenge(
    state: &AppState,
    route: &PricedRoute,
    parts: &Parts,
    error: Option<String>,
) -> Response {
    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map_or_else(|| format!("localhost:{}", state.port), str::to_string);

    let requirements = PaymentRequirements {
        scheme: SCHEME_EXACT.to_string(),
        network: state.network.clone(),
        max_amount_required: route.price,
        resource: format!("http://{host}{}", parts.uri.path()),
        description: Some(route.config.description.clone().unwrap_or_default()),
        mime_type: Some("application/json".to_string()),
        output_schema: None,
        pay_to: state.recipient.clone(),
        max_timeout_seconds: Some(MAX_TIMEOUT_SECONDS),
        asset: state.asset.clone(),
        extra: None,
    };

    if error.is_none() {
        let _ = state.events.send(ServerEvent::ChallengeIssued {
            path: route.path.clone(),
            amount: route.price.to_string(),
        });
    }
    (
        StatusCode::PAYMENT_REQUIRED,
        Json(PaymentRequiredResponse::new(requirements, error)),
    )
        .into_response()
}

async fn request_context(parts: &Parts, body: axum::body::Body) -> RequestContext {
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<Value>(&bytes).ok(),
        _ => None,
    };
    RequestContext {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
        body,
    }
}

/// Body returned for paths with no configured route.
pub(crate) async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not configured in x402test" })),
    )
}

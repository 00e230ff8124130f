use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, header},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::admin::{AdminError, CreditRequest, QuotaView};
use crate::config::RuntimeSettings;
use crate::server::AppState;
use crate::services::UserId;

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AdminError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AdminError::Disabled);
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token_matches(token, expected) => Ok(()),
        _ => Err(AdminError::Unauthorized),
    }
}

/// Compare in constant time; length still leaks
fn token_matches(presented: &str, expected: &str) -> bool {
    !presented.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

pub async fn get_control_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RuntimeSettings>, AdminError> {
    authorize(&state, &headers)?;
    Ok(Json(state.settings.snapshot().await))
}

/// Replace the runtime settings; messages already in flight are unaffected
pub async fn put_control_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(settings): Json<RuntimeSettings>,
) -> Result<Json<RuntimeSettings>, AdminError> {
    authorize(&state, &headers)?;

    tracing::info!(
        enable_advanced = settings.control.enable_advanced,
        enable_moderation = settings.control.enable_moderation,
        sensitive_words = settings.control.sensitive_words.len(),
        standard = settings.pricing.standard,
        advanced = settings.pricing.advanced,
        image = settings.pricing.image,
        "Runtime settings replaced"
    );
    state.settings.replace(settings.clone()).await;
    Ok(Json(settings))
}

pub async fn get_quota_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
) -> Result<Json<QuotaView>, AdminError> {
    authorize(&state, &headers)?;
    let balance = state.ledger.balance(UserId(user_id)).await;
    Ok(Json(QuotaView { user_id, balance }))
}

pub async fn credit_quota_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
    Json(request): Json<CreditRequest>,
) -> Result<Json<QuotaView>, AdminError> {
    authorize(&state, &headers)?;
    if request.amount == 0 {
        return Err(AdminError::BadRequest("amount must be positive".to_string()));
    }

    let user = UserId(user_id);
    state.ledger.credit(user, request.amount).await;
    let balance = state.ledger.balance(user).await;
    tracing::info!(user_id, amount = request.amount, balance, "Quota topped up by admin");

    Ok(Json(QuotaView { user_id, balance }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_matches_exact_value_only() {
        assert!(token_matches("admin-secret", "admin-secret"));
        assert!(!token_matches("admin-secreT", "admin-secret"));
        assert!(!token_matches("admin", "admin-secret"));
        assert!(!token_matches("", ""));
    }
}

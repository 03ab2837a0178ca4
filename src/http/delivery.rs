use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::error::ApiError;
use super::extract::{Admin, JsonBody};
use super::AppState;
use crate::domain::aggregates::{DeliveryRule, DeliveryRuleUpdate, NewDeliveryRule};
use crate::domain::value_objects::{DeliveryRuleId, Money};
use crate::store::Store;

/// Public view of the active rule.
#[derive(Debug, Serialize)]
pub struct DeliverySettings {
    pub free_delivery_threshold: Money,
    pub delivery_cost: Money,
}

pub async fn settings<S: Store>(State(state): State<AppState<S>>) -> Result<Json<DeliverySettings>, ApiError> {
    let rule = state.delivery.get_or_create_default().await?;
    Ok(Json(DeliverySettings { free_delivery_threshold: rule.free_threshold, delivery_cost: rule.flat_fee }))
}

pub async fn list_rules<S: Store>(State(state): State<AppState<S>>, _admin: Admin) -> Result<Json<Vec<DeliveryRule>>, ApiError> {
    Ok(Json(state.delivery.list_rules().await?))
}

pub async fn create_rule<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    JsonBody(rule): JsonBody<NewDeliveryRule>,
) -> Result<(StatusCode, Json<DeliveryRule>), ApiError> {
    Ok((StatusCode::CREATED, Json(state.delivery.create_rule(rule).await?)))
}

pub async fn update_rule<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Path(id): Path<DeliveryRuleId>,
    JsonBody(update): JsonBody<DeliveryRuleUpdate>,
) -> Result<Json<DeliveryRule>, ApiError> {
    Ok(Json(state.delivery.update_rule(id, update).await?))
}

pub async fn activate_rule<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Path(id): Path<DeliveryRuleId>,
) -> Result<Json<DeliveryRule>, ApiError> {
    Ok(Json(state.delivery.activate_rule(id).await?))
}

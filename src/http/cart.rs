use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use super::error::ApiError;
use super::extract::{JsonBody, Requester};
use super::AppState;
use crate::domain::aggregates::CartView;
use crate::domain::value_objects::{LineId, ProductId};
use crate::store::Store;

fn one() -> u32 { 1 }

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetQuantityRequest {
    #[validate(range(max = 10000))]
    pub quantity: u32,
}

pub async fn get_cart<S: Store>(State(state): State<AppState<S>>, requester: Requester) -> Result<Json<CartView>, ApiError> {
    let cart = state.carts.resolve(&requester).await?;
    Ok(Json(state.carts.view(&cart).await?))
}

pub async fn add_item<S: Store>(
    State(state): State<AppState<S>>,
    requester: Requester,
    JsonBody(req): JsonBody<AddItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    req.validate()?;
    let cart = state.carts.resolve(&requester).await?;
    Ok(Json(state.carts.add_item(&cart, req.product_id, req.quantity).await?))
}

pub async fn set_quantity<S: Store>(
    State(state): State<AppState<S>>,
    requester: Requester,
    Path(line_id): Path<LineId>,
    JsonBody(req): JsonBody<SetQuantityRequest>,
) -> Result<Json<CartView>, ApiError> {
    req.validate()?;
    let cart = state.carts.resolve(&requester).await?;
    Ok(Json(state.carts.set_quantity(&cart, line_id, req.quantity).await?))
}

pub async fn remove_item<S: Store>(
    State(state): State<AppState<S>>,
    requester: Requester,
    Path(line_id): Path<LineId>,
) -> Result<Json<CartView>, ApiError> {
    let cart = state.carts.resolve(&requester).await?;
    Ok(Json(state.carts.remove_item(&cart, line_id).await?))
}

pub async fn clear<S: Store>(State(state): State<AppState<S>>, requester: Requester) -> Result<Json<CartView>, ApiError> {
    let cart = state.carts.resolve(&requester).await?;
    Ok(Json(state.carts.clear(&cart).await?))
}

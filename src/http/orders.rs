use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use super::error::ApiError;
use super::extract::{Admin, JsonBody, SignedIn};
use super::AppState;
use crate::domain::aggregates::{OrderDetail, OrderStatus, OrderSummary};
use crate::domain::value_objects::{AddressId, OrderId};
use crate::services::PlaceOrder;
use crate::store::Store;
use crate::EcommerceError;

#[derive(Debug, Deserialize, Validate)]
pub struct PlaceOrderRequest {
    pub address_id: AddressId,
    #[validate(length(min = 1, max = 32))]
    pub payment_method: String,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn place_order<S: Store>(
    State(state): State<AppState<S>>,
    SignedIn { account, requester }: SignedIn,
    JsonBody(req): JsonBody<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderSummary>), ApiError> {
    req.validate()?;
    let cart = state.carts.resolve(&requester).await?;
    let request = PlaceOrder { address_id: req.address_id, payment_method: req.payment_method, comment: req.comment };
    let detail = state.checkout.place_order(account, &cart, request).await?;
    Ok((StatusCode::CREATED, Json(detail.summary())))
}

pub async fn list_orders<S: Store>(
    State(state): State<AppState<S>>,
    SignedIn { account, .. }: SignedIn,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    Ok(Json(state.orders.list_orders(account).await?))
}

pub async fn get_order<S: Store>(
    State(state): State<AppState<S>>,
    SignedIn { account, .. }: SignedIn,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>, ApiError> {
    Ok(Json(state.orders.get_order(account, id).await?))
}

pub async fn update_status<S: Store>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Path(id): Path<OrderId>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<OrderDetail>, ApiError> {
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|s| EcommerceError::Validation(format!("unknown order status '{s}'")))?;
    Ok(Json(state.orders.update_status(id, status).await?))
}

//! Order and client-order endpoints.
//!
//! Both collections share these handlers; the routes pick the collection by
//! wrapping the generic functions with an [`OrderKind`].

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{self, payload_from_body, OrderDocument, OrderKind, OrderListQuery, OrderRow};
use crate::events::OrderEvent;
use crate::AppState;

use super::auth::CurrentUser;
use super::error::{ApiError, AppJson};
use super::validation::validate_uuid;

fn validate_order_id(id: &str) -> Result<(), ApiError> {
    validate_uuid(id, "order_id").map_err(|e| ApiError::validation_field("order_id", e))
}

fn body_to_payload(body: Value) -> Result<String, ApiError> {
    let payload = payload_from_body(body)
        .ok_or_else(|| ApiError::validation_field("body", "Order must be a JSON object"))?;
    Ok(Value::Object(payload).to_string())
}

async fn fetch_order(state: &AppState, kind: OrderKind, id: &str) -> Result<Option<OrderDocument>, ApiError> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", kind.table());
    let row = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    Ok(row.map(OrderDocument::try_from).transpose()?)
}

/// List documents, newest first.
///
/// Admins see everything (optionally narrowed with `?userId=`); everyone else
/// only sees their own.
async fn list(
    state: &AppState,
    kind: OrderKind,
    user: &CurrentUser,
    query: OrderListQuery,
) -> Result<Vec<OrderDocument>, ApiError> {
    let owner = if user.is_admin() {
        query.user_id.filter(|u| !u.is_empty())
    } else {
        Some(user.id().to_string())
    };

    let rows = match owner {
        Some(owner) => {
            let sql = format!(
                "SELECT * FROM {} WHERE user_id = ? ORDER BY created_at DESC",
                kind.table()
            );
            sqlx::query_as::<_, OrderRow>(&sql)
                .bind(owner)
                .fetch_all(&state.db)
                .await?
        }
        None => {
            let sql = format!("SELECT * FROM {} ORDER BY created_at DESC", kind.table());
            sqlx::query_as::<_, OrderRow>(&sql)
                .fetch_all(&state.db)
                .await?
        }
    };

    rows.into_iter()
        .map(|row| OrderDocument::try_from(row).map_err(ApiError::from))
        .collect()
}

/// Insert a document owned by the caller and announce it
async fn create(
    state: &AppState,
    kind: OrderKind,
    user: &CurrentUser,
    body: Value,
) -> Result<OrderDocument, ApiError> {
    let payload = body_to_payload(body)?;
    let id = Uuid::new_v4().to_string();
    let now = db::now();

    let sql = format!(
        "INSERT INTO {} (id, user_id, payload, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(&id)
        .bind(user.id())
        .bind(&payload)
        .bind(&now)
        .bind(&now)
        .execute(&state.db)
        .await?;

    let doc = OrderDocument::try_from(OrderRow {
        id,
        user_id: user.id().to_string(),
        payload,
        created_at: now.clone(),
        updated_at: now,
    })?;

    tracing::info!(kind = kind.label(), order_id = %doc.id, user_id = %doc.user_id, "Order placed");
    state.events.publish(OrderEvent::created(kind, doc.clone()));

    Ok(doc)
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<OrderDocument>>, ApiError> {
    Ok(Json(list(&state, OrderKind::Order, &user, query).await?))
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppJson(body): AppJson<Value>,
) -> Result<(StatusCode, Json<OrderDocument>), ApiError> {
    let doc = create(&state, OrderKind::Order, &user, body).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// Get one order. Other users' orders are reported as missing to non-admins.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDocument>, ApiError> {
    validate_order_id(&id)?;

    let doc = fetch_order(&state, OrderKind::Order, &id)
        .await?
        .filter(|doc| user.is_admin() || doc.user_id == user.id())
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    Ok(Json(doc))
}

/// Replace an order's document (admin). Concurrent writers: last write wins.
pub async fn update_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<OrderDocument>, ApiError> {
    validate_order_id(&id)?;
    let payload = body_to_payload(body)?;

    let sql = format!(
        "UPDATE {} SET payload = ?, updated_at = ? WHERE id = ?",
        OrderKind::Order.table()
    );
    let updated = sqlx::query(&sql)
        .bind(&payload)
        .bind(db::now())
        .bind(&id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(ApiError::not_found("Order not found"));
    }

    let doc = fetch_order(&state, OrderKind::Order, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    tracing::info!(order_id = %doc.id, "Order updated");
    state.events.publish(OrderEvent::OrderUpdated(doc.clone()));

    Ok(Json(doc))
}

pub async fn list_client_orders(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<OrderDocument>>, ApiError> {
    Ok(Json(list(&state, OrderKind::ClientOrder, &user, query).await?))
}

pub async fn create_client_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppJson(body): AppJson<Value>,
) -> Result<(StatusCode, Json<OrderDocument>), ApiError> {
    let doc = create(&state, OrderKind::ClientOrder, &user, body).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

//! Order and client-order models.
//!
//! Orders are documents: whatever JSON object the client submits is stored as
//! the payload, alongside the owning user and timestamps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

/// Keys owned by the server; stripped from client payloads before storage
pub const RESERVED_KEYS: &[&str] = &["_id", "id", "userId", "createdAt", "updatedAt"];

/// The two order collections. They share a shape and all handling code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Order,
    ClientOrder,
}

impl OrderKind {
    pub fn table(&self) -> &'static str {
        match self {
            OrderKind::Order => "orders",
            OrderKind::ClientOrder => "client_orders",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderKind::Order => "Order",
            OrderKind::ClientOrder => "Client order",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: String,
    pub user_id: String,
    pub payload: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Order as returned to clients and broadcast to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl TryFrom<OrderRow> for OrderDocument {
    type Error = serde_json::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let payload: Map<String, Value> = serde_json::from_str(&row.payload)?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            payload,
        })
    }
}

/// Turn a request body into a storable payload.
///
/// Returns `None` when the body is not a JSON object.
pub fn payload_from_body(body: Value) -> Option<Map<String, Value>> {
    match body {
        Value::Object(mut map) => {
            for key in RESERVED_KEYS {
                map.remove(*key);
            }
            Some(map)
        }
        _ => None,
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

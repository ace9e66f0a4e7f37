//! Menu item models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    pub category: String,
    /// Static path of the uploaded image, e.g. `/api/Images/1700000000000-….png`
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Text fields of a menu item as submitted in a multipart form
#[derive(Debug, Clone, Default)]
pub struct MenuItemFields {
    pub name: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
}

//! Menu API endpoints.
//!
//! Reads are public. Writes are admin-only and take `multipart/form-data` with
//! text fields `name`, `price`, `category` and an optional `image` file.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{self, MenuItem, MenuItemFields};
use crate::uploads::UploadedImage;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{parse_price, validate_required, validate_uuid};

#[derive(Debug, Default, Deserialize)]
pub struct MenuListQuery {
    pub category: Option<String>,
}

/// Validated menu item text fields
#[derive(Debug)]
struct MenuItemInput {
    name: String,
    price: f64,
    category: String,
}

fn validate_fields(fields: &MenuItemFields) -> Result<MenuItemInput, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let name = fields.name.as_deref().unwrap_or("").trim().to_string();
    if let Err(e) = validate_required(&name, "Name", 100) {
        errors.add("name", e);
    }

    let category = fields.category.as_deref().unwrap_or("").trim().to_string();
    if let Err(e) = validate_required(&category, "Category", 50) {
        errors.add("category", e);
    }

    let price = match fields.price.as_deref() {
        Some(raw) => match parse_price(raw) {
            Ok(price) => Some(price),
            Err(e) => {
                errors.add("price", e);
                None
            }
        },
        None => {
            errors.add("price", "Price is required");
            None
        }
    };

    errors.finish()?;
    Ok(MenuItemInput {
        name,
        category,
        price: price.unwrap_or_default(),
    })
}

/// Drain a multipart form into text fields and an optional image.
///
/// Browsers submit an empty, unnamed file part when no file was chosen; that
/// counts as "no image".
async fn read_menu_form(
    mut multipart: Multipart,
) -> Result<(MenuItemFields, Option<UploadedImage>), ApiError> {
    let mut fields = MenuItemFields::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart request: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.is_empty());
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Multipart error: {}", e)))?;
                if file_name.is_some() || !data.is_empty() {
                    image = Some(UploadedImage {
                        file_name,
                        content_type,
                        data,
                    });
                }
            }
            "name" | "price" | "category" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Multipart error: {}", e)))?;
                match name.as_str() {
                    "name" => fields.name = Some(value),
                    "price" => fields.price = Some(value),
                    _ => fields.category = Some(value),
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown menu form field");
            }
        }
    }

    Ok((fields, image))
}

async fn find_menu_item(state: &AppState, id: &str) -> Result<MenuItem, ApiError> {
    if let Err(e) = validate_uuid(id, "menu_item_id") {
        return Err(ApiError::validation_field("menu_item_id", e));
    }

    sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Menu item not found"))
}

/// List menu items, optionally filtered by category
pub async fn list_menu_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MenuListQuery>,
) -> Result<Json<Vec<MenuItem>>, ApiError> {
    let items = match query.category.as_deref().filter(|c| !c.is_empty()) {
        Some(category) => {
            sqlx::query_as::<_, MenuItem>(
                "SELECT * FROM menu_items WHERE category = ? ORDER BY name ASC",
            )
            .bind(category)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, MenuItem>(
                "SELECT * FROM menu_items ORDER BY category ASC, name ASC",
            )
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(Json(items))
}

pub async fn get_menu_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MenuItem>, ApiError> {
    Ok(Json(find_menu_item(&state, &id).await?))
}

/// Create a menu item (admin)
pub async fn create_menu_item(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MenuItem>), ApiError> {
    let (fields, upload) = read_menu_form(multipart).await?;
    let input = validate_fields(&fields)?;

    let image = match &upload {
        Some(upload) => Some(state.images.save(upload).await?),
        None => None,
    };

    let now = db::now();
    let item = MenuItem {
        id: Uuid::new_v4().to_string(),
        name: input.name,
        price: input.price,
        category: input.category,
        image,
        created_at: now.clone(),
        updated_at: now,
    };

    let inserted = sqlx::query(
        "INSERT INTO menu_items (id, name, price, category, image, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&item.id)
    .bind(&item.name)
    .bind(item.price)
    .bind(&item.category)
    .bind(&item.image)
    .bind(&item.created_at)
    .bind(&item.updated_at)
    .execute(&state.db)
    .await;

    if let Err(e) = inserted {
        if let Some(path) = &item.image {
            state.images.remove(path).await;
        }
        return Err(e.into());
    }

    tracing::info!(menu_item_id = %item.id, name = %item.name, "Created menu item");
    Ok((StatusCode::CREATED, Json(item)))
}

/// Replace a menu item's fields (admin). The image is kept unless a new one is uploaded.
pub async fn update_menu_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<MenuItem>, ApiError> {
    let existing = find_menu_item(&state, &id).await?;
    let (fields, upload) = read_menu_form(multipart).await?;
    let input = validate_fields(&fields)?;

    let new_image = match &upload {
        Some(upload) => Some(state.images.save(upload).await?),
        None => None,
    };
    let image = new_image.clone().or_else(|| existing.image.clone());
    let updated_at = db::now();

    let result = sqlx::query(
        "UPDATE menu_items SET name = ?, price = ?, category = ?, image = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&input.name)
    .bind(input.price)
    .bind(&input.category)
    .bind(&image)
    .bind(&updated_at)
    .bind(&id)
    .execute(&state.db)
    .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => {
            // Deleted between the lookup and the update
            if let Some(path) = &new_image {
                state.images.remove(path).await;
            }
            return Err(ApiError::not_found("Menu item not found"));
        }
        Ok(_) => {}
        Err(e) => {
            if let Some(path) = &new_image {
                state.images.remove(path).await;
            }
            return Err(e.into());
        }
    }

    if new_image.is_some() {
        if let Some(old) = &existing.image {
            state.images.remove(old).await;
        }
    }

    tracing::info!(menu_item_id = %id, "Updated menu item");
    Ok(Json(MenuItem {
        id,
        name: input.name,
        price: input.price,
        category: input.category,
        image,
        created_at: existing.created_at,
        updated_at,
    }))
}

/// Delete a menu item and its image (admin)
pub async fn delete_menu_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let existing = find_menu_item(&state, &id).await?;

    sqlx::query("DELETE FROM menu_items WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if let Some(path) = &existing.image {
        state.images.remove(path).await;
    }

    tracing::info!(menu_item_id = %id, "Deleted menu item");
    Ok(Json(serde_json::json!({ "message": "Menu item deleted", "_id": id })))
}

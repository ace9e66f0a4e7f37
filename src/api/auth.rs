//! Account and session endpoints, plus the auth middleware and extractor.
//!
//! Sessions are a pair of cookies: a short-lived `accessToken` checked on every
//! protected request, and a longer-lived `refreshToken` that is exchanged (and
//! consumed) at `/api/refresh` for a new pair.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use crate::config::{AuthConfig, CookieSameSite};
use crate::crypto::{self, Claims, TokenService};
use crate::db::{
    self, CheckAuthResponse, LoginRequest, LoginResponse, RegisterRequest, Role, User,
    UserResponse,
};
use crate::AppState;

use super::error::{ApiError, AppJson, ValidationErrorBuilder};
use super::validation::{validate_email, validate_password, validate_required};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Login failure bodies, sent with 200. Clients match on these literal strings.
pub const INCORRECT_PASSWORD: &str = "Incorrect password";
pub const USER_NOT_FOUND: &str = "User does not exist";

/// The authenticated caller, decoded from the access token
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_admin()
    }
}

impl From<&CurrentUser> for UserResponse {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.0.sub.clone(),
            email: user.0.email.clone(),
            name: user.0.name.clone(),
            role: user.0.role.clone(),
        }
    }
}

fn same_site(value: CookieSameSite) -> SameSite {
    match value {
        CookieSameSite::Strict => SameSite::Strict,
        CookieSameSite::Lax => SameSite::Lax,
        CookieSameSite::None => SameSite::None,
    }
}

fn session_cookie(
    auth: &AuthConfig,
    name: &'static str,
    value: String,
    max_age: chrono::Duration,
) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(auth.cookie_secure)
        .same_site(same_site(auth.cookie_same_site))
        .max_age(time::Duration::seconds(max_age.num_seconds()));
    if let Some(domain) = &auth.cookie_domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

fn expired_cookie(auth: &AuthConfig, name: &'static str) -> Cookie<'static> {
    let mut builder = Cookie::build(name).path("/");
    if let Some(domain) = &auth.cookie_domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

/// Mint an access/refresh pair for `user`, persist the refresh session and
/// add both cookies to `jar`.
async fn start_session(state: &AppState, user: &User, jar: CookieJar) -> Result<CookieJar, ApiError> {
    let access = state.tokens.issue_access(user)?;
    let refresh = state.tokens.issue_refresh(user)?;

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&refresh.claims.jti)
    .bind(&user.id)
    .bind(crypto::hash_token(&refresh.token))
    .bind(db::timestamp_after(state.tokens.refresh_ttl()))
    .bind(db::now())
    .execute(&state.db)
    .await?;

    let auth = &state.config.auth;
    Ok(jar
        .add(session_cookie(auth, ACCESS_COOKIE, access.token, state.tokens.access_ttl()))
        .add(session_cookie(auth, REFRESH_COOKIE, refresh.token, state.tokens.refresh_ttl())))
}

fn login_response(user: &User) -> LoginResponse {
    LoginResponse {
        role: user.role.clone(),
        user_id: user.id.clone(),
        user_name: user.display_name(),
    }
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Response, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(request.email.trim())
        .fetch_optional(&state.db)
        .await?;

    let Some(user) = user else {
        tracing::info!(email = %request.email, "Login for unknown user");
        return Ok(Json(USER_NOT_FOUND).into_response());
    };

    if !crypto::verify_password(&request.password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "Login with incorrect password");
        return Ok(Json(INCORRECT_PASSWORD).into_response());
    }

    let jar = start_session(&state, &user, jar).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok((jar, Json(login_response(&user))).into_response())
}

fn validate_register_request(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_email(req.email.trim()) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }
    if let Err(e) = validate_required(&req.first_name, "First name", 100) {
        errors.add("firstName", e);
    }
    if let Err(e) = validate_required(&req.last_name, "Last name", 100) {
        errors.add("lastName", e);
    }

    errors.finish()
}

/// Create a customer account and log it in
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<Response, ApiError> {
    validate_register_request(&request)?;

    let email = request.email.trim().to_string();
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = crypto::hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let now = db::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        password_hash,
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        role: Role::Customer.as_str().to_string(),
        created_at: now.clone(),
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, role, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.role)
    .bind(&user.created_at)
    .bind(&user.updated_at)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %user.id, "Registered new customer");

    let jar = start_session(&state, &user, jar).await?;
    Ok((StatusCode::CREATED, jar, Json(login_response(&user))).into_response())
}

/// Exchange a refresh token for a new session. The presented token is consumed.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

    let claims = state.tokens.validate_refresh(&token)?;

    // Delete-and-check makes the token single use even under concurrent refreshes
    let consumed = sqlx::query(
        "DELETE FROM sessions WHERE id = ? AND token_hash = ? AND expires_at > ?",
    )
    .bind(&claims.jti)
    .bind(crypto::hash_token(&token))
    .bind(db::now())
    .execute(&state.db)
    .await?
    .rows_affected();

    if consumed == 0 {
        tracing::warn!(user_id = %claims.sub, session_id = %claims.jti, "Refresh token reuse or unknown session");
        return Err(ApiError::unauthorized("Session is no longer valid"));
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    let jar = start_session(&state, &user, jar).await?;
    Ok((jar, Json(login_response(&user))).into_response())
}

/// Clear session cookies and drop the refresh session if one is presented
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Response, ApiError> {
    if let Some(token) = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()) {
        if let Ok(claims) = state.tokens.validate_refresh(&token) {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(&claims.jti)
                .execute(&state.db)
                .await?;
            tracing::info!(user_id = %claims.sub, "User logged out");
        }
    }

    let auth = &state.config.auth;
    let jar = jar
        .remove(expired_cookie(auth, ACCESS_COOKIE))
        .remove(expired_cookie(auth, REFRESH_COOKIE));

    Ok((jar, Json(serde_json::json!({ "message": "Logged out" }))).into_response())
}

/// Report the caller's session
pub async fn check_auth(user: CurrentUser) -> Json<CheckAuthResponse> {
    Json(CheckAuthResponse {
        authenticated: true,
        user: UserResponse::from(&user),
    })
}

/// Decode the access token from the `accessToken` cookie, falling back to an
/// `Authorization: Bearer` header.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenService) -> Result<Claims, ApiError> {
    let jar = CookieJar::from_headers(headers);
    let token = match jar.get(ACCESS_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(TokenService::extract_from_header)
            .map(str::to_string)
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?,
    };

    Ok(tokens.validate_access(&token)?)
}

/// Auth middleware: rejects requests without a valid access token
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = authenticate(request.headers(), &state.tokens)?;
    request.extensions_mut().insert(CurrentUser(claims));
    Ok(next.run(request).await)
}

/// Admin middleware: 401 without a valid access token, 403 for non-admins
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = authenticate(request.headers(), &state.tokens)?;
    if !claims.is_admin() {
        tracing::warn!(user_id = %claims.sub, path = %request.uri().path(), "Non-admin denied");
        return Err(ApiError::forbidden("Admin access required"));
    }
    request.extensions_mut().insert(CurrentUser(claims));
    Ok(next.run(request).await)
}

/// Extractor for the authenticated caller.
///
/// Reuses the claims attached by the middleware when present.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let user = CurrentUser(authenticate(&parts.headers, &state.tokens)?);
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

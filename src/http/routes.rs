// Route table and handlers.

use super::error::ApiError;
use super::extract::{ClientIp, CurrentUser};
use super::AppState;
use crate::core::clock;
use crate::core::content::{Content, ContentStatus, UserAccount};
use crate::core::events::Event;
use crate::core::firewall::{Actor, FirewallStore, NewContent, NewUser};
use crate::core::moderation::{ReviewAction, ReviewRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/users", post(create_user))
        .route("/api/v1/contents", post(create_content))
        .route("/api/v1/contents/{id}", get(get_content))
        .route("/api/v1/contents/{id}/points", post(rate_content))
        .route("/api/v1/balances/{recipient_id}", get(get_balance))
        .route("/api/v1/events/{id}", get(get_event))
        .route(
            "/api/v1/moderations/review_firewall/{id}",
            post(review_firewall),
        )
        .with_state(state)
}

// ============================================================================
// REQUEST / RESPONSE BODIES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    pub username: String,
    pub email: String,
    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

fn default_notifications() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateContentBody {
    pub parent_id: Option<Uuid>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct RateContentBody {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub action: ReviewAction,
}

#[derive(Debug, Serialize)]
pub struct BalanceBody {
    pub recipient_id: Uuid,
    pub balance: i64,
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation(format!("\"{}\" is not a valid id", raw)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn create_user(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<CreateUserBody>, JsonRejection>,
) -> Result<(StatusCode, Json<UserAccount>), ApiError> {
    let payload = body(payload)?;
    let user = state
        .firewall
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            notifications: payload.notifications,
            origin_ip: ip,
            requested_at: clock::now(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn create_content(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ClientIp(ip): ClientIp,
    payload: Result<Json<CreateContentBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Content>), ApiError> {
    let payload = body(payload)?;
    let content = state
        .firewall
        .create_content(NewContent {
            owner_id: user_id,
            parent_id: payload.parent_id,
            slug: payload.slug,
            title: payload.title,
            status: payload.status.unwrap_or(ContentStatus::Published),
            origin_ip: ip,
            requested_at: clock::now(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(content)))
}

async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Content>, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .find_content(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Content {} does not exist", id)))
}

async fn rate_content(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    payload: Result<Json<RateContentBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let id = parse_id(&id)?;
    let payload = body(payload)?;
    let event = state
        .balances
        .rate_content(id, Actor::user(user_id, ip), payload.amount, clock::now())
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn get_balance(
    State(state): State<AppState>,
    Path(recipient_id): Path<String>,
) -> Result<Json<BalanceBody>, ApiError> {
    let recipient_id = parse_id(&recipient_id)?;
    let balance = state.balances.balance(recipient_id).await?;
    Ok(Json(BalanceBody {
        recipient_id,
        balance,
    }))
}

async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let id = parse_id(&id)?;
    state
        .store
        .find_event(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Event {} does not exist", id)))
}

async fn review_firewall(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    payload: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<Event>, ApiError> {
    let firewall_event_id = parse_id(&id)?;
    let payload = body(payload)?;
    let outcome = state
        .reviewer
        .review(ReviewRequest {
            firewall_event_id,
            action: payload.action,
            reviewer_id: user_id,
            reviewer_ip: ip,
            requested_at: clock::now(),
        })
        .await?;
    Ok(Json(outcome.event))
}

// ============================================================================
// TESTS
// ============================================================================

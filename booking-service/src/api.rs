use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use shared::*;
use std::sync::Arc;
use uuid::Uuid;
use crate::handlers::BookingProcessor;
use crate::store::{BookingStore, FarmStore};

#[derive(Clone)]
pub struct AppState {
    pub processor: BookingProcessor,
    pub farms: Arc<dyn FarmStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub featured_limit: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub farm_id: Uuid,
    #[serde(deserialize_with = "deserialize_calendar_date")]
    pub date: NaiveDate,
    pub meals: Vec<BookingLineItem>,
    pub user_email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingResponse {
    pub message: String,
    pub booking_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FarmQuery {
    pub location: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { message: message.into() }))
}

/// `Json` whose rejections use the same `{message}` body as every other error.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                // Bodies that parse but do not fit the type are invalid requests too.
                let status = match rejection.status() {
                    StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
                    status => status,
                };
                Err(api_error(status, rejection.body_text()))
            }
        }
    }
}

/// Accepts a plain `YYYY-MM-DD` date or an RFC 3339 timestamp, whose UTC
/// calendar day is used.
fn deserialize_calendar_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(date);
    }
    raw.parse::<DateTime<Utc>>()
        .map(|timestamp| timestamp.date_naive())
        .map_err(|_| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

pub fn booking_error_response(error: &BookingError) -> ApiError {
    let status = match error {
        BookingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        BookingError::NotFound => StatusCode::NOT_FOUND,
        BookingError::Unavailable => StatusCode::BAD_REQUEST,
        BookingError::InsufficientInventory { .. } => StatusCode::BAD_REQUEST,
        BookingError::TransactionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, error.to_string())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/farms", get(list_farms).post(create_farm))
        .route("/api/farms/:id", get(get_farm).put(update_farm))
        .route("/api/search-farms", get(list_farms))
        .route("/api/featured-farms", get(featured_farms))
        .route("/api/available-dates", get(available_dates))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn create_booking(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateBookingRequest>,
) -> Result<Json<CreateBookingResponse>, ApiError> {
    let booking_request = BookingRequest {
        farm_id: request.farm_id,
        date: request.date,
        line_items: request.meals,
        requester_email: request.user_email,
    };

    match state.processor.submit_booking(booking_request).await {
        Ok(confirmation) => {
            let notification_error = match &confirmation.notification {
                NotificationStatus::Failed { reason } => Some(reason.clone()),
                NotificationStatus::Sent { .. } => None,
            };
            Ok(Json(CreateBookingResponse {
                message: "Booking confirmed".to_string(),
                booking_id: confirmation.booking_id,
                email_preview: confirmation.notification.reference().map(str::to_string),
                notification_error,
            }))
        }
        Err(e) => {
            tracing::warn!("Booking rejected ({}): {}", e.kind(), e);
            Err(booking_error_response(&e))
        }
    }
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, ApiError> {
    match state.bookings.get_booking(booking_id).await {
        Ok(Some(booking)) => Ok(Json(booking)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Booking not found")),
        Err(e) => {
            tracing::error!("Error fetching booking: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching booking"))
        }
    }
}

pub async fn list_farms(
    State(state): State<AppState>,
    Query(query): Query<FarmQuery>,
) -> Result<Json<Vec<Farm>>, ApiError> {
    match state.farms.list_farms(query.location.as_deref()).await {
        Ok(farms) => Ok(Json(match query.date {
            Some(date) => farms.into_iter().filter(|farm| farm.is_available_on(date)).collect(),
            None => farms,
        })),
        Err(e) => {
            tracing::error!("Error fetching farms: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching farms"))
        }
    }
}

pub async fn get_farm(
    State(state): State<AppState>,
    Path(farm_id): Path<Uuid>,
) -> Result<Json<Farm>, ApiError> {
    match state.farms.get_farm(farm_id).await {
        Ok(Some(farm)) => Ok(Json(farm)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Farm not found")),
        Err(e) => {
            tracing::error!("Error fetching farm: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching farm"))
        }
    }
}

pub async fn create_farm(
    State(state): State<AppState>,
    ApiJson(farm): ApiJson<NewFarm>,
) -> Result<(StatusCode, Json<Farm>), ApiError> {
    farm.validate()
        .map_err(|message| api_error(StatusCode::BAD_REQUEST, message))?;

    match state.farms.create_farm(farm).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(created))),
        Err(e) => {
            tracing::error!("Error creating farm: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error creating farm"))
        }
    }
}

pub async fn update_farm(
    State(state): State<AppState>,
    Path(farm_id): Path<Uuid>,
    ApiJson(farm): ApiJson<NewFarm>,
) -> Result<Json<Farm>, ApiError> {
    farm.validate()
        .map_err(|message| api_error(StatusCode::BAD_REQUEST, message))?;

    match state.farms.update_farm(farm_id, farm).await {
        Ok(Some(updated)) => Ok(Json(updated)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Farm not found")),
        Err(e) => {
            tracing::error!("Error updating farm: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error updating farm"))
        }
    }
}

pub async fn featured_farms(State(state): State<AppState>) -> Result<Json<Vec<Farm>>, ApiError> {
    match state.farms.featured_farms(state.featured_limit).await {
        Ok(farms) => Ok(Json(farms)),
        Err(e) => {
            tracing::error!("Error fetching featured farms: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching featured farms"))
        }
    }
}

pub async fn available_dates(State(state): State<AppState>) -> Result<Json<Vec<NaiveDate>>, ApiError> {
    match state.farms.available_dates().await {
        Ok(dates) => Ok(Json(dates)),
        Err(e) => {
            tracing::error!("Error fetching available dates: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching available dates"))
        }
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}

use actix_web::{web, HttpResponse, Responder};
use validator::Validate;
use crate::core::Dispatcher;
use crate::models::{
    token_prefix, DeviceRegistration, DispatchAcceptedResponse, ErrorResponse, HealthResponse,
    ListingCreatedEvent, ListingCreatedRequest, Platform, ProviderStatus, RegisterDeviceRequest,
    RegisterDeviceResponse,
};
use crate::services::{PostgresClient, RegistrationStore};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub registrations: Arc<dyn RegistrationStore>,
    pub postgres: Arc<PostgresClient>,
}

/// Configure notification routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/listings/created", web::post().to(listing_created))
        .route("/devices", web::post().to(register_device))
        .route("/devices/{token}", web::delete().to(unregister_device));
}

fn bad_request(error: &str, message: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: 400,
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let pg_healthy = state.postgres.health_check().await.unwrap_or(false);

    let status = if pg_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        providers: ProviderStatus {
            fcm: state.dispatcher.fcm_enabled(),
            apns: state.dispatcher.apns_enabled(),
        },
    })
}

/// New listing event
///
/// POST /api/v1/listings/created
///
/// The dispatch runs in the background; the caller gets 202 straight away so
/// listing creation never waits on push delivery.
async fn listing_created(
    state: web::Data<AppState>,
    req: web::Json<ListingCreatedRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return bad_request("Validation failed", errors.to_string());
    }

    let event: ListingCreatedEvent = req.into_inner().into();
    let dispatch_id = uuid::Uuid::new_v4().to_string();
    let listing_id = event.listing_id.clone();

    tracing::info!("Accepted listing {} for dispatch {}", listing_id, dispatch_id);

    let dispatcher = state.dispatcher.clone();
    actix_web::rt::spawn(async move {
        dispatcher.dispatch(&event).await;
    });

    HttpResponse::Accepted().json(DispatchAcceptedResponse {
        accepted: true,
        dispatch_id,
        listing_id,
    })
}

/// Register a device token
///
/// POST /api/v1/devices
///
/// ```json
/// { "userId": "string", "deviceToken": "string", "platform": "android|apple" }
/// ```
async fn register_device(
    state: web::Data<AppState>,
    req: web::Json<RegisterDeviceRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return bad_request("Validation failed", errors.to_string());
    }

    let platform = match Platform::parse(&req.platform) {
        Some(platform) => platform,
        None => {
            return bad_request(
                "Invalid platform",
                "Platform must be one of: android, apple".to_string(),
            )
        }
    };

    let registration = DeviceRegistration {
        user_id: req.user_id.clone(),
        device_token: req.device_token.clone(),
        platform,
        registered_at: chrono::Utc::now(),
    };

    match state.registrations.upsert_registration(&registration).await {
        Ok(()) => HttpResponse::Ok().json(RegisterDeviceResponse {
            registered: true,
            platform: platform.as_str().to_string(),
        }),
        Err(e) => {
            tracing::error!(
                "Failed to register device {} for {}: {}",
                token_prefix(&req.device_token),
                req.user_id,
                e
            );
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to register device".to_string(),
                message: e.to_string(),
                status_code: 500,
            })
        }
    }
}

/// Remove a device token; succeeds whether or not it was registered
///
/// DELETE /api/v1/devices/{token}
async fn unregister_device(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let token = path.into_inner();

    match state.registrations.remove_registration(&token).await {
        Ok(existed) => {
            tracing::debug!("Unregistered {} (existed: {})", token_prefix(&token), existed);
            HttpResponse::NoContent().finish()
        }
        Err(e) => {
            tracing::error!("Failed to unregister {}: {}", token_prefix(&token), e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to unregister device".to_string(),
                message: e.to_string(),
                status_code: 500,
            })
        }
    }
}

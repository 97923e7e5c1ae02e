use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub providers: ProviderStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub fcm: bool,
    pub apns: bool,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Returned when a listing event is accepted for background dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAcceptedResponse {
    pub accepted: bool,
    pub dispatch_id: String,
    pub listing_id: String,
}

/// Device registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDeviceResponse {
    pub registered: bool,
    pub platform: String,
}

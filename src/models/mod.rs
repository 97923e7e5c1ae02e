// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    token_prefix, DeliveryStatus, DeviceRegistration, DispatchSummary, FilterCriteria, FilterMode,
    ListingCreatedEvent, NotificationPreference, Platform, PropertyKind, Provider,
    PushMessage, ProviderFailure,
    SearchFilter, SellerOrigin, TokenOutcome,
};
pub use requests::{ListingCreatedRequest, RegisterDeviceRequest};
pub use responses::{
    DispatchAcceptedResponse, ErrorResponse, HealthResponse, ProviderStatus, RegisterDeviceResponse,
};

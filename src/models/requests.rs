use serde::{Deserialize, Serialize};
use validator::Validate;

/// Inbound "listing created" notification from the property workflow
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListingCreatedRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "listing_id", rename = "listingId")]
    pub listing_id: String,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[serde(alias = "property_kind", rename = "propertyKind")]
    pub property_kind: crate::models::PropertyKind,
    #[serde(alias = "seller_origin", rename = "sellerOrigin")]
    pub seller_origin: crate::models::SellerOrigin,
}

impl From<ListingCreatedRequest> for crate::models::ListingCreatedEvent {
    fn from(req: ListingCreatedRequest) -> Self {
        Self {
            listing_id: req.listing_id,
            title: req.title,
            city: req.city,
            price: req.price,
            property_kind: req.property_kind,
            seller_origin: req.seller_origin,
        }
    }
}

/// Request to register (or re-register) a device token
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterDeviceRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[validate(length(min = 1, max = 4096))]
    #[serde(alias = "device_token", rename = "deviceToken")]
    pub device_token: String,
    /// "android" or "apple" (aliases "fcm", "ios", "apns")
    pub platform: String,
}

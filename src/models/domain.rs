use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Strategy a user picked for deciding which new listings are relevant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    All,
    SameAsSearch,
    Custom,
}

impl FilterMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(FilterMode::All),
            "same_as_search" => Some(FilterMode::SameAsSearch),
            "custom" => Some(FilterMode::Custom),
            _ => None,
        }
    }
}

/// Location, property kind and seller criteria shared by custom preferences
/// and saved search filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Empty means no location restriction
    #[serde(default)]
    pub locations: BTreeSet<String>,
    #[serde(rename = "includeHouse", default = "default_true")]
    pub include_house: bool,
    #[serde(rename = "includeLand", default = "default_true")]
    pub include_land: bool,
    #[serde(rename = "includeForeclosure", default = "default_true")]
    pub include_foreclosure: bool,
    #[serde(rename = "includePrivateSeller", default = "default_true")]
    pub include_private_seller: bool,
    #[serde(rename = "includeBroker", default = "default_true")]
    pub include_broker: bool,
    #[serde(rename = "includePortal", default = "default_true")]
    pub include_portal: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            locations: BTreeSet::new(),
            include_house: true,
            include_land: true,
            include_foreclosure: true,
            include_private_seller: true,
            include_broker: true,
            include_portal: true,
        }
    }
}

fn default_true() -> bool { true }

/// A user's notification preference (at most one per user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "isEnabled")]
    pub is_enabled: bool,
    #[serde(rename = "filterMode")]
    pub filter_mode: FilterMode,
    /// Only consulted in `Custom` mode
    #[serde(default)]
    pub criteria: FilterCriteria,
}

/// The user's saved search filter, read when the preference is `SameAsSearch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub criteria: FilterCriteria,
}

/// Platform class of a registered device, which also selects the push gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Apple,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Apple => "apple",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "android" | "fcm" => Some(Platform::Android),
            "apple" | "ios" | "apns" => Some(Platform::Apple),
            _ => None,
        }
    }
}

/// A device token registered by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "deviceToken")]
    pub device_token: String,
    pub platform: Platform,
    #[serde(rename = "registeredAt")]
    pub registered_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyKind {
    House,
    Land,
    Foreclosure,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SellerOrigin {
    PrivateSeller,
    Broker,
    Portal,
    #[serde(other)]
    Other,
}

/// Event emitted by the property-creation workflow, consumed once per delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingCreatedEvent {
    #[serde(rename = "listingId")]
    pub listing_id: String,
    pub title: String,
    pub city: String,
    pub price: f64,
    #[serde(rename = "propertyKind")]
    pub property_kind: PropertyKind,
    #[serde(rename = "sellerOrigin")]
    pub seller_origin: SellerOrigin,
}

/// Provider-neutral notification content built once per listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    pub category: Option<String>,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
}

impl PushMessage {
    pub fn for_listing(listing: &ListingCreatedEvent) -> Self {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "new_listing".to_string());
        data.insert("listingId".to_string(), listing.listing_id.clone());
        data.insert("city".to_string(), listing.city.clone());
        data.insert("price".to_string(), format!("{:.0}", listing.price));

        Self {
            title: format!("New listing in {}", listing.city),
            body: format!("{} - {:.0}", listing.title, listing.price),
            data,
            category: Some("NEW_LISTING".to_string()),
            thread_id: Some("listings".to_string()),
        }
    }
}

/// Which gateway produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Fcm,
    Apns,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Fcm => write!(f, "fcm"),
            Provider::Apns => write!(f, "apns"),
        }
    }
}

/// Result of trying to deliver to one device token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    /// Provider not configured, nothing was attempted
    Skipped,
    /// Token can never succeed again and must be pruned
    Permanent(String),
    /// Token retained for a future attempt
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOutcome {
    pub token: String,
    pub status: DeliveryStatus,
}

impl TokenOutcome {
    pub fn new(token: impl Into<String>, status: DeliveryStatus) -> Self {
        Self { token: token.into(), status }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self.status, DeliveryStatus::Permanent(_))
    }
}

/// A provider-level failure caught during dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: Provider,
    pub message: String,
}

/// Outcome counts of one dispatch, for observability only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    #[serde(rename = "listingId")]
    pub listing_id: String,
    #[serde(rename = "matchedUsers")]
    pub matched_users: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Tokens deleted from the registration store
    pub pruned: usize,
    /// Sends still in flight when the dispatch deadline passed
    pub abandoned: usize,
    #[serde(rename = "providerFailures")]
    pub provider_failures: Vec<ProviderFailure>,
    /// Recipient resolution failed and nothing was sent
    pub aborted: bool,
}

impl DispatchSummary {
    pub fn empty(listing_id: impl Into<String>) -> Self {
        Self {
            listing_id: listing_id.into(),
            ..Default::default()
        }
    }

    /// Fold per-token outcomes into the counters
    pub fn record(&mut self, outcomes: &[TokenOutcome]) {
        for outcome in outcomes {
            match outcome.status {
                DeliveryStatus::Sent => self.sent += 1,
                DeliveryStatus::Skipped => self.skipped += 1,
                DeliveryStatus::Permanent(_) | DeliveryStatus::Transient(_) => self.failed += 1,
            }
        }
    }
}

/// Shorten a device token for logging; full tokens never reach the logs
pub fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if prefix.len() < token.len() {
        format!("{}…", prefix)
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_event_deserializes_unknown_kinds() {
        let json = r#"{
            "listingId": "l-1",
            "title": "Cottage",
            "city": "Ghent",
            "price": 250000.0,
            "propertyKind": "houseboat",
            "sellerOrigin": "auction"
        }"#;

        let event: ListingCreatedEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.property_kind, PropertyKind::Other);
        assert_eq!(event.seller_origin, SellerOrigin::Other);
    }

    #[test]
    fn test_push_message_for_listing() {
        let listing = ListingCreatedEvent {
            listing_id: "l-9".to_string(),
            title: "Canal house".to_string(),
            city: "Leiden".to_string(),
            price: 499_999.6,
            property_kind: PropertyKind::House,
            seller_origin: SellerOrigin::Broker,
        };

        let message = PushMessage::for_listing(&listing);
        assert_eq!(message.title, "New listing in Leiden");
        assert_eq!(message.body, "Canal house - 500000");
        assert_eq!(message.data.get("listingId").map(String::as_str), Some("l-9"));
    }

    #[test]
    fn test_platform_aliases() {
        assert_eq!(Platform::parse("iOS"), Some(Platform::Apple));
        assert_eq!(Platform::parse("fcm"), Some(Platform::Android));
        assert_eq!(Platform::parse("windows"), None);
    }

    #[test]
    fn test_token_prefix_hides_tail() {
        assert_eq!(token_prefix("abcdefghijklmnop"), "abcdefgh…");
        assert_eq!(token_prefix("short"), "short");
    }

    #[test]
    fn test_summary_record_counts() {
        let mut summary = DispatchSummary::empty("l-1");
        summary.record(&[
            TokenOutcome::new("a", DeliveryStatus::Sent),
            TokenOutcome::new("b", DeliveryStatus::Skipped),
            TokenOutcome::new("c", DeliveryStatus::Permanent("Unregistered".into())),
            TokenOutcome::new("d", DeliveryStatus::Transient("Throttled".into())),
        ]);

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
    }
}

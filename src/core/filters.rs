use crate::models::{
    FilterCriteria, FilterMode, ListingCreatedEvent, NotificationPreference, PropertyKind,
    SearchFilter, SellerOrigin,
};

/// Decide whether a new listing is relevant to a user's notification preference
///
/// `search_filter` is only consulted for `SameAsSearch` preferences. A user who
/// never saved a search filter receives every listing.
#[inline]
pub fn matches(
    preference: &NotificationPreference,
    search_filter: Option<&SearchFilter>,
    listing: &ListingCreatedEvent,
) -> bool {
    if !preference.is_enabled {
        return false;
    }

    match preference.filter_mode {
        FilterMode::All => true,
        FilterMode::SameAsSearch => match search_filter {
            Some(filter) => matches_criteria(&filter.criteria, listing),
            None => true,
        },
        FilterMode::Custom => matches_criteria(&preference.criteria, listing),
    }
}

/// Location, property kind and seller origin checks, ANDed together
#[inline]
pub fn matches_criteria(criteria: &FilterCriteria, listing: &ListingCreatedEvent) -> bool {
    matches_location(criteria, &listing.city)
        && matches_property_kind(criteria, listing.property_kind)
        && matches_seller_origin(criteria, listing.seller_origin)
}

/// Empty location set accepts any city; otherwise a case-insensitive exact match is required
#[inline]
pub fn matches_location(criteria: &FilterCriteria, city: &str) -> bool {
    if criteria.locations.is_empty() {
        return true;
    }

    let city = city.trim().to_lowercase();
    criteria
        .locations
        .iter()
        .any(|location| location.trim().to_lowercase() == city)
}

#[inline]
pub fn matches_property_kind(criteria: &FilterCriteria, kind: PropertyKind) -> bool {
    match kind {
        PropertyKind::House => criteria.include_house,
        PropertyKind::Land => criteria.include_land,
        PropertyKind::Foreclosure => criteria.include_foreclosure,
        PropertyKind::Other => true,
    }
}

#[inline]
pub fn matches_seller_origin(criteria: &FilterCriteria, origin: SellerOrigin) -> bool {
    match origin {
        SellerOrigin::PrivateSeller => criteria.include_private_seller,
        SellerOrigin::Broker => criteria.include_broker,
        SellerOrigin::Portal => criteria.include_portal,
        SellerOrigin::Other => true,
    }
}

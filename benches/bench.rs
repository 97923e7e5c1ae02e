// Criterion benchmarks for Listing Push

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use listing_push::core::filters::{matches, matches_location};
use listing_push::models::{
    FilterCriteria, FilterMode, ListingCreatedEvent, NotificationPreference, PropertyKind,
    PushMessage, SearchFilter, SellerOrigin,
};
use std::collections::HashMap;

const CITIES: [&str; 5] = ["Amsterdam", "Rotterdam", "Utrecht", "Eindhoven", "Groningen"];

fn create_preference(id: usize) -> NotificationPreference {
    let filter_mode = match id % 3 {
        0 => FilterMode::All,
        1 => FilterMode::SameAsSearch,
        _ => FilterMode::Custom,
    };

    NotificationPreference {
        user_id: format!("user-{}", id),
        is_enabled: true,
        filter_mode,
        criteria: FilterCriteria {
            locations: [CITIES[id % CITIES.len()].to_string()].into_iter().collect(),
            include_land: id % 2 == 0,
            include_private_seller: id % 4 != 0,
            ..Default::default()
        },
    }
}

fn create_search_filter(id: usize) -> SearchFilter {
    SearchFilter {
        user_id: format!("user-{}", id),
        criteria: FilterCriteria {
            locations: [CITIES[(id + 1) % CITIES.len()].to_string()].into_iter().collect(),
            ..Default::default()
        },
    }
}

fn create_listing() -> ListingCreatedEvent {
    ListingCreatedEvent {
        listing_id: "listing-1".to_string(),
        title: "Canal house".to_string(),
        city: "Utrecht".to_string(),
        price: 650_000.0,
        property_kind: PropertyKind::House,
        seller_origin: SellerOrigin::Broker,
    }
}

fn bench_location_match(c: &mut Criterion) {
    let criteria = FilterCriteria {
        locations: CITIES.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    };

    c.bench_function("location_match", |b| {
        b.iter(|| matches_location(black_box(&criteria), black_box(" groningen ")));
    });
}

fn bench_recipient_matching(c: &mut Criterion) {
    let listing = create_listing();

    let mut group = c.benchmark_group("recipient_matching");

    for preference_count in [100, 1_000, 10_000].iter() {
        let preferences: Vec<NotificationPreference> =
            (0..*preference_count).map(create_preference).collect();
        let search_filters: HashMap<String, SearchFilter> = (0..*preference_count)
            .filter(|i| i % 3 == 1)
            .map(|i| (format!("user-{}", i), create_search_filter(i)))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("matches", preference_count),
            preference_count,
            |b, _| {
                b.iter(|| {
                    let matched = preferences
                        .iter()
                        .filter(|p| matches(p, search_filters.get(&p.user_id), black_box(&listing)))
                        .count();
                    black_box(matched)
                });
            },
        );
    }

    group.finish();
}

fn bench_push_message(c: &mut Criterion) {
    let listing = create_listing();

    c.bench_function("push_message_for_listing", |b| {
        b.iter(|| PushMessage::for_listing(black_box(&listing)));
    });
}

criterion_group!(
    benches,
    bench_location_match,
    bench_recipient_matching,
    bench_push_message
);

criterion_main!(benches);

use crate::config::DispatchSettings;
use crate::core::filters::matches;
use crate::models::{
    token_prefix, DeliveryStatus, DispatchSummary, FilterMode, ListingCreatedEvent, Platform,
    Provider, ProviderFailure, PushMessage, SearchFilter, TokenOutcome,
};
use crate::services::{ApnsClient, FcmClient, PreferenceStore, RegistrationStore, StoreError};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;

/// Failure to resolve recipients; the only error that stops a dispatch
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to load notification preferences: {0}")]
    Preferences(#[source] StoreError),

    #[error("Failed to load search filters: {0}")]
    SearchFilters(#[source] StoreError),

    #[error("Failed to load device registrations: {0}")]
    Registrations(#[source] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    /// Upper bound on in-flight per-device sends
    pub max_concurrent_sends: usize,
    /// Sends not finished by then are abandoned
    pub deadline: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions::from(&DispatchSettings::default())
    }
}

impl From<&DispatchSettings> for DispatchOptions {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            max_concurrent_sends: settings.max_concurrent_sends.max(1),
            deadline: Duration::from_secs(settings.deadline_secs),
        }
    }
}

/// What one provider reported back
#[derive(Debug, Default)]
struct ProviderReport {
    outcomes: Vec<TokenOutcome>,
    failures: Vec<ProviderFailure>,
    abandoned: usize,
}

/// Fans a new listing out to every interested user's devices
///
/// # Pipeline
/// 1. Load enabled preferences (and search filters for `SameAsSearch` users, batched)
/// 2. Match the listing against each preference
/// 3. Load registrations of the matched users and split them by platform
/// 4. Send through both gateways concurrently
/// 5. Prune tokens reported as permanently invalid
#[derive(Clone)]
pub struct Dispatcher {
    preferences: Arc<dyn PreferenceStore>,
    registrations: Arc<dyn RegistrationStore>,
    fcm: Arc<FcmClient>,
    apns: Arc<ApnsClient>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        preferences: Arc<dyn PreferenceStore>,
        registrations: Arc<dyn RegistrationStore>,
        fcm: Arc<FcmClient>,
        apns: Arc<ApnsClient>,
        options: DispatchOptions,
    ) -> Self {
        // A zero cap would never poll a send
        let options = DispatchOptions {
            max_concurrent_sends: options.max_concurrent_sends.max(1),
            ..options
        };

        Self {
            preferences,
            registrations,
            fcm,
            apns,
            options,
        }
    }

    pub fn fcm_enabled(&self) -> bool {
        self.fcm.is_enabled()
    }

    pub fn apns_enabled(&self) -> bool {
        self.apns.is_enabled()
    }

    /// Dispatch notifications for a new listing
    ///
    /// Never fails: store errors are logged and reported through `aborted`,
    /// provider errors through `provider_failures`.
    pub async fn dispatch(&self, listing: &ListingCreatedEvent) -> DispatchSummary {
        let span = tracing::info_span!("dispatch", listing_id = %listing.listing_id);

        async {
            match self.try_dispatch(listing).await {
                Ok(summary) => {
                    tracing::info!(
                        matched_users = summary.matched_users,
                        sent = summary.sent,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        pruned = summary.pruned,
                        abandoned = summary.abandoned,
                        "Dispatch finished"
                    );
                    summary
                }
                Err(e) => {
                    tracing::error!("Dispatch aborted: {}", e);
                    DispatchSummary {
                        aborted: true,
                        ..DispatchSummary::empty(listing.listing_id.clone())
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Users whose preference matches the listing, deduplicated and sorted
    pub async fn resolve_recipients(
        &self,
        listing: &ListingCreatedEvent,
    ) -> Result<Vec<String>, DispatchError> {
        let preferences = self
            .preferences
            .load_enabled_preferences()
            .await
            .map_err(DispatchError::Preferences)?;

        if preferences.is_empty() {
            return Ok(Vec::new());
        }

        let same_as_search: Vec<String> = preferences
            .iter()
            .filter(|p| p.filter_mode == FilterMode::SameAsSearch)
            .map(|p| p.user_id.clone())
            .collect();

        let search_filters: HashMap<String, SearchFilter> = if same_as_search.is_empty() {
            HashMap::new()
        } else {
            self.preferences
                .load_search_filters_by_users(&same_as_search)
                .await
                .map_err(DispatchError::SearchFilters)?
                .into_iter()
                .map(|f| (f.user_id.clone(), f))
                .collect()
        };

        let recipients: BTreeSet<String> = preferences
            .iter()
            .filter(|p| matches(p, search_filters.get(&p.user_id), listing))
            .map(|p| p.user_id.clone())
            .collect();

        tracing::debug!(
            "{} of {} enabled preferences match",
            recipients.len(),
            preferences.len()
        );

        Ok(recipients.into_iter().collect())
    }

    async fn try_dispatch(
        &self,
        listing: &ListingCreatedEvent,
    ) -> Result<DispatchSummary, DispatchError> {
        let mut summary = DispatchSummary::empty(listing.listing_id.clone());

        let recipients = self.resolve_recipients(listing).await?;
        summary.matched_users = recipients.len();
        if recipients.is_empty() {
            return Ok(summary);
        }

        let registrations = self
            .registrations
            .load_registrations_by_users(&recipients)
            .await
            .map_err(DispatchError::Registrations)?;

        if registrations.is_empty() {
            tracing::debug!("No devices registered for matched users");
            return Ok(summary);
        }

        // Tokens are unique by invariant, but a duplicate row must not send twice
        let mut seen = HashSet::new();
        let (android, apple): (Vec<_>, Vec<_>) = registrations
            .into_iter()
            .filter(|r| seen.insert(r.device_token.clone()))
            .partition(|r| r.platform == Platform::Android);

        let android: Vec<String> = android.into_iter().map(|r| r.device_token).collect();
        let apple: Vec<String> = apple.into_iter().map(|r| r.device_token).collect();

        tracing::debug!(
            "Sending to {} Android and {} Apple devices",
            android.len(),
            apple.len()
        );

        let message = PushMessage::for_listing(listing);
        let deadline = deadline_after(Instant::now(), self.options.deadline);

        let (android_report, apple_report) = tokio::join!(
            self.send_android(&android, &message, deadline),
            self.send_apple(&apple, &message, deadline),
        );

        let mut invalid = Vec::new();
        for report in [android_report, apple_report] {
            summary.record(&report.outcomes);
            summary.abandoned += report.abandoned;
            summary.provider_failures.extend(report.failures);
            invalid.extend(
                report
                    .outcomes
                    .into_iter()
                    .filter(TokenOutcome::is_permanent)
                    .map(|o| o.token),
            );
        }

        if !invalid.is_empty() {
            match self.registrations.delete_registrations_by_tokens(&invalid).await {
                Ok(removed) => summary.pruned = removed as usize,
                Err(e) => {
                    tracing::error!("Failed to prune {} invalid tokens: {}", invalid.len(), e)
                }
            }
        }

        Ok(summary)
    }

    /// One multicast call per chunk; chunks go out in sequence
    async fn send_android(
        &self,
        tokens: &[String],
        message: &PushMessage,
        deadline: Instant,
    ) -> ProviderReport {
        let mut report = ProviderReport::default();
        if tokens.is_empty() {
            return report;
        }

        let mut chunks = tokens.chunks(self.fcm.max_batch_size());
        while let Some(chunk) = chunks.next() {
            match tokio::time::timeout_at(deadline, self.fcm.send_batch(chunk, message)).await {
                Ok(Ok(outcomes)) => {
                    log_failures(Provider::Fcm, &outcomes);
                    report.outcomes.extend(outcomes);
                }
                Ok(Err(e)) => {
                    tracing::error!("FCM batch of {} tokens failed: {}", chunk.len(), e);
                    report.failures.push(ProviderFailure {
                        provider: Provider::Fcm,
                        message: e.to_string(),
                    });
                    report.outcomes.extend(chunk.iter().map(|t| {
                        TokenOutcome::new(t.as_str(), DeliveryStatus::Transient(e.to_string()))
                    }));
                }
                Err(_) => {
                    let remaining =
                        chunk.len() + chunks.by_ref().map(<[String]>::len).sum::<usize>();
                    tracing::warn!(
                        "Dispatch deadline reached, abandoning {} Android sends",
                        remaining
                    );
                    report.abandoned = remaining;
                    break;
                }
            }
        }

        report
    }

    /// One request per device, at most `max_concurrent_sends` in flight
    async fn send_apple(
        &self,
        tokens: &[String],
        message: &PushMessage,
        deadline: Instant,
    ) -> ProviderReport {
        let mut report = ProviderReport::default();
        if tokens.is_empty() {
            return report;
        }

        if !self.apns.is_enabled() {
            report.outcomes = tokens
                .iter()
                .map(|t| TokenOutcome::new(t.as_str(), DeliveryStatus::Skipped))
                .collect();
            return report;
        }

        let apns = &self.apns;
        let mut sends = stream::iter(tokens)
            .map(|token| async move { apns.deliver(token, message).await })
            .buffer_unordered(self.options.max_concurrent_sends);

        let mut network_errors = 0usize;
        let mut first_error = None;

        let completed = tokio::time::timeout_at(deadline, async {
            while let Some((outcome, error)) = sends.next().await {
                if let Some(e) = error {
                    network_errors += 1;
                    first_error.get_or_insert_with(|| e.to_string());
                }
                report.outcomes.push(outcome);
            }
        })
        .await;

        if completed.is_err() {
            report.abandoned = tokens.len() - report.outcomes.len();
            tracing::warn!(
                "Dispatch deadline reached, abandoning {} Apple sends",
                report.abandoned
            );
        }

        if let Some(first) = first_error {
            report.failures.push(ProviderFailure {
                provider: Provider::Apns,
                message: format!("{} of {} sends failed: {}", network_errors, tokens.len(), first),
            });
        }

        log_failures(Provider::Apns, &report.outcomes);
        report
    }
}

/// `now + deadline`, or roughly thirty years out when that overflows
fn deadline_after(now: Instant, deadline: Duration) -> Instant {
    now.checked_add(deadline)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

fn log_failures(provider: Provider, outcomes: &[TokenOutcome]) {
    for outcome in outcomes {
        match &outcome.status {
            DeliveryStatus::Permanent(reason) => tracing::info!(
                "{} reported {} as invalid ({}), pruning",
                provider,
                token_prefix(&outcome.token),
                reason
            ),
            DeliveryStatus::Transient(reason) => tracing::warn!(
                "{} delivery to {} failed ({}), keeping token",
                provider,
                token_prefix(&outcome.token),
                reason
            ),
            DeliveryStatus::Sent | DeliveryStatus::Skipped => {}
        }
    }
}

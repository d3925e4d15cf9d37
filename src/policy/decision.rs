//! Turns a detection into an ordered set of ad images
//!
//! Related items come from the first non-empty strategy of the fallback
//! chain (cross-sell, day-and-hour, day). Each slot of the configured output
//! sequence then becomes one request to the generation service.

use super::animation::animate;
use super::request::{AdDecorations, DynamicAdRequest, PredefinedAdRequest};
use super::services::{AdServices, RelatedItem, ServiceError};
use crate::preferences::{
    Preferences, SlotKind, DEFAULT_DYNAMIC_SERVICE_PATH, DEFAULT_PREDEFINED_SERVICE_PATH,
};
use crate::queue::{DetectionEvent, FeedId};
use chrono::{DateTime, Datelike, Local, Timelike};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Attempts per slot when the generation service reports busy
pub const MAX_BUSY_ATTEMPTS: u32 = 3;

pub struct DecisionPolicy {
    services: Arc<dyn AdServices>,
    busy_retry_delay: Duration,
    now_fn: Box<dyn Fn() -> DateTime<Local> + Send + Sync>,
}

impl DecisionPolicy {
    pub fn new(services: Arc<dyn AdServices>, busy_retry_delay: Duration) -> Self {
        Self::new_with_clock(services, busy_retry_delay, Box::new(Local::now))
    }

    /// Create policy with a custom clock for the day/hour lookups
    pub fn new_with_clock(
        services: Arc<dyn AdServices>,
        busy_retry_delay: Duration,
        now_fn: Box<dyn Fn() -> DateTime<Local> + Send + Sync>,
    ) -> Self {
        Self {
            services,
            busy_retry_delay,
            now_fn,
        }
    }

    /// Run the fallback chain; empty when every strategy came back empty
    pub async fn related_items(
        &self,
        feed: &FeedId,
        event: Option<&DetectionEvent>,
    ) -> Vec<RelatedItem> {
        if let Some(event) = event {
            match self.services.cross_sell(&event.label_id).await {
                Ok(items) if !items.is_empty() => {
                    log::debug!(
                        "Cross-sell for {} on {}: {} items",
                        event.label_id,
                        feed,
                        items.len()
                    );
                    return items;
                }
                Ok(_) => log::debug!("No cross-sell items for {} on {}", event.label_id, feed),
                Err(e) => {
                    log::warn!("⚠️  Cross-sell lookup failed for {}: {}", event.label_id, e)
                }
            }
        }

        let now = (self.now_fn)();
        let dow = now.weekday().number_from_monday();
        let hh24 = now.hour();

        match self.services.items_by_day_hour(feed, dow, hh24).await {
            Ok(items) if !items.is_empty() => return items,
            Ok(_) => log::debug!("No day/hour items for {} (dow {}, hh {})", feed, dow, hh24),
            Err(e) => log::warn!("⚠️  Day/hour lookup failed for {}: {}", feed, e),
        }

        match self.services.items_by_day(feed, dow).await {
            Ok(items) if !items.is_empty() => return items,
            Ok(_) => log::debug!("No day items for {} (dow {})", feed, dow),
            Err(e) => log::warn!("⚠️  Day lookup failed for {}: {}", feed, e),
        }

        Vec::new()
    }

    /// Produce the images for one detection (or none)
    ///
    /// Returns `None` when no slot produced an image.
    pub async fn decide(
        &self,
        feed: &FeedId,
        event: Option<&DetectionEvent>,
        concept: &str,
        preferences: &Preferences,
    ) -> Option<Vec<String>> {
        let sequence = &preferences.digital_signage.output_sequence;
        if sequence.is_empty() {
            log::warn!("⚠️  Empty output sequence, nothing to decide for {}", feed);
            return None;
        }

        let related = self.related_items(feed, event).await;
        let mut images = Vec::new();
        let mut dynamic_used = 0usize;

        for slot in sequence {
            match slot {
                SlotKind::Dynamic => {
                    let complement = &preferences.dynamic_ads.query_complement;
                    let (query, item) = if related.is_empty() {
                        (format!("{}, {}", concept, complement), None)
                    } else {
                        let item = &related[dynamic_used % related.len()];
                        dynamic_used += 1;
                        (format!("{}. {}", item.label, complement), Some(item))
                    };
                    if let Some(image) = self.dynamic_slot(query, item, preferences).await {
                        images.push(image);
                    }
                }
                SlotKind::Predefined => {
                    let complement = &preferences.predefined_ads.query_complement;
                    let query = if related.is_empty() {
                        format!("{}. {}", concept, complement)
                    } else {
                        let labels: Vec<&str> = related.iter().map(|i| i.label.as_str()).collect();
                        format!("Benefits of {}. {}", labels.join(", "), complement)
                    };
                    images.extend(self.predefined_slot(query, related.first(), preferences).await);
                }
            }
        }

        if images.is_empty() {
            log::info!("🤷 No ads produced for {}", feed);
            return None;
        }

        let signage = &preferences.digital_signage;
        if signage.output_add_animation {
            // Decoding and encoding frames is CPU bound
            let stills = images.clone();
            let frame_ms = signage.output_animation_min_ms_per_img;
            match tokio::task::spawn_blocking(move || animate(&stills, frame_ms)).await {
                Ok(Some(gif)) => images.push(gif),
                Ok(None) => log::debug!("No animation for {}: no decodable stills", feed),
                Err(e) => log::error!("❌ Animation task for {} failed: {}", feed, e),
            }
        }

        Some(images)
    }

    /// Rendered price and promotional text for `item`, if the lookup succeeds
    async fn price_text(
        &self,
        item: Option<&RelatedItem>,
        preferences: &Preferences,
    ) -> (Option<String>, Option<String>) {
        let Some(item) = item else {
            return (None, None);
        };

        match self.services.price(&preferences.price, &item.id).await {
            Ok(quote) => {
                let discount = preferences.price.gral_percentage_discount;
                let price = if discount > 0.0 && discount < 100.0 {
                    quote.price * (1.0 - discount / 100.0)
                } else {
                    quote.price
                };
                (Some(format!("{:.2} {}", price, quote.unit)), quote.promotional_text)
            }
            Err(e) => {
                log::debug!("No price for {}: {}", item.id, e);
                (None, None)
            }
        }
    }

    async fn dynamic_slot(
        &self,
        query: String,
        item: Option<&RelatedItem>,
        preferences: &Preferences,
    ) -> Option<String> {
        let style = &preferences.dynamic_ads;
        let (price, promo) = self.price_text(item, preferences).await;
        let request = DynamicAdRequest {
            description: query,
            device: style.query_device.clone(),
            decorations: AdDecorations::from_style(style, price, promo.as_deref()),
        };

        let path = style.service_path_or(DEFAULT_DYNAMIC_SERVICE_PATH);
        let services = &self.services;
        let request = &request;
        self.with_busy_retry("dynamic ad", move || services.dynamic_ad(path, request))
            .await
    }

    async fn predefined_slot(
        &self,
        query: String,
        item: Option<&RelatedItem>,
        preferences: &Preferences,
    ) -> Vec<String> {
        let style = &preferences.predefined_ads;
        let (price, promo) = self.price_text(item, preferences).await;
        let request = PredefinedAdRequest {
            query,
            n_results: 1,
            use_default_ad_onempty: preferences.digital_signage.use_default_ad_when_emptyresult,
            decorations: AdDecorations::from_style(style, price, promo.as_deref()),
        };

        let path = style.service_path_or(DEFAULT_PREDEFINED_SERVICE_PATH);
        let services = &self.services;
        let request = &request;
        self.with_busy_retry("predefined ad", move || services.predefined_ads(path, request))
            .await
            .unwrap_or_default()
    }

    /// Retry `call` while the service is busy, at most [`MAX_BUSY_ATTEMPTS`] times
    async fn with_busy_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        for attempt in 1..=MAX_BUSY_ATTEMPTS {
            match call().await {
                Ok(value) => return Some(value),
                Err(ServiceError::Busy) => {
                    log::warn!(
                        "⏳ {} service busy (attempt {}/{})",
                        what,
                        attempt,
                        MAX_BUSY_ATTEMPTS
                    );
                    if attempt < MAX_BUSY_ATTEMPTS {
                        tokio::time::sleep(self.busy_retry_delay).await;
                    }
                }
                Err(e) => {
                    log::error!("❌ {} request failed: {}", what, e);
                    return None;
                }
            }
        }
        log::warn!("⚠️  Giving up on {} after {} busy replies", what, MAX_BUSY_ATTEMPTS);
        None
    }
}

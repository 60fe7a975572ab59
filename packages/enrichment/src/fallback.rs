//! Progressive interim data for locations with nothing usable yet.
//!
//! When an enrichment is slow or has nothing to work with, callers can
//! ask for degraded data instead: the nearest known records, streamed
//! one at a time in ascending distance order with a short stagger
//! between emissions. Nothing on this path is cached; it is always
//! recomputed.

use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt, pin_mut};
use poverty_map_indicator_models::{Location, NeighborRecord};
use poverty_map_spatial::SpatialStore;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{EVENT_ENRICHMENT_INTERIM, EnrichmentConfig, EnrichmentError, PushChannel};

/// One interim record, tagged with its position in the emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterimRecord {
    /// 1-based position of this record in the stream.
    pub rank: usize,
    /// Total number of records the stream will emit.
    pub total: usize,
    /// The nearby record being offered as a substitute.
    pub record: NeighborRecord,
}

/// Streams nearby records as interim substitutes for missing enrichment
/// results.
pub struct FallbackStreamer {
    store: Arc<dyn SpatialStore>,
    push: Arc<dyn PushChannel>,
    config: EnrichmentConfig,
}

impl FallbackStreamer {
    /// Creates a streamer over the given store and push channel.
    #[must_use]
    pub fn new(
        store: Arc<dyn SpatialStore>,
        push: Arc<dyn PushChannel>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            store,
            push,
            config,
        }
    }

    /// Returns a stream of up to `fallback_limit` records within
    /// `fallback_radius_km` of `location`, in ascending distance order,
    /// pausing `fallback_stagger_ms` between emissions.
    pub fn interim_records(
        &self,
        location: &Location,
    ) -> impl Stream<Item = Result<InterimRecord, EnrichmentError>> + Send + '_ {
        let latitude = location.latitude;
        let longitude = location.longitude;

        try_stream! {
            let neighbors = self
                .store
                .find_near(
                    latitude,
                    longitude,
                    self.config.fallback_radius_km,
                    self.config.fallback_limit,
                )
                .await?;

            let total = neighbors.len();
            log::debug!("Streaming {total} interim record(s) near ({latitude}, {longitude})");

            for (index, record) in neighbors.into_iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(self.config.fallback_stagger()).await;
                }
                yield InterimRecord {
                    rank: index + 1,
                    total,
                    record,
                };
            }
        }
    }

    /// Drives [`Self::interim_records`] to completion, delivering each
    /// record to `subscriber` as an [`EVENT_ENRICHMENT_INTERIM`] event.
    /// Returns the number of records delivered.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError::Adapter`] if the spatial store fails.
    pub async fn stream_interim(
        &self,
        location: &Location,
        subscriber: &str,
    ) -> Result<usize, EnrichmentError> {
        let stream = self.interim_records(location);
        pin_mut!(stream);

        let mut delivered = 0_usize;
        while let Some(item) = stream.next().await {
            let item = item?;
            self.push
                .notify(
                    subscriber,
                    EVENT_ENRICHMENT_INTERIM,
                    json!({
                        "location": location,
                        "rank": item.rank,
                        "total": item.total,
                        "record": item.record,
                    }),
                )
                .await;
            delivered += 1;
        }

        Ok(delivered)
    }
}

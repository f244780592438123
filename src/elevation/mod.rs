//! DEM elevation lookup for point records
//!
//! Records are enriched in sequential batches. A batch that fails is logged
//! and keeps its original elevations; enrichment itself never fails.

pub mod client;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use client::OpenElevationClient;

use crate::Result;
use crate::cache::PersistentCache;
use crate::models::PointRecord;

/// Default number of locations per lookup request
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Source of terrain elevations
#[async_trait]
pub trait ElevationProvider: Send + Sync {
    /// Elevations for `(lat, lon)` positions, in request order
    async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<Option<f64>>>;
}

/// Persistent elevation cache keyed by rounded position
#[derive(Clone)]
pub struct ElevationCache {
    cache: PersistentCache,
    ttl: Duration,
}

impl ElevationCache {
    pub fn open<P: AsRef<Path>>(path: P, ttl: Duration) -> Result<Self> {
        Ok(Self {
            cache: PersistentCache::open(path)?,
            ttl,
        })
    }

    /// Cached elevation, `None` on a miss or a cache failure
    pub async fn get(&self, record: &PointRecord) -> Option<f64> {
        match self.cache.get::<f64>(&record.cache_key()).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Elevation cache read failed: {}", e);
                None
            }
        }
    }

    pub async fn put(&self, record: &PointRecord, elevation: f64) {
        if let Err(e) = self.cache.put(&record.cache_key(), elevation, self.ttl).await {
            warn!("Elevation cache write failed: {}", e);
        }
    }
}

/// Outcome of an enrichment run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    /// Records whose elevation came from the service
    pub fetched: usize,
    /// Records whose elevation came from the cache
    pub cached: usize,
    /// Batches that failed and kept their original elevations
    pub failed_batches: usize,
}

/// Replace record elevations with DEM values, batch by batch
pub async fn enrich_elevations(
    provider: &dyn ElevationProvider,
    records: &mut [PointRecord],
    batch_size: usize,
    cache: Option<&ElevationCache>,
) -> EnrichmentSummary {
    let total = records.len();
    let batch_size = batch_size.max(1);
    let mut summary = EnrichmentSummary::default();
    let mut processed = 0;

    info!("Fetching elevation data for {} points", total);

    for (index, batch) in records.chunks_mut(batch_size).enumerate() {
        let mut pending = Vec::with_capacity(batch.len());
        for (i, record) in batch.iter_mut().enumerate() {
            let hit = match cache {
                Some(cache) => cache.get(record).await,
                None => None,
            };
            match hit {
                Some(elevation) => {
                    record.elevation = elevation;
                    summary.cached += 1;
                }
                None => pending.push(i),
            }
        }

        if !pending.is_empty() {
            let locations: Vec<(f64, f64)> = pending
                .iter()
                .map(|&i| (batch[i].latitude, batch[i].longitude))
                .collect();

            match provider.lookup(&locations).await {
                Ok(elevations) => {
                    for (&i, elevation) in pending.iter().zip(elevations) {
                        let Some(elevation) = elevation else {
                            continue;
                        };
                        batch[i].elevation = elevation;
                        summary.fetched += 1;
                        if let Some(cache) = cache {
                            cache.put(&batch[i], elevation).await;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Batch {} failed, keeping original elevations: {}",
                        index + 1,
                        e
                    );
                    summary.failed_batches += 1;
                }
            }
        } else {
            debug!("Batch {} served from cache", index + 1);
        }

        processed += batch.len();
        info!("Processed {}/{} coordinates", processed, total);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoKitError;
    use crate::models::Coordinate;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers `lat + lon`, fails on any batch containing latitude 99
    #[derive(Default)]
    struct FakeProvider {
        requests: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ElevationProvider for FakeProvider {
        async fn lookup(&self, locations: &[(f64, f64)]) -> Result<Vec<Option<f64>>> {
            self.requests.lock().unwrap().push(locations.len());
            if locations.iter().any(|(lat, _)| *lat == 99.0) {
                return Err(GeoKitError::api("service unavailable"));
            }
            Ok(locations
                .iter()
                .map(|(lat, lon)| if *lat < 0.0 { None } else { Some(lat + lon) })
                .collect())
        }
    }

    fn record(lat: f64, lon: f64) -> PointRecord {
        PointRecord::new(format!("{lat}"), &Coordinate::with_altitude(lon, lat, -1.0))
    }

    #[tokio::test]
    async fn test_enrich_in_batches() {
        let provider = FakeProvider::default();
        let mut records = vec![record(1.0, 1.0), record(2.0, 2.0), record(-3.0, 3.0)];

        let summary = enrich_elevations(&provider, &mut records, 2, None).await;

        assert_eq!(*provider.requests.lock().unwrap(), vec![2, 1]);
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.failed_batches, 0);
        assert_eq!(records[0].elevation, 2.0);
        assert_eq!(records[1].elevation, 4.0);
        // no value from the service keeps the KML altitude
        assert_eq!(records[2].elevation, -1.0);
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_original() {
        let provider = FakeProvider::default();
        let mut records = vec![record(99.0, 0.0), record(1.0, 0.0), record(5.0, 5.0)];

        let summary = enrich_elevations(&provider, &mut records, 2, None).await;

        assert_eq!(summary.failed_batches, 1);
        assert_eq!(records[0].elevation, -1.0);
        assert_eq!(records[1].elevation, -1.0);
        assert_eq!(records[2].elevation, 10.0);
    }

    #[tokio::test]
    async fn test_cache_avoids_second_lookup() {
        let dir = TempDir::new().unwrap();
        let cache = ElevationCache::open(dir.path(), Duration::from_secs(3600)).unwrap();
        let provider = FakeProvider::default();

        let mut first = vec![record(1.0, 2.0)];
        enrich_elevations(&provider, &mut first, 50, Some(&cache)).await;

        let mut second = vec![record(1.0, 2.0)];
        let summary = enrich_elevations(&provider, &mut second, 50, Some(&cache)).await;

        assert_eq!(summary.cached, 1);
        assert_eq!(second[0].elevation, 3.0);
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }
}

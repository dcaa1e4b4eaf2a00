//! Background worker that expires short-lived objects.
//!
//! Each pass lists the whole bucket from scratch, leaves protected keys alone
//! and deletes every object older than the configured TTL.

use crate::config::{GatewayConfig, SweepMode, SweeperConfig};
use crate::models::listing::ListOptions;
use crate::services::bucket::{Bucket, StorageResult};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Counters for a single sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: usize,
    pub protected: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Set when the pass stopped at a fresh object (`SweepMode::Halt`).
    pub halted: bool,
}

pub struct ExpirySweeper {
    bucket: Arc<dyn Bucket>,
    gateway: Arc<GatewayConfig>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(bucket: Arc<dyn Bucket>, gateway: Arc<GatewayConfig>, config: SweeperConfig) -> Self {
        Self {
            bucket,
            gateway,
            config,
        }
    }

    /// Spawns the sweeper as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(&self) {
        let mut timer = interval(self.config.interval);

        info!(
            "Expiry sweeper started (interval: {:?}, ttl: {:?}, mode: {:?})",
            self.config.interval, self.config.ttl, self.config.mode
        );

        // Skip the first tick (fires immediately)
        timer.tick().await;

        loop {
            timer.tick().await;
            let start = std::time::Instant::now();
            match self.sweep(Utc::now()).await {
                Ok(stats) => info!(
                    "Sweep completed in {:?}: examined {}, deleted {}, failed {}, protected {}, halted {}",
                    start.elapsed(),
                    stats.examined,
                    stats.deleted,
                    stats.failed,
                    stats.protected,
                    stats.halted
                ),
                Err(e) => error!("Sweep failed: {:?}", e),
            }
        }
    }

    /// Run one pass as of `now`.
    ///
    /// A failed listing aborts the pass. A failed deletion is logged and the
    /// pass moves on to the next object.
    pub async fn sweep(&self, now: DateTime<Utc>) -> StorageResult<SweepStats> {
        let ttl = TimeDelta::from_std(self.config.ttl).unwrap_or(TimeDelta::MAX);
        let mut stats = SweepStats::default();
        let mut cursor = None;

        loop {
            let listing = self
                .bucket
                .list(ListOptions {
                    cursor: cursor.take(),
                    ..Default::default()
                })
                .await?;

            for object in listing.objects {
                if self.gateway.is_protected(&object.key) {
                    stats.protected += 1;
                    continue;
                }
                stats.examined += 1;

                if now - object.uploaded < ttl {
                    match self.config.mode {
                        SweepMode::Halt => {
                            debug!("halting sweep at fresh object {}", object.key);
                            stats.halted = true;
                            return Ok(stats);
                        }
                        SweepMode::Skip => continue,
                    }
                }

                match self.bucket.delete(&object.key).await {
                    Ok(()) => {
                        info!("delete: {}", object.key);
                        stats.deleted += 1;
                    }
                    Err(e) => {
                        warn!("failed to delete expired object {}: {}", object.key, e);
                        stats.failed += 1;
                    }
                }
            }

            match listing.cursor {
                Some(next) if listing.truncated => cursor = Some(next),
                _ => break,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{listing::Listing, object::ObjectDescriptor};
    use crate::services::bucket::{
        BodyStream, GetOptions, PutOptions, StorageError, StoredObject,
    };
    use async_trait::async_trait;
    use std::{io, sync::Mutex, time::Duration};

    /// In-memory bucket that lists objects in insertion order, one page of
    /// `page_size` at a time, and records deletions.
    struct FakeBucket {
        objects: Vec<ObjectDescriptor>,
        page_size: usize,
        deleted: Mutex<Vec<String>>,
        failing: Vec<String>,
    }

    impl FakeBucket {
        fn new(now: DateTime<Utc>, ages: &[(&str, i64)]) -> Self {
            let objects = ages
                .iter()
                .map(|(key, age)| {
                    ObjectDescriptor::new(*key, 1, "etag", now - TimeDelta::seconds(*age))
                })
                .collect();
            Self {
                objects,
                page_size: 1000,
                deleted: Mutex::new(Vec::new()),
                failing: Vec::new(),
            }
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Bucket for FakeBucket {
        async fn list(&self, options: ListOptions) -> StorageResult<Listing> {
            let start: usize = options.cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let end = (start + self.page_size).min(self.objects.len());
            let truncated = end < self.objects.len();
            Ok(Listing {
                objects: self.objects[start..end].to_vec(),
                truncated,
                cursor: truncated.then(|| end.to_string()),
                delimited_prefixes: Vec::new(),
            })
        }

        async fn head(&self, _key: &str) -> StorageResult<Option<ObjectDescriptor>> {
            unimplemented!()
        }

        async fn get(&self, _key: &str, _options: GetOptions) -> StorageResult<Option<StoredObject>> {
            unimplemented!()
        }

        async fn put(
            &self,
            _key: &str,
            _body: BodyStream,
            _options: PutOptions,
        ) -> StorageResult<ObjectDescriptor> {
            unimplemented!()
        }

        async fn delete(&self, key: &str) -> StorageResult<()> {
            if self.failing.iter().any(|k| k == key) {
                return Err(StorageError::Io(io::Error::other("disk on fire")));
            }
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    fn sweeper(bucket: Arc<FakeBucket>, mode: SweepMode, protected: Option<&str>) -> ExpirySweeper {
        let gateway = GatewayConfig {
            protected_prefix: protected.map(str::to_string),
        };
        let config = SweeperConfig {
            enabled: true,
            ttl: Duration::from_secs(60),
            interval: Duration::from_secs(60),
            mode,
        };
        ExpirySweeper::new(bucket, Arc::new(gateway), config)
    }

    #[tokio::test]
    async fn halt_mode_stops_at_first_fresh_object() {
        let now = Utc::now();
        let bucket = Arc::new(FakeBucket::new(now, &[("a", 70), ("b", 30), ("c", 90)]));

        let stats = sweeper(bucket.clone(), SweepMode::Halt, None)
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(bucket.deleted(), ["a"]);
        assert!(stats.halted);
        assert_eq!(stats.examined, 2);
    }

    #[tokio::test]
    async fn skip_mode_evaluates_every_object() {
        let now = Utc::now();
        let bucket = Arc::new(FakeBucket::new(now, &[("a", 70), ("b", 30), ("c", 90)]));

        let stats = sweeper(bucket.clone(), SweepMode::Skip, None)
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(bucket.deleted(), ["a", "c"]);
        assert!(!stats.halted);
        assert_eq!(stats.deleted, 2);
    }

    #[tokio::test]
    async fn object_exactly_at_ttl_is_expired() {
        let now = Utc::now();
        let bucket = Arc::new(FakeBucket::new(now, &[("edge", 60)]));

        sweeper(bucket.clone(), SweepMode::Halt, None)
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(bucket.deleted(), ["edge"]);
    }

    #[tokio::test]
    async fn protected_keys_are_never_deleted_nor_halt_the_pass() {
        let now = Utc::now();
        let bucket = Arc::new(FakeBucket::new(
            now,
            &[("keep/fresh", 1), ("keep/old", 500), ("old", 500)],
        ));

        let stats = sweeper(bucket.clone(), SweepMode::Halt, Some("keep/"))
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(bucket.deleted(), ["old"]);
        assert_eq!(stats.protected, 2);
        assert!(!stats.halted);
    }

    #[tokio::test]
    async fn failed_delete_does_not_stop_the_pass() {
        let now = Utc::now();
        let mut fake = FakeBucket::new(now, &[("a", 100), ("b", 100), ("c", 100)]);
        fake.failing = vec!["b".to_string()];
        let bucket = Arc::new(fake);

        let stats = sweeper(bucket.clone(), SweepMode::Skip, None)
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(bucket.deleted(), ["a", "c"]);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn follows_cursor_across_pages() {
        let now = Utc::now();
        let mut fake = FakeBucket::new(now, &[("a", 100), ("b", 100), ("c", 100)]);
        fake.page_size = 2;
        let bucket = Arc::new(fake);

        sweeper(bucket.clone(), SweepMode::Skip, None)
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(bucket.deleted(), ["a", "b", "c"]);
    }
}

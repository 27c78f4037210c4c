//! Service boundary used by the transport layer.
//!
//! `ChartService` ties birth-time normalization, geocoding, the ephemeris,
//! chart assembly, persistence and the chart cache together. Recomputes for
//! the same user are serialized with a per-user async mutex; cache fills from
//! storage take the same lock, so a read never caches a chart that a
//! concurrent edit has already dropped.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::cache::{ChartCache, InMemoryChartCache};
use crate::chart::{ChartAssembler, NatalChart};
use crate::config::ChartConfig;
use crate::ephemeris::{EphemerisAdapter, EphemerisProvider};
use crate::error::{ChartError, ChartResult, GeocodingError};
use crate::geocoding::{GeoLocation, Geocoder};
use crate::store::ChartRepository;
use crate::time::{
    compute_julian_day, naive_utc_to_julian_day, offset_from_longitude, parse_birth_datetime,
    to_universal_time,
};
use crate::transit::{Aspect, SkyReport, TransitAnalyzer, TransitSnapshot};
use crate::{BirthRecord, ChartPoint, JulianDay, UserId};

pub struct ChartService {
    config: ChartConfig,
    assembler: ChartAssembler,
    transits: TransitAnalyzer,
    geocoder: Arc<dyn Geocoder>,
    repository: Arc<dyn ChartRepository>,
    cache: Arc<dyn ChartCache>,
    recompute_locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
    // bumped on every explicit invalidation
    cache_epoch: AtomicU64,
}

impl ChartService {
    pub fn new(
        config: ChartConfig,
        ephemeris: Arc<dyn EphemerisProvider>,
        geocoder: Arc<dyn Geocoder>,
        repository: Arc<dyn ChartRepository>,
    ) -> Self {
        let adapter = EphemerisAdapter::new(ephemeris, config.ephemeris_timeout);
        let cache = Arc::new(InMemoryChartCache::new(config.cache_capacity, config.cache_ttl));
        ChartService {
            assembler: ChartAssembler::new(adapter.clone(), config.house_system),
            transits: TransitAnalyzer::new(adapter),
            config,
            geocoder,
            repository,
            cache,
            recompute_locks: Mutex::new(HashMap::new()),
            cache_epoch: AtomicU64::new(0),
        }
    }

    /// Replaces the default in-memory cache.
    pub fn with_cache(mut self, cache: Arc<dyn ChartCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn compute_julian_day(
        &self,
        date: &str,
        time: &str,
        tz_offset_hours: f64,
    ) -> ChartResult<JulianDay> {
        compute_julian_day(date, time, tz_offset_hours)
    }

    /// Computes a chart without touching storage or the cache. The record's
    /// location is geocoded when missing.
    pub async fn compute_chart(&self, record: &BirthRecord) -> ChartResult<NatalChart> {
        record.validate()?;
        let local = parse_birth_datetime(&record.birthdate, &record.birthtime)?;
        let location = self.resolve_location(record).await?;

        let offset = location
            .timezone_offset_hours
            .unwrap_or_else(|| offset_from_longitude(location.longitude));
        let universal = to_universal_time(local, offset)?;
        let jd = naive_utc_to_julian_day(universal);
        debug!(user_id = record.user_id, jd, offset, "birth time normalized");

        self.assembler
            .assemble(Some(record.user_id), jd, &location)
            .await
    }

    /// Recomputes and stores the user's chart, replacing any previous one.
    pub async fn recompute_chart(&self, user_id: UserId) -> ChartResult<NatalChart> {
        self.with_user_lock(user_id, self.recompute_locked(user_id)).await
    }

    /// Cached chart points, falling back to storage and, when storage is
    /// empty and a birth record exists, to a fresh computation.
    pub async fn get_chart(&self, user_id: UserId) -> ChartResult<Vec<ChartPoint>> {
        if let Some(points) = self.cache.get(user_id) {
            debug!(user_id, "chart served from cache");
            return Ok(points);
        }
        self.with_user_lock(user_id, self.load_chart_locked(user_id)).await
    }

    /// Drops cached charts for one user, or all of them. Stored rows are
    /// untouched.
    pub fn invalidate_chart(&self, user_id: Option<UserId>) {
        self.cache_epoch.fetch_add(1, Ordering::SeqCst);
        match user_id {
            Some(user_id) => {
                debug!(user_id, "chart cache entry invalidated");
                self.cache.invalidate(user_id);
            }
            None => {
                debug!("chart cache cleared");
                self.cache.clear();
            }
        }
    }

    /// Signup path: stores the record and computes the first chart.
    pub async fn register_birth_record(&self, record: &BirthRecord) -> ChartResult<NatalChart> {
        record.validate()?;
        parse_birth_datetime(&record.birthdate, &record.birthtime)?;
        self.repository.save_birth_record(record).await?;
        info!(user_id = record.user_id, "birth record registered");
        self.recompute_chart(record.user_id).await
    }

    /// Profile edit: stores the new record and drops the stored chart so the
    /// next read recomputes it.
    pub async fn update_birth_record(&self, record: &BirthRecord) -> ChartResult<()> {
        record.validate()?;
        parse_birth_datetime(&record.birthdate, &record.birthtime)?;

        self.with_user_lock(record.user_id, self.replace_birth_record(record)).await
    }

    pub async fn current_transits(&self, now: Option<DateTime<Utc>>) -> TransitSnapshot {
        self.transits
            .current_positions(now.unwrap_or_else(Utc::now))
            .await
    }

    pub async fn current_aspects(&self, now: Option<DateTime<Utc>>) -> Vec<Aspect> {
        self.current_transits(now).await.aspects()
    }

    /// Positions, aspects and lunar information for `now`, ready to render.
    pub async fn current_sky_report(&self, now: Option<DateTime<Utc>>) -> SkyReport {
        SkyReport::from_snapshot(self.current_transits(now).await)
    }

    async fn resolve_location(&self, record: &BirthRecord) -> ChartResult<GeoLocation> {
        if let Some(location) = record.location {
            return Ok(location);
        }
        let location = tokio::time::timeout(
            self.config.geocoder_timeout,
            self.geocoder.geocode(&record.city, &record.country),
        )
        .await
        .map_err(|_| GeocodingError::Timeout)??;
        location.validate()?;
        debug!(
            user_id = record.user_id,
            latitude = location.latitude,
            longitude = location.longitude,
            "birth place geocoded"
        );
        Ok(location)
    }

    async fn recompute_locked(&self, user_id: UserId) -> ChartResult<NatalChart> {
        let mut record = self
            .repository
            .load_birth_record(user_id)
            .await?
            .ok_or(ChartError::BirthRecordNotFound(user_id))?;

        if record.location.is_none() {
            record.validate()?;
            let location = self.resolve_location(&record).await?;
            self.repository
                .save_resolved_location(user_id, &location)
                .await?;
            record.location = Some(location);
        }

        let chart = self.compute_chart(&record).await?;
        let version = self.repository.replace_chart(user_id, &chart.points).await?;
        self.cache.put(user_id, chart.points.clone());

        info!(
            user_id,
            version,
            points = chart.len(),
            skipped = ?chart.skipped,
            "chart recomputed"
        );
        Ok(chart)
    }

    async fn load_chart_locked(&self, user_id: UserId) -> ChartResult<Vec<ChartPoint>> {
        // filled by whoever held the lock before us
        if let Some(points) = self.cache.get(user_id) {
            return Ok(points);
        }

        let epoch = self.cache_epoch.load(Ordering::SeqCst);
        let points = self.repository.load_chart(user_id).await?;
        if !points.is_empty() {
            if self.cache_epoch.load(Ordering::SeqCst) == epoch {
                self.cache.put(user_id, points.clone());
            } else {
                debug!(user_id, "cache invalidated during read, not caching");
            }
            return Ok(points);
        }

        if !self.config.recompute_on_empty {
            return Ok(points);
        }
        if self.repository.load_birth_record(user_id).await?.is_none() {
            debug!(user_id, "no chart and no birth record");
            return Ok(Vec::new());
        }
        Ok(self.recompute_locked(user_id).await?.into_points())
    }

    async fn replace_birth_record(&self, record: &BirthRecord) -> ChartResult<()> {
        self.repository.save_birth_record(record).await?;
        let removed = self.repository.delete_chart(record.user_id).await?;
        self.cache.invalidate(record.user_id);
        info!(user_id = record.user_id, removed, "birth record updated, chart dropped");
        Ok(())
    }

    async fn with_user_lock<T>(
        &self,
        user_id: UserId,
        work: impl Future<Output = ChartResult<T>>,
    ) -> ChartResult<T> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.release_user_lock(user_id);
        result
    }

    fn user_lock(&self, user_id: UserId) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.recompute_locks.lock().entry(user_id).or_default())
    }

    fn release_user_lock(&self, user_id: UserId) {
        let mut locks = self.recompute_locks.lock();
        let unused = locks
            .get(&user_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if unused {
            locks.remove(&user_id);
        }
    }
}

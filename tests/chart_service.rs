use approx::assert_abs_diff_eq;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use natal_core::{
    BirthRecord, CelestialBody, ChartConfig, ChartError, ChartPoint, ChartRepository,
    ChartService, EphemerisError, EphemerisProvider, GeoLocation, Geocoder, GeocodingError,
    HouseCusps, HouseSystem, InMemoryChartCache, JulianDay, PointName, PointType,
    SqliteChartRepository, StoreResult, UserId, ZodiacSign,
};

struct MockEphemeris {
    longitudes: HashMap<CelestialBody, f64>,
    failing: HashSet<CelestialBody>,
    houses_fail: bool,
    house_calls: AtomicUsize,
    last_jd: Mutex<Option<JulianDay>>,
}

impl MockEphemeris {
    fn new() -> Self {
        let longitudes = CelestialBody::iter()
            .enumerate()
            .map(|(index, body)| (body, 84.5 + 27.0 * index as f64))
            .collect();
        MockEphemeris {
            longitudes,
            failing: HashSet::new(),
            houses_fail: false,
            house_calls: AtomicUsize::new(0),
            last_jd: Mutex::new(None),
        }
    }

    fn failing(mut self, body: CelestialBody) -> Self {
        self.failing.insert(body);
        self
    }

    fn computations(&self) -> usize {
        self.house_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EphemerisProvider for MockEphemeris {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn position(&self, jd: JulianDay, body: CelestialBody) -> Result<f64, EphemerisError> {
        *self.last_jd.lock() = Some(jd);
        if self.failing.contains(&body) {
            return Err(EphemerisError::body(body, "ephemeris file not found"));
        }
        Ok(self.longitudes[&body])
    }

    async fn houses(
        &self,
        _jd: JulianDay,
        _latitude: f64,
        _longitude: f64,
        _system: HouseSystem,
    ) -> Result<HouseCusps, EphemerisError> {
        self.house_calls.fetch_add(1, Ordering::SeqCst);
        if self.houses_fail {
            return Err(EphemerisError::houses("polar latitude"));
        }
        Ok(HouseCusps {
            cusps: std::array::from_fn(|i| (180.0 + 30.0 * i as f64) % 360.0),
            ascendant: 180.0,
            midheaven: 90.0,
        })
    }
}

struct MockGeocoder {
    result: Result<GeoLocation, ()>,
    calls: AtomicUsize,
}

impl MockGeocoder {
    fn resolving(location: GeoLocation) -> Self {
        MockGeocoder {
            result: Ok(location),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        MockGeocoder {
            result: Err(()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, city: &str, country: &str) -> Result<GeoLocation, GeocodingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.map_err(|_| GeocodingError::NoResults {
            query: format!("{city}, {country}"),
        })
    }
}

struct StallingGeocoder;

#[async_trait]
impl Geocoder for StallingGeocoder {
    async fn geocode(&self, _city: &str, _country: &str) -> Result<GeoLocation, GeocodingError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(new_york())
    }
}

/// Delegates to SQLite but holds every chart read for a while after the
/// rows have been fetched.
struct SlowReadRepository {
    inner: SqliteChartRepository,
    read_delay: Duration,
}

#[async_trait]
impl ChartRepository for SlowReadRepository {
    async fn load_birth_record(&self, user_id: UserId) -> StoreResult<Option<BirthRecord>> {
        self.inner.load_birth_record(user_id).await
    }

    async fn save_birth_record(&self, record: &BirthRecord) -> StoreResult<()> {
        self.inner.save_birth_record(record).await
    }

    async fn save_resolved_location(
        &self,
        user_id: UserId,
        location: &GeoLocation,
    ) -> StoreResult<()> {
        self.inner.save_resolved_location(user_id, location).await
    }

    async fn load_chart(&self, user_id: UserId) -> StoreResult<Vec<ChartPoint>> {
        let points = self.inner.load_chart(user_id).await?;
        tokio::time::sleep(self.read_delay).await;
        Ok(points)
    }

    async fn replace_chart(&self, user_id: UserId, points: &[ChartPoint]) -> StoreResult<i64> {
        self.inner.replace_chart(user_id, points).await
    }

    async fn chart_point_count(&self, user_id: UserId) -> StoreResult<usize> {
        self.inner.chart_point_count(user_id).await
    }

    async fn delete_chart(&self, user_id: UserId) -> StoreResult<usize> {
        self.inner.delete_chart(user_id).await
    }
}

fn slow_read_service() -> (ChartService, Arc<SlowReadRepository>) {
    let repository = Arc::new(SlowReadRepository {
        inner: SqliteChartRepository::open_in_memory().unwrap(),
        read_delay: Duration::from_millis(100),
    });
    let config = ChartConfig {
        cache_ttl: None,
        ..ChartConfig::default()
    };
    let service = ChartService::new(
        config,
        Arc::new(MockEphemeris::new()),
        Arc::new(MockGeocoder::resolving(new_york())),
        repository.clone(),
    );
    (service, repository)
}

struct Harness {
    service: ChartService,
    ephemeris: Arc<MockEphemeris>,
    geocoder: Arc<MockGeocoder>,
    repository: Arc<SqliteChartRepository>,
}

fn new_york() -> GeoLocation {
    GeoLocation::new(40.7128, -74.0060, Some(-4.0))
}

fn harness_with(ephemeris: MockEphemeris, geocoder: MockGeocoder) -> Harness {
    let ephemeris = Arc::new(ephemeris);
    let geocoder = Arc::new(geocoder);
    let repository = Arc::new(SqliteChartRepository::open_in_memory().unwrap());
    let config = ChartConfig {
        cache_ttl: None,
        ..ChartConfig::default()
    };
    let service = ChartService::new(
        config,
        ephemeris.clone(),
        geocoder.clone(),
        repository.clone(),
    );
    Harness {
        service,
        ephemeris,
        geocoder,
        repository,
    }
}

fn harness() -> Harness {
    harness_with(MockEphemeris::new(), MockGeocoder::resolving(new_york()))
}

fn birth_record(user_id: i64) -> BirthRecord {
    BirthRecord::new(user_id, "1990-06-15", "12:00", "New York", "USA")
}

#[tokio::test]
async fn sun_lands_in_gemini() {
    let h = harness();
    let record = birth_record(1).with_location(new_york());
    let chart = h.service.compute_chart(&record).await.unwrap();

    let sun = chart.point(CelestialBody::Sun).unwrap();
    assert_eq!(sun.sign, ZodiacSign::Gemini);
    assert_eq!((sun.degree, sun.minute, sun.second), (24, 30, 0));
    assert_eq!(sun.house, Some(9));
    assert_eq!(sun.latitude, 40.7128);
    assert_eq!(sun.user_id, Some(1));

    let jd = h.ephemeris.last_jd.lock().unwrap();
    assert_abs_diff_eq!(jd, 2_448_058.0 + 4.0 / 24.0, epsilon = 1e-6);
    assert_eq!(h.geocoder.calls(), 0);
}

#[tokio::test]
async fn chart_has_every_body_and_both_angles() {
    let h = harness();
    let chart = h
        .service
        .compute_chart(&birth_record(1).with_location(new_york()))
        .await
        .unwrap();
    assert_eq!(chart.len(), 14);
    assert!(chart.is_complete());

    let ascendant = chart.point(PointName::Ascendant).unwrap();
    assert_eq!(ascendant.house, Some(1));
    assert_eq!(ascendant.point_type, PointType::Point);
    assert_eq!(ascendant.sign, ZodiacSign::Libra);
    let midheaven = chart.point(PointName::Midheaven).unwrap();
    assert_eq!(midheaven.house, Some(10));
    assert_eq!(
        chart.point(CelestialBody::NorthNode).unwrap().point_type,
        PointType::Point
    );
    assert_eq!(
        chart.point(CelestialBody::Chiron).unwrap().point_type,
        PointType::Asteroid
    );
}

#[tokio::test]
async fn failing_body_is_left_out() {
    let h = harness_with(
        MockEphemeris::new().failing(CelestialBody::Pluto),
        MockGeocoder::resolving(new_york()),
    );
    let chart = h
        .service
        .compute_chart(&birth_record(1).with_location(new_york()))
        .await
        .unwrap();

    assert!(chart.point(CelestialBody::Pluto).is_none());
    assert_eq!(chart.skipped, vec![CelestialBody::Pluto]);
    assert_eq!(chart.len(), 13);
    assert!(chart.point(CelestialBody::Neptune).is_some());
}

#[tokio::test]
async fn house_failure_aborts_the_chart() {
    let mut ephemeris = MockEphemeris::new();
    ephemeris.houses_fail = true;
    let h = harness_with(ephemeris, MockGeocoder::resolving(new_york()));

    let err = h.service.register_birth_record(&birth_record(1)).await.unwrap_err();
    assert!(matches!(
        err,
        ChartError::Ephemeris(EphemerisError::Houses { .. })
    ));
    assert_eq!(h.repository.chart_point_count(1).await.unwrap(), 0);
}

#[tokio::test]
async fn compute_chart_is_idempotent() {
    let h = harness();
    let record = birth_record(1).with_location(new_york());
    let first = h.service.compute_chart(&record).await.unwrap();
    let second = h.service.compute_chart(&record).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn invalid_birth_data_fails_before_geocoding() {
    let h = harness();
    for record in [
        BirthRecord::new(1, "1990-13-15", "12:00", "New York", "USA"),
        BirthRecord::new(1, "1990-06-15", "25:00", "New York", "USA"),
        BirthRecord::new(1, "1990-06-15", "12:00", "", "USA"),
    ] {
        let err = h.service.compute_chart(&record).await.unwrap_err();
        assert!(matches!(err, ChartError::InvalidInput(_)), "{record:?}");
    }
    assert_eq!(h.geocoder.calls(), 0);
    assert_eq!(h.ephemeris.computations(), 0);
}

#[tokio::test]
async fn geocoding_failure_creates_no_chart() {
    let h = harness_with(MockEphemeris::new(), MockGeocoder::failing());
    let err = h.service.register_birth_record(&birth_record(1)).await.unwrap_err();
    assert!(matches!(err, ChartError::Geocoding(GeocodingError::NoResults { .. })));
    assert_eq!(h.repository.chart_point_count(1).await.unwrap(), 0);
    assert_eq!(h.ephemeris.computations(), 0);
}

#[tokio::test]
async fn resolved_location_is_stored_once() {
    let h = harness();
    h.service.register_birth_record(&birth_record(1)).await.unwrap();
    assert_eq!(h.geocoder.calls(), 1);

    let stored = h.repository.load_birth_record(1).await.unwrap().unwrap();
    assert_eq!(stored.location, Some(new_york()));

    h.service.recompute_chart(1).await.unwrap();
    assert_eq!(h.geocoder.calls(), 1);
    assert_eq!(h.ephemeris.computations(), 2);
}

#[tokio::test]
async fn missing_offset_is_estimated_from_longitude() {
    let h = harness_with(
        MockEphemeris::new(),
        MockGeocoder::resolving(GeoLocation::new(40.7128, -74.0060, None)),
    );
    h.service.compute_chart(&birth_record(1)).await.unwrap();
    let jd = h.ephemeris.last_jd.lock().unwrap();
    assert_abs_diff_eq!(jd, 2_448_058.0 + 5.0 / 24.0, epsilon = 1e-6);
}

#[tokio::test]
async fn invalidated_chart_is_recomputed_on_next_read() {
    let h = harness();
    let chart = h.service.register_birth_record(&birth_record(1)).await.unwrap();
    assert_eq!(h.ephemeris.computations(), 1);

    // stored rows vanish behind the cache's back
    h.repository.delete_chart(1).await.unwrap();
    let cached = h.service.get_chart(1).await.unwrap();
    assert_eq!(cached, chart.points);
    assert_eq!(h.ephemeris.computations(), 1);

    h.service.invalidate_chart(Some(1));
    let fresh = h.service.get_chart(1).await.unwrap();
    assert_eq!(h.ephemeris.computations(), 2);
    assert_eq!(fresh, chart.points);
    assert_eq!(h.repository.chart_point_count(1).await.unwrap(), 14);
}

#[tokio::test]
async fn invalidation_exposes_newer_stored_chart() {
    let h = harness();
    h.service.register_birth_record(&birth_record(1)).await.unwrap();
    let replacement = h.repository.load_chart(1).await.unwrap()[..1].to_vec();
    h.repository.replace_chart(1, &replacement).await.unwrap();

    assert_eq!(h.service.get_chart(1).await.unwrap().len(), 14);
    h.service.invalidate_chart(None);
    assert_eq!(h.service.get_chart(1).await.unwrap(), replacement);
    assert_eq!(h.ephemeris.computations(), 1);
}

#[tokio::test]
async fn unknown_user_has_no_chart() {
    let h = harness();
    assert!(h.service.get_chart(42).await.unwrap().is_empty());
    let err = h.service.recompute_chart(42).await.unwrap_err();
    assert!(matches!(err, ChartError::BirthRecordNotFound(42)));
}

#[tokio::test]
async fn empty_storage_without_lazy_recompute() {
    let ephemeris = Arc::new(MockEphemeris::new());
    let repository = Arc::new(SqliteChartRepository::open_in_memory().unwrap());
    let config = ChartConfig {
        recompute_on_empty: false,
        ..ChartConfig::default()
    };
    let service = ChartService::new(
        config,
        ephemeris.clone(),
        Arc::new(MockGeocoder::resolving(new_york())),
        repository.clone(),
    );
    repository.save_birth_record(&birth_record(1)).await.unwrap();
    assert!(service.get_chart(1).await.unwrap().is_empty());
    assert_eq!(ephemeris.computations(), 0);
}

#[tokio::test]
async fn profile_edit_drops_the_stored_chart() {
    let h = harness();
    h.service.register_birth_record(&birth_record(1)).await.unwrap();

    let edited = BirthRecord::new(1, "1985-01-02", "08:15", "London", "UK")
        .with_location(GeoLocation::new(51.5074, -0.1278, Some(0.0)));
    h.service.update_birth_record(&edited).await.unwrap();
    assert_eq!(h.repository.chart_point_count(1).await.unwrap(), 0);

    let points = h.service.get_chart(1).await.unwrap();
    assert_eq!(points.len(), 14);
    assert_eq!(points[0].latitude, 51.5074);
    assert_eq!(h.ephemeris.computations(), 2);
}

#[tokio::test]
async fn concurrent_recomputes_leave_one_complete_chart() {
    let h = harness();
    h.repository.save_birth_record(&birth_record(1)).await.unwrap();

    let (a, b) = tokio::join!(h.service.recompute_chart(1), h.service.recompute_chart(1));
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(h.repository.chart_point_count(1).await.unwrap(), 14);
    assert_eq!(h.service.get_chart(1).await.unwrap().len(), 14);
}

#[tokio::test]
async fn transit_snapshot_has_no_owner_or_houses() {
    let h = harness();
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let snapshot = h.service.current_transits(Some(now)).await;

    assert_eq!(snapshot.timestamp, now);
    assert_abs_diff_eq!(snapshot.julian_day, 2_460_477.0, epsilon = 1e-9);
    assert_eq!(snapshot.points.len(), 12);
    assert!(snapshot
        .points
        .iter()
        .all(|p| p.user_id.is_none() && p.house.is_none() && p.latitude == 0.0));

    let aspects = h.service.current_aspects(Some(now)).await;
    assert_eq!(aspects, snapshot.aspects());

    let report = h.service.current_sky_report(Some(now)).await.to_string();
    assert!(report.contains("CURRENT PLANETARY POSITIONS:\n- Sun: Gemini 24°30'\n"));
    assert!(report.contains("LUNAR INFORMATION:"));
}

#[tokio::test]
async fn charts_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("natal.db");

    let stored = {
        let repository = Arc::new(SqliteChartRepository::open(&path).unwrap());
        let service = ChartService::new(
            ChartConfig::default(),
            Arc::new(MockEphemeris::new()),
            Arc::new(MockGeocoder::resolving(new_york())),
            repository,
        );
        service.register_birth_record(&birth_record(7)).await.unwrap()
    };

    let reopened = SqliteChartRepository::open(&path).unwrap();
    assert_eq!(reopened.load_chart(7).await.unwrap(), stored.points);
    let record = reopened.load_birth_record(7).await.unwrap().unwrap();
    assert_eq!(record.location, Some(new_york()));
}

#[tokio::test]
async fn read_racing_a_profile_edit_does_not_revive_the_old_chart() {
    let (service, repository) = slow_read_service();
    service.register_birth_record(&birth_record(1)).await.unwrap();
    service.invalidate_chart(Some(1));

    let london = BirthRecord::new(1, "1985-01-02", "08:15", "London", "UK")
        .with_location(GeoLocation::new(51.5074, -0.1278, Some(0.0)));
    let (during, edit) = tokio::join!(service.get_chart(1), service.update_birth_record(&london));
    edit.unwrap();
    assert_eq!(during.unwrap()[0].latitude, 40.7128);
    assert_eq!(repository.chart_point_count(1).await.unwrap(), 0);

    let after = service.get_chart(1).await.unwrap();
    assert_eq!(after.len(), 14);
    assert_eq!(after[0].latitude, 51.5074);
}

#[tokio::test]
async fn invalidation_during_a_read_wins() {
    let (service, repository) = slow_read_service();
    service.register_birth_record(&birth_record(1)).await.unwrap();
    service.invalidate_chart(Some(1));

    let replacement = repository.load_chart(1).await.unwrap()[..2].to_vec();
    let (_, replaced) = tokio::join!(service.get_chart(1), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let version = repository.replace_chart(1, &replacement).await;
        service.invalidate_chart(Some(1));
        version
    });
    replaced.unwrap();

    assert_eq!(service.get_chart(1).await.unwrap(), replacement);
}

#[tokio::test]
async fn injected_cache_decides_what_is_kept() {
    let h = harness();
    let service = h.service.with_cache(Arc::new(InMemoryChartCache::new(0, None)));
    service.register_birth_record(&birth_record(1)).await.unwrap();

    // nothing is cached, so every read goes to storage
    h.repository.delete_chart(1).await.unwrap();
    assert_eq!(service.get_chart(1).await.unwrap().len(), 14);
    assert_eq!(h.ephemeris.computations(), 2);
    assert_eq!(service.get_chart(1).await.unwrap().len(), 14);
    assert_eq!(h.ephemeris.computations(), 2);
}

#[tokio::test]
async fn stalled_geocoder_times_out() {
    let ephemeris = Arc::new(MockEphemeris::new());
    let config = ChartConfig {
        geocoder_timeout: Duration::from_millis(50),
        ..ChartConfig::default()
    };
    let service = ChartService::new(
        config,
        ephemeris.clone(),
        Arc::new(StallingGeocoder),
        Arc::new(SqliteChartRepository::open_in_memory().unwrap()),
    );

    let err = service.compute_chart(&birth_record(1)).await.unwrap_err();
    assert!(matches!(err, ChartError::Geocoding(GeocodingError::Timeout)));
    assert_eq!(ephemeris.computations(), 0);
}

//! Usage statistics handler.
//!
//! Records one hit per successful request under the client identifier and the
//! `service{d}method` function identifier, both as an all-time counter and as
//! an hourly counter that expires a day after its hour opened. The store
//! cannot enumerate keys, so two index lists track every client and function
//! ever seen.
//!
//! Index updates are read-modify-write and may lose a concurrent first
//! registration; the counters themselves are atomic increments and are never
//! lost. Every store fault is absorbed here: a failing store degrades the
//! handler to a no-op and never fails the request.

use std::cmp::Ordering;
use std::sync::Arc;

use rpcgate_core::{ProcessingStatus, Value};
use serde_json::Map;
use tracing::{debug, warn};

use crate::counter::keys::{bucket_expiry, bucket_label, bucket_label_back};
use crate::counter::{Clock, CounterStore, KeySpace, StoreError, StoreValue, SystemClock};
use crate::traits::{CallScope, Handler};

/// Label of the all-time section of a client's report.
pub const GLOBAL_LABEL: &str = "global";

/// Reports and resets need a reachable store.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("statistics store is not configured")]
    Unavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Counts for one bucket, sorted by count descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketUsage {
    pub label: String,
    pub counts: Vec<(String, u64)>,
}

/// All buckets recorded for one client. The `global` bucket comes first and
/// is always present, even when empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientUsage {
    pub client: String,
    pub buckets: Vec<BucketUsage>,
}

impl ClientUsage {
    fn new(client: &str) -> Self {
        Self {
            client: client.to_string(),
            buckets: vec![BucketUsage {
                label: GLOBAL_LABEL.to_string(),
                counts: Vec::new(),
            }],
        }
    }

    fn push(&mut self, label: &str, function: &str, count: u64) {
        let index = match self.buckets.iter().position(|b| b.label == label) {
            Some(index) => index,
            None => {
                self.buckets.push(BucketUsage {
                    label: label.to_string(),
                    counts: Vec::new(),
                });
                self.buckets.len() - 1
            }
        };
        self.buckets[index].counts.push((function.to_string(), count));
    }

    /// Looks up one count, mostly for tests and diagnostics.
    #[must_use]
    pub fn count(&self, label: &str, function: &str) -> Option<u64> {
        self.buckets
            .iter()
            .find(|b| b.label == label)?
            .counts
            .iter()
            .find(|(f, _)| f == function)
            .map(|(_, n)| *n)
    }
}

/// Nested usage report: client, then bucket, then function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsReport {
    pub clients: Vec<ClientUsage>,
}

impl StatsReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[must_use]
    pub fn client(&self, client: &str) -> Option<&ClientUsage> {
        self.clients.iter().find(|c| c.client == client)
    }

    /// Renders as `{client: {bucket: {function: count}}}`, keeping order.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let clients = self
            .clients
            .iter()
            .map(|usage| {
                let buckets = usage
                    .buckets
                    .iter()
                    .map(|bucket| {
                        let counts = bucket
                            .counts
                            .iter()
                            .map(|(function, n)| (function.clone(), Value::from(*n)))
                            .collect::<Map<_, _>>();
                        (bucket.label.clone(), Value::Object(counts))
                    })
                    .collect::<Map<_, _>>();
                (usage.client.clone(), Value::Object(buckets))
            })
            .collect::<Map<_, _>>();
        Value::Object(clients)
    }
}

fn by_count_desc(a: &(String, u64), b: &(String, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

// ---------------------------------------------------------------------------
// StatsHandler
// ---------------------------------------------------------------------------

/// Counts successful calls per client and function.
pub struct StatsHandler {
    store: Option<Arc<dyn CounterStore>>,
    clock: Arc<dyn Clock>,
    keys: KeySpace,
    lookback_hours: u32,
}

impl StatsHandler {
    /// Creates a handler over `store`. `None` makes every operation a no-op
    /// (reports fail with [`StatsError::Unavailable`]).
    #[must_use]
    pub fn new(store: Option<Arc<dyn CounterStore>>, keys: KeySpace, lookback_hours: u32) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            keys,
            lookback_hours,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&dyn CounterStore, StatsError> {
        self.store.as_deref().ok_or(StatsError::Unavailable)
    }

    /// Records one call of `service`/`method` by `client`.
    ///
    /// # Errors
    ///
    /// Returns the first store error; counters incremented before it stay.
    pub fn record(&self, client: &str, service: &str, method: &str) -> Result<(), StatsError> {
        let store = self.store()?;
        let function = self.keys.function(service, method);

        register(store, &self.keys.client_index(), client)?;
        register(store, &self.keys.function_index(), &function)?;

        let now = self.clock.now();
        store.increment(&self.keys.total(client, &function), 1, 0, None)?;
        store.increment(
            &self.keys.hourly(client, &function, &bucket_label(now)),
            1,
            0,
            Some(bucket_expiry(now)),
        )?;
        Ok(())
    }

    /// Builds the usage report.
    ///
    /// For each known client and function the all-time count lands under
    /// `global`; hourly buckets are then read from the current hour
    /// backwards, stopping at the first empty bucket or after the lookback
    /// limit.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Unavailable`] without a store, or the store's
    /// own error.
    pub fn stats(&self) -> Result<StatsReport, StatsError> {
        let store = self.store()?;
        let clients = read_list(store, &self.keys.client_index())?;
        let functions = read_list(store, &self.keys.function_index())?;
        let now = self.clock.now();

        let mut report = StatsReport::default();
        for client in &clients {
            let mut usage = ClientUsage::new(client);
            for function in &functions {
                let total_key = self.keys.total(client, function);
                if let Some(count) = read_count(store, &total_key)? {
                    usage.push(GLOBAL_LABEL, function, count);
                }
                for hours_back in 0..self.lookback_hours {
                    let label = bucket_label_back(now, hours_back);
                    let key = self.keys.hourly(client, function, &label);
                    match read_count(store, &key)? {
                        Some(count) => usage.push(&label, function, count),
                        None => break,
                    }
                }
            }
            for bucket in &mut usage.buckets {
                bucket.counts.sort_by(by_count_desc);
            }
            report.clients.push(usage);
        }
        Ok(report)
    }

    /// Deletes every counter reachable from the indexes, then the indexes.
    ///
    /// Hourly buckets are deleted across the whole lookback window, even
    /// past empty hours. Buckets older than the window are not reported and
    /// expire on their own.
    ///
    /// # Errors
    ///
    /// Returns [`StatsError::Unavailable`] without a store, or the store's
    /// own error.
    pub fn reset(&self) -> Result<bool, StatsError> {
        let store = self.store()?;
        let clients = read_list(store, &self.keys.client_index())?;
        let functions = read_list(store, &self.keys.function_index())?;
        let now = self.clock.now();

        let mut removed = 0_usize;
        for client in &clients {
            for function in &functions {
                if store.delete(&self.keys.total(client, function))? {
                    removed += 1;
                }
                // The whole window, past empty hours.
                for hours_back in 0..self.lookback_hours {
                    let label = bucket_label_back(now, hours_back);
                    if store.delete(&self.keys.hourly(client, function, &label))? {
                        removed += 1;
                    }
                }
            }
        }
        store.delete(&self.keys.client_index())?;
        store.delete(&self.keys.function_index())?;
        debug!(removed, "statistics reset");
        Ok(true)
    }
}

impl Handler for StatsHandler {
    fn pre_handle(&self, scope: &CallScope<'_>, status: ProcessingStatus) -> &dyn Handler {
        if !status.is_success() || self.store.is_none() {
            return self;
        }
        let request = scope.request;
        if let (Some(service), Some(method)) = (request.service(), request.method()) {
            if let Err(err) = self.record(request.client_id(), service.name(), method) {
                warn!(error = %err, "failed to record usage");
            }
        }
        self
    }

    fn handle(&self, _scope: &CallScope<'_>, _status: ProcessingStatus, output: Value) -> Value {
        output
    }
}

impl std::fmt::Debug for StatsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsHandler")
            .field("available", &self.is_available())
            .field("keys", &self.keys)
            .field("lookback_hours", &self.lookback_hours)
            .finish_non_exhaustive()
    }
}

fn read_list(store: &dyn CounterStore, key: &str) -> Result<Vec<String>, StoreError> {
    match store.get(key)? {
        None => Ok(Vec::new()),
        Some(value) => value.into_list().ok_or_else(|| StoreError::WrongType {
            key: key.to_string(),
            expected: "list",
        }),
    }
}

/// A missing or zero counter reads as `None`.
fn read_count(store: &dyn CounterStore, key: &str) -> Result<Option<u64>, StoreError> {
    Ok(store
        .get(key)?
        .and_then(|value| value.as_counter())
        .filter(|n| *n > 0))
}

/// Appends `member` to the list at `key` unless already present.
fn register(store: &dyn CounterStore, key: &str, member: &str) -> Result<(), StoreError> {
    let mut members = read_list(store, key)?;
    if !members.iter().any(|m| m == member) {
        members.push(member.to_string());
        store.set(key, StoreValue::List(members))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use http::StatusCode;

    use super::*;
    use crate::config::DispatchConfig;
    use crate::counter::{ManualClock, MemoryCounterStore};
    use crate::dispatch::{Dispatcher, RawRequest, Registries};

    struct Fixture {
        handler: StatsHandler,
        store: Arc<MemoryCounterStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture_at(hour: u32, minute: u32, second: u32) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, second).unwrap(),
        ));
        let store = Arc::new(MemoryCounterStore::with_clock(clock.clone()));
        let handler = StatsHandler::new(
            Some(store.clone() as Arc<dyn CounterStore>),
            KeySpace::new("rpcgate", "__"),
            12,
        )
        .with_clock(clock.clone());
        Fixture {
            handler,
            store,
            clock,
        }
    }

    #[test]
    fn record_populates_indexes_and_counters() {
        let f = fixture_at(9, 15, 0);
        f.handler.record("10.0.0.1", "guid", "get").unwrap();
        f.handler.record("10.0.0.1", "guid", "get").unwrap();

        assert_eq!(
            f.store.get("rpcgate__clients").unwrap(),
            Some(StoreValue::List(vec!["10.0.0.1".to_string()]))
        );
        assert_eq!(
            f.store.get("rpcgate__functions").unwrap(),
            Some(StoreValue::List(vec!["guid__get".to_string()]))
        );
        assert_eq!(
            f.store.get("rpcgate__10.0.0.1__guid__get").unwrap(),
            Some(StoreValue::Counter(2))
        );
        assert_eq!(
            f.store.get("rpcgate__10.0.0.1__guid__get__03_01_09").unwrap(),
            Some(StoreValue::Counter(2))
        );
    }

    #[test]
    fn report_sorts_counts_descending() {
        let f = fixture_at(9, 15, 0);
        f.handler.record("a", "ping", "ping").unwrap();
        for _ in 0..3 {
            f.handler.record("a", "guid", "get").unwrap();
        }

        let report = f.handler.stats().unwrap();
        assert_eq!(
            report.to_value(),
            json!({
                "a": {
                    "global": { "guid__get": 3, "ping__ping": 1 },
                    "03_01_09": { "guid__get": 3, "ping__ping": 1 },
                }
            })
        );
        let global = &report.client("a").unwrap().buckets[0];
        assert_eq!(global.counts[0], ("guid__get".to_string(), 3));
    }

    #[test]
    fn hour_rollover_keeps_both_buckets() {
        let f = fixture_at(9, 59, 59);
        f.handler.record("a", "guid", "get").unwrap();
        f.clock.advance(Duration::seconds(2));
        f.handler.record("a", "guid", "get").unwrap();

        let report = f.handler.stats().unwrap();
        let usage = report.client("a").unwrap();
        assert_eq!(usage.count(GLOBAL_LABEL, "guid__get"), Some(2));
        assert_eq!(usage.count("03_01_10", "guid__get"), Some(1));
        assert_eq!(usage.count("03_01_09", "guid__get"), Some(1));
    }

    #[test]
    fn walk_stops_at_first_empty_hour() {
        let f = fixture_at(6, 0, 0);
        f.handler.record("a", "guid", "get").unwrap();
        f.clock.advance(Duration::hours(2));
        f.handler.record("a", "guid", "get").unwrap();

        let usage = f.handler.stats().unwrap().clients.remove(0);
        assert_eq!(usage.count("03_01_08", "guid__get"), Some(1));
        assert_eq!(usage.count("03_01_06", "guid__get"), None);
        assert_eq!(usage.count(GLOBAL_LABEL, "guid__get"), Some(2));
    }

    #[test]
    fn walk_is_bounded_by_lookback() {
        let f = fixture_at(0, 30, 0);
        for _ in 0..14 {
            f.handler.record("a", "guid", "get").unwrap();
            f.clock.advance(Duration::hours(1));
        }
        f.clock.advance(Duration::hours(-1));

        let usage = f.handler.stats().unwrap().clients.remove(0);
        // global plus twelve hourly buckets
        assert_eq!(usage.buckets.len(), 13);
    }

    #[test]
    fn reset_twice_leaves_an_empty_report() {
        let f = fixture_at(9, 15, 0);
        f.handler.record("a", "guid", "get").unwrap();
        f.handler.record("b", "ping", "ping").unwrap();

        assert!(f.handler.reset().unwrap());
        assert!(f.handler.reset().unwrap());
        assert!(f.handler.stats().unwrap().is_empty());
        assert!(f.store.is_empty());
    }

    #[test]
    fn reset_clears_buckets_behind_an_empty_hour() {
        let f = fixture_at(9, 15, 0);
        for _ in 0..5 {
            f.handler.record("a", "guid", "get").unwrap();
        }
        f.clock.advance(Duration::hours(1));
        assert!(f.handler.reset().unwrap());
        assert!(f.store.is_empty());

        f.handler.record("a", "guid", "get").unwrap();
        let report = f.handler.stats().unwrap();
        assert_eq!(
            report.to_value(),
            json!({
                "a": {
                    "global": { "guid__get": 1 },
                    "03_01_10": { "guid__get": 1 },
                }
            })
        );
        assert_eq!(f.store.get("rpcgate__a__guid__get__03_01_09").unwrap(), None);
    }

    /// Refuses every operation, like a counter store that cannot be reached.
    struct UnreachableStore;

    impl CounterStore for UnreachableStore {
        fn get(&self, _key: &str) -> Result<Option<StoreValue>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn set(&self, _key: &str, _value: StoreValue) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        fn increment(
            &self,
            _key: &str,
            _step: u64,
            _initial: u64,
            _expires_at: Option<i64>,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn store_faults_never_fail_the_call() {
        let stats = Arc::new(StatsHandler::new(
            Some(Arc::new(UnreachableStore) as Arc<dyn CounterStore>),
            KeySpace::new("rpcgate", "__"),
            12,
        ));
        let mut registries = Registries::stock();
        registries
            .handlers
            .add_instance("stats", Arc::clone(&stats) as Arc<dyn Handler>, true);
        let dispatcher = Dispatcher::new(registries, DispatchConfig::default());

        let response = dispatcher.dispatch(&RawRequest::new("/ping").client("10.0.0.1"));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            serde_json::from_slice::<Value>(&response.body).unwrap(),
            json!("PONG")
        );

        assert!(matches!(
            stats.record("10.0.0.1", "ping", "ping"),
            Err(StatsError::Store(StoreError::Unavailable(_)))
        ));
        assert!(matches!(stats.stats(), Err(StatsError::Store(_))));
        assert!(matches!(stats.reset(), Err(StatsError::Store(_))));
    }

    #[test]
    fn unknown_client_still_gets_an_empty_global_section() {
        let f = fixture_at(9, 15, 0);
        f.store
            .set("rpcgate__clients", StoreValue::List(vec!["ghost".to_string()]))
            .unwrap();
        let report = f.handler.stats().unwrap();
        assert_eq!(report.to_value(), json!({ "ghost": { "global": {} } }));
    }

    #[test]
    fn missing_store_is_a_no_op() {
        let handler = StatsHandler::new(None, KeySpace::new("rpcgate", "__"), 12);
        assert!(matches!(handler.stats(), Err(StatsError::Unavailable)));
        assert!(matches!(handler.reset(), Err(StatsError::Unavailable)));
        assert!(matches!(
            handler.record("a", "guid", "get"),
            Err(StatsError::Unavailable)
        ));
    }

    #[test]
    fn concurrent_first_requests_count_twice() {
        let f = fixture_at(9, 15, 0);
        let handler = Arc::new(f.handler);
        let threads: Vec<_> = (0..2)
            .map(|_| {
                let handler = Arc::clone(&handler);
                std::thread::spawn(move || handler.record("new-client", "guid", "get").unwrap())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(
            f.store.get("rpcgate__new-client__guid__get").unwrap(),
            Some(StoreValue::Counter(2))
        );
    }
}

//! Record store — append-only, in-memory table of [`LogRecord`]s.
//!
//! Every insert updates two kinds of index:
//!
//! - a hash set over `(client_address, time)` so duplicate detection is O(1);
//! - one group index per [`Field`], mapping each distinct value to the row ids
//!   that carry it, so every query is a single pass over the groups.
//!
//! Time bucketing always works on [`LogRecord::time_epoch`], i.e. UTC seconds.

use crate::error::StoreError;
use crate::record::{Field, LogRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Result of [`RecordStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateSkipped,
}

/// One row of a top-N listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedItem {
    pub value: String,
    pub count: u64,
}

/// Bucket widths used for peak-rate figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Second,
    Minute,
    Hour,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Second, Granularity::Minute, Granularity::Hour];

    pub fn seconds(self) -> i64 {
        match self {
            Granularity::Second => 1,
            Granularity::Minute => 60,
            Granularity::Hour => 3600,
        }
    }
}

/// Highest per-bucket sum seen at each granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Peaks {
    pub per_second: u64,
    pub per_minute: u64,
    pub per_hour: u64,
}

impl Peaks {
    pub fn get(&self, granularity: Granularity) -> u64 {
        match granularity {
            Granularity::Second => self.per_second,
            Granularity::Minute => self.per_minute,
            Granularity::Hour => self.per_hour,
        }
    }

    fn set(&mut self, granularity: Granularity, value: u64) {
        match granularity {
            Granularity::Second => self.per_second = value,
            Granularity::Minute => self.per_minute = value,
            Granularity::Hour => self.per_hour = value,
        }
    }
}

/// Totals and peak rates for one distinct value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRow {
    pub value: String,
    pub requests: u64,
    /// Sum of `downstream_content_size`; `None` when no record carried one
    pub bytes: Option<u64>,
    pub peak_requests: Peaks,
    /// `None` when no record carried a `downstream_content_size`
    pub peak_bytes: Option<Peaks>,
}

/// Request counts for one field value, aligned to the timeline's global buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Series {
    /// Bucket start, seconds since the Unix epoch
    pub buckets: Vec<i64>,
    pub counts: Vec<u64>,
}

pub type Timeline = BTreeMap<String, Series>;

#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<LogRecord>,
    seen: HashSet<(String, String)>,
    groups: HashMap<Field, HashMap<String, Vec<usize>>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Insert a record unless one with the same `(client_address, time)` is already stored.
    pub fn insert(&mut self, record: LogRecord) -> InsertOutcome {
        let key = (record.client_address.clone(), record.time.clone());
        if !self.seen.insert(key) {
            return InsertOutcome::DuplicateSkipped;
        }

        let row = self.records.len();
        for field in Field::ALL {
            if let Some(value) = record.value(field) {
                self.groups
                    .entry(field)
                    .or_default()
                    .entry(value.into_owned())
                    .or_default()
                    .push(row);
            }
        }
        self.records.push(record);
        InsertOutcome::Inserted
    }

    /// The `n` most frequent values of `field`.
    ///
    /// Ordered by count descending; equal counts are ordered by value ascending.
    pub fn top_n_by(&self, field: Field, n: usize) -> Vec<RankedItem> {
        let mut ranked: Vec<(&str, u64)> = self
            .group(field)
            .map(|(value, rows)| (value, rows.len() as u64))
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(n)
            .map(|(value, count)| RankedItem {
                value: value.to_string(),
                count,
            })
            .collect()
    }

    /// Totals and peak rates for every distinct value of `field`.
    ///
    /// Rows are ordered by request count descending, then value ascending.
    pub fn aggregate_by(&self, field: Field) -> Vec<AggregateRow> {
        let mut rows: Vec<AggregateRow> = self
            .group(field)
            .map(|(value, rows)| self.aggregate_rows(value, rows))
            .collect();
        rows.sort_unstable_by(|a, b| b.requests.cmp(&a.requests).then(a.value.cmp(&b.value)));
        rows
    }

    /// Request counts per value of `field` in fixed windows of `interval_seconds`.
    ///
    /// Buckets are the union over all records; every series carries all of them,
    /// with zero where the value had no requests.
    pub fn timeline(&self, field: Field, interval_seconds: u64) -> Result<Timeline, StoreError> {
        let width = i64::try_from(interval_seconds)
            .ok()
            .filter(|w| *w > 0)
            .ok_or(StoreError::InvalidInterval(interval_seconds))?;

        let buckets: Vec<i64> = self
            .records
            .iter()
            .map(|r| bucket_start(r.time_epoch, width))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let timeline = self
            .group(field)
            .map(|(value, rows)| {
                let mut per_bucket: HashMap<i64, u64> = HashMap::new();
                for &row in rows {
                    *per_bucket
                        .entry(bucket_start(self.records[row].time_epoch, width))
                        .or_insert(0) += 1;
                }
                let counts = buckets
                    .iter()
                    .map(|b| per_bucket.get(b).copied().unwrap_or(0))
                    .collect();
                (
                    value.to_string(),
                    Series {
                        buckets: buckets.clone(),
                        counts,
                    },
                )
            })
            .collect();
        Ok(timeline)
    }

    fn group(&self, field: Field) -> impl Iterator<Item = (&str, &Vec<usize>)> {
        self.groups
            .get(&field)
            .into_iter()
            .flat_map(|g| g.iter().map(|(value, rows)| (value.as_str(), rows)))
    }

    fn aggregate_rows(&self, value: &str, rows: &[usize]) -> AggregateRow {
        let records = || rows.iter().map(|&row| &self.records[row]);

        let bytes = records()
            .filter_map(|r| r.downstream_content_size)
            .reduce(u64::saturating_add);

        let mut peak_requests = Peaks::default();
        let mut peak_bytes = Peaks::default();
        for granularity in Granularity::ALL {
            let width = granularity.seconds();
            // bucket start -> (requests, bytes)
            let mut buckets: HashMap<i64, (u64, u64)> = HashMap::new();
            for record in records() {
                let slot = buckets.entry(bucket_start(record.time_epoch, width)).or_default();
                slot.0 += 1;
                slot.1 = slot.1.saturating_add(record.downstream_content_size.unwrap_or(0));
            }
            peak_requests.set(granularity, buckets.values().map(|s| s.0).max().unwrap_or(0));
            peak_bytes.set(granularity, buckets.values().map(|s| s.1).max().unwrap_or(0));
        }

        AggregateRow {
            value: value.to_string(),
            requests: rows.len() as u64,
            bytes,
            peak_requests,
            peak_bytes: bytes.map(|_| peak_bytes),
        }
    }
}

/// Start of the `width`-second window containing `epoch`.
pub fn bucket_start(epoch: i64, width: i64) -> i64 {
    epoch.div_euclid(width) * width
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_705_314_600; // 2024-01-15T10:30:00Z

    fn record(ip: &str, path: &str, epoch: i64, bytes: Option<u64>) -> LogRecord {
        let time = chrono::DateTime::from_timestamp(epoch, 0)
            .unwrap()
            .to_rfc3339();
        LogRecord {
            client_address: format!("{}:5000", ip),
            client_ip: ip.to_string(),
            client_port: "5000".to_string(),
            downstream_content_size: bytes,
            downstream_status: 200,
            duration: 1000.0,
            request_method: "GET".to_string(),
            request_path: path.to_string(),
            service_addr: None,
            start_time: time.clone(),
            level: "info".to_string(),
            message: String::new(),
            trace_id: None,
            user_agent: None,
            time,
            time_epoch: epoch,
            tag: String::new(),
        }
    }

    fn store_of(records: Vec<LogRecord>) -> RecordStore {
        let mut store = RecordStore::new();
        for r in records {
            store.insert(r);
        }
        store
    }

    #[test]
    fn duplicate_key_keeps_first_record() {
        let mut store = RecordStore::new();
        let first = record("10.0.0.1", "/first", T0, Some(10));
        let mut second = first.clone();
        second.request_path = "/second".to_string();
        second.downstream_status = 500;

        assert_eq!(store.insert(first), InsertOutcome::Inserted);
        assert_eq!(store.insert(second), InsertOutcome::DuplicateSkipped);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].request_path, "/first");
        assert_eq!(
            store.top_n_by(Field::RequestPath, 10),
            vec![RankedItem { value: "/first".into(), count: 1 }]
        );
    }

    #[test]
    fn same_address_different_time_is_not_a_duplicate() {
        let mut store = RecordStore::new();
        assert_eq!(store.insert(record("10.0.0.1", "/", T0, None)), InsertOutcome::Inserted);
        assert_eq!(store.insert(record("10.0.0.1", "/", T0 + 1, None)), InsertOutcome::Inserted);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn top_n_breaks_ties_by_value() {
        let mut records = vec![];
        let mut t = T0;
        for (path, n) in [("/d", 1), ("/c", 3), ("/b", 3), ("/a", 5)] {
            for _ in 0..n {
                records.push(record("10.0.0.1", path, t, None));
                t += 1;
            }
        }
        let store = store_of(records);
        let expected = vec![
            RankedItem { value: "/a".into(), count: 5 },
            RankedItem { value: "/b".into(), count: 3 },
        ];
        for _ in 0..3 {
            assert_eq!(store.top_n_by(Field::RequestPath, 2), expected);
        }
        assert_eq!(store.top_n_by(Field::RequestPath, 10).len(), 4);
        assert!(store.top_n_by(Field::RequestPath, 0).is_empty());
    }

    #[test]
    fn optional_fields_skip_absent_values() {
        let mut with_service = record("10.0.0.1", "/", T0, None);
        with_service.service_addr = Some("svc:80".to_string());
        let store = store_of(vec![with_service, record("10.0.0.2", "/", T0, None)]);
        assert_eq!(
            store.top_n_by(Field::ServiceAddr, 10),
            vec![RankedItem { value: "svc:80".into(), count: 1 }]
        );
    }

    #[test]
    fn peak_per_second_counts_a_burst() {
        let mut records = vec![];
        for port in 0..5 {
            let mut r = record("10.0.0.9", "/", T0, Some(100));
            r.client_address = format!("10.0.0.9:{}", port);
            records.push(r);
        }
        records.push(record("10.0.0.9", "/", T0 + 10, Some(1)));
        let store = store_of(records);

        let rows = store.aggregate_by(Field::ClientIp);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.requests, 6);
        assert_eq!(row.bytes, Some(501));
        assert_eq!(row.peak_requests.per_second, 5);
        assert_eq!(row.peak_requests.per_minute, 6);
        assert_eq!(row.peak_requests.per_hour, 6);
        let peak_bytes = row.peak_bytes.unwrap();
        assert_eq!(peak_bytes.per_second, 500);
        assert_eq!(peak_bytes.get(Granularity::Minute), 501);
    }

    #[test]
    fn aggregate_bytes_are_null_safe() {
        let store = store_of(vec![
            record("10.0.0.1", "/", T0, None),
            record("10.0.0.1", "/", T0 + 1, Some(7)),
            record("10.0.0.2", "/", T0, None),
        ]);
        let rows = store.aggregate_by(Field::ClientIp);
        assert_eq!(rows[0].value, "10.0.0.1");
        assert_eq!(rows[0].bytes, Some(7));
        assert_eq!(rows[1].value, "10.0.0.2");
        assert_eq!(rows[1].bytes, None);
        assert_eq!(rows[1].peak_bytes, None);
        assert_eq!(rows[1].peak_requests.per_second, 1);
    }

    #[test]
    fn huge_byte_counts_saturate() {
        let store = store_of(vec![
            record("10.0.0.1", "/", T0, Some(u64::MAX - 1)),
            record("10.0.0.1", "/", T0 + 1, Some(10)),
        ]);
        let row = &store.aggregate_by(Field::ClientIp)[0];
        assert_eq!(row.bytes, Some(u64::MAX));
        assert_eq!(row.peak_bytes.unwrap().per_minute, u64::MAX);
        assert_eq!(row.peak_bytes.unwrap().per_second, u64::MAX - 1);
    }

    #[test]
    fn hour_buckets_are_aligned_to_utc() {
        // 10:59:59 and 11:00:00 fall in different hours
        let store = store_of(vec![
            record("10.0.0.1", "/", T0 + 29 * 60 + 59, None),
            record("10.0.0.1", "/", T0 + 30 * 60, None),
        ]);
        let row = &store.aggregate_by(Field::ClientIp)[0];
        assert_eq!(row.peak_requests.per_hour, 1);
    }

    #[test]
    fn timeline_zero_fills_missing_buckets() {
        let store = store_of(vec![
            record("10.0.0.1", "/", T0, None),
            record("10.0.0.1", "/", T0 + 5, None),
            record("10.0.0.2", "/", T0 + 120, None),
        ]);
        let timeline = store.timeline(Field::ClientIp, 60).unwrap();
        assert_eq!(timeline.len(), 2);
        let one = &timeline["10.0.0.1"];
        let two = &timeline["10.0.0.2"];
        assert_eq!(one.buckets, vec![T0, T0 + 120]);
        assert_eq!(two.buckets, one.buckets);
        assert_eq!(one.counts, vec![2, 0]);
        assert_eq!(two.counts, vec![0, 1]);
    }

    #[test]
    fn timeline_rejects_zero_interval() {
        let store = store_of(vec![record("10.0.0.1", "/", T0, None)]);
        assert_eq!(
            store.timeline(Field::Tag, 0),
            Err(StoreError::InvalidInterval(0))
        );
    }

    #[test]
    fn empty_store_answers_empty() {
        let store = RecordStore::new();
        assert!(store.is_empty());
        assert!(store.top_n_by(Field::ClientIp, 5).is_empty());
        assert!(store.aggregate_by(Field::Tag).is_empty());
        assert!(store.timeline(Field::ClientIp, 60).unwrap().is_empty());
    }

    #[test]
    fn bucket_start_floors_negative_epochs() {
        assert_eq!(bucket_start(-1, 60), -60);
        assert_eq!(bucket_start(59, 60), 0);
        assert_eq!(bucket_start(60, 60), 60);
    }
}

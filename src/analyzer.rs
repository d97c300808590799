use crate::error::StoreError;
use crate::ingest::IngestResult;
use crate::record::Field;
use crate::store::{AggregateRow, RankedItem, RecordStore, Series, Timeline};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The three groupings the report is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    ClientIp,
    RequestPath,
    Tag,
}

impl GroupKey {
    pub const ALL: [GroupKey; 3] = [GroupKey::ClientIp, GroupKey::RequestPath, GroupKey::Tag];

    pub fn field(self) -> Field {
        match self {
            GroupKey::ClientIp => Field::ClientIp,
            GroupKey::RequestPath => Field::RequestPath,
            GroupKey::Tag => Field::Tag,
        }
    }

    /// Short column heading
    pub fn label(self) -> &'static str {
        match self {
            GroupKey::ClientIp => "IP",
            GroupKey::RequestPath => "Path",
            GroupKey::Tag => "Tag",
        }
    }

    /// Paths are too many and too sparse to chart.
    pub fn has_timeline(self) -> bool {
        !matches!(self, GroupKey::RequestPath)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field())
    }
}

impl FromStr for GroupKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupKey::ALL
            .iter()
            .copied()
            .find(|key| key.field().name() == s)
            .ok_or_else(|| StoreError::UnknownField(s.to_string()))
    }
}

pub fn top_n(store: &RecordStore, key: GroupKey, n: usize) -> Vec<RankedItem> {
    store.top_n_by(key.field(), n)
}

pub fn summarize(store: &RecordStore, key: GroupKey) -> Vec<AggregateRow> {
    store.aggregate_by(key.field())
}

pub fn timeline(
    store: &RecordStore,
    key: GroupKey,
    interval_seconds: u64,
) -> Result<Timeline, StoreError> {
    store.timeline(key.field(), interval_seconds)
}

/// Sum all series of an aligned timeline into one.
pub fn total_series(timeline: &Timeline) -> Option<Series> {
    let mut series = timeline.values();
    let first = series.next()?.clone();
    Some(series.fold(first, |mut total, s| {
        for (acc, count) in total.counts.iter_mut().zip(&s.counts) {
            *acc += count;
        }
        total
    }))
}

/// Everything computed for one [`GroupKey`].
#[derive(Debug, Serialize)]
pub struct KeySection {
    pub key: GroupKey,
    pub top: Vec<RankedItem>,
    pub rows: Vec<AggregateRow>,
    pub timeline: Option<Timeline>,
}

/// The complete analysis output
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub ingest: IngestResult,
    pub total_records: usize,
    pub total_bytes: Option<u64>,
    pub top_n: usize,
    pub interval_seconds: u64,
    pub sections: Vec<KeySection>,
}

impl AnalysisReport {
    pub fn section(&self, key: GroupKey) -> Option<&KeySection> {
        self.sections.iter().find(|s| s.key == key)
    }
}

/// Run every query the report needs against a fully ingested store.
pub fn analyze(
    store: &RecordStore,
    ingest: IngestResult,
    top_n: usize,
    interval_seconds: u64,
) -> Result<AnalysisReport, StoreError> {
    let sections = GroupKey::ALL
        .iter()
        .map(|&key| -> Result<KeySection, StoreError> {
            let timeline = if key.has_timeline() {
                Some(timeline(store, key, interval_seconds)?)
            } else {
                None
            };
            Ok(KeySection {
                key,
                top: self::top_n(store, key, top_n),
                rows: summarize(store, key),
                timeline,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total_bytes = store
        .records()
        .iter()
        .filter_map(|r| r.downstream_content_size)
        .reduce(u64::saturating_add);

    Ok(AnalysisReport {
        ingest,
        total_records: store.len(),
        total_bytes,
        top_n,
        interval_seconds,
        sections,
    })
}

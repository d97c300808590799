//! End-to-end: build a real support bundle, unpack it, ingest every router
//! request log and check the aggregates the report is built from.

use bundle_insights::analyzer::{self, GroupKey};
use bundle_insights::ingest::{FailurePolicy, IngestOptions, Ingestor};
use bundle_insights::store::RecordStore;
use bundle_insights::unpack::{unpack, LogFilePattern};
use bundle_insights::IngestError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;

fn request(addr: &str, path: &str, time: &str, size: u64, tag: Option<&str>) -> String {
    let tag = tag
        .map(|t| format!(r#","_tag":"{}""#, t))
        .unwrap_or_default();
    format!(
        r#"{{"ClientAddr":"{}","DownstreamContentSize":{},"DownstreamStatus":200,"Duration":250000,"RequestMethod":"GET","RequestPath":"{}","ServiceAddr":"localhost:8081","StartUTC":"{}","level":"info","msg":"","request_User-Agent":"JFrog CLI","time":"{}"{}}}"#,
        addr, size, path, time, time, tag
    )
}

fn node_log() -> String {
    [
        request("10.1.0.1:50000", "/artifactory/api/npm", "2024-01-15T10:00:00Z", 1000, None),
        request("10.1.0.1:50001", "/artifactory/api/npm", "2024-01-15T10:00:00Z", 1000, None),
        request("10.1.0.1:50002", "/artifactory/api/npm", "2024-01-15T10:00:00Z", 1000, None),
        request("10.1.0.2:40000", "/artifactory/api/docker", "2024-01-15T10:20:00Z", 5000, Some("ci")),
        request("127.0.0.1:9999", "/router/api/v1/system/health", "2024-01-15T10:20:01Z", 10, None),
    ]
    .join("\n")
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn gz_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Two nodes; node2 ships a gzipped copy of node1's log, so every record
/// there is a duplicate.
fn write_bundle(dir: &Path) -> std::path::PathBuf {
    let log = node_log();
    let node1 = zip_bytes(&[("var/log/router-request.log", log.as_bytes())]);
    let rotated = gz_bytes(log.as_bytes());
    let node2 = zip_bytes(&[("var/log/router-request.1.log.gz", &rotated[..])]);
    let bundle = zip_bytes(&[("node1.zip", &node1[..]), ("node2.zip", &node2[..])]);
    let path = dir.join("support-bundle-2024-01-15.zip");
    std::fs::write(&path, bundle).unwrap();
    path
}

#[test]
fn bundle_to_report() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = write_bundle(dir.path());

    let files = unpack(&bundle, &LogFilePattern::default()).unwrap();
    assert_eq!(files.len(), 2);

    let mut store = RecordStore::new();
    let summary = Ingestor::new(IngestOptions::default())
        .ingest_all(&mut store, &files, FailurePolicy::Abort)
        .unwrap();
    assert_eq!(summary.files_ingested, 2);
    assert_eq!(summary.totals.accepted, 4);
    assert_eq!(summary.totals.skipped_duplicate, 4);
    assert_eq!(summary.totals.skipped_filtered, 2);

    let report = analyzer::analyze(&store, summary.totals, 10, 900).unwrap();
    assert_eq!(report.total_bytes, Some(8000));

    let ips = report.section(GroupKey::ClientIp).unwrap();
    assert_eq!(ips.top[0].value, "10.1.0.1");
    assert_eq!(ips.top[0].count, 3);
    assert!(ips.top.iter().all(|item| item.value != "127.0.0.1"));
    let busiest = &ips.rows[0];
    assert_eq!(busiest.peak_requests.per_second, 3);
    assert_eq!(busiest.peak_bytes.unwrap().per_second, 3000);

    let tags = report.section(GroupKey::Tag).unwrap();
    let timeline = tags.timeline.as_ref().unwrap();
    assert_eq!(timeline[""].counts, vec![3, 0]);
    assert_eq!(timeline["ci"].counts, vec![0, 1]);
    assert_eq!(timeline[""].buckets, timeline["ci"].buckets);
}

#[test]
fn broken_file_aborts_or_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("router-request.log");
    let bad = dir.path().join("router-request.broken.log");
    std::fs::write(&good, node_log()).unwrap();
    std::fs::write(&bad, format!("{}\n{{\"ClientAddr\": 1}}\n", node_log().lines().next().unwrap()))
        .unwrap();
    let files = vec![bad.clone(), good];
    let ingestor = Ingestor::new(IngestOptions::default());

    let mut store = RecordStore::new();
    match ingestor.ingest_all(&mut store, &files, FailurePolicy::Abort) {
        Err(IngestError::Malformed { path, line, .. }) => {
            assert_eq!(path, bad);
            assert_eq!(line, 2);
        }
        other => panic!("expected Malformed, got {:?}", other.map(|s| s.totals)),
    }

    let mut store = RecordStore::new();
    let summary = ingestor
        .ingest_all(&mut store, &files, FailurePolicy::SkipFile)
        .unwrap();
    assert_eq!(summary.files_failed, vec![bad]);
    assert_eq!(store.len(), 4);
}

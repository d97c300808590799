use crate::error::{RecordError, StoreError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Client IP of the router's own health checks.
pub const LOOPBACK_IP: &str = "127.0.0.1";

/// One normalized router request, as held by the record store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// Raw `ip:port` exactly as logged
    pub client_address: String,
    pub client_ip: String,
    pub client_port: String,
    pub downstream_content_size: Option<u64>,
    pub downstream_status: u16,
    /// Request duration in the unit the router logs (nanoseconds)
    pub duration: f64,
    pub request_method: String,
    pub request_path: String,
    pub service_addr: Option<String>,
    /// `StartUTC`, stored verbatim
    pub start_time: String,
    pub level: String,
    pub message: String,
    pub trace_id: Option<String>,
    pub user_agent: Option<String>,
    /// `time`, stored verbatim; all bucketing uses [`LogRecord::time_epoch`]
    pub time: String,
    /// `time` as whole seconds since the Unix epoch (UTC)
    pub time_epoch: i64,
    pub tag: String,
}

/// Wire layout of a router-request log line.
///
/// Example:
///   {"ClientAddr":"10.0.0.5:443","DownstreamContentSize":512,"DownstreamStatus":200,
///    "Duration":1200000,"RequestMethod":"GET","RequestPath":"/api/v1/system/ping",
///    "StartUTC":"2024-01-15T10:30:00.0012Z","level":"info","msg":"","time":"2024-01-15T10:30:00Z"}
#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(rename = "ClientAddr")]
    client_addr: String,
    #[serde(rename = "DownstreamContentSize", default)]
    downstream_content_size: Option<u64>,
    #[serde(rename = "DownstreamStatus")]
    downstream_status: u16,
    #[serde(rename = "Duration")]
    duration: f64,
    #[serde(rename = "RequestMethod")]
    request_method: String,
    #[serde(rename = "RequestPath")]
    request_path: String,
    #[serde(rename = "ServiceAddr", default)]
    service_addr: Option<String>,
    #[serde(rename = "StartUTC")]
    start_utc: String,
    level: String,
    msg: String,
    #[serde(rename = "request_Uber-Trace-Id", default)]
    trace_id: Option<String>,
    #[serde(rename = "request_User-Agent", default)]
    user_agent: Option<String>,
    time: String,
    #[serde(rename = "_tag", default)]
    tag: Option<String>,
}

/// Parse a single JSON log line into a [`LogRecord`].
///
/// Records without a `_tag` get `default_tag`.
pub fn parse_record(line: &str, default_tag: &str) -> Result<LogRecord, RecordError> {
    let wire: WireRecord = serde_json::from_str(line)?;

    let (client_ip, client_port) =
        split_client_addr(&wire.client_addr).ok_or_else(|| RecordError::InvalidField {
            field: "ClientAddr",
            value: wire.client_addr.clone(),
        })?;
    let (client_ip, client_port) = (client_ip.to_string(), client_port.to_string());

    let time_epoch = parse_timestamp(&wire.time)
        .ok_or_else(|| RecordError::InvalidField {
            field: "time",
            value: wire.time.clone(),
        })?
        .timestamp();

    Ok(LogRecord {
        client_address: wire.client_addr,
        client_ip,
        client_port,
        downstream_content_size: wire.downstream_content_size,
        downstream_status: wire.downstream_status,
        duration: wire.duration,
        request_method: wire.request_method,
        request_path: wire.request_path,
        service_addr: wire.service_addr,
        start_time: wire.start_utc,
        level: wire.level,
        message: wire.msg,
        trace_id: wire.trace_id,
        user_agent: wire.user_agent,
        time: wire.time,
        time_epoch,
        tag: wire.tag.unwrap_or_else(|| default_tag.to_string()),
    })
}

/// Split `ip:port` on the last colon, so bracketed IPv6 addresses keep their colons.
pub fn split_client_addr(addr: &str) -> Option<(&str, &str)> {
    addr.rsplit_once(':')
}

/// Parse a router timestamp into a UTC instant.
///
/// RFC 3339 with any offset is preferred; offset-less forms are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Columns the record store can group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    ClientAddress,
    ClientIp,
    ClientPort,
    DownstreamStatus,
    RequestMethod,
    RequestPath,
    ServiceAddr,
    Level,
    UserAgent,
    Tag,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::ClientAddress,
        Field::ClientIp,
        Field::ClientPort,
        Field::DownstreamStatus,
        Field::RequestMethod,
        Field::RequestPath,
        Field::ServiceAddr,
        Field::Level,
        Field::UserAgent,
        Field::Tag,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::ClientAddress => "client_address",
            Field::ClientIp => "client_ip",
            Field::ClientPort => "client_port",
            Field::DownstreamStatus => "downstream_status",
            Field::RequestMethod => "request_method",
            Field::RequestPath => "request_path",
            Field::ServiceAddr => "service_addr",
            Field::Level => "level",
            Field::UserAgent => "user_agent",
            Field::Tag => "tag",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Field {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| StoreError::UnknownField(s.to_string()))
    }
}

impl LogRecord {
    /// Value of `field` for this record; `None` when an optional field is absent.
    pub fn value(&self, field: Field) -> Option<Cow<'_, str>> {
        match field {
            Field::ClientAddress => Some(Cow::Borrowed(&self.client_address)),
            Field::ClientIp => Some(Cow::Borrowed(&self.client_ip)),
            Field::ClientPort => Some(Cow::Borrowed(&self.client_port)),
            Field::DownstreamStatus => Some(Cow::Owned(self.downstream_status.to_string())),
            Field::RequestMethod => Some(Cow::Borrowed(&self.request_method)),
            Field::RequestPath => Some(Cow::Borrowed(&self.request_path)),
            Field::ServiceAddr => self.service_addr.as_deref().map(Cow::Borrowed),
            Field::Level => Some(Cow::Borrowed(&self.level)),
            Field::UserAgent => self.user_agent.as_deref().map(Cow::Borrowed),
            Field::Tag => Some(Cow::Borrowed(&self.tag)),
        }
    }

    pub fn is_loopback(&self) -> bool {
        self.client_ip == LOOPBACK_IP
    }
}

// ─── Unit Tests ──────────────────────────────────────────────────────────────

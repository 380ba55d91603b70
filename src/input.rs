//! Loading span records from trace files.
//!
//! Two JSON layouts are understood, optionally gzip compressed:
//! - OTLP exports: an array of `ExportTraceServiceRequest`, or a single request.
//! - Trace data: `{ "traceID": ..., "spans": [...] }` (or an array of those), with flat span
//!   objects whose timestamps are nanoseconds or RFC 3339 strings.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Result};
use flate2::read::GzDecoder;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value;
use opentelemetry_proto::tonic::common::v1::{AnyValue, ArrayValue, KeyValue, KeyValueList};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::task_timer::TaskTimer;
use crate::types::{
    parse_timestamp, Attributes, Event, Link, Resource, Scope, SpanPayload, SpanRecord, UnixNanos,
};

/// All spans of one trace, in the order in which they were read.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceInput {
    pub trace_id: String,
    pub spans: Vec<SpanRecord>,
}

pub fn load_trace_file(path: &Path) -> Result<Vec<TraceInput>> {
    info!(path = %path.display(), "loading trace file");
    let mut file_bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut file_bytes)?;
    parse_trace_file(&file_bytes)
}

pub fn parse_trace_file(file_bytes: &[u8]) -> Result<Vec<TraceInput>> {
    let t = TaskTimer::new("Parsing trace file");

    let file_bytes = decompress(file_bytes)?;
    let file_str = std::str::from_utf8(&file_bytes)
        .map_err(|e| anyhow::anyhow!("File is not UTF8!: {}", e))?;
    let json: serde_json::Value = serde_json::from_str(file_str)?;

    let records = if is_otlp_export(&json) {
        let requests: Vec<ExportTraceServiceRequest> = match json {
            serde_json::Value::Array(_) => serde_json::from_value(json)?,
            _ => vec![serde_json::from_value(json)?],
        };
        extract_spans(&requests)
    } else if is_trace_data(&json) {
        let traces: Vec<TraceDataJson> = match json {
            serde_json::Value::Array(_) => serde_json::from_value(json)?,
            _ => vec![serde_json::from_value(json)?],
        };
        traces
            .into_iter()
            .flat_map(|trace| {
                let trace_id = trace.trace_id;
                trace
                    .spans
                    .into_iter()
                    .map(move |span| span.into_record(&trace_id))
            })
            .collect()
    } else {
        bail!("Unrecognized trace file, expected an OTLP export or trace data JSON");
    };

    let traces = group_by_trace(records);
    info!(traces = traces.len(), "parsed trace file");
    t.stop();
    Ok(traces)
}

fn decompress(file_bytes: &[u8]) -> Result<Cow<'_, [u8]>> {
    if !file_bytes.starts_with(&[0x1f, 0x8b]) {
        return Ok(Cow::Borrowed(file_bytes));
    }
    debug!("decompressing gzip trace file");
    let mut decompressed = Vec::new();
    GzDecoder::new(file_bytes).read_to_end(&mut decompressed)?;
    Ok(Cow::Owned(decompressed))
}

fn is_otlp_export(json: &serde_json::Value) -> bool {
    match json {
        serde_json::Value::Array(items) => items
            .first()
            .map_or(true, |item| item.get("resourceSpans").is_some()),
        serde_json::Value::Object(object) => object.contains_key("resourceSpans"),
        _ => false,
    }
}

fn is_trace_data(json: &serde_json::Value) -> bool {
    match json {
        serde_json::Value::Array(items) => items.iter().all(|item| item.get("spans").is_some()),
        serde_json::Value::Object(object) => object.contains_key("spans"),
        _ => false,
    }
}

/// Groups records by trace id. Traces keep the order in which their first span was seen.
pub fn group_by_trace(records: Vec<SpanRecord>) -> Vec<TraceInput> {
    let mut index_by_trace_id: HashMap<String, usize> = HashMap::new();
    let mut traces: Vec<TraceInput> = Vec::new();

    for record in records {
        let index = *index_by_trace_id
            .entry(record.trace_id.clone())
            .or_insert_with(|| {
                traces.push(TraceInput {
                    trace_id: record.trace_id.clone(),
                    spans: Vec::new(),
                });
                traces.len() - 1
            });
        traces[index].spans.push(record);
    }

    traces
}

fn collect_attributes(attributes: &[KeyValue]) -> Attributes {
    let mut collected = BTreeMap::new();
    for attribute in attributes {
        collected.insert(
            attribute.key.clone(),
            attribute.value.clone().and_then(|v| v.value),
        );
    }
    collected
}

/// OTLP uses 0 for timestamps that were never set.
fn otlp_time(unix_nano: u64) -> Option<UnixNanos> {
    (unix_nano != 0).then_some(unix_nano)
}

fn span_kind_name(kind: i32) -> &'static str {
    match kind {
        1 => "SPAN_KIND_INTERNAL",
        2 => "SPAN_KIND_SERVER",
        3 => "SPAN_KIND_CLIENT",
        4 => "SPAN_KIND_PRODUCER",
        5 => "SPAN_KIND_CONSUMER",
        _ => "SPAN_KIND_UNSPECIFIED",
    }
}

fn status_code_name(code: i32) -> &'static str {
    match code {
        1 => "STATUS_CODE_OK",
        2 => "STATUS_CODE_ERROR",
        _ => "STATUS_CODE_UNSET",
    }
}

/// Flatten OTLP requests into span records, in file order.
pub fn extract_spans(requests: &[ExportTraceServiceRequest]) -> Vec<SpanRecord> {
    let mut records = Vec::new();
    let mut untimed = 0usize;

    for request in requests {
        for rs in &request.resource_spans {
            let resource = match &rs.resource {
                Some(r) => Resource::from_attributes(
                    collect_attributes(&r.attributes),
                    r.dropped_attributes_count,
                ),
                None => Resource::default(),
            };

            for ss in &rs.scope_spans {
                let scope = ss.scope.as_ref().map(|s| Scope {
                    name: s.name.clone(),
                    version: s.version.clone(),
                    attributes: collect_attributes(&s.attributes),
                    dropped_attributes_count: s.dropped_attributes_count,
                });

                for span in &ss.spans {
                    let start_time = otlp_time(span.start_time_unix_nano);
                    let end_time = otlp_time(span.end_time_unix_nano);
                    if start_time.is_none() || end_time.is_none() {
                        untimed += 1;
                    }

                    let events = span
                        .events
                        .iter()
                        .map(|event| Event {
                            name: event.name.clone(),
                            time: otlp_time(event.time_unix_nano),
                            attributes: collect_attributes(&event.attributes),
                            dropped_attributes_count: event.dropped_attributes_count,
                        })
                        .collect();

                    let links = span
                        .links
                        .iter()
                        .map(|link| Link {
                            trace_id: hex::encode(&link.trace_id),
                            span_id: hex::encode(&link.span_id),
                            trace_state: link.trace_state.clone(),
                            attributes: collect_attributes(&link.attributes),
                            dropped_attributes_count: link.dropped_attributes_count,
                        })
                        .collect();

                    let (status_code, status_message) = match &span.status {
                        Some(status) => (status_code_name(status.code), status.message.clone()),
                        None => (status_code_name(0), String::new()),
                    };

                    records.push(SpanRecord {
                        trace_id: hex::encode(&span.trace_id),
                        span_id: hex::encode(&span.span_id),
                        parent_span_id: hex::encode(&span.parent_span_id),
                        start_time,
                        end_time,
                        payload: SpanPayload {
                            name: span.name.clone(),
                            kind: span_kind_name(span.kind).to_string(),
                            trace_state: span.trace_state.clone(),
                            status_code: status_code.to_string(),
                            status_message,
                            attributes: collect_attributes(&span.attributes),
                            events,
                            links,
                            resource: resource.clone(),
                            scope: scope.clone(),
                            dropped_attributes_count: span.dropped_attributes_count,
                            dropped_events_count: span.dropped_events_count,
                            dropped_links_count: span.dropped_links_count,
                        },
                    });
                }
            }
        }
    }

    if untimed > 0 {
        warn!(spans = untimed, "spans without start or end time");
    }
    records
}

#[derive(Debug, Deserialize)]
struct TraceDataJson {
    #[serde(rename = "traceID")]
    trace_id: String,
    #[serde(default)]
    spans: Vec<SpanDataJson>,
}

/// Timestamps show up as numbers, numeric strings or RFC 3339 strings.
/// Anything else is kept so that one bad value doesn't reject the whole file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Nanos(u64),
    Text(String),
    Other(serde_json::Value),
}

impl RawTimestamp {
    fn parse(&self) -> Option<UnixNanos> {
        match self {
            RawTimestamp::Nanos(nanos) => Some(*nanos),
            RawTimestamp::Text(text) => parse_timestamp(text),
            RawTimestamp::Other(_) => None,
        }
    }
}

fn parse_raw_timestamp(raw: &Option<RawTimestamp>, span_id: &str, field: &str) -> Option<UnixNanos> {
    let parsed = raw.as_ref().and_then(RawTimestamp::parse);
    if parsed.is_none() {
        warn!(span_id, field, "missing or malformed timestamp");
    }
    parsed
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SpanDataJson {
    #[serde(rename = "traceID")]
    trace_id: String,
    trace_state: String,
    #[serde(rename = "spanID")]
    span_id: String,
    #[serde(rename = "parentSpanID")]
    parent_span_id: String,
    name: String,
    kind: String,
    start_time: Option<RawTimestamp>,
    end_time: Option<RawTimestamp>,
    attributes: BTreeMap<String, serde_json::Value>,
    events: Vec<EventDataJson>,
    links: Vec<LinkDataJson>,
    resource: Option<ResourceDataJson>,
    scope: Option<ScopeDataJson>,
    dropped_attributes_count: u32,
    dropped_events_count: u32,
    dropped_links_count: u32,
    status_code: String,
    status_message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EventDataJson {
    name: String,
    timestamp: Option<RawTimestamp>,
    attributes: BTreeMap<String, serde_json::Value>,
    #[serde(alias = "droppedAttributeCount")]
    dropped_attributes_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LinkDataJson {
    #[serde(rename = "traceID")]
    trace_id: String,
    #[serde(rename = "spanID")]
    span_id: String,
    trace_state: String,
    attributes: BTreeMap<String, serde_json::Value>,
    dropped_attributes_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ResourceDataJson {
    attributes: BTreeMap<String, serde_json::Value>,
    dropped_attributes_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScopeDataJson {
    name: String,
    version: String,
    attributes: BTreeMap<String, serde_json::Value>,
    dropped_attributes_count: u32,
}

impl SpanDataJson {
    fn into_record(self, trace_id: &str) -> SpanRecord {
        let start_time = parse_raw_timestamp(&self.start_time, &self.span_id, "startTime");
        let end_time = parse_raw_timestamp(&self.end_time, &self.span_id, "endTime");

        let resource = match self.resource {
            Some(resource) => Resource::from_attributes(
                json_attributes(resource.attributes),
                resource.dropped_attributes_count,
            ),
            None => Resource::default(),
        };

        SpanRecord {
            // The enclosing trace id wins, spans may omit theirs.
            trace_id: if self.trace_id.is_empty() {
                trace_id.to_string()
            } else {
                self.trace_id
            },
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            start_time,
            end_time,
            payload: SpanPayload {
                name: self.name,
                kind: self.kind,
                trace_state: self.trace_state,
                status_code: self.status_code,
                status_message: self.status_message,
                attributes: json_attributes(self.attributes),
                events: self
                    .events
                    .into_iter()
                    .map(|event| Event {
                        name: event.name,
                        time: event.timestamp.as_ref().and_then(RawTimestamp::parse),
                        attributes: json_attributes(event.attributes),
                        dropped_attributes_count: event.dropped_attributes_count,
                    })
                    .collect(),
                links: self
                    .links
                    .into_iter()
                    .map(|link| Link {
                        trace_id: link.trace_id,
                        span_id: link.span_id,
                        trace_state: link.trace_state,
                        attributes: json_attributes(link.attributes),
                        dropped_attributes_count: link.dropped_attributes_count,
                    })
                    .collect(),
                resource,
                scope: self.scope.map(|scope| Scope {
                    name: scope.name,
                    version: scope.version,
                    attributes: json_attributes(scope.attributes),
                    dropped_attributes_count: scope.dropped_attributes_count,
                }),
                dropped_attributes_count: self.dropped_attributes_count,
                dropped_events_count: self.dropped_events_count,
                dropped_links_count: self.dropped_links_count,
            },
        }
    }
}

fn json_attributes(attributes: BTreeMap<String, serde_json::Value>) -> Attributes {
    attributes
        .into_iter()
        .map(|(key, value)| (key, json_to_value(value)))
        .collect()
}

fn json_to_value(value: serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(Value::BoolValue(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::IntValue(i)),
            None => n.as_f64().map(Value::DoubleValue),
        },
        serde_json::Value::String(s) => Some(Value::StringValue(s)),
        serde_json::Value::Array(values) => Some(Value::ArrayValue(ArrayValue {
            values: values
                .into_iter()
                .map(|v| AnyValue {
                    value: json_to_value(v),
                })
                .collect(),
        })),
        serde_json::Value::Object(object) => Some(Value::KvlistValue(KeyValueList {
            values: object
                .into_iter()
                .map(|(key, v)| KeyValue {
                    key,
                    value: Some(AnyValue {
                        value: json_to_value(v),
                    }),
                })
                .collect(),
        })),
    }
}

use std::collections::BTreeMap;

use opentelemetry_proto::tonic::common::v1::any_value::Value;

/// Nanoseconds since the Unix epoch.
/// Kept as an integer everywhere, `f64` can't represent current timestamps exactly.
pub type UnixNanos = u64;

pub const NANOS_PER_MICROSECOND: i128 = 1_000;
pub const NANOS_PER_MILLISECOND: i128 = 1_000_000;
pub const NANOS_PER_SECOND: i128 = 1_000_000_000;

pub type Attributes = BTreeMap<String, Option<Value>>;

pub fn time_point_to_utc_string(time: UnixNanos) -> String {
    let Ok(nanos) = i64::try_from(time) else {
        return format!("{time}ns");
    };
    let date_time = chrono::DateTime::from_timestamp_nanos(nanos);
    date_time.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a timestamp given either as integer nanoseconds (`"1700000000123456789"`) or as an
/// RFC 3339 string with an optional fractional part (`"2023-11-14T22:13:20.123456789Z"`).
/// Returns `None` for anything that can't be represented as nanoseconds since the epoch.
pub fn parse_timestamp(text: &str) -> Option<UnixNanos> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse::<UnixNanos>().ok();
    }
    let date_time = chrono::DateTime::parse_from_rfc3339(text).ok()?;
    let nanos = date_time.timestamp_nanos_opt()?;
    UnixNanos::try_from(nanos).ok()
}

/// A single span as handed over by the ingestion side.
/// Only the ids and the timestamps matter for reconstruction, `payload` is passed through.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub trace_id: String,
    pub span_id: String,
    /// Empty for root spans.
    pub parent_span_id: String,
    /// `None` when the source timestamp was missing or malformed.
    pub start_time: Option<UnixNanos>,
    pub end_time: Option<UnixNanos>,
    pub payload: SpanPayload,
}

impl SpanRecord {
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        parent_span_id: impl Into<String>,
        start_time: Option<UnixNanos>,
        end_time: Option<UnixNanos>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: parent_span_id.into(),
            start_time,
            end_time,
            payload: SpanPayload::default(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_empty()
    }

    /// Signed so that spans ending before they start are visible as such.
    pub fn duration_nanos(&self) -> Option<i128> {
        Some(i128::from(self.end_time?) - i128::from(self.start_time?))
    }

    pub fn service_name(&self) -> &str {
        self.payload.resource.name.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanPayload {
    pub name: String,
    pub kind: String,
    pub trace_state: String,
    pub status_code: String,
    pub status_message: String,
    pub attributes: Attributes,
    pub events: Vec<Event>,
    pub links: Vec<Link>,
    pub resource: Resource,
    pub scope: Option<Scope>,
    pub dropped_attributes_count: u32,
    pub dropped_events_count: u32,
    pub dropped_links_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub time: Option<UnixNanos>,
    pub attributes: Attributes,
    pub dropped_attributes_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub trace_id: String,
    pub span_id: String,
    pub trace_state: String,
    pub attributes: Attributes,
    pub dropped_attributes_count: u32,
}

/// The entity that produced the span, named after its `service.name` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub attributes: Attributes,
    pub dropped_attributes_count: u32,
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            name: UNKNOWN_SERVICE.to_string(),
            attributes: BTreeMap::new(),
            dropped_attributes_count: 0,
        }
    }
}

pub const UNKNOWN_SERVICE: &str = "unknown";

impl Resource {
    pub fn from_attributes(attributes: Attributes, dropped_attributes_count: u32) -> Self {
        let name = match attributes.get("service.name") {
            Some(Some(Value::StringValue(service_name))) => service_name.clone(),
            _ => UNKNOWN_SERVICE.to_string(),
        };
        Self {
            name,
            attributes,
            dropped_attributes_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub name: String,
    pub version: String,
    pub attributes: Attributes,
    pub dropped_attributes_count: u32,
}

/// Renders an attribute value for display. Nested strings are quoted so that list and map
/// entries stay distinguishable, an unset value renders as `null`.
pub fn value_to_text(value: &Option<Value>) -> String {
    let mut text = String::new();
    write_value(&mut text, value.as_ref(), false);
    text
}

fn write_value(out: &mut String, value: Option<&Value>, nested: bool) {
    let Some(value) = value else {
        out.push_str("null");
        return;
    };

    match value {
        Value::StringValue(s) if nested => out.push_str(&format!("{s:?}")),
        Value::StringValue(s) => out.push_str(s),
        Value::BoolValue(b) => out.push_str(&b.to_string()),
        Value::IntValue(i) => out.push_str(&i.to_string()),
        Value::DoubleValue(d) => out.push_str(&d.to_string()),
        Value::BytesValue(bytes) => out.push_str(&hex::encode(bytes)),
        Value::ArrayValue(array) => {
            out.push('[');
            for (index, item) in array.values.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_value(out, item.value.as_ref(), true);
            }
            out.push(']');
        }
        Value::KvlistValue(list) => {
            out.push('{');
            for (index, entry) in list.values.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(&entry.key);
                out.push_str(": ");
                write_value(out, entry.value.as_ref().and_then(|v| v.value.as_ref()), true);
            }
            out.push('}');
        }
    }
}

fn optional_time_to_string(time: Option<UnixNanos>) -> String {
    match time {
        Some(time) => time_point_to_utc_string(time),
        None => "unknown".to_string(),
    }
}

/// Human readable dump of a span, used for the detail view.
pub fn stringify_span(span: &SpanRecord) -> String {
    let payload = &span.payload;
    let mut s = format!(
        "Span {{\n name: {}\n kind: {}\n span_id: {}\n trace_id: {}\n parent_span_id: {}\n start_time: {}\n end_time: {}\n status: {} {}\n attributes: {}\n",
        payload.name,
        payload.kind,
        span.span_id,
        span.trace_id,
        span.parent_span_id,
        optional_time_to_string(span.start_time),
        optional_time_to_string(span.end_time),
        payload.status_code,
        payload.status_message,
        stringify_attributes(&payload.attributes),
    );

    s.push_str(" events: [");
    for event in &payload.events {
        s.push_str(&format!(
            "\n  event {} {}\n attributes: {}",
            event.name,
            optional_time_to_string(event.time),
            stringify_attributes(&event.attributes),
        ));
    }
    s.push_str("],\n");

    s.push_str(" links: [");
    for link in &payload.links {
        s.push_str(&format!(
            "\n  link {}/{}\n attributes: {}",
            link.trace_id,
            link.span_id,
            stringify_attributes(&link.attributes),
        ));
    }
    s.push_str("],\n");

    s.push_str(&format!(
        " resource: Resource {{\n  name: {}\n  attributes: {}\n }},\n",
        payload.resource.name,
        stringify_attributes(&payload.resource.attributes),
    ));
    s.push_str(&format!(
        " scope: {:?},\n",
        payload.scope.as_ref().map(|scope| {
            format!(
                "Scope {{\n  name: {}\n  version: {}\n  attributes: {}\n }}",
                scope.name,
                scope.version,
                stringify_attributes(&scope.attributes),
            )
        })
    ));
    s.push('}');

    s
}

pub fn stringify_attributes(attributes: &Attributes) -> String {
    let mut s = "{".to_string();
    for (key, value) in attributes {
        s.push_str(&format!("\n {} = {},", key, value_to_text(value)));
    }
    s.push('}');
    s
}

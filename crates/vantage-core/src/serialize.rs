//! Serialization engine.
//!
//! Converts the report object graph to and from a JSON-representable
//! nested structure. Results travel as `[tag, data]` pairs dispatched
//! through the [`ResultRegistry`](crate::registry::ResultRegistry);
//! external attributes are elided from the main document and handled by
//! the side channel.
//!
//! Reading is version-gated: the document header names the format
//! version (headerless documents are version 0), and a [`ReadContext`]
//! threads that version explicitly through every decode call. A result
//! that fails to decode is replaced by a placeholder carrying the error
//! summary; the rest of the document loads normally.

use chrono::NaiveDateTime;
use serde_json::{Map, Value, json};

use crate::config::FORMAT_VERSION;
use crate::error::{Result, VantageError};
use crate::model::{Block, Link, Report, Section};
use crate::registry::ResultRegistry;
use crate::result::{
    ChartResult, ImageResult, PlotResult, ReportResult, StaticResult, TableResult, TextResult,
};
use crate::status::Status;
use crate::table::Table;
use crate::text::slugify;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_FORMAT_OLD: &str = "%Y-%m-%d %H:%M:%S";

/// Per-read deserialization state. One context is created at the start
/// of each top-level read and passed by reference all the way down;
/// nothing version-related is ever stored globally.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext {
    pub version: u32,
}

pub(crate) fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT_OLD))
        .map_err(|err| VantageError::CorruptDocument(format!("bad timestamp {raw:?}: {err}")))
}

/// serde adapter for the stored timestamp string format.
pub(crate) mod timefmt {
    use chrono::NaiveDateTime;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        timestamp: &NaiveDateTime,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(*timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(D::Error::custom)
    }
}

// --- write path ---------------------------------------------------------

/// Serialize a full document: `[{"version": N}, report]`, pretty-printed
/// with sorted keys.
pub fn encode_document(report: &Report, registry: &ResultRegistry) -> Result<Vec<u8>> {
    let doc = Value::Array(vec![
        json!({"version": FORMAT_VERSION}),
        encode_report(report, registry)?,
    ]);
    Ok(serde_json::to_vec_pretty(&doc)?)
}

pub fn encode_report(report: &Report, registry: &ResultRegistry) -> Result<Value> {
    let mut map = Map::new();
    map.insert("title".to_string(), json!(report.title));
    map.insert("runid".to_string(), json!(report.run_id));
    map.insert("runtitle".to_string(), json!(report.run_title));
    map.insert(
        "timestamp".to_string(),
        json!(format_timestamp(report.timestamp)),
    );
    map.insert(
        "sections".to_string(),
        Value::Array(
            report
                .sections
                .iter()
                .map(|section| encode_section(section, registry))
                .collect::<Result<Vec<Value>>>()?,
        ),
    );
    Ok(Value::Object(map))
}

fn encode_section(section: &Section, registry: &ResultRegistry) -> Result<Value> {
    let mut map = Map::new();
    map.insert("title".to_string(), json!(section.title));
    map.insert("description".to_string(), json!(section.description));
    map.insert(
        "blocks".to_string(),
        Value::Array(
            section
                .blocks
                .iter()
                .map(|block| encode_block(block, registry))
                .collect::<Result<Vec<Value>>>()?,
        ),
    );
    Ok(Value::Object(map))
}

fn encode_block(block: &Block, registry: &ResultRegistry) -> Result<Value> {
    let mut map = Map::new();
    map.insert("title".to_string(), json!(block.title));
    map.insert("status".to_string(), json!(block.status.code()));
    map.insert("tags".to_string(), json!(block.tags));
    map.insert("description".to_string(), json!(block.description));
    map.insert("emphasize".to_string(), json!(block.emphasize));
    map.insert(
        "link".to_string(),
        match &block.link {
            Some(link) => json!({
                "endpoint_id": link.endpoint_id,
                "path": link.path,
                "text": link.text,
            }),
            None => Value::Null,
        },
    );
    map.insert(
        "results".to_string(),
        Value::Array(
            block
                .results
                .iter()
                .map(|result| encode_tagged(result, registry))
                .collect::<Result<Vec<Value>>>()?,
        ),
    );
    Ok(Value::Object(map))
}

fn encode_tagged(result: &ReportResult, registry: &ResultRegistry) -> Result<Value> {
    let tag = result.tag();
    let codec = registry
        .codec(tag)
        .ok_or_else(|| VantageError::UnknownTag(tag.to_string()))?;
    let data = (codec.encode)(result)
        .ok_or_else(|| VantageError::Internal(format!("codec mismatch for tag {tag}")))?;
    Ok(Value::Array(vec![json!(tag), Value::Object(data)]))
}

// --- per-variant codecs -------------------------------------------------

pub(crate) fn encode_text(result: &ReportResult) -> Option<Map<String, Value>> {
    let ReportResult::Text(r) = result else {
        return None;
    };
    let mut map = Map::new();
    map.insert("title".to_string(), json!(r.title));
    map.insert("status".to_string(), json!(r.status.code()));
    map.insert("message".to_string(), json!(r.message));
    Some(map)
}

pub(crate) fn decode_text(map: &Map<String, Value>, _ctx: &ReadContext) -> Result<ReportResult> {
    Ok(ReportResult::Text(TextResult {
        title: require_str(map, "title")?,
        status: status_field(map, "status")?,
        message: opt_str(map, "message"),
    }))
}

pub(crate) fn encode_table(result: &ReportResult) -> Option<Map<String, Value>> {
    let ReportResult::Table(r) = result else {
        return None;
    };
    let mut map = Map::new();
    map.insert("title".to_string(), json!(r.title));
    // external attributes travel in the side channel
    map.insert("data".to_string(), Value::Null);
    map.insert("statustable".to_string(), Value::Null);
    map.insert("status".to_string(), json!(r.status.code()));
    map.insert("format".to_string(), json!(r.format));
    map.insert("allow_data_export".to_string(), json!(r.allow_data_export));
    map.insert("features".to_string(), json!(r.features));
    map.insert("_external".to_string(), json!(r.external_key));
    Some(map)
}

pub(crate) fn decode_table(map: &Map<String, Value>, ctx: &ReadContext) -> Result<ReportResult> {
    Ok(ReportResult::Table(TableResult {
        title: require_str(map, "title")?,
        data: opt_table_field(map, "data", ctx)?,
        status_table: opt_table_field(map, "statustable", ctx)?,
        status: status_field(map, "status")?,
        format: opt_str(map, "format"),
        allow_data_export: bool_field(map, "allow_data_export"),
        features: opt_str(map, "features").unwrap_or_else(|| "all".to_string()),
        external_key: opt_str(map, "_external"),
    }))
}

pub(crate) fn encode_image(result: &ReportResult) -> Option<Map<String, Value>> {
    let ReportResult::Image(r) = result else {
        return None;
    };
    let mut map = Map::new();
    map.insert("title".to_string(), json!(r.title));
    map.insert("filename".to_string(), json!(r.filename));
    if let Some(file) = &r.legacy_file {
        map.insert("file".to_string(), json!(file));
    }
    map.insert("data".to_string(), Value::Null);
    map.insert("_external".to_string(), json!(r.external_key));
    Some(map)
}

pub(crate) fn decode_image(map: &Map<String, Value>, ctx: &ReadContext) -> Result<ReportResult> {
    // pre-v3 documents reference a raw resource file instead of bytes
    if ctx.version < 3 {
        return Ok(ReportResult::Image(ImageResult {
            title: opt_str(map, "title"),
            filename: None,
            data: None,
            legacy_file: opt_str(map, "file"),
            external_key: None,
        }));
    }
    Ok(ReportResult::Image(ImageResult {
        title: opt_str(map, "title"),
        filename: opt_str(map, "filename"),
        data: None,
        legacy_file: opt_str(map, "file"),
        external_key: opt_str(map, "_external"),
    }))
}

pub(crate) fn encode_plot(result: &ReportResult) -> Option<Map<String, Value>> {
    let ReportResult::Plot(r) = result else {
        return None;
    };
    let mut map = Map::new();
    map.insert("title".to_string(), json!(r.title));
    map.insert("data".to_string(), Value::Null);
    map.insert("allow_data_export".to_string(), json!(r.allow_data_export));
    map.insert("_external".to_string(), json!(r.external_key));
    Some(map)
}

pub(crate) fn decode_plot(map: &Map<String, Value>, ctx: &ReadContext) -> Result<ReportResult> {
    Ok(ReportResult::Plot(PlotResult {
        title: require_str(map, "title")?,
        data: opt_table_field(map, "data", ctx)?,
        allow_data_export: bool_field(map, "allow_data_export"),
        external_key: opt_str(map, "_external"),
    }))
}

pub(crate) fn encode_chart(result: &ReportResult) -> Option<Map<String, Value>> {
    let ReportResult::Chart(r) = result else {
        return None;
    };
    let mut map = Map::new();
    map.insert("spec".to_string(), json!(r.spec));
    map.insert("height".to_string(), json!(r.height));
    Some(map)
}

pub(crate) fn decode_chart(map: &Map<String, Value>, _ctx: &ReadContext) -> Result<ReportResult> {
    Ok(ReportResult::Chart(ChartResult {
        spec: require_str(map, "spec")?,
        height: map.get("height").and_then(Value::as_u64).map(|h| h as u32),
    }))
}

pub(crate) fn encode_static(result: &ReportResult) -> Option<Map<String, Value>> {
    let ReportResult::Static(r) = result else {
        return None;
    };
    let mut map = Map::new();
    map.insert("title".to_string(), json!(r.title));
    map.insert("content".to_string(), json!(r.content));
    map.insert("status".to_string(), json!(r.status.code()));
    Some(map)
}

pub(crate) fn decode_static(map: &Map<String, Value>, _ctx: &ReadContext) -> Result<ReportResult> {
    Ok(ReportResult::Static(StaticResult {
        title: require_str(map, "title")?,
        content: require_str(map, "content")?,
        status: status_field(map, "status")?,
    }))
}

// --- read path ----------------------------------------------------------

/// Parse a full document, detecting the format version from the header.
/// Headerless documents (the oldest layout) are version 0.
pub fn decode_document(bytes: &[u8], registry: &ResultRegistry) -> Result<(Report, u32)> {
    let parsed: Value = serde_json::from_slice(bytes)?;
    let (version, data) = match &parsed {
        Value::Array(items) if items.len() == 2 => {
            let version = items[0]
                .get("version")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    VantageError::CorruptDocument("document header has no version".to_string())
                })? as u32;
            (version, &items[1])
        }
        Value::Object(_) => (0, &parsed),
        _ => {
            return Err(VantageError::CorruptDocument(
                "document is neither header+data nor a bare mapping".to_string(),
            ));
        }
    };
    let ctx = ReadContext { version };
    let report = decode_report(data, &ctx, registry)?;
    Ok((report, version))
}

pub fn decode_report(value: &Value, ctx: &ReadContext, registry: &ResultRegistry) -> Result<Report> {
    let map = value.as_object().ok_or_else(|| {
        VantageError::CorruptDocument("report data is not a mapping".to_string())
    })?;
    let title = opt_str(map, "title").unwrap_or_default();
    let timestamp = match map.get("timestamp").and_then(Value::as_str) {
        Some(raw) => parse_timestamp(raw)?,
        None => chrono::Local::now().naive_local(),
    };
    let run_id = opt_str(map, "runid")
        .unwrap_or_else(|| timestamp.format(crate::model::RUN_ID_FORMAT).to_string());
    let run_title = opt_str(map, "runtitle").unwrap_or_else(|| run_id.clone());

    let sections = map
        .get("sections")
        .and_then(Value::as_array)
        .map(|sections| {
            sections
                .iter()
                .map(|section| decode_section(section, ctx, registry))
                .collect::<Result<Vec<Section>>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(Report {
        id: slugify(&title),
        title,
        run_id,
        run_title,
        timestamp,
        sections,
    })
}

fn decode_section(value: &Value, ctx: &ReadContext, registry: &ResultRegistry) -> Result<Section> {
    let map = value.as_object().ok_or_else(|| {
        VantageError::CorruptDocument("section is not a mapping".to_string())
    })?;
    let blocks = map
        .get("blocks")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .map(|block| decode_block(block, ctx, registry))
                .collect::<Result<Vec<Block>>>()
        })
        .transpose()?
        .unwrap_or_default();
    Ok(Section {
        title: opt_str(map, "title").unwrap_or_default(),
        description: opt_str(map, "description").unwrap_or_default(),
        blocks,
        addr: None,
    })
}

fn decode_block(value: &Value, ctx: &ReadContext, registry: &ResultRegistry) -> Result<Block> {
    let map = value.as_object().ok_or_else(|| {
        VantageError::CorruptDocument("block is not a mapping".to_string())
    })?;

    let results: Vec<ReportResult> = map
        .get("results")
        .and_then(Value::as_array)
        .map(|results| results.iter().map(|r| decode_tagged(r, ctx, registry)).collect())
        .unwrap_or_default();

    let status = match map.get("status") {
        Some(Value::Null) | None => crate::status::status_max(
            results.iter().map(ReportResult::status),
        )
        .unwrap_or_default(),
        Some(_) => status_field(map, "status")?,
    };

    let tags = map
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let link = map.get("link").and_then(Value::as_object).map(|link| Link {
        endpoint_id: opt_str(link, "endpoint_id").unwrap_or_default(),
        path: opt_str(link, "path").unwrap_or_default(),
        text: opt_str(link, "text").unwrap_or_default(),
    });

    Ok(Block {
        title: opt_str(map, "title").unwrap_or_default(),
        results,
        status,
        tags,
        description: opt_str(map, "description"),
        emphasize: bool_field(map, "emphasize"),
        link,
        addr: None,
    })
}

fn decode_tagged(value: &Value, ctx: &ReadContext, registry: &ResultRegistry) -> ReportResult {
    let Some(pair) = value.as_array().filter(|pair| pair.len() == 2) else {
        return registry.decode_tagged("<untagged>", value, ctx);
    };
    let tag = pair[0].as_str().unwrap_or("<untagged>");
    registry.decode_tagged(tag, &pair[1], ctx)
}

// --- field helpers ------------------------------------------------------

fn opt_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn require_str(map: &Map<String, Value>, key: &str) -> Result<String> {
    opt_str(map, key)
        .ok_or_else(|| VantageError::CorruptDocument(format!("missing field {key:?}")))
}

fn bool_field(map: &Map<String, Value>, key: &str) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn status_field(map: &Map<String, Value>, key: &str) -> Result<Status> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(Status::Neutral),
        Some(value) => {
            let code = value.as_i64().ok_or_else(|| {
                VantageError::InvalidStatus(value.to_string())
            })?;
            Status::from_code(code)
        }
    }
}

fn opt_table_field(
    map: &Map<String, Value>,
    key: &str,
    ctx: &ReadContext,
) -> Result<Option<Table>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Table::decode(value, ctx.version).map(Some),
    }
}

//! Result tag registry.
//!
//! Serialized results travel as `[tag, data]` pairs; the registry maps a
//! tag to the codec for that variant. Registration is an explicit call,
//! never a side effect of defining a type. Unknown tags degrade to a
//! placeholder text result so one unrecognized variant never aborts a
//! whole document load.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::result::{ReportResult, TextResult};
use crate::serialize::{self, ReadContext};
use crate::status::Status;

pub type EncodeFn = fn(&ReportResult) -> Option<Map<String, Value>>;
pub type DecodeFn = fn(&Map<String, Value>, &ReadContext) -> Result<ReportResult>;

/// Codec for one result variant: which attributes are external, plus the
/// serializer/deserializer pair.
#[derive(Debug, Clone)]
pub struct VariantCodec {
    pub externals: &'static [&'static str],
    pub encode: EncodeFn,
    pub decode: DecodeFn,
}

#[derive(Debug, Clone)]
pub struct ResultRegistry {
    codecs: BTreeMap<String, VariantCodec>,
}

impl ResultRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    /// Registry with the six built-in variants registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "TextResult",
            VariantCodec {
                externals: &[],
                encode: serialize::encode_text,
                decode: serialize::decode_text,
            },
        );
        registry.register(
            "TableResult",
            VariantCodec {
                externals: &["data", "statustable"],
                encode: serialize::encode_table,
                decode: serialize::decode_table,
            },
        );
        registry.register(
            "ImageResult",
            VariantCodec {
                externals: &["data"],
                encode: serialize::encode_image,
                decode: serialize::decode_image,
            },
        );
        registry.register(
            "PlotResult",
            VariantCodec {
                externals: &["data"],
                encode: serialize::encode_plot,
                decode: serialize::decode_plot,
            },
        );
        registry.register(
            "ChartResult",
            VariantCodec {
                externals: &[],
                encode: serialize::encode_chart,
                decode: serialize::decode_chart,
            },
        );
        registry.register(
            "StaticResult",
            VariantCodec {
                externals: &[],
                encode: serialize::encode_static,
                decode: serialize::decode_static,
            },
        );
        registry
    }

    /// Register a variant under a tag. Re-registering a tag replaces the
    /// previous codec.
    pub fn register(&mut self, tag: impl Into<String>, codec: VariantCodec) {
        self.codecs.insert(tag.into(), codec);
    }

    #[must_use]
    pub fn codec(&self, tag: &str) -> Option<&VariantCodec> {
        self.codecs.get(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }

    /// Decode a `[tag, data]` pair. Unknown tags and per-variant decode
    /// failures both produce a placeholder text result; the error never
    /// propagates past the failing entity.
    pub(crate) fn decode_tagged(&self, tag: &str, data: &Value, ctx: &ReadContext) -> ReportResult {
        let Some(codec) = self.codec(tag) else {
            let message = format!("Unknown result type {tag}. A result plugin may be missing.");
            warn!(tag, "unknown result tag during deserialization");
            return ReportResult::Text(TextResult::new(
                "Unknown result type",
                Some(Status::Neutral),
                Some(message),
            ));
        };
        let Some(map) = data.as_object() else {
            return decode_failure_placeholder(tag, "result data is not a mapping");
        };
        match (codec.decode)(map, ctx) {
            Ok(result) => result,
            Err(err) => decode_failure_placeholder(tag, &err.to_string()),
        }
    }
}

impl Default for ResultRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn decode_failure_placeholder(tag: &str, detail: &str) -> ReportResult {
    warn!(tag, detail, "error reading result");
    ReportResult::Text(TextResult::new(
        format!("Error reading {tag}"),
        Some(Status::Bad),
        Some(detail.to_string()),
    ))
}

//! Result variants: the polymorphic leaves of a report.
//!
//! Each variant declares which of its attributes are external: too large
//! or binary to inline in the main document. External attributes are
//! elided at write time and stored in the consolidated side-channel blob,
//! addressed by a generated or caller-supplied key.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::externals::ExternalValue;
use crate::key::join_key;
use crate::status::{Status, combine_status, table_status};
use crate::store::KeyValueStore;
use crate::table::Table;

/// Textual result with an optional expandable message.
#[derive(Debug, Clone, PartialEq)]
pub struct TextResult {
    pub title: String,
    pub status: Status,
    pub message: Option<String>,
}

impl TextResult {
    pub fn new(title: impl Into<String>, status: Option<Status>, message: Option<String>) -> Self {
        Self {
            title: title.into(),
            status: status.unwrap_or_default(),
            message,
        }
    }
}

/// Tabular result. The status table mirrors the data table's shape and
/// carries one status value per cell; the scalar status is its maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct TableResult {
    pub title: String,
    pub data: Option<Table>,
    pub status_table: Option<Table>,
    pub status: Status,
    pub format: Option<String>,
    pub allow_data_export: bool,
    pub features: String,
    pub external_key: Option<String>,
}

impl TableResult {
    /// Build a tabular result. `status_overlays` are partial status
    /// tables overlaid onto the data shape; overlapping cells take the
    /// worst value.
    pub fn new(
        title: impl Into<String>,
        data: Option<Table>,
        status_overlays: &[Table],
    ) -> Result<Self> {
        let status_table = match &data {
            Some(reference) => Some(combine_status(reference, status_overlays)?),
            None => None,
        };
        let status = match &status_table {
            Some(table) => table_status(table, None)?.unwrap_or_default(),
            None => Status::Neutral,
        };
        Ok(Self {
            title: title.into(),
            data,
            status_table,
            status,
            format: None,
            allow_data_export: false,
            features: "all".to_string(),
            external_key: None,
        })
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: impl Into<String>) -> Self {
        self.features = features.into();
        self
    }

    #[must_use]
    pub fn allow_data_export(mut self) -> Self {
        self.allow_data_export = true;
        self
    }
}

/// Image result holding the raw encoded image bytes.
///
/// Documents older than format version 3 reference a raw file under the
/// run's `resources/` prefix instead of carrying bytes; `legacy_file`
/// preserves that reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
    pub title: Option<String>,
    pub filename: Option<String>,
    pub data: Option<Vec<u8>>,
    pub legacy_file: Option<String>,
    pub external_key: Option<String>,
}

impl ImageResult {
    pub fn from_bytes(
        title: Option<String>,
        filename: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            title,
            filename: Some(crate::text::slugify(&filename.into())),
            data: Some(data),
            legacy_file: None,
            external_key: None,
        }
    }

    /// Fetch the image bytes, following the legacy resource-file path
    /// for pre-v3 documents.
    pub fn open(
        &self,
        store: &dyn KeyValueStore,
        report_id: &str,
        run_id: &str,
    ) -> Result<Vec<u8>> {
        if let Some(file) = &self.legacy_file {
            let key = join_key([report_id, run_id, "resources", file]);
            return store.get(&key);
        }
        match &self.data {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(crate::error::VantageError::NotFound(format!(
                "image data not loaded for {report_id}/{run_id}"
            ))),
        }
    }
}

/// Line-plot result; each data column is rendered as one line.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotResult {
    pub title: String,
    pub data: Option<Table>,
    pub allow_data_export: bool,
    pub external_key: Option<String>,
}

impl PlotResult {
    pub fn new(title: impl Into<String>, data: Table) -> Self {
        Self {
            title: title.into(),
            data: Some(data),
            allow_data_export: false,
            external_key: None,
        }
    }

    #[must_use]
    pub fn allow_data_export(mut self) -> Self {
        self.allow_data_export = true;
        self
    }
}

/// Pre-built chart specification rendered client-side.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartResult {
    pub spec: String,
    pub height: Option<u32>,
}

impl ChartResult {
    pub fn new(spec: impl Into<String>, height: Option<u32>) -> Self {
        Self {
            spec: spec.into(),
            height,
        }
    }
}

/// Pre-rendered content included verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticResult {
    pub title: String,
    pub content: String,
    pub status: Status,
}

impl StaticResult {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        status: Option<Status>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            status: status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportResult {
    Text(TextResult),
    Table(TableResult),
    Image(ImageResult),
    Plot(PlotResult),
    Chart(ChartResult),
    Static(StaticResult),
}

impl ReportResult {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Text(_) => "TextResult",
            Self::Table(_) => "TableResult",
            Self::Image(_) => "ImageResult",
            Self::Plot(_) => "PlotResult",
            Self::Chart(_) => "ChartResult",
            Self::Static(_) => "StaticResult",
        }
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Text(r) => Some(&r.title),
            Self::Table(r) => Some(&r.title),
            Self::Image(r) => r.title.as_deref(),
            Self::Plot(r) => Some(&r.title),
            Self::Chart(_) => None,
            Self::Static(r) => Some(&r.title),
        }
    }

    /// Status of this result; variants without one are neutral.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Text(r) => r.status,
            Self::Table(r) => r.status,
            Self::Static(r) => r.status,
            Self::Image(_) | Self::Plot(_) | Self::Chart(_) => Status::Neutral,
        }
    }

    #[must_use]
    pub fn external_key(&self) -> Option<&str> {
        match self {
            Self::Table(r) => r.external_key.as_deref(),
            Self::Image(r) => r.external_key.as_deref(),
            Self::Plot(r) => r.external_key.as_deref(),
            _ => None,
        }
    }

    /// Set an explicit side-channel key, e.g. for cross-report sharing.
    pub fn set_external_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        match self {
            Self::Table(r) => r.external_key = Some(key),
            Self::Image(r) => r.external_key = Some(key),
            Self::Plot(r) => r.external_key = Some(key),
            _ => {}
        }
    }

    /// Current values of this variant's external attributes. Empty when
    /// the variant declares none or all of them are unset.
    #[must_use]
    pub(crate) fn external_values(&self) -> BTreeMap<String, ExternalValue> {
        let mut out = BTreeMap::new();
        match self {
            Self::Table(r) => {
                if let Some(table) = &r.data {
                    out.insert("data".to_string(), ExternalValue::Table(table.clone()));
                }
                if let Some(table) = &r.status_table {
                    out.insert(
                        "statustable".to_string(),
                        ExternalValue::Table(table.clone()),
                    );
                }
            }
            Self::Image(r) => {
                if let Some(bytes) = &r.data {
                    out.insert("data".to_string(), ExternalValue::Bytes(bytes.clone()));
                }
            }
            Self::Plot(r) => {
                if let Some(table) = &r.data {
                    out.insert("data".to_string(), ExternalValue::Table(table.clone()));
                }
            }
            _ => {}
        }
        out
    }

    /// Generate a side-channel key if this result carries external data
    /// and none was supplied. Returns the key in use, if any.
    pub(crate) fn ensure_external_key(&mut self) -> Option<String> {
        if self.external_values().is_empty() {
            return self.external_key().map(str::to_string);
        }
        if self.external_key().is_none() {
            let generated = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
            self.set_external_key(generated);
        }
        self.external_key().map(str::to_string)
    }

    /// Re-attach external attribute values loaded from the side channel.
    pub(crate) fn attach_externals(&mut self, values: &BTreeMap<String, ExternalValue>) {
        match self {
            Self::Table(r) => {
                if let Some(ExternalValue::Table(table)) = values.get("data") {
                    r.data = Some(table.clone());
                }
                if let Some(ExternalValue::Table(table)) = values.get("statustable") {
                    r.status_table = Some(table.clone());
                }
            }
            Self::Image(r) => {
                // pre-v3 images read from the resources prefix instead
                if r.legacy_file.is_some() {
                    return;
                }
                if let Some(ExternalValue::Bytes(bytes)) = values.get("data") {
                    r.data = Some(bytes.clone());
                }
            }
            Self::Plot(r) => {
                if let Some(ExternalValue::Table(table)) = values.get("data") {
                    r.data = Some(table.clone());
                }
            }
            _ => {}
        }
    }
}

impl From<TextResult> for ReportResult {
    fn from(value: TextResult) -> Self {
        Self::Text(value)
    }
}

impl From<TableResult> for ReportResult {
    fn from(value: TableResult) -> Self {
        Self::Table(value)
    }
}

impl From<ImageResult> for ReportResult {
    fn from(value: ImageResult) -> Self {
        Self::Image(value)
    }
}

impl From<PlotResult> for ReportResult {
    fn from(value: PlotResult) -> Self {
        Self::Plot(value)
    }
}

impl From<ChartResult> for ReportResult {
    fn from(value: ChartResult) -> Self {
        Self::Chart(value)
    }
}

impl From<StaticResult> for ReportResult {
    fn from(value: StaticResult) -> Self {
        Self::Static(value)
    }
}

//! Tabular payloads.
//!
//! A [`Table`] is a label-addressed grid: row labels (`index`), column
//! labels (`columns`) and row-major cells. Labels may be scalars or lists
//! (multi-level indices from old documents). Cells are a closed value
//! type so the externals blob can use a non-self-describing binary codec.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Result, VantageError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Cell>),
}

impl Cell {
    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Cell::Int(i)
                } else {
                    Cell::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Cell::Text(s.clone()),
            Value::Array(items) => Cell::List(items.iter().map(Cell::from_json).collect()),
            Value::Object(_) => Cell::Text(value.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => json!(i),
            Cell::Float(f) => json!(f),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::List(items) => Value::Array(items.iter().map(Cell::to_json).collect()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Cell>,
    index: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<Cell>, index: Vec<Cell>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        if rows.len() != index.len() {
            return Err(VantageError::Validation(format!(
                "table has {} rows but {} index labels",
                rows.len(),
                index.len()
            )));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(VantageError::Validation(format!(
                    "table row {} has {} cells but {} columns",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self {
            columns,
            index,
            rows,
        })
    }

    /// Build a table from column names and row-major cells, with a
    /// default integer index.
    pub fn from_rows(columns: &[&str], rows: Vec<Vec<Cell>>) -> Result<Self> {
        let index = (0..rows.len() as i64).map(Cell::Int).collect();
        Self::new(columns.iter().map(|c| Cell::from(*c)).collect(), index, rows)
    }

    #[must_use]
    pub fn columns(&self) -> &[Cell] {
        &self.columns
    }

    #[must_use]
    pub fn index(&self) -> &[Cell] {
        &self.index
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flatten()
    }

    #[must_use]
    pub fn get(&self, row: &Cell, column: &Cell) -> Option<&Cell> {
        let r = self.index.iter().position(|label| label == row)?;
        let c = self.columns.iter().position(|label| label == column)?;
        self.rows.get(r)?.get(c)
    }

    pub(crate) fn set(&mut self, row: &Cell, column: &Cell, value: Cell) -> bool {
        let Some(r) = self.index.iter().position(|label| label == row) else {
            return false;
        };
        let Some(c) = self.columns.iter().position(|label| label == column) else {
            return false;
        };
        self.rows[r][c] = value;
        true
    }

    /// Encode in the split orientation used by the current format:
    /// `{"columns": [...], "index": [...], "data": [[...], ...]}`.
    #[must_use]
    pub fn encode_split(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "columns".to_string(),
            Value::Array(self.columns.iter().map(Cell::to_json).collect()),
        );
        map.insert(
            "index".to_string(),
            Value::Array(self.index.iter().map(Cell::to_json).collect()),
        );
        map.insert(
            "data".to_string(),
            Value::Array(
                self.rows
                    .iter()
                    .map(|row| Value::Array(row.iter().map(Cell::to_json).collect()))
                    .collect(),
            ),
        );
        Value::Object(map)
    }

    /// Decode tabular data as written by any supported format version.
    ///
    /// Version 0 stored a raw mapping of column name to `{row_label:
    /// cell}`. Version 1 onwards store explicit `columns`/`index`/`data`
    /// arrays; multi-level labels arrive as nested arrays and are kept
    /// as list labels.
    pub fn decode(value: &Value, version: u32) -> Result<Self> {
        if version == 0 {
            return Self::decode_column_mapping(value);
        }
        Self::decode_split(value)
    }

    fn decode_split(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            VantageError::CorruptDocument("tabular payload is not a mapping".to_string())
        })?;
        let columns = decode_label_array(map.get("columns"), "columns")?;
        let index = decode_label_array(map.get("index"), "index")?;
        let data = map
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| VantageError::CorruptDocument("tabular payload has no data".to_string()))?;
        let rows = data
            .iter()
            .map(|row| {
                row.as_array()
                    .map(|cells| cells.iter().map(Cell::from_json).collect())
                    .ok_or_else(|| {
                        VantageError::CorruptDocument("tabular row is not an array".to_string())
                    })
            })
            .collect::<Result<Vec<Vec<Cell>>>>()?;
        Self::new(columns, index, rows)
    }

    fn decode_column_mapping(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            VantageError::CorruptDocument("tabular payload is not a mapping".to_string())
        })?;

        let columns: Vec<String> = map.keys().cloned().collect();
        let mut index: Vec<String> = Vec::new();
        for col in map.values() {
            let col = col.as_object().ok_or_else(|| {
                VantageError::CorruptDocument("tabular column is not a mapping".to_string())
            })?;
            for label in col.keys() {
                if !index.contains(label) {
                    index.push(label.clone());
                }
            }
        }

        let rows = index
            .iter()
            .map(|label| {
                columns
                    .iter()
                    .map(|col| {
                        map.get(col)
                            .and_then(|c| c.get(label))
                            .map_or(Cell::Null, Cell::from_json)
                    })
                    .collect()
            })
            .collect();

        Self::new(
            columns.iter().map(|c| Cell::Text(c.clone())).collect(),
            index.into_iter().map(Cell::Text).collect(),
            rows,
        )
    }
}

fn decode_label_array(value: Option<&Value>, what: &str) -> Result<Vec<Cell>> {
    value
        .and_then(Value::as_array)
        .map(|labels| labels.iter().map(Cell::from_json).collect())
        .ok_or_else(|| VantageError::CorruptDocument(format!("tabular payload has no {what}")))
}

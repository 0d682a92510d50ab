//! Status values and their aggregation.
//!
//! Every result carries one of four status values; containers reduce
//! their children with `max` (worse wins). Tabular statuses are validated
//! elementwise before reduction, never coerced silently.

use std::fmt::{Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::{Result, VantageError};
use crate::table::{Cell, Table};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    /// The element was not checked, or has no status.
    #[default]
    Neutral,
    /// The element passed the check.
    Good,
    /// Passed, but classified as needing attention.
    Warning,
    /// The element was qualified as bad.
    Bad,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Neutral, Status::Good, Status::Warning, Status::Bad];

    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Neutral => 0,
            Self::Good => 1,
            Self::Warning => 2,
            Self::Bad => 3,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Neutral => "No Status",
            Self::Good => "Good",
            Self::Warning => "Warning",
            Self::Bad => "Bad",
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(Self::Neutral),
            1 => Ok(Self::Good),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Bad),
            other => Err(VantageError::InvalidStatus(other.to_string())),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Status::from_code(code).map_err(D::Error::custom)
    }
}

/// Reduce an iterator of statuses to the worst one. Empty input has no
/// status.
pub fn status_max<I>(statuses: I) -> Option<Status>
where
    I: IntoIterator<Item = Status>,
{
    statuses.into_iter().max()
}

/// Validate one tabular cell as a status value.
///
/// Null cells are acceptable and map to [`Status::Neutral`]. Anything
/// else must be an integer in range; out-of-range or non-integer cells
/// are an error unless a replacement status is supplied, in which case
/// the replacement is used and a warning is logged.
pub fn validate_cell(cell: &Cell, replace_invalid: Option<Status>) -> Result<Status> {
    let parsed = match cell {
        Cell::Null => return Ok(Status::Neutral),
        Cell::Int(code) => Status::from_code(*code),
        other => Err(VantageError::InvalidStatus(format!("{other:?}"))),
    };
    match parsed {
        Ok(status) => Ok(status),
        Err(err) => match replace_invalid {
            Some(replacement) => {
                warn!(cell = ?cell, %replacement, "replacing invalid status value");
                Ok(replacement)
            }
            None => Err(err),
        },
    }
}

/// Elementwise-validate a status table, then reduce to the worst value.
/// An empty table has no status.
pub fn table_status(table: &Table, replace_invalid: Option<Status>) -> Result<Option<Status>> {
    let mut worst: Option<Status> = None;
    for cell in table.cells() {
        let status = validate_cell(cell, replace_invalid)?;
        worst = Some(worst.map_or(status, |w| w.max(status)));
    }
    Ok(worst)
}

/// Overlay partial status tables onto a reference shape.
///
/// Produces a table with the reference's labels, filled with
/// [`Status::Neutral`], then applies each overlay cell whose row and
/// column labels exist in the reference. Where overlays overlap, the
/// worst value wins. Overlay cells are validated first.
pub fn combine_status(reference: &Table, overlays: &[Table]) -> Result<Table> {
    let neutral_rows = vec![vec![Cell::Int(0); reference.n_columns()]; reference.n_rows()];
    let mut combined = Table::new(
        reference.columns().to_vec(),
        reference.index().to_vec(),
        neutral_rows,
    )?;

    for overlay in overlays {
        for (r, row_label) in overlay.index().iter().enumerate() {
            for (c, col_label) in overlay.columns().iter().enumerate() {
                let status = validate_cell(&overlay.rows()[r][c], None)?;
                let current = combined
                    .get(row_label, col_label)
                    .and_then(Cell::as_int)
                    .map_or(Ok(Status::Neutral), Status::from_code)?;
                if combined.get(row_label, col_label).is_some() {
                    let worst = current.max(status);
                    combined.set(row_label, col_label, Cell::Int(i64::from(worst.code())));
                }
            }
        }
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_tracks_severity() {
        assert!(Status::Bad > Status::Warning);
        assert!(Status::Warning > Status::Good);
        assert!(Status::Good > Status::Neutral);
    }

    #[test]
    fn from_code_rejects_out_of_range() {
        assert!(Status::from_code(4).is_err());
        assert!(Status::from_code(-1).is_err());
        assert_eq!(Status::from_code(2).expect("valid"), Status::Warning);
    }

    #[test]
    fn null_cells_are_neutral_never_invalid() {
        assert_eq!(
            validate_cell(&Cell::Null, None).expect("null ok"),
            Status::Neutral
        );
    }

    #[test]
    fn invalid_cell_raises_by_default() {
        let err = validate_cell(&Cell::Int(7), None).expect_err("must fail");
        assert_eq!(err.code(), "INVALID_STATUS");
        let err = validate_cell(&Cell::from("bad"), None).expect_err("must fail");
        assert_eq!(err.code(), "INVALID_STATUS");
    }

    #[test]
    fn invalid_cell_is_replaced_on_request() {
        let status =
            validate_cell(&Cell::Int(9), Some(Status::Warning)).expect("replacement applies");
        assert_eq!(status, Status::Warning);
    }

    #[test]
    fn table_status_takes_elementwise_max() {
        let table = Table::from_rows(
            &["a", "b"],
            vec![
                vec![Cell::Int(1), Cell::Null],
                vec![Cell::Int(2), Cell::Int(1)],
            ],
        )
        .expect("table");
        assert_eq!(
            table_status(&table, None).expect("status"),
            Some(Status::Warning)
        );
    }

    #[test]
    fn empty_table_has_no_status() {
        let table = Table::from_rows(&[], vec![]).expect("table");
        assert_eq!(table_status(&table, None).expect("status"), None);
    }

    #[test]
    fn combine_overlays_partial_tables() {
        let reference = Table::from_rows(
            &["a", "b"],
            vec![
                vec![Cell::Int(10), Cell::Int(20)],
                vec![Cell::Int(30), Cell::Int(40)],
            ],
        )
        .expect("reference");
        // one overlay covering only column "a", row 1
        let overlay = Table::new(
            vec![Cell::from("a")],
            vec![Cell::Int(1)],
            vec![vec![Cell::Int(3)]],
        )
        .expect("overlay");

        let combined = combine_status(&reference, &[overlay]).expect("combine");
        assert_eq!(
            combined.get(&Cell::Int(1), &Cell::from("a")),
            Some(&Cell::Int(3))
        );
        assert_eq!(
            combined.get(&Cell::Int(0), &Cell::from("a")),
            Some(&Cell::Int(0))
        );
    }

    #[test]
    fn overlapping_overlays_take_the_worst_value() {
        let reference =
            Table::from_rows(&["a"], vec![vec![Cell::Int(0)]]).expect("reference");
        let low = Table::new(
            vec![Cell::from("a")],
            vec![Cell::Int(0)],
            vec![vec![Cell::Int(1)]],
        )
        .expect("low");
        let high = Table::new(
            vec![Cell::from("a")],
            vec![Cell::Int(0)],
            vec![vec![Cell::Int(2)]],
        )
        .expect("high");

        let combined = combine_status(&reference, &[high, low]).expect("combine");
        assert_eq!(
            combined.get(&Cell::Int(0), &Cell::from("a")),
            Some(&Cell::Int(2))
        );
    }
}

//! Stamp combination
//!
//! Cell-by-cell arithmetic between a surface and a stamp grid that shares
//! its cell size and snap. The output always has the surface's extent;
//! cells the stamp does not define keep the surface value.

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use terrastamp_core::raster::Raster;
use terrastamp_core::{Error, Result};

/// Arithmetic applied as `surface op stamp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum StampOp {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl FromStr for StampOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADD" | "+" => Ok(StampOp::Add),
            "SUBTRACT" | "SUB" | "-" => Ok(StampOp::Subtract),
            "MULTIPLY" | "MUL" | "*" => Ok(StampOp::Multiply),
            "DIVIDE" | "DIV" | "/" => Ok(StampOp::Divide),
            _ => Err(Error::InvalidPolicy(format!(
                "unknown operation '{}' (expected ADD, SUBTRACT, MULTIPLY or DIVIDE)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for StampOp {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for StampOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StampOp::Add => "ADD",
            StampOp::Subtract => "SUBTRACT",
            StampOp::Multiply => "MULTIPLY",
            StampOp::Divide => "DIVIDE",
        })
    }
}

/// What DIVIDE does when a stamp cell is exactly zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum ZeroDivision {
    /// Abort with `NumericFault`
    #[default]
    Fail,
    /// Write the surface no-data value
    NoData,
    /// Keep the IEEE result (infinity, or NaN for 0/0)
    Infinity,
}

impl FromStr for ZeroDivision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "FAIL" | "ERROR" => Ok(ZeroDivision::Fail),
            "NODATA" | "NO_DATA" => Ok(ZeroDivision::NoData),
            "INFINITY" | "INF" | "IEEE" => Ok(ZeroDivision::Infinity),
            _ => Err(Error::InvalidPolicy(format!("unknown zero-division policy '{}'", s))),
        }
    }
}

impl TryFrom<String> for ZeroDivision {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Combine `stamp` onto `surface`, failing on division by a zero stamp cell.
///
/// See [`combine_with`].
pub fn combine(surface: &Raster<f64>, stamp: &Raster<f64>, op: StampOp) -> Result<Raster<f64>> {
    combine_with(surface, stamp, op, ZeroDivision::Fail)
}

/// Combine `stamp` onto `surface` cell by cell.
///
/// * Cells outside the stamp, or where the stamp is no-data, keep the
///   surface value.
/// * Surface no-data cells stay no-data.
/// * Everything else is `surface op stamp` in plain IEEE arithmetic, except
///   that DIVIDE by an exact zero follows `zero_division`.
///
/// The output copies the surface's shape, transform, CRS and no-data value.
/// The stamp must share the surface's cell size and snap, otherwise this
/// fails with `Misaligned`.
pub fn combine_with(
    surface: &Raster<f64>,
    stamp: &Raster<f64>,
    op: StampOp,
    zero_division: ZeroDivision,
) -> Result<Raster<f64>> {
    let (row_off, col_off) = surface
        .transform()
        .cell_offset_of(stamp.transform())
        .ok_or_else(|| {
            Error::Misaligned(format!(
                "stamp grid {:?} does not share cell size and snap with surface grid {:?}",
                stamp.transform(),
                surface.transform()
            ))
        })?;

    let (rows, cols) = surface.shape();
    let (stamp_rows, stamp_cols) = stamp.shape();
    let nodata_out = surface.nodata().unwrap_or(f64::NAN);

    let surface_data = surface.data();
    let stamp_data = stamp.data();

    let stamp_at = |row: usize, col: usize| -> Option<f64> {
        let r = row as i64 - row_off;
        let c = col as i64 - col_off;
        if r < 0 || c < 0 || r >= stamp_rows as i64 || c >= stamp_cols as i64 {
            return None;
        }
        let v = stamp_data[(r as usize, c as usize)];
        (!stamp.is_nodata(v)).then_some(v)
    };

    let row_results: Vec<Vec<f64>> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut row_data = Vec::with_capacity(cols);
            for col in 0..cols {
                let s = surface_data[(row, col)];
                let value = match stamp_at(row, col) {
                    Some(t) if !surface.is_nodata(s) => match op {
                        StampOp::Add => s + t,
                        StampOp::Subtract => s - t,
                        StampOp::Multiply => s * t,
                        StampOp::Divide if t == 0.0 => match zero_division {
                            ZeroDivision::Fail => {
                                return Err(Error::NumericFault {
                                    row,
                                    col,
                                    reason: format!("division of {} by a zero stamp value", s),
                                });
                            }
                            ZeroDivision::NoData => nodata_out,
                            ZeroDivision::Infinity => s / t,
                        },
                        StampOp::Divide => s / t,
                    },
                    _ => s,
                };
                row_data.push(value);
            }
            Ok(row_data)
        })
        .collect::<Result<Vec<_>>>()?;

    let data: Vec<f64> = row_results.into_iter().flatten().collect();

    let mut output = surface.with_same_meta::<f64>(rows, cols);
    output.set_nodata(surface.nodata());
    *output.data_mut() = Raster::from_vec(data, rows, cols)?.into_array();

    Ok(output)
}

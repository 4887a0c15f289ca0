//! Elevation profiles
//!
//! Map ring distances to elevations by sampling a height function inside
//! each ring. The resolver is pure: distances, a stair policy and a height
//! function go in, an immutable [`ElevationProfile`] comes out.

mod expression;

pub use expression::{Expression, VARIABLE};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use terrastamp_core::{Error, Result};

/// Where inside a ring the height function is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum StairPolicy {
    /// The ring's inner boundary (previous distance, 0 for the first ring)
    Inner,
    /// The ring's outer boundary
    Outer,
    /// Halfway between the inner and outer boundaries
    #[default]
    Mid,
}

impl StairPolicy {
    /// Sample distance for a ring spanning `prev..d`
    pub fn sample_point(self, prev: f64, d: f64) -> f64 {
        match self {
            StairPolicy::Inner => prev,
            StairPolicy::Outer => d,
            StairPolicy::Mid => prev + (d - prev) / 2.0,
        }
    }
}

impl FromStr for StairPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INNER" | "INSIDE" => Ok(StairPolicy::Inner),
            "OUTER" | "OUTSIDE" => Ok(StairPolicy::Outer),
            "MID" | "CENTRE" | "CENTER" | "MIDDLE" => Ok(StairPolicy::Mid),
            _ => Err(Error::InvalidPolicy(format!(
                "unknown stair policy '{}' (expected INNER, OUTER or MID)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for StairPolicy {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for StairPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StairPolicy::Inner => "INNER",
            StairPolicy::Outer => "OUTER",
            StairPolicy::Mid => "MID",
        })
    }
}

/// A scalar function of distance.
///
/// Implemented by compiled [`Expression`]s and by plain closures
/// `Fn(f64) -> f64`. Closure results that are not finite are rejected.
pub trait HeightFunction {
    fn height_at(&self, d: f64) -> Result<f64>;
}

impl HeightFunction for Expression {
    fn height_at(&self, d: f64) -> Result<f64> {
        self.evaluate(d)
    }
}

impl<F> HeightFunction for F
where
    F: Fn(f64) -> f64,
{
    fn height_at(&self, d: f64) -> Result<f64> {
        let v = self(d);
        if v.is_finite() {
            Ok(v)
        } else {
            Err(Error::expression(format!("non-finite result {}", v)))
        }
    }
}

/// One resolved ring
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileEntry {
    /// Outer boundary of the ring
    pub distance: f64,
    /// Distance the height function was evaluated at
    pub sample: f64,
    /// Resolved elevation
    pub elevation: f64,
}

/// Distance to elevation mapping, one entry per ring, ascending by distance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElevationProfile {
    policy: StairPolicy,
    entries: Vec<ProfileEntry>,
}

impl ElevationProfile {
    /// Elevation of the ring whose outer boundary is `distance`
    pub fn get(&self, distance: f64) -> Option<f64> {
        self.entry(distance).map(|e| e.elevation)
    }

    /// Full entry for `distance`
    pub fn entry(&self, distance: f64) -> Option<&ProfileEntry> {
        self.entries
            .binary_search_by(|e| e.distance.total_cmp(&distance))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn policy(&self) -> StairPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.entries.iter()
    }

    /// Sorted ring distances
    pub fn distances(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.distance).collect()
    }
}

/// Sort and validate a ring distance list.
///
/// Rejects empty lists, non-finite or negative values, a zero first
/// distance and duplicates. All of these would produce a zero-width ring or
/// an ambiguous profile key.
pub fn sorted_distances(distances: &[f64]) -> Result<Vec<f64>> {
    if distances.is_empty() {
        return Err(Error::InvalidDistances("at least one distance is required".into()));
    }
    if let Some(bad) = distances.iter().find(|d| !d.is_finite()) {
        return Err(Error::InvalidDistances(format!("distance {} is not finite", bad)));
    }
    if let Some(bad) = distances.iter().find(|&&d| d < 0.0) {
        return Err(Error::InvalidDistances(format!("distance {} is negative", bad)));
    }

    let mut sorted = distances.to_vec();
    sorted.sort_by(f64::total_cmp);

    if sorted[0] == 0.0 {
        return Err(Error::InvalidDistances(
            "the first ring would have zero width (distance 0)".into(),
        ));
    }
    if let Some(w) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(Error::InvalidDistances(format!("duplicate distance {}", w[0])));
    }

    Ok(sorted)
}

/// Resolve one elevation per ring.
///
/// Distances are sorted ascending first. For ring `i` spanning
/// `prev..d_i` (with `prev = 0` for the first ring) the height function is
/// evaluated at the policy's sample point.
///
/// # Example
/// ```ignore
/// let f = Expression::compile("d*d")?;
/// let p = resolve_profile(&[10.0, 20.0, 30.0], StairPolicy::Mid, &f)?;
/// assert_eq!(p.get(20.0), Some(225.0));
/// ```
pub fn resolve_profile<H>(distances: &[f64], policy: StairPolicy, height_fn: &H) -> Result<ElevationProfile>
where
    H: HeightFunction + ?Sized,
{
    let sorted = sorted_distances(distances)?;

    let mut entries = Vec::with_capacity(sorted.len());
    let mut prev = 0.0;
    for (ring, &distance) in sorted.iter().enumerate() {
        let sample = policy.sample_point(prev, distance);
        let elevation = height_fn.height_at(sample).map_err(|e| {
            let reason = match e {
                Error::InvalidExpression { reason, .. } => reason,
                other => other.to_string(),
            };
            Error::InvalidExpression {
                ring: Some(ring),
                distance: Some(distance),
                reason: format!("{} (evaluated at d = {})", reason, sample),
            }
        })?;

        entries.push(ProfileEntry {
            distance,
            sample,
            elevation,
        });
        prev = distance;
    }

    Ok(ElevationProfile { policy, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn expr(src: &str) -> Expression {
        Expression::compile(src).unwrap()
    }

    #[test]
    fn test_mid_squares() {
        let p = resolve_profile(&[10.0, 20.0, 30.0], StairPolicy::Mid, &expr("d*d")).unwrap();
        assert_eq!(p.len(), 3);
        assert_relative_eq!(p.get(10.0).unwrap(), 25.0);
        assert_relative_eq!(p.get(20.0).unwrap(), 225.0);
        assert_relative_eq!(p.get(30.0).unwrap(), 625.0);
    }

    #[test]
    fn test_inner_offset() {
        let p = resolve_profile(&[10.0, 20.0, 30.0], StairPolicy::Inner, &expr("d+1")).unwrap();
        assert_relative_eq!(p.get(10.0).unwrap(), 1.0);
        assert_relative_eq!(p.get(20.0).unwrap(), 11.0);
        assert_relative_eq!(p.get(30.0).unwrap(), 21.0);
    }

    #[test]
    fn test_outer_samples_boundary() {
        let p = resolve_profile(&[5.0, 15.0], StairPolicy::Outer, &|d: f64| d * 2.0).unwrap();
        assert_relative_eq!(p.get(5.0).unwrap(), 10.0);
        assert_relative_eq!(p.get(15.0).unwrap(), 30.0);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let p = resolve_profile(&[30.0, 10.0, 20.0], StairPolicy::Mid, &|d: f64| d).unwrap();
        let samples: Vec<f64> = p.iter().map(|e| e.sample).collect();
        assert_eq!(p.distances(), vec![10.0, 20.0, 30.0]);
        assert_eq!(samples, vec![5.0, 15.0, 25.0]);
    }

    #[test]
    fn test_sample_point_properties() {
        let d = [3.0, 7.5, 12.0, 40.0];
        let f = |x: f64| x;
        for policy in [StairPolicy::Inner, StairPolicy::Outer, StairPolicy::Mid] {
            let p = resolve_profile(&d, policy, &f).unwrap();
            assert_eq!(p.len(), d.len());
            for (i, e) in p.iter().enumerate() {
                let prev = if i == 0 { 0.0 } else { d[i - 1] };
                let expected = match policy {
                    StairPolicy::Inner => prev,
                    StairPolicy::Outer => d[i],
                    StairPolicy::Mid => (prev + d[i]) / 2.0,
                };
                assert_relative_eq!(e.sample, expected);
            }
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("inner".parse::<StairPolicy>().unwrap(), StairPolicy::Inner);
        assert_eq!("OUTSIDE".parse::<StairPolicy>().unwrap(), StairPolicy::Outer);
        assert_eq!("Centre".parse::<StairPolicy>().unwrap(), StairPolicy::Mid);
        assert!(matches!(
            "diagonal".parse::<StairPolicy>(),
            Err(Error::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_policy_serde_aliases() {
        let p: StairPolicy = serde_json::from_str("\"CENTRE\"").unwrap();
        assert_eq!(p, StairPolicy::Mid);
        assert_eq!(serde_json::to_string(&StairPolicy::Inner).unwrap(), "\"INNER\"");
    }

    #[test]
    fn test_invalid_distances() {
        let f = |d: f64| d;
        for bad in [
            vec![],
            vec![0.0, 10.0],
            vec![10.0, 10.0],
            vec![-5.0, 10.0],
            vec![f64::NAN],
            vec![f64::INFINITY],
        ] {
            let res = resolve_profile(&bad, StairPolicy::Mid, &f);
            assert!(matches!(res, Err(Error::InvalidDistances(_))), "{:?}", bad);
        }
    }

    #[test]
    fn test_evaluation_error_names_ring() {
        // INNER samples the first ring at 0
        let err = resolve_profile(&[10.0, 20.0], StairPolicy::Inner, &expr("1/d")).unwrap_err();
        match err {
            Error::InvalidExpression { ring, distance, reason } => {
                assert_eq!(ring, Some(0));
                assert_eq!(distance, Some(10.0));
                assert!(reason.contains("division by zero"), "{reason}");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_closure_non_finite_rejected() {
        let err = resolve_profile(&[1.0, 2.0], StairPolicy::Outer, &|d: f64| {
            if d > 1.5 { f64::NAN } else { d }
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidExpression { ring: Some(1), .. }));
    }
}

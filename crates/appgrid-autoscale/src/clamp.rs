//! Bounded scale decision.
//!
//! Inputs arrive as the strings stored on a repair policy; an empty bound
//! means that side is unbounded. The maximum is checked first, so when a
//! proposal clears it the minimum still applies.

use crate::error::{RepairError, RepairResult};

/// How a proposed instance count was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Within bounds, used as proposed.
    Accepted,
    /// Outside a bound and moved onto it.
    Partial,
    /// Above the maximum while already running at the maximum.
    AtCeiling,
    /// Below the minimum while already running at the minimum.
    AtFloor,
}

/// Result of [`check_scale_number`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleCheck {
    /// Instance count to scale to; for a rejection, the bound that was hit.
    pub number: u32,
    pub verdict: Verdict,
}

impl ScaleCheck {
    pub fn accepted(&self) -> bool {
        matches!(self.verdict, Verdict::Accepted | Verdict::Partial)
    }

    pub fn is_partial(&self) -> bool {
        self.verdict == Verdict::Partial
    }
}

/// Clamp `scale` (the proposed count) given `app` (the current count) and
/// the optional `max`/`min` bounds.
pub fn check_scale_number(scale: &str, app: &str, max: &str, min: &str) -> RepairResult<ScaleCheck> {
    let scale = parse_count("scale number", scale)?;
    let app = parse_count("app number", app)?;
    let max = parse_bound("instance max", max)?;
    let min = parse_bound("instance min", min)?;
    if max.is_none() && min.is_none() {
        return Err(RepairError::Unbounded);
    }

    if let Some(max) = max
        && scale > max
    {
        return Ok(if app != max {
            ScaleCheck {
                number: max,
                verdict: Verdict::Partial,
            }
        } else {
            ScaleCheck {
                number: max,
                verdict: Verdict::AtCeiling,
            }
        });
    }

    if let Some(min) = min
        && scale < min
    {
        return Ok(if app != min {
            ScaleCheck {
                number: min,
                verdict: Verdict::Partial,
            }
        } else {
            ScaleCheck {
                number: min,
                verdict: Verdict::AtFloor,
            }
        });
    }

    Ok(ScaleCheck {
        number: scale,
        verdict: Verdict::Accepted,
    })
}

fn parse_count(field: &'static str, value: &str) -> RepairResult<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| RepairError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn parse_bound(field: &'static str, value: &str) -> RepairResult<Option<u32>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_count(field, value).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(scale: &str, app: &str, max: &str, min: &str) -> ScaleCheck {
        check_scale_number(scale, app, max, min).unwrap()
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(matches!(
            check_scale_number("", "", "", ""),
            Err(RepairError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn within_both_bounds() {
        assert_eq!(
            check("1", "3", "5", "1"),
            ScaleCheck { number: 1, verdict: Verdict::Accepted }
        );
        assert_eq!(
            check("5", "3", "5", "1"),
            ScaleCheck { number: 5, verdict: Verdict::Accepted }
        );
        assert_eq!(
            check("3", "5", "5", "1"),
            ScaleCheck { number: 3, verdict: Verdict::Accepted }
        );
    }

    #[test]
    fn above_max_clamps_partially() {
        let result = check("6", "3", "5", "1");
        assert_eq!(result, ScaleCheck { number: 5, verdict: Verdict::Partial });
        assert!(result.accepted() && result.is_partial());
    }

    #[test]
    fn above_max_at_ceiling_is_rejected() {
        let result = check("6", "5", "5", "1");
        assert_eq!(result, ScaleCheck { number: 5, verdict: Verdict::AtCeiling });
        assert!(!result.accepted());
    }

    #[test]
    fn min_only() {
        assert_eq!(
            check("1", "3", "", "1"),
            ScaleCheck { number: 1, verdict: Verdict::Accepted }
        );
        assert_eq!(
            check("1", "3", "", "2"),
            ScaleCheck { number: 2, verdict: Verdict::Partial }
        );
        let floor = check("1", "3", "", "3");
        assert_eq!(floor, ScaleCheck { number: 3, verdict: Verdict::AtFloor });
        assert!(!floor.accepted());
    }

    #[test]
    fn max_only_has_no_floor() {
        assert_eq!(
            check("0", "1", "5", ""),
            ScaleCheck { number: 0, verdict: Verdict::Accepted }
        );
    }

    #[test]
    fn no_bounds_is_an_error() {
        assert!(matches!(
            check_scale_number("2", "1", "", ""),
            Err(RepairError::Unbounded)
        ));
    }

    #[test]
    fn garbage_bound_is_an_error() {
        assert!(matches!(
            check_scale_number("2", "1", "five", ""),
            Err(RepairError::InvalidNumber { field: "instance max", .. })
        ));
    }
}

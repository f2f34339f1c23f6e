//! Run-length collapse of daily position samples into transit intervals.
//!
//! Samples arrive chronologically sorted per planet; insertion order is the
//! only valid order and out-of-order dates are a precondition violation, not
//! something to silently repair.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::{CelestialBody, CelestialPosition, House, HouseCusp};

/// Default distance (degrees) from a cusp or sign edge inside which a sample
/// is tagged entering or leaving.
pub const DEFAULT_BOUNDARY_THRESHOLD: f64 = 3.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryTag {
    Entering,
    Leaving,
    Transiting,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackBy {
    House,
    Sign,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailySample {
    pub date: NaiveDate,
    pub position: CelestialPosition,
}

/// One contiguous stretch of same-house (or same-sign) occupancy. A single
/// sample yields a zero-length interval with `start == end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitInterval {
    pub planet: CelestialBody,
    pub value: u8,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub boundary: BoundaryTag,
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitError {
    #[error("samples for {body} are out of order at {date}")]
    OutOfOrderSamples { body: CelestialBody, date: NaiveDate },
    #[error("chart carries no usable house cusps")]
    NoCusps,
}

// ---------------------------
// ## House Membership
// ---------------------------

/// House containing `degree`. Wrap-around past the 12th house is handled by
/// a synthetic 13th cusp at `first.degree + 360` during the scan; the
/// synthetic cusp never appears in any output.
pub fn house_of(degree: f64, cusps: &[HouseCusp]) -> Option<House> {
    if cusps.is_empty() {
        return None;
    }
    let mut sorted: Vec<(f64, House)> = cusps.iter().map(|c| (c.degree, c.house)).collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let degree = degree.rem_euclid(360.0);
    let unwrapped = if degree < sorted[0].0 {
        degree + 360.0
    } else {
        degree
    };
    let sentinel = sorted[0].0 + 360.0;
    for (i, &(cusp_degree, house)) in sorted.iter().enumerate() {
        let next = sorted.get(i + 1).map(|&(d, _)| d).unwrap_or(sentinel);
        if unwrapped >= cusp_degree && unwrapped < next {
            return Some(house);
        }
    }
    None
}

// ---------------------------
// ## Boundary Tagging
// ---------------------------

/// Tag relative to the current sign's edges. The trailing edge is the one
/// crossed to enter the sign (below for prograde motion, above for
/// retrograde); being within `threshold` of it means Entering, within
/// `threshold` of the leading edge means Leaving.
pub fn sign_boundary_tag(position: &CelestialPosition, threshold: f64) -> BoundaryTag {
    let into_sign = position.norm_degree;
    let until_next = 30.0 - position.norm_degree;
    let (trailing, leading) = if position.is_retrograde {
        (until_next, into_sign)
    } else {
        (into_sign, until_next)
    };
    if trailing < threshold {
        BoundaryTag::Entering
    } else if leading < threshold {
        BoundaryTag::Leaving
    } else {
        BoundaryTag::Transiting
    }
}

/// Same rule against the current house's two cusps.
pub fn house_boundary_tag(
    position: &CelestialPosition,
    cusps: &[HouseCusp],
    threshold: f64,
) -> BoundaryTag {
    let Some(house) = house_of(position.full_degree, cusps) else {
        return BoundaryTag::Transiting;
    };
    let Some(own) = cusps.iter().find(|c| c.house == house) else {
        return BoundaryTag::Transiting;
    };
    let next_house = House::from_index(house.index() % 12 + 1).unwrap_or(House::First);
    let Some(next) = cusps.iter().find(|c| c.house == next_house) else {
        return BoundaryTag::Transiting;
    };

    let into_house = (position.full_degree - own.degree).rem_euclid(360.0);
    let until_next = (next.degree - position.full_degree).rem_euclid(360.0);
    let (trailing, leading) = if position.is_retrograde {
        (until_next, into_house)
    } else {
        (into_house, until_next)
    };
    if trailing < threshold {
        BoundaryTag::Entering
    } else if leading < threshold {
        BoundaryTag::Leaving
    } else {
        BoundaryTag::Transiting
    }
}

/// Both tags for one sample, as the house-transit code family consumes them.
pub fn boundary_tags(
    position: &CelestialPosition,
    cusps: &[HouseCusp],
    threshold: f64,
) -> (BoundaryTag, BoundaryTag) {
    (
        sign_boundary_tag(position, threshold),
        house_boundary_tag(position, cusps, threshold),
    )
}

// ---------------------------
// ## Interval Tracking
// ---------------------------

struct OpenInterval {
    value: u8,
    start: NaiveDate,
    end: NaiveDate,
    boundary: BoundaryTag,
}

/// Collapses chronologically ordered daily samples into occupancy intervals
/// per planet. Boundary tags come from each interval's first sample, not
/// from interval membership.
pub fn track_intervals(
    samples: &[DailySample],
    by: TrackBy,
    cusps: &[HouseCusp],
    threshold: f64,
) -> Result<HashMap<CelestialBody, Vec<TransitInterval>>, TransitError> {
    if cusps.is_empty() {
        return Err(TransitError::NoCusps);
    }

    let mut finished: HashMap<CelestialBody, Vec<TransitInterval>> = HashMap::new();
    let mut open: HashMap<CelestialBody, OpenInterval> = HashMap::new();

    for sample in samples {
        let body = sample.position.body;
        let value = match by {
            TrackBy::House => house_of(sample.position.full_degree, cusps)
                .ok_or(TransitError::NoCusps)?
                .index() as u8,
            TrackBy::Sign => sample.position.sign.index() as u8,
        };
        let tag = match by {
            TrackBy::House => house_boundary_tag(&sample.position, cusps, threshold),
            TrackBy::Sign => sign_boundary_tag(&sample.position, threshold),
        };

        match open.get_mut(&body) {
            Some(current) => {
                if sample.date < current.end {
                    return Err(TransitError::OutOfOrderSamples {
                        body,
                        date: sample.date,
                    });
                }
                if current.value == value {
                    current.end = sample.date;
                } else {
                    let closed = std::mem::replace(
                        current,
                        OpenInterval {
                            value,
                            start: sample.date,
                            end: sample.date,
                            boundary: tag,
                        },
                    );
                    finished.entry(body).or_default().push(TransitInterval {
                        planet: body,
                        value: closed.value,
                        start: closed.start,
                        end: closed.end,
                        boundary: closed.boundary,
                    });
                }
            }
            None => {
                open.insert(
                    body,
                    OpenInterval {
                        value,
                        start: sample.date,
                        end: sample.date,
                        boundary: tag,
                    },
                );
            }
        }
    }

    for (body, current) in open {
        finished.entry(body).or_default().push(TransitInterval {
            planet: body,
            value: current.value,
            start: current.start,
            end: current.end,
            boundary: current.boundary,
        });
    }
    Ok(finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ZodiacSign;

    fn equal_cusps() -> Vec<HouseCusp> {
        House::all()
            .enumerate()
            .map(|(i, house)| HouseCusp {
                house,
                sign: ZodiacSign::from_longitude(i as f64 * 30.0),
                degree: i as f64 * 30.0,
            })
            .collect()
    }

    /// Cusps rotated so the 1st house starts late in the circle and the 12th
    /// wraps through 0°.
    fn rotated_cusps() -> Vec<HouseCusp> {
        House::all()
            .enumerate()
            .map(|(i, house)| {
                let degree = (340.0 + i as f64 * 30.0).rem_euclid(360.0);
                HouseCusp {
                    house,
                    sign: ZodiacSign::from_longitude(degree),
                    degree,
                }
            })
            .collect()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample(d: u32, degree: f64) -> DailySample {
        DailySample {
            date: day(d),
            position: CelestialPosition::new(CelestialBody::Mars, degree, House::First, false),
        }
    }

    #[test]
    fn house_membership_handles_wraparound() {
        let cusps = rotated_cusps();
        assert_eq!(house_of(345.0, &cusps), Some(House::First));
        assert_eq!(house_of(5.0, &cusps), Some(House::First));
        assert_eq!(house_of(15.0, &cusps), Some(House::Second));
        assert_eq!(house_of(335.0, &cusps), Some(House::Twelfth));
    }

    #[test]
    fn same_house_run_merges_into_one_interval() {
        let samples: Vec<DailySample> =
            (1..=5).map(|d| sample(d, 40.0 + d as f64)).collect();
        let intervals =
            track_intervals(&samples, TrackBy::House, &equal_cusps(), 3.0).unwrap();
        let mars = &intervals[&CelestialBody::Mars];
        assert_eq!(mars.len(), 1);
        assert_eq!(mars[0].value, 2);
        assert_eq!(mars[0].start, day(1));
        assert_eq!(mars[0].end, day(5));
    }

    #[test]
    fn occupancy_change_opens_a_new_interval() {
        let degrees = [55.0, 57.0, 59.0, 61.0, 63.0, 91.0];
        let samples: Vec<DailySample> = degrees
            .iter()
            .enumerate()
            .map(|(i, &deg)| sample(i as u32 + 1, deg))
            .collect();
        let intervals =
            track_intervals(&samples, TrackBy::House, &equal_cusps(), 3.0).unwrap();
        let mars = &intervals[&CelestialBody::Mars];
        // Two occupancy changes in six samples: three intervals.
        assert_eq!(mars.len(), 3);
        assert_eq!(mars[0].value, 2);
        assert_eq!(mars[0].end, day(3));
        assert_eq!(mars[1].value, 3);
        assert_eq!(mars[1].start, day(4));
        assert_eq!(mars[1].end, day(5));
        assert_eq!(mars[2].value, 4);
        assert_eq!(mars[2].start, day(6));
        assert_eq!(mars[2].end, day(6));
    }

    #[test]
    fn single_sample_yields_zero_length_interval() {
        let samples = vec![sample(7, 100.0)];
        let intervals =
            track_intervals(&samples, TrackBy::Sign, &equal_cusps(), 3.0).unwrap();
        let mars = &intervals[&CelestialBody::Mars];
        assert_eq!(mars.len(), 1);
        assert_eq!(mars[0].start, mars[0].end);
        assert_eq!(mars[0].value, ZodiacSign::Cancer.index() as u8);
    }

    #[test]
    fn out_of_order_samples_are_rejected() {
        let samples = vec![sample(5, 40.0), sample(3, 41.0)];
        assert_eq!(
            track_intervals(&samples, TrackBy::House, &equal_cusps(), 3.0).unwrap_err(),
            TransitError::OutOfOrderSamples {
                body: CelestialBody::Mars,
                date: day(3)
            }
        );
    }

    #[test]
    fn first_day_in_a_new_house_tags_entering() {
        let degrees = [58.5, 61.0];
        let samples: Vec<DailySample> = degrees
            .iter()
            .enumerate()
            .map(|(i, &deg)| sample(i as u32 + 1, deg))
            .collect();
        let intervals =
            track_intervals(&samples, TrackBy::House, &equal_cusps(), 3.0).unwrap();
        let mars = &intervals[&CelestialBody::Mars];
        assert_eq!(mars.len(), 2);
        // 58.5° is within 3° of the 60° cusp ahead: leaving.
        assert_eq!(mars[0].boundary, BoundaryTag::Leaving);
        // 61.0° just crossed that cusp: entering on the interval's first day.
        assert_eq!(mars[1].boundary, BoundaryTag::Entering);
    }

    #[test]
    fn retrograde_swaps_entering_and_leaving() {
        let direct = CelestialPosition::new(CelestialBody::Mars, 61.0, House::Third, false);
        let retro = CelestialPosition::new(CelestialBody::Mars, 61.0, House::Third, true);
        assert_eq!(sign_boundary_tag(&direct, 3.0), BoundaryTag::Entering);
        assert_eq!(sign_boundary_tag(&retro, 3.0), BoundaryTag::Leaving);
    }

    #[test]
    fn mid_sign_is_plain_transiting() {
        let pos = CelestialPosition::new(CelestialBody::Mars, 75.0, House::Third, false);
        assert_eq!(sign_boundary_tag(&pos, 3.0), BoundaryTag::Transiting);
        assert_eq!(
            house_boundary_tag(&pos, &equal_cusps(), 3.0),
            BoundaryTag::Transiting
        );
    }
}

//! Whole-chart shape classification.
//!
//! The rules run in one explicit priority order, first match wins: the four
//! distribution patterns (Splash, Splay, Bucket, Seesaw), then the
//! span-based shapes measured from the lowest-degree planet (Bundle, Bowl,
//! Locomotive). A chart matching nothing is `ChartPattern::None`, a valid
//! terminal result.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CelestialBody, CelestialPosition};

/// Points removed from the placement set before any clustering runs.
pub const DEFAULT_EXCLUDED: &[CelestialBody] = &[
    CelestialBody::SouthNode,
    CelestialBody::PartOfFortune,
    CelestialBody::Chiron,
];

/// Width (degrees) within which consecutive planets form one Splay cluster.
const SPLAY_CLUSTER_GAP: f64 = 10.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartPattern {
    Bundle,
    Bowl,
    Locomotive,
    Splay,
    Bucket,
    Seesaw,
    Splash,
    None,
}

impl fmt::Display for ChartPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ChartPattern::Bundle => "Bundle",
            ChartPattern::Bowl => "Bowl",
            ChartPattern::Locomotive => "Locomotive",
            ChartPattern::Splay => "Splay",
            ChartPattern::Bucket => "Bucket",
            ChartPattern::Seesaw => "Seesaw",
            ChartPattern::Splash => "Splash",
            ChartPattern::None => "no discernible pattern",
        };
        write!(f, "{}", name)
    }
}

/// The priority order itself, kept as data so it can be read and tested as
/// one thing rather than inferred from call sequence.
const RULES: [(ChartPattern, fn(&[f64]) -> bool); 7] = [
    (ChartPattern::Splash, is_splash),
    (ChartPattern::Splay, is_splay),
    (ChartPattern::Bucket, is_bucket),
    (ChartPattern::Seesaw, is_seesaw),
    (ChartPattern::Bundle, is_bundle),
    (ChartPattern::Bowl, is_bowl),
    (ChartPattern::Locomotive, is_locomotive),
];

/// Classifies a snapshot of natal placements. Excluded points are dropped
/// before any rule runs; fewer than four surviving planets never form a
/// pattern.
pub fn classify(placements: &[CelestialPosition], excluded: &[CelestialBody]) -> ChartPattern {
    let degrees: Vec<f64> = placements
        .iter()
        .filter(|p| !excluded.contains(&p.body))
        .map(|p| p.full_degree.rem_euclid(360.0))
        .collect();
    if degrees.len() < 4 {
        return ChartPattern::None;
    }
    for (pattern, rule) in RULES {
        if rule(&degrees) {
            return pattern;
        }
    }
    ChartPattern::None
}

/// The narrower span-only classifier, measured from the lowest-degree
/// planet: Bundle within 120°, Bowl within 180°, Locomotive within 240°, in
/// that order.
pub fn classify_span(degrees: &[f64]) -> ChartPattern {
    if degrees.len() < 2 {
        return ChartPattern::None;
    }
    if is_bundle(degrees) {
        ChartPattern::Bundle
    } else if is_bowl(degrees) {
        ChartPattern::Bowl
    } else if is_locomotive(degrees) {
        ChartPattern::Locomotive
    } else {
        ChartPattern::None
    }
}

// ---------------------------
// ## Rules
// ---------------------------

fn occupied_signs(degrees: &[f64]) -> usize {
    let mut seen = [false; 12];
    for &d in degrees {
        seen[(d / 30.0).floor() as usize % 12] = true;
    }
    seen.iter().filter(|&&s| s).count()
}

fn is_splash(degrees: &[f64]) -> bool {
    occupied_signs(degrees) >= 7
}

/// Clusters of consecutive planets within 10° of each other, singletons
/// discarded; Splay needs at least three surviving clusters with a full
/// empty sign sector between every adjacent pair.
fn is_splay(degrees: &[f64]) -> bool {
    let clusters = clusters_of(degrees, SPLAY_CLUSTER_GAP);
    let surviving: Vec<&(f64, f64, usize)> =
        clusters.iter().filter(|&&(_, _, count)| count > 1).collect();
    if surviving.len() < 3 {
        return false;
    }
    for (i, &&(_, end, _)) in surviving.iter().enumerate() {
        let &&(next_start, _, _) = &surviving[(i + 1) % surviving.len()];
        if !gap_contains_empty_sign(end, next_start, degrees) {
            return false;
        }
    }
    true
}

/// Maximal runs of sorted degrees where adjacent members sit within `gap`,
/// the wrap-around run merged. Returns `(start, end, count)` per cluster.
fn clusters_of(degrees: &[f64], gap: f64) -> Vec<(f64, f64, usize)> {
    let mut sorted = degrees.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut clusters: Vec<(f64, f64, usize)> = Vec::new();
    for &d in &sorted {
        match clusters.last_mut() {
            Some((_, end, count)) if d - *end <= gap => {
                *end = d;
                *count += 1;
            }
            _ => clusters.push((d, d, 1)),
        }
    }
    // The circle closes: a first cluster within reach of the last one is the
    // same cluster.
    if clusters.len() > 1 {
        let (first_start, first_end, first_count) = clusters[0];
        let (_, last_end, _) = *clusters.last().unwrap();
        if first_start + 360.0 - last_end <= gap {
            let last = clusters.last_mut().unwrap();
            last.1 = first_end + 360.0;
            last.2 += first_count;
            clusters.remove(0);
        }
    }
    clusters
}

/// True when the circular gap from `end` forward to `start` contains at
/// least one whole 30° sign sector with no planet in it. A discarded
/// singleton sitting inside the gap still blocks its sector.
fn gap_contains_empty_sign(end: f64, start: f64, degrees: &[f64]) -> bool {
    let start = if start <= end { start + 360.0 } else { start };
    let mut boundary = (end / 30.0).floor() * 30.0 + 30.0;
    while boundary + 30.0 <= start {
        let sector = (boundary.rem_euclid(360.0) / 30.0).floor() as usize % 12;
        let occupied = degrees
            .iter()
            .any(|&d| (d / 30.0).floor() as usize % 12 == sector);
        if !occupied {
            return true;
        }
        boundary += 30.0;
    }
    false
}

/// Some handle planet with every other planet inside the 150°–210° band
/// opposite it. The first satisfying handle wins, which makes the check
/// order-dependent on input order.
fn is_bucket(degrees: &[f64]) -> bool {
    degrees.iter().any(|&handle| {
        degrees
            .iter()
            .filter(|&&p| p != handle)
            .all(|&p| {
                let rel = (p - handle).rem_euclid(360.0);
                (150.0..=210.0).contains(&rel)
            })
    })
}

/// Some pivot with at least two others within 60° and at least two more in
/// the 120°–180° opposite range.
fn is_seesaw(degrees: &[f64]) -> bool {
    degrees.iter().any(|&pivot| {
        let near = degrees
            .iter()
            .filter(|&&p| p != pivot && crate::separation(p, pivot) <= 60.0)
            .count();
        let far = degrees
            .iter()
            .filter(|&&p| {
                let sep = crate::separation(p, pivot);
                (120.0..=180.0).contains(&sep)
            })
            .count();
        near >= 2 && far >= 2
    })
}

fn span_from_lowest(degrees: &[f64]) -> f64 {
    let mut sorted = degrees.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    }
}

fn is_bundle(degrees: &[f64]) -> bool {
    span_from_lowest(degrees) <= 120.0
}

fn is_bowl(degrees: &[f64]) -> bool {
    span_from_lowest(degrees) <= 180.0
}

fn is_locomotive(degrees: &[f64]) -> bool {
    span_from_lowest(degrees) <= 240.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::House;

    fn placements(degrees: &[f64]) -> Vec<CelestialPosition> {
        let bodies = [
            CelestialBody::Sun,
            CelestialBody::Moon,
            CelestialBody::Mercury,
            CelestialBody::Venus,
            CelestialBody::Mars,
            CelestialBody::Jupiter,
            CelestialBody::Saturn,
            CelestialBody::Uranus,
            CelestialBody::Neptune,
            CelestialBody::Pluto,
        ];
        degrees
            .iter()
            .zip(bodies.iter().cycle())
            .map(|(&d, &b)| CelestialPosition::new(b, d, House::First, false))
            .collect()
    }

    #[test]
    fn tight_cluster_is_a_bundle() {
        let chart = placements(&[5.0, 15.0, 28.0, 40.0, 55.0, 62.0, 71.0, 80.0, 92.0, 100.0]);
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::Bundle);
    }

    #[test]
    fn one_per_sign_is_a_splash() {
        let degrees: Vec<f64> = (0..10).map(|i| i as f64 * 30.0 + 15.0).collect();
        let chart = placements(&degrees);
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::Splash);
    }

    #[test]
    fn three_separated_clusters_are_a_splay() {
        let chart = placements(&[
            10.0, 15.0, 20.0, 130.0, 135.0, 140.0, 250.0, 255.0, 260.0,
        ]);
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::Splay);
    }

    #[test]
    fn handle_opposite_a_packed_bowl_is_a_bucket() {
        // Everything between 170° and 200° except the lone handle at 0°.
        let chart = placements(&[0.0, 170.0, 175.0, 180.0, 185.0, 190.0, 195.0, 200.0]);
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::Bucket);
    }

    #[test]
    fn two_opposed_groups_are_a_seesaw() {
        let chart = placements(&[0.0, 10.0, 50.0, 150.0, 160.0, 170.0]);
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::Seesaw);
    }

    #[test]
    fn half_circle_spread_is_a_bowl() {
        let chart = placements(&[0.0, 45.0, 90.0, 135.0, 150.0]);
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::Bowl);
    }

    #[test]
    fn excluded_points_do_not_shape_the_chart() {
        // A tight bundle plus a far-flung South Node that would break it.
        let mut chart = placements(&[5.0, 20.0, 40.0, 60.0, 80.0, 100.0]);
        chart.push(CelestialPosition::new(
            CelestialBody::SouthNode,
            250.0,
            House::Ninth,
            false,
        ));
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::Bundle);
    }

    #[test]
    fn scattered_chart_with_no_shape_reports_none() {
        let chart = placements(&[0.0, 90.0, 181.0, 271.0]);
        assert_eq!(classify(&chart, DEFAULT_EXCLUDED), ChartPattern::None);
    }

    #[test]
    fn span_classifier_is_ordered_bundle_first() {
        assert_eq!(classify_span(&[0.0, 50.0, 110.0]), ChartPattern::Bundle);
        assert_eq!(classify_span(&[0.0, 90.0, 170.0]), ChartPattern::Bowl);
        assert_eq!(classify_span(&[0.0, 120.0, 230.0]), ChartPattern::Locomotive);
        assert_eq!(classify_span(&[0.0, 120.0, 250.0]), ChartPattern::None);
    }
}

//! Angular relationships between two ecliptic longitudes.
//!
//! All arithmetic is mod-360 and symmetric; the one directional rule is the
//! applying/separating flag, which flips under retrograde motion.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CelestialBody, CelestialPosition};

// ---------------------------
// ## Aspect Types
// ---------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectType {
    Conjunction,
    Sextile,
    Square,
    Trine,
    Quincunx,
    Opposition,
}

impl AspectType {
    pub fn iter() -> impl Iterator<Item = AspectType> {
        [
            AspectType::Conjunction,
            AspectType::Sextile,
            AspectType::Square,
            AspectType::Trine,
            AspectType::Quincunx,
            AspectType::Opposition,
        ]
        .iter()
        .copied()
    }

    /// Exact angle of the aspect in degrees.
    pub fn angle(&self) -> f64 {
        match self {
            AspectType::Conjunction => 0.0,
            AspectType::Sextile => 60.0,
            AspectType::Square => 90.0,
            AspectType::Trine => 120.0,
            AspectType::Quincunx => 150.0,
            AspectType::Opposition => 180.0,
        }
    }
}

impl fmt::Display for AspectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AspectType::Conjunction => "conjunction",
            AspectType::Sextile => "sextile",
            AspectType::Square => "square",
            AspectType::Trine => "trine",
            AspectType::Quincunx => "quincunx",
            AspectType::Opposition => "opposition",
        };
        write!(f, "{}", name)
    }
}

// ---------------------------
// ## Orb Classes
// ---------------------------

/// Tightness band of an aspect's residual orb. The 3–7° band is kept as its
/// own class rather than folded into a neighbour.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbClass {
    Exact,
    Close,
    Unclassified,
    Loose,
    General,
}

impl OrbClass {
    pub fn classify(residual: f64) -> OrbClass {
        let residual = residual.abs();
        if residual < 1.0 {
            OrbClass::Exact
        } else if residual < 3.0 {
            OrbClass::Close
        } else if residual < 7.0 {
            OrbClass::Unclassified
        } else if residual <= 10.0 {
            OrbClass::Loose
        } else {
            OrbClass::General
        }
    }

    /// Adjective used in rendered sentences.
    pub fn adjective(&self) -> &'static str {
        match self {
            OrbClass::Exact => "exact",
            OrbClass::Close => "close",
            OrbClass::Unclassified => "moderate",
            OrbClass::Loose => "loose",
            OrbClass::General => "wide",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Applying,
    Separating,
}

// ---------------------------
// ## Orb Profiles
// ---------------------------

/// Orb windows as a value, not a branch. The natal profile uses one fixed
/// window for every body; the daily-transit profile widens per planet,
/// luminaries widest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrbProfile {
    pub name: &'static str,
    default_window: f64,
    per_body: Vec<(CelestialBody, f64)>,
}

impl OrbProfile {
    pub fn natal() -> OrbProfile {
        OrbProfile {
            name: "natal",
            default_window: 5.0,
            per_body: Vec::new(),
        }
    }

    pub fn daily_transit() -> OrbProfile {
        OrbProfile {
            name: "daily-transit",
            default_window: 5.0,
            per_body: vec![
                (CelestialBody::Sun, 10.0),
                (CelestialBody::Moon, 10.0),
                (CelestialBody::Mercury, 7.0),
                (CelestialBody::Venus, 7.0),
                (CelestialBody::Mars, 8.0),
                (CelestialBody::Jupiter, 9.0),
                (CelestialBody::Saturn, 9.0),
                (CelestialBody::Uranus, 5.0),
                (CelestialBody::Neptune, 5.0),
                (CelestialBody::Pluto, 5.0),
                (CelestialBody::NorthNode, 3.0),
                (CelestialBody::SouthNode, 3.0),
                (CelestialBody::Chiron, 3.0),
            ],
        }
    }

    pub fn fixed(name: &'static str, window: f64) -> OrbProfile {
        OrbProfile {
            name,
            default_window: window,
            per_body: Vec::new(),
        }
    }

    /// Half-width of the aspect window when `body` is the transiting body.
    pub fn window_for(&self, body: CelestialBody) -> f64 {
        self.per_body
            .iter()
            .find(|&&(b, _)| b == body)
            .map(|&(_, w)| w)
            .unwrap_or(self.default_window)
    }
}

// ---------------------------
// ## Classification
// ---------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AspectInfo {
    pub aspect: AspectType,
    pub body_a: CelestialBody,
    pub body_b: CelestialBody,
    pub orb: f64,
    pub orb_class: OrbClass,
    pub phase: Phase,
}

/// Circular separation of two longitudes, always in `0..=180`.
pub fn separation(degree_a: f64, degree_b: f64) -> f64 {
    let diff = (degree_a - degree_b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Classifies the relationship between two positions, or `None` when no
/// aspect window matches. The window edge is inclusive: a residual exactly
/// equal to the profile window still counts as in aspect.
pub fn classify(
    a: &CelestialPosition,
    b: &CelestialPosition,
    profile: &OrbProfile,
) -> Option<AspectInfo> {
    classify_degrees(
        a.body,
        a.full_degree,
        b.body,
        b.full_degree,
        a.is_retrograde,
        profile,
    )
}

/// Degree-level variant of [`classify`] for callers that only hold raw
/// longitudes (the daily transit scan).
pub fn classify_degrees(
    body_a: CelestialBody,
    degree_a: f64,
    body_b: CelestialBody,
    degree_b: f64,
    retrograde_a: bool,
    profile: &OrbProfile,
) -> Option<AspectInfo> {
    let sep = separation(degree_a, degree_b);
    let window = profile.window_for(body_a);

    for aspect in AspectType::iter() {
        let residual = (sep - aspect.angle()).abs();
        if residual <= window {
            return Some(AspectInfo {
                aspect,
                body_a,
                body_b,
                orb: residual,
                orb_class: OrbClass::classify(residual),
                phase: phase_of(degree_a, degree_b, aspect, retrograde_a),
            });
        }
    }
    None
}

/// Applying when the exact target degree still lies ahead of `degree_b` in
/// the direction of prograde motion; an already-perfected aspect (zero arc)
/// counts as separating. Retrograde motion of the first body inverts the
/// direction of approach, so the flag flips.
fn phase_of(degree_a: f64, degree_b: f64, aspect: AspectType, retrograde_a: bool) -> Phase {
    let target = (degree_a + aspect.angle()).rem_euclid(360.0);
    let forward_arc = (target - degree_b).rem_euclid(360.0);
    let prograde_phase = if forward_arc > 0.0 && forward_arc < 180.0 {
        Phase::Applying
    } else {
        Phase::Separating
    };
    if retrograde_a {
        match prograde_phase {
            Phase::Applying => Phase::Separating,
            Phase::Separating => Phase::Applying,
        }
    } else {
        prograde_phase
    }
}

//! Deterministic chart-analysis core for the stellium platform.
//!
//! Everything here is pure computation over in-memory data: positions and
//! cusps arrive from the external ephemeris service, reference codes and
//! natural-language facts flow out to the generation layer. No I/O, no
//! persistence, no rendering.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod aspects;
pub mod codes;
pub mod decode;
pub mod grounding;
pub mod patterns;
pub mod transits;

pub use aspects::{
    classify_degrees, separation, AspectInfo, AspectType, OrbClass, OrbProfile, Phase,
};
pub use codes::{
    AspectFact, EncodeError, HouseRulerFact, HouseTransitFact, PlacementFact, GRAMMAR_VERSION,
};
pub use decode::{decode, decode_corpus, describe, DecodeError, DecodedFact};
pub use grounding::{
    GenerationError, GenerationProvider, GroundingCorpus, GroundingError, RetryGate, Validator,
};
pub use patterns::{classify_span, ChartPattern};
pub use transits::{
    house_of, track_intervals, BoundaryTag, DailySample, TrackBy, TransitError, TransitInterval,
};

// ---------------------------
// ## Enumerations
// ---------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CelestialBody {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    NorthNode,
    SouthNode,
    Chiron,
    Ascendant,
    Midheaven,
    PartOfFortune,
}

impl CelestialBody {
    pub fn iter() -> impl Iterator<Item = CelestialBody> {
        [
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
            CelestialBody::NorthNode,
            CelestialBody::SouthNode,
            CelestialBody::Chiron,
            CelestialBody::Ascendant,
            CelestialBody::Midheaven,
            CelestialBody::PartOfFortune,
        ]
        .iter()
        .copied()
    }

    /// Bodies that actually move through the zodiac day to day. The chart
    /// axes and the Part of Fortune are derived points and never transit.
    pub fn is_transiting_body(&self) -> bool {
        !matches!(
            self,
            CelestialBody::Ascendant | CelestialBody::Midheaven | CelestialBody::PartOfFortune
        )
    }

    /// Resolves an external API name. Tolerant of case and spacing, closed
    /// over the table above.
    pub fn from_name(name: &str) -> Option<CelestialBody> {
        let key: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "sun" => Some(CelestialBody::Sun),
            "moon" => Some(CelestialBody::Moon),
            "mercury" => Some(CelestialBody::Mercury),
            "venus" => Some(CelestialBody::Venus),
            "mars" => Some(CelestialBody::Mars),
            "jupiter" => Some(CelestialBody::Jupiter),
            "saturn" => Some(CelestialBody::Saturn),
            "uranus" => Some(CelestialBody::Uranus),
            "neptune" => Some(CelestialBody::Neptune),
            "pluto" => Some(CelestialBody::Pluto),
            "northnode" | "truenode" | "node" => Some(CelestialBody::NorthNode),
            "southnode" => Some(CelestialBody::SouthNode),
            "chiron" => Some(CelestialBody::Chiron),
            "ascendant" | "asc" => Some(CelestialBody::Ascendant),
            "midheaven" | "mc" => Some(CelestialBody::Midheaven),
            "partoffortune" | "fortuna" => Some(CelestialBody::PartOfFortune),
            _ => None,
        }
    }
}

impl fmt::Display for CelestialBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CelestialBody::Sun => "Sun",
            CelestialBody::Moon => "Moon",
            CelestialBody::Mercury => "Mercury",
            CelestialBody::Venus => "Venus",
            CelestialBody::Mars => "Mars",
            CelestialBody::Jupiter => "Jupiter",
            CelestialBody::Saturn => "Saturn",
            CelestialBody::Uranus => "Uranus",
            CelestialBody::Neptune => "Neptune",
            CelestialBody::Pluto => "Pluto",
            CelestialBody::NorthNode => "North Node",
            CelestialBody::SouthNode => "South Node",
            CelestialBody::Chiron => "Chiron",
            CelestialBody::Ascendant => "Ascendant",
            CelestialBody::Midheaven => "Midheaven",
            CelestialBody::PartOfFortune => "Part of Fortune",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZodiacSign {
    Aries = 0,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

impl ZodiacSign {
    pub fn from_longitude(longitude: f64) -> Self {
        let normalized_longitude = longitude.rem_euclid(360.0);
        let sign_index = (normalized_longitude / 30.0).floor() as usize;
        ZodiacSign::from_index(sign_index).unwrap_or(ZodiacSign::Pisces)
    }

    pub fn from_index(index: usize) -> Option<ZodiacSign> {
        match index {
            0 => Some(ZodiacSign::Aries),
            1 => Some(ZodiacSign::Taurus),
            2 => Some(ZodiacSign::Gemini),
            3 => Some(ZodiacSign::Cancer),
            4 => Some(ZodiacSign::Leo),
            5 => Some(ZodiacSign::Virgo),
            6 => Some(ZodiacSign::Libra),
            7 => Some(ZodiacSign::Scorpio),
            8 => Some(ZodiacSign::Sagittarius),
            9 => Some(ZodiacSign::Capricorn),
            10 => Some(ZodiacSign::Aquarius),
            11 => Some(ZodiacSign::Pisces),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Modern rulership table.
    pub fn ruler(&self) -> CelestialBody {
        match self {
            ZodiacSign::Aries => CelestialBody::Mars,
            ZodiacSign::Taurus => CelestialBody::Venus,
            ZodiacSign::Gemini => CelestialBody::Mercury,
            ZodiacSign::Cancer => CelestialBody::Moon,
            ZodiacSign::Leo => CelestialBody::Sun,
            ZodiacSign::Virgo => CelestialBody::Mercury,
            ZodiacSign::Libra => CelestialBody::Venus,
            ZodiacSign::Scorpio => CelestialBody::Pluto,
            ZodiacSign::Sagittarius => CelestialBody::Jupiter,
            ZodiacSign::Capricorn => CelestialBody::Saturn,
            ZodiacSign::Aquarius => CelestialBody::Uranus,
            ZodiacSign::Pisces => CelestialBody::Neptune,
        }
    }
}

impl fmt::Display for ZodiacSign {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sign_str = match self {
            ZodiacSign::Aries => "Aries",
            ZodiacSign::Taurus => "Taurus",
            ZodiacSign::Gemini => "Gemini",
            ZodiacSign::Cancer => "Cancer",
            ZodiacSign::Leo => "Leo",
            ZodiacSign::Virgo => "Virgo",
            ZodiacSign::Libra => "Libra",
            ZodiacSign::Scorpio => "Scorpio",
            ZodiacSign::Sagittarius => "Sagittarius",
            ZodiacSign::Capricorn => "Capricorn",
            ZodiacSign::Aquarius => "Aquarius",
            ZodiacSign::Pisces => "Pisces",
        };
        write!(f, "{}", sign_str)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum House {
    First = 1,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
    Seventh,
    Eighth,
    Ninth,
    Tenth,
    Eleventh,
    Twelfth,
}

impl House {
    pub fn from_index(index: usize) -> Option<House> {
        match index {
            1 => Some(House::First),
            2 => Some(House::Second),
            3 => Some(House::Third),
            4 => Some(House::Fourth),
            5 => Some(House::Fifth),
            6 => Some(House::Sixth),
            7 => Some(House::Seventh),
            8 => Some(House::Eighth),
            9 => Some(House::Ninth),
            10 => Some(House::Tenth),
            11 => Some(House::Eleventh),
            12 => Some(House::Twelfth),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn all() -> impl Iterator<Item = House> {
        (1..=12).filter_map(House::from_index)
    }

    pub fn ordinal(&self) -> &'static str {
        match self {
            House::First => "1st",
            House::Second => "2nd",
            House::Third => "3rd",
            House::Fourth => "4th",
            House::Fifth => "5th",
            House::Sixth => "6th",
            House::Seventh => "7th",
            House::Eighth => "8th",
            House::Ninth => "9th",
            House::Tenth => "10th",
            House::Eleventh => "11th",
            House::Twelfth => "12th",
        }
    }
}

// ---------------------------
// ## Chart Data Model
// ---------------------------

/// One body's position at a single timestamp. `norm_degree` and `sign` are
/// always derived from `full_degree`, never trusted from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CelestialPosition {
    pub body: CelestialBody,
    pub full_degree: f64,
    pub norm_degree: f64,
    pub sign: ZodiacSign,
    pub house: House,
    pub is_retrograde: bool,
}

impl CelestialPosition {
    pub fn new(body: CelestialBody, full_degree: f64, house: House, is_retrograde: bool) -> Self {
        let full_degree = full_degree.rem_euclid(360.0);
        CelestialPosition {
            body,
            full_degree,
            norm_degree: full_degree.rem_euclid(30.0),
            sign: ZodiacSign::from_longitude(full_degree),
            house,
            is_retrograde,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HouseCusp {
    pub house: House,
    pub sign: ZodiacSign,
    pub degree: f64,
}

// ---------------------------
// ## Ingestion Boundary
// ---------------------------

/// Position record exactly as the external ephemeris API delivers it. Every
/// field the wire could omit is an `Option`; conversion fails fast instead of
/// guessing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPosition {
    pub name: Option<String>,
    pub full_degree: Option<f64>,
    pub norm_degree: Option<f64>,
    pub sign: Option<String>,
    pub house: Option<u8>,
    pub is_retro: Option<bool>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCusp {
    pub house: Option<u8>,
    pub sign: Option<String>,
    pub degree: Option<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("incomplete chart data: {record} is missing `{field}`")]
    IncompleteChartData { record: String, field: &'static str },
    #[error("unknown celestial body `{0}` in chart data")]
    UnknownBody(String),
    #[error("chart must carry exactly 12 house cusps, got {0}")]
    WrongCuspCount(usize),
    #[error("duplicate or missing cusp for the {0} house")]
    DuplicateCusp(&'static str),
}

impl TryFrom<RawPosition> for CelestialPosition {
    type Error = ChartError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        let name = raw.name.ok_or(ChartError::IncompleteChartData {
            record: "position".to_string(),
            field: "name",
        })?;
        let body =
            CelestialBody::from_name(&name).ok_or_else(|| ChartError::UnknownBody(name.clone()))?;
        let full_degree = raw.full_degree.ok_or_else(|| ChartError::IncompleteChartData {
            record: name.clone(),
            field: "fullDegree",
        })?;
        // Sign and normDegree are derived locally, but their absence still
        // signals a truncated record upstream.
        if raw.sign.is_none() {
            return Err(ChartError::IncompleteChartData {
                record: name,
                field: "sign",
            });
        }
        let house_index = raw.house.ok_or_else(|| ChartError::IncompleteChartData {
            record: name.clone(),
            field: "house",
        })?;
        let house =
            House::from_index(house_index as usize).ok_or(ChartError::IncompleteChartData {
                record: name,
                field: "house",
            })?;
        let is_retrograde = match raw.is_retro {
            Some(flag) => flag,
            None => raw.speed.map(|s| s < 0.0).unwrap_or(false),
        };
        Ok(CelestialPosition::new(body, full_degree, house, is_retrograde))
    }
}

impl TryFrom<RawCusp> for HouseCusp {
    type Error = ChartError;

    fn try_from(raw: RawCusp) -> Result<Self, Self::Error> {
        let house_index = raw.house.ok_or(ChartError::IncompleteChartData {
            record: "cusp".to_string(),
            field: "house",
        })?;
        let house =
            House::from_index(house_index as usize).ok_or(ChartError::IncompleteChartData {
                record: "cusp".to_string(),
                field: "house",
            })?;
        let degree = raw.degree.ok_or(ChartError::IncompleteChartData {
            record: house.ordinal().to_string(),
            field: "degree",
        })?;
        let degree = degree.rem_euclid(360.0);
        Ok(HouseCusp {
            house,
            sign: ZodiacSign::from_longitude(degree),
            degree,
        })
    }
}

// ---------------------------
// ## Natal Chart
// ---------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NatalChart {
    pub positions: Vec<CelestialPosition>,
    pub cusps: Vec<HouseCusp>,
}

impl NatalChart {
    pub fn new(
        positions: Vec<CelestialPosition>,
        cusps: Vec<HouseCusp>,
    ) -> Result<Self, ChartError> {
        if cusps.len() != 12 {
            return Err(ChartError::WrongCuspCount(cusps.len()));
        }
        for house in House::all() {
            if cusps.iter().filter(|c| c.house == house).count() != 1 {
                return Err(ChartError::DuplicateCusp(house.ordinal()));
            }
        }
        Ok(NatalChart { positions, cusps })
    }

    pub fn from_raw(positions: Vec<RawPosition>, cusps: Vec<RawCusp>) -> Result<Self, ChartError> {
        let positions = positions
            .into_iter()
            .map(CelestialPosition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let cusps = cusps
            .into_iter()
            .map(HouseCusp::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        NatalChart::new(positions, cusps)
    }

    pub fn position(&self, body: CelestialBody) -> Option<&CelestialPosition> {
        self.positions.iter().find(|p| p.body == body)
    }

    pub fn cusp(&self, house: House) -> Option<&HouseCusp> {
        self.cusps.iter().find(|c| c.house == house)
    }

    /// Classifies every unordered pair once (a before b in chart order).
    pub fn aspects(&self, profile: &OrbProfile) -> Vec<AspectInfo> {
        let mut found = Vec::new();
        for (i, a) in self.positions.iter().enumerate() {
            for b in self.positions.iter().skip(i + 1) {
                if let Some(aspect) = aspects::classify(a, b, profile) {
                    found.push(aspect);
                }
            }
        }
        found
    }

    pub fn shape(&self) -> ChartPattern {
        patterns::classify(&self.positions, patterns::DEFAULT_EXCLUDED)
    }
}

// ---------------------------
// ## Synthetic Points
// ---------------------------

/// The ascendant as a typed position: the 1st-house cusp degree, always in
/// the 1st house, never retrograde.
pub fn ascendant_point(cusps: &[HouseCusp]) -> Result<CelestialPosition, ChartError> {
    let cusp = cusps
        .iter()
        .find(|c| c.house == House::First)
        .ok_or(ChartError::IncompleteChartData {
            record: "cusps".to_string(),
            field: "house 1",
        })?;
    Ok(CelestialPosition::new(
        CelestialBody::Ascendant,
        cusp.degree,
        House::First,
        false,
    ))
}

pub fn midheaven_point(cusps: &[HouseCusp]) -> Result<CelestialPosition, ChartError> {
    let cusp = cusps
        .iter()
        .find(|c| c.house == House::Tenth)
        .ok_or(ChartError::IncompleteChartData {
            record: "cusps".to_string(),
            field: "house 10",
        })?;
    Ok(CelestialPosition::new(
        CelestialBody::Midheaven,
        cusp.degree,
        House::Tenth,
        false,
    ))
}

/// The south node mirrors the north node exactly 180° away and shares its
/// motion.
pub fn south_node_point(
    north_node: &CelestialPosition,
    cusps: &[HouseCusp],
) -> Result<CelestialPosition, ChartError> {
    let degree = (north_node.full_degree + 180.0).rem_euclid(360.0);
    let house = house_of(degree, cusps).ok_or(ChartError::WrongCuspCount(cusps.len()))?;
    Ok(CelestialPosition::new(
        CelestialBody::SouthNode,
        degree,
        house,
        north_node.is_retrograde,
    ))
}

/// Day-formula Part of Fortune: ascendant + Moon − Sun.
pub fn part_of_fortune_point(
    ascendant_degree: f64,
    sun: &CelestialPosition,
    moon: &CelestialPosition,
    cusps: &[HouseCusp],
) -> Result<CelestialPosition, ChartError> {
    let degree = (ascendant_degree + moon.full_degree - sun.full_degree).rem_euclid(360.0);
    let house = house_of(degree, cusps).ok_or(ChartError::WrongCuspCount(cusps.len()))?;
    Ok(CelestialPosition::new(
        CelestialBody::PartOfFortune,
        degree,
        house,
        false,
    ))
}

// ---------------------------
// ## Chart Report
// ---------------------------

/// Everything the web layer consumes for one chart, computed in a single
/// pass: typed facts, the detected shape, and the grounding corpus handed to
/// the generation gate.
#[derive(Debug, Clone, Serialize)]
pub struct ChartReport {
    pub placements: Vec<PlacementFact>,
    pub aspects: Vec<AspectInfo>,
    pub rulers: Vec<HouseRulerFact>,
    pub pattern: ChartPattern,
    pub corpus: GroundingCorpus,
}

impl ChartReport {
    pub fn calculate(chart: &NatalChart, profile: &OrbProfile) -> Result<Self, EncodeError> {
        let placements = chart
            .positions
            .iter()
            .map(PlacementFact::from_position)
            .collect();
        let aspects = chart.aspects(profile);
        let rulers = codes::house_rulers(chart);
        let pattern = chart.shape();
        let corpus = GroundingCorpus::build(chart, profile)?;
        Ok(ChartReport {
            placements,
            aspects,
            rulers,
            pattern,
            corpus,
        })
    }
}

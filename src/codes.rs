//! The symbolic reference-code grammar.
//!
//! Four code families share a planet table, a sign table, and zero-padded
//! house numbers. Every table is closed and bidirectional: extending one
//! entity means touching encode and decode in the same place, and encoding
//! anything a family's table does not admit is an error, never a malformed
//! code.
//!
//! Field widths are a de facto wire format persisted downstream; changing
//! them is a breaking change tracked by [`GRAMMAR_VERSION`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aspects::{AspectInfo, AspectType, OrbClass};
use crate::transits::BoundaryTag;
use crate::{CelestialBody, CelestialPosition, House, NatalChart, ZodiacSign};

/// Version of the code grammar below. Codes themselves stay unversioned on
/// the wire for compatibility with already-persisted data.
pub const GRAMMAR_VERSION: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("unknown entity for code family {family}: {name}")]
    UnknownEntity { family: &'static str, name: String },
}

// ---------------------------
// ## Field Tables
// ---------------------------

impl CelestialBody {
    /// Two-digit wire token for this body.
    pub fn code(&self) -> &'static str {
        match self {
            CelestialBody::Sun => "00",
            CelestialBody::Moon => "01",
            CelestialBody::Mercury => "02",
            CelestialBody::Venus => "03",
            CelestialBody::Mars => "04",
            CelestialBody::Jupiter => "05",
            CelestialBody::Saturn => "06",
            CelestialBody::Uranus => "07",
            CelestialBody::Neptune => "08",
            CelestialBody::Pluto => "09",
            CelestialBody::NorthNode => "10",
            CelestialBody::SouthNode => "11",
            CelestialBody::Chiron => "12",
            CelestialBody::Ascendant => "13",
            CelestialBody::Midheaven => "14",
            CelestialBody::PartOfFortune => "15",
        }
    }

    pub fn from_code(code: &str) -> Option<CelestialBody> {
        match code {
            "00" => Some(CelestialBody::Sun),
            "01" => Some(CelestialBody::Moon),
            "02" => Some(CelestialBody::Mercury),
            "03" => Some(CelestialBody::Venus),
            "04" => Some(CelestialBody::Mars),
            "05" => Some(CelestialBody::Jupiter),
            "06" => Some(CelestialBody::Saturn),
            "07" => Some(CelestialBody::Uranus),
            "08" => Some(CelestialBody::Neptune),
            "09" => Some(CelestialBody::Pluto),
            "10" => Some(CelestialBody::NorthNode),
            "11" => Some(CelestialBody::SouthNode),
            "12" => Some(CelestialBody::Chiron),
            "13" => Some(CelestialBody::Ascendant),
            "14" => Some(CelestialBody::Midheaven),
            "15" => Some(CelestialBody::PartOfFortune),
            _ => None,
        }
    }
}

impl ZodiacSign {
    pub fn code(&self) -> &'static str {
        match self {
            ZodiacSign::Aries => "00",
            ZodiacSign::Taurus => "01",
            ZodiacSign::Gemini => "02",
            ZodiacSign::Cancer => "03",
            ZodiacSign::Leo => "04",
            ZodiacSign::Virgo => "05",
            ZodiacSign::Libra => "06",
            ZodiacSign::Scorpio => "07",
            ZodiacSign::Sagittarius => "08",
            ZodiacSign::Capricorn => "09",
            ZodiacSign::Aquarius => "10",
            ZodiacSign::Pisces => "11",
        }
    }

    pub fn from_code(code: &str) -> Option<ZodiacSign> {
        match code {
            "00" => Some(ZodiacSign::Aries),
            "01" => Some(ZodiacSign::Taurus),
            "02" => Some(ZodiacSign::Gemini),
            "03" => Some(ZodiacSign::Cancer),
            "04" => Some(ZodiacSign::Leo),
            "05" => Some(ZodiacSign::Virgo),
            "06" => Some(ZodiacSign::Libra),
            "07" => Some(ZodiacSign::Scorpio),
            "08" => Some(ZodiacSign::Sagittarius),
            "09" => Some(ZodiacSign::Capricorn),
            "10" => Some(ZodiacSign::Aquarius),
            "11" => Some(ZodiacSign::Pisces),
            _ => None,
        }
    }
}

impl House {
    /// Two-digit zero-padded house number.
    pub fn code(&self) -> &'static str {
        match self {
            House::First => "01",
            House::Second => "02",
            House::Third => "03",
            House::Fourth => "04",
            House::Fifth => "05",
            House::Sixth => "06",
            House::Seventh => "07",
            House::Eighth => "08",
            House::Ninth => "09",
            House::Tenth => "10",
            House::Eleventh => "11",
            House::Twelfth => "12",
        }
    }

    pub fn from_code(code: &str) -> Option<House> {
        match code {
            "01" => Some(House::First),
            "02" => Some(House::Second),
            "03" => Some(House::Third),
            "04" => Some(House::Fourth),
            "05" => Some(House::Fifth),
            "06" => Some(House::Sixth),
            "07" => Some(House::Seventh),
            "08" => Some(House::Eighth),
            "09" => Some(House::Ninth),
            "10" => Some(House::Tenth),
            "11" => Some(House::Eleventh),
            "12" => Some(House::Twelfth),
            _ => None,
        }
    }
}

impl AspectType {
    pub fn code(&self) -> &'static str {
        match self {
            AspectType::Conjunction => "00",
            AspectType::Sextile => "01",
            AspectType::Square => "02",
            AspectType::Trine => "03",
            AspectType::Quincunx => "04",
            AspectType::Opposition => "05",
        }
    }

    pub fn from_code(code: &str) -> Option<AspectType> {
        match code {
            "00" => Some(AspectType::Conjunction),
            "01" => Some(AspectType::Sextile),
            "02" => Some(AspectType::Square),
            "03" => Some(AspectType::Trine),
            "04" => Some(AspectType::Quincunx),
            "05" => Some(AspectType::Opposition),
            _ => None,
        }
    }
}

impl OrbClass {
    pub fn code(&self) -> &'static str {
        match self {
            OrbClass::Exact => "e",
            OrbClass::Close => "c",
            OrbClass::Unclassified => "u",
            OrbClass::Loose => "l",
            OrbClass::General => "g",
        }
    }

    pub fn from_code(code: &str) -> Option<OrbClass> {
        match code {
            "e" => Some(OrbClass::Exact),
            "c" => Some(OrbClass::Close),
            "u" => Some(OrbClass::Unclassified),
            "l" => Some(OrbClass::Loose),
            "g" => Some(OrbClass::General),
            _ => None,
        }
    }
}

impl BoundaryTag {
    pub fn code(&self) -> &'static str {
        match self {
            BoundaryTag::Entering => "E",
            BoundaryTag::Leaving => "L",
            BoundaryTag::Transiting => "T",
        }
    }

    pub fn from_code(code: &str) -> Option<BoundaryTag> {
        match code {
            "E" => Some(BoundaryTag::Entering),
            "L" => Some(BoundaryTag::Leaving),
            "T" => Some(BoundaryTag::Transiting),
            _ => None,
        }
    }
}

// ---------------------------
// ## Placement Family
// ---------------------------

/// `P{r|p}-{planet}{sign}{house}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementFact {
    pub body: CelestialBody,
    pub sign: ZodiacSign,
    pub house: House,
    pub is_retrograde: bool,
}

impl PlacementFact {
    pub fn from_position(position: &CelestialPosition) -> PlacementFact {
        PlacementFact {
            body: position.body,
            sign: position.sign,
            house: position.house,
            is_retrograde: position.is_retrograde,
        }
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        let motion = if self.is_retrograde { "r" } else { "p" };
        Ok(format!(
            "P{}-{}{}{}",
            motion,
            self.body.code(),
            self.sign.code(),
            self.house.code()
        ))
    }
}

// ---------------------------
// ## Aspect Family
// ---------------------------

/// `A-{planetA}{orbClass}{aspectType}{planetB}{sign}{house}` — sign and
/// house describe the second body's placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AspectFact {
    pub body_a: CelestialBody,
    pub orb_class: OrbClass,
    pub aspect: AspectType,
    pub body_b: CelestialBody,
    pub sign_b: ZodiacSign,
    pub house_b: House,
}

impl AspectFact {
    pub fn from_aspect(info: &AspectInfo, position_b: &CelestialPosition) -> AspectFact {
        AspectFact {
            body_a: info.body_a,
            orb_class: info.orb_class,
            aspect: info.aspect,
            body_b: info.body_b,
            sign_b: position_b.sign,
            house_b: position_b.house,
        }
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(format!(
            "A-{}{}{}{}{}{}",
            self.body_a.code(),
            self.orb_class.code(),
            self.aspect.code(),
            self.body_b.code(),
            self.sign_b.code(),
            self.house_b.code()
        ))
    }
}

// ---------------------------
// ## House-Ruler Family
// ---------------------------

/// `r-{rulerPlanet}{cuspSign}{ruledHouse}{occupantSign}{occupantHouse}` —
/// the ruler of `ruled_house`'s cusp sign, and where that ruler itself sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HouseRulerFact {
    pub ruler: CelestialBody,
    pub cusp_sign: ZodiacSign,
    pub ruled_house: House,
    pub ruler_sign: ZodiacSign,
    pub ruler_house: House,
}

impl HouseRulerFact {
    pub fn encode(&self) -> Result<String, EncodeError> {
        if !is_rulership_planet(self.ruler) {
            return Err(EncodeError::UnknownEntity {
                family: "house-ruler",
                name: self.ruler.to_string(),
            });
        }
        Ok(format!(
            "r-{}{}{}{}{}",
            self.ruler.code(),
            self.cusp_sign.code(),
            self.ruled_house.code(),
            self.ruler_sign.code(),
            self.ruler_house.code()
        ))
    }
}

fn is_rulership_planet(body: CelestialBody) -> bool {
    (0..12)
        .filter_map(ZodiacSign::from_index)
        .any(|sign| sign.ruler() == body)
}

/// One ruler fact per house whose ruling planet is present in the chart.
pub fn house_rulers(chart: &NatalChart) -> Vec<HouseRulerFact> {
    let mut rulers = Vec::new();
    for cusp in &chart.cusps {
        let ruler = cusp.sign.ruler();
        if let Some(position) = chart.position(ruler) {
            rulers.push(HouseRulerFact {
                ruler,
                cusp_sign: cusp.sign,
                ruled_house: cusp.house,
                ruler_sign: position.sign,
                ruler_house: position.house,
            });
        }
    }
    rulers
}

// ---------------------------
// ## House-Transit Family
// ---------------------------

/// `H{r|t}-{planet}{signBoundary}{sign}{houseBoundary}{house}` — boundary
/// tags carry whether the body is entering, leaving, or moving through its
/// current sign and house.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HouseTransitFact {
    pub body: CelestialBody,
    pub sign_boundary: BoundaryTag,
    pub sign: ZodiacSign,
    pub house_boundary: BoundaryTag,
    pub house: House,
    pub is_retrograde: bool,
}

impl HouseTransitFact {
    /// The one parameterized constructor for daily transit codes: boundary
    /// thresholds arrive as configuration, and the house comes from the cusp
    /// scan rather than the sample's own claim.
    pub fn from_position(
        position: &CelestialPosition,
        cusps: &[crate::HouseCusp],
        threshold: f64,
    ) -> HouseTransitFact {
        let (sign_boundary, house_boundary) =
            crate::transits::boundary_tags(position, cusps, threshold);
        let house =
            crate::transits::house_of(position.full_degree, cusps).unwrap_or(position.house);
        HouseTransitFact {
            body: position.body,
            sign_boundary,
            sign: position.sign,
            house_boundary,
            house,
            is_retrograde: position.is_retrograde,
        }
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        if !self.body.is_transiting_body() {
            return Err(EncodeError::UnknownEntity {
                family: "house-transit",
                name: self.body.to_string(),
            });
        }
        let motion = if self.is_retrograde { "r" } else { "t" };
        Ok(format!(
            "H{}-{}{}{}{}{}",
            motion,
            self.body.code(),
            self.sign_boundary.code(),
            self.sign.code(),
            self.house_boundary.code(),
            self.house.code()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planet_table_is_bidirectional() {
        for body in CelestialBody::iter() {
            assert_eq!(CelestialBody::from_code(body.code()), Some(body));
        }
        assert_eq!(CelestialBody::from_code("99"), None);
    }

    #[test]
    fn sign_and_house_tables_are_bidirectional() {
        for index in 0..12 {
            let sign = ZodiacSign::from_index(index).unwrap();
            assert_eq!(ZodiacSign::from_code(sign.code()), Some(sign));
        }
        for house in House::all() {
            assert_eq!(House::from_code(house.code()), Some(house));
        }
    }

    #[test]
    fn placement_code_shape() {
        let fact = PlacementFact {
            body: CelestialBody::Mars,
            sign: ZodiacSign::Pisces,
            house: House::Third,
            is_retrograde: true,
        };
        assert_eq!(fact.encode().unwrap(), "Pr-041103");

        let direct = PlacementFact {
            is_retrograde: false,
            ..fact
        };
        assert_eq!(direct.encode().unwrap(), "Pp-041103");
    }

    #[test]
    fn aspect_code_shape() {
        let fact = AspectFact {
            body_a: CelestialBody::Sun,
            orb_class: OrbClass::Exact,
            aspect: AspectType::Square,
            body_b: CelestialBody::Venus,
            sign_b: ZodiacSign::Leo,
            house_b: House::Fifth,
        };
        assert_eq!(fact.encode().unwrap(), "A-00e02030405");
    }

    #[test]
    fn ruler_code_shape() {
        let fact = HouseRulerFact {
            ruler: CelestialBody::Mercury,
            cusp_sign: ZodiacSign::Gemini,
            ruled_house: House::Third,
            ruler_sign: ZodiacSign::Leo,
            ruler_house: House::Fifth,
        };
        assert_eq!(fact.encode().unwrap(), "r-0202030405");
    }

    #[test]
    fn ruler_family_rejects_non_rulers() {
        let fact = HouseRulerFact {
            ruler: CelestialBody::Chiron,
            cusp_sign: ZodiacSign::Gemini,
            ruled_house: House::Third,
            ruler_sign: ZodiacSign::Leo,
            ruler_house: House::Fifth,
        };
        assert_eq!(
            fact.encode().unwrap_err(),
            EncodeError::UnknownEntity {
                family: "house-ruler",
                name: "Chiron".to_string()
            }
        );
    }

    #[test]
    fn transit_code_shape() {
        let fact = HouseTransitFact {
            body: CelestialBody::Saturn,
            sign_boundary: BoundaryTag::Transiting,
            sign: ZodiacSign::Aquarius,
            house_boundary: BoundaryTag::Entering,
            house: House::Eleventh,
            is_retrograde: false,
        };
        assert_eq!(fact.encode().unwrap(), "Ht-06T10E11");
    }

    #[test]
    fn transit_fact_from_position_tags_both_boundaries() {
        let cusps: Vec<crate::HouseCusp> = House::all()
            .enumerate()
            .map(|(i, house)| crate::HouseCusp {
                house,
                sign: ZodiacSign::from_longitude(i as f64 * 30.0),
                degree: i as f64 * 30.0,
            })
            .collect();
        // 61°: one degree past the Gemini ingress and the 3rd-house cusp.
        let position = CelestialPosition::new(CelestialBody::Mars, 61.0, House::Third, false);
        let fact = HouseTransitFact::from_position(&position, &cusps, 3.0);
        assert_eq!(fact.sign_boundary, BoundaryTag::Entering);
        assert_eq!(fact.house_boundary, BoundaryTag::Entering);
        assert_eq!(fact.encode().unwrap(), "Ht-04E02E03");
    }

    #[test]
    fn transit_family_rejects_derived_points() {
        let fact = HouseTransitFact {
            body: CelestialBody::PartOfFortune,
            sign_boundary: BoundaryTag::Transiting,
            sign: ZodiacSign::Aries,
            house_boundary: BoundaryTag::Transiting,
            house: House::First,
            is_retrograde: false,
        };
        assert!(matches!(
            fact.encode(),
            Err(EncodeError::UnknownEntity { family: "house-transit", .. })
        ));
    }

    #[test]
    fn encoding_is_injective_across_nearby_facts() {
        let base = PlacementFact {
            body: CelestialBody::Mars,
            sign: ZodiacSign::Pisces,
            house: House::Third,
            is_retrograde: false,
        };
        let mut seen = std::collections::HashSet::new();
        for body in [CelestialBody::Mars, CelestialBody::Venus] {
            for house in House::all() {
                for retro in [false, true] {
                    let fact = PlacementFact {
                        body,
                        house,
                        is_retrograde: retro,
                        ..base
                    };
                    assert!(seen.insert(fact.encode().unwrap()));
                }
            }
        }
        assert_eq!(seen.len(), 2 * 12 * 2);
    }
}

//! Decoding reference codes back into typed facts and sentences.
//!
//! The decoder dispatches on the family prefix, slices fixed-width fields in
//! the exact order the encoder wrote them, and reverse-maps each token
//! through the same closed tables. Error kinds stay distinguishable so a
//! caller can tell corrupt data apart from an encoder/decoder table skew.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::aspects::{AspectType, OrbClass};
use crate::codes::{AspectFact, HouseRulerFact, HouseTransitFact, PlacementFact};
use crate::transits::BoundaryTag;
use crate::{CelestialBody, House, ZodiacSign};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized code family in `{0}`")]
    UnrecognizedFamily(String),
    #[error("malformed {family} code: expected {expected} characters, found {found}")]
    MalformedLength {
        family: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("unknown {field} token `{token}` (encoder/decoder table mismatch)")]
    UnknownField { field: &'static str, token: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DecodedFact {
    Placement(PlacementFact),
    Aspect(AspectFact),
    HouseRuler(HouseRulerFact),
    HouseTransit(HouseTransitFact),
}

impl DecodedFact {
    /// The natural-language sentence for this fact, without provenance.
    pub fn sentence(&self) -> String {
        match self {
            DecodedFact::Placement(fact) => {
                let motion = if fact.is_retrograde { ", retrograde" } else { "" };
                format!(
                    "{} sits in {} in the {} house{}",
                    fact.body,
                    fact.sign,
                    fact.house.ordinal(),
                    motion
                )
            }
            DecodedFact::Aspect(fact) => {
                let article = match fact.orb_class {
                    OrbClass::Exact => "an",
                    _ => "a",
                };
                format!(
                    "{} forms {} {} {} to {}, which sits in {} in the {} house",
                    fact.body_a,
                    article,
                    fact.orb_class.adjective(),
                    fact.aspect,
                    fact.body_b,
                    fact.sign_b,
                    fact.house_b.ordinal()
                )
            }
            DecodedFact::HouseRuler(fact) => format!(
                "The {} house, with {} on the cusp, is ruled by {}, placed in {} in the {} house",
                fact.ruled_house.ordinal(),
                fact.cusp_sign,
                fact.ruler,
                fact.ruler_sign,
                fact.ruler_house.ordinal()
            ),
            DecodedFact::HouseTransit(fact) => {
                let motion = if fact.is_retrograde { ", retrograde," } else { "" };
                let sign_phrase = match fact.sign_boundary {
                    BoundaryTag::Entering => format!("is entering {}", fact.sign),
                    BoundaryTag::Leaving => format!("is leaving {}", fact.sign),
                    BoundaryTag::Transiting => format!("is moving through {}", fact.sign),
                };
                let house_phrase = match fact.house_boundary {
                    BoundaryTag::Entering => {
                        format!("entering the {} house", fact.house.ordinal())
                    }
                    BoundaryTag::Leaving => format!("leaving the {} house", fact.house.ordinal()),
                    BoundaryTag::Transiting => {
                        format!("moving through the {} house", fact.house.ordinal())
                    }
                };
                format!("{}{} {} and {}", fact.body, motion, sign_phrase, house_phrase)
            }
        }
    }

    /// Sentence with the original code appended for traceability.
    pub fn describe(&self, code: &str) -> String {
        format!("{} (ref: {})", self.sentence(), code)
    }
}

// ---------------------------
// ## Decoding
// ---------------------------

/// Parses one reference code back into its typed fields.
pub fn decode(code: &str) -> Result<DecodedFact, DecodeError> {
    if !code.is_ascii() {
        return Err(DecodeError::UnrecognizedFamily(code.to_string()));
    }
    let bytes = code.as_bytes();
    match bytes {
        [b'P', b'r' | b'p', b'-', ..] => decode_placement(code),
        [b'A', b'-', ..] => decode_aspect(code),
        [b'r', b'-', ..] => decode_ruler(code),
        [b'H', b'r' | b't', b'-', ..] => decode_transit(code),
        _ => Err(DecodeError::UnrecognizedFamily(code.to_string())),
    }
}

/// Decodes and renders in one step.
pub fn describe(code: &str) -> Result<String, DecodeError> {
    Ok(decode(code)?.describe(code))
}

/// Decodes a batch of codes independently: one bad code is logged and
/// skipped, never aborting the rest.
pub fn decode_corpus(codes: &[String]) -> (Vec<DecodedFact>, Vec<(String, DecodeError)>) {
    let mut facts = Vec::new();
    let mut failures = Vec::new();
    for code in codes {
        match decode(code) {
            Ok(fact) => facts.push(fact),
            Err(err) => {
                warn!(code = %code, error = %err, "skipping undecodable reference code");
                failures.push((code.clone(), err));
            }
        }
    }
    (facts, failures)
}

fn expect_len(code: &str, family: &'static str, expected: usize) -> Result<(), DecodeError> {
    if code.len() != expected {
        return Err(DecodeError::MalformedLength {
            family,
            expected,
            found: code.len(),
        });
    }
    Ok(())
}

fn body_field(token: &str, field: &'static str) -> Result<CelestialBody, DecodeError> {
    CelestialBody::from_code(token).ok_or_else(|| DecodeError::UnknownField {
        field,
        token: token.to_string(),
    })
}

fn sign_field(token: &str, field: &'static str) -> Result<ZodiacSign, DecodeError> {
    ZodiacSign::from_code(token).ok_or_else(|| DecodeError::UnknownField {
        field,
        token: token.to_string(),
    })
}

fn house_field(token: &str, field: &'static str) -> Result<House, DecodeError> {
    House::from_code(token).ok_or_else(|| DecodeError::UnknownField {
        field,
        token: token.to_string(),
    })
}

fn decode_placement(code: &str) -> Result<DecodedFact, DecodeError> {
    expect_len(code, "placement", 9)?;
    Ok(DecodedFact::Placement(PlacementFact {
        is_retrograde: &code[1..2] == "r",
        body: body_field(&code[3..5], "planet")?,
        sign: sign_field(&code[5..7], "sign")?,
        house: house_field(&code[7..9], "house")?,
    }))
}

fn decode_aspect(code: &str) -> Result<DecodedFact, DecodeError> {
    expect_len(code, "aspect", 13)?;
    Ok(DecodedFact::Aspect(AspectFact {
        body_a: body_field(&code[2..4], "first planet")?,
        orb_class: OrbClass::from_code(&code[4..5]).ok_or_else(|| DecodeError::UnknownField {
            field: "orb class",
            token: code[4..5].to_string(),
        })?,
        aspect: AspectType::from_code(&code[5..7]).ok_or_else(|| DecodeError::UnknownField {
            field: "aspect type",
            token: code[5..7].to_string(),
        })?,
        body_b: body_field(&code[7..9], "second planet")?,
        sign_b: sign_field(&code[9..11], "sign")?,
        house_b: house_field(&code[11..13], "house")?,
    }))
}

fn decode_ruler(code: &str) -> Result<DecodedFact, DecodeError> {
    expect_len(code, "house-ruler", 12)?;
    Ok(DecodedFact::HouseRuler(HouseRulerFact {
        ruler: body_field(&code[2..4], "ruler planet")?,
        cusp_sign: sign_field(&code[4..6], "cusp sign")?,
        ruled_house: house_field(&code[6..8], "ruled house")?,
        ruler_sign: sign_field(&code[8..10], "occupant sign")?,
        ruler_house: house_field(&code[10..12], "occupant house")?,
    }))
}

fn decode_transit(code: &str) -> Result<DecodedFact, DecodeError> {
    expect_len(code, "house-transit", 11)?;
    Ok(DecodedFact::HouseTransit(HouseTransitFact {
        is_retrograde: &code[1..2] == "r",
        body: body_field(&code[3..5], "planet")?,
        sign_boundary: BoundaryTag::from_code(&code[5..6]).ok_or_else(|| {
            DecodeError::UnknownField {
                field: "sign boundary",
                token: code[5..6].to_string(),
            }
        })?,
        sign: sign_field(&code[6..8], "sign")?,
        house_boundary: BoundaryTag::from_code(&code[8..9]).ok_or_else(|| {
            DecodeError::UnknownField {
                field: "house boundary",
                token: code[8..9].to_string(),
            }
        })?,
        house: house_field(&code[9..11], "house")?,
    }))
}

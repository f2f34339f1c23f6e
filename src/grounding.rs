//! Groundedness checking for generated chart readings.
//!
//! The generation collaborator is an external model reached over the
//! network; nothing it returns is shown to a user until every reference code
//! it cites is found in the chart's own grounding corpus. The retry gate is
//! bounded: a persistently hallucinating generator ends in a terminal error,
//! not an infinite loop.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::aspects::OrbProfile;
use crate::codes::{self, AspectFact, PlacementFact};
use crate::decode::DecodedFact;
use crate::{EncodeError, NatalChart};

// ---------------------------
// ## Generation Collaborator
// ---------------------------

#[derive(Debug, Error, PartialEq, Eq)]
#[error("text generation failed: {message}")]
pub struct GenerationError {
    pub message: String,
}

/// The external text-generation service. One call, one response, no implied
/// retry; cancellation and timeouts belong to the implementor's transport.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Error)]
pub enum GroundingError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("could not produce a grounded answer after {attempts} attempts")]
    Ungrounded {
        attempts: usize,
        offending: Vec<String>,
    },
}

// ---------------------------
// ## Grounding Corpus
// ---------------------------

/// The ordered list of natural-language facts a generated answer is allowed
/// to cite, each sentence ending with one parenthesized reference code.
/// Built once per chart and passed whole to the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingCorpus {
    sentences: Vec<String>,
}

impl GroundingCorpus {
    pub fn from_sentences(sentences: Vec<String>) -> GroundingCorpus {
        GroundingCorpus { sentences }
    }

    /// Runs the full pipeline for one chart: placement, aspect, and
    /// house-ruler facts, encoded and rendered in a stable order.
    pub fn build(chart: &NatalChart, profile: &OrbProfile) -> Result<GroundingCorpus, EncodeError> {
        let mut sentences = Vec::new();

        for position in &chart.positions {
            let fact = PlacementFact::from_position(position);
            let code = fact.encode()?;
            sentences.push(DecodedFact::Placement(fact).describe(&code));
        }

        for info in chart.aspects(profile) {
            // The second body came out of this chart, so its placement is
            // always present.
            if let Some(position_b) = chart.position(info.body_b) {
                let fact = AspectFact::from_aspect(&info, position_b);
                let code = fact.encode()?;
                sentences.push(DecodedFact::Aspect(fact).describe(&code));
            }
        }

        for fact in codes::house_rulers(chart) {
            let code = fact.encode()?;
            sentences.push(DecodedFact::HouseRuler(fact).describe(&code));
        }

        debug!(facts = sentences.len(), "built grounding corpus");
        Ok(GroundingCorpus { sentences })
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

// ---------------------------
// ## Validator
// ---------------------------

/// Extracts parenthesized citations and checks them against the corpus.
pub struct Validator {
    pattern: Regex,
}

impl Validator {
    pub fn new() -> Validator {
        Validator {
            pattern: Regex::new(r"\(([^()]+)\)").expect("citation pattern is well formed"),
        }
    }

    /// Every parenthesized substring in `text`, with any leading `ref:`
    /// marker stripped.
    pub fn extract_refs(&self, text: &str) -> Vec<String> {
        self.pattern
            .captures_iter(text)
            .map(|caps| {
                let inner = caps[1].trim();
                inner.strip_prefix("ref:").map(str::trim).unwrap_or(inner).to_string()
            })
            .collect()
    }

    /// Codes cited by `generated` that the corpus does not contain, in
    /// citation order.
    pub fn offending_codes(&self, generated: &str, corpus: &[String]) -> Vec<String> {
        let allowed: HashSet<String> = corpus
            .iter()
            .flat_map(|sentence| self.extract_refs(sentence))
            .collect();
        self.extract_refs(generated)
            .into_iter()
            .filter(|code| !allowed.contains(code))
            .collect()
    }

    /// True iff every code cited by `generated` appears in the corpus.
    pub fn validate(&self, generated: &str, corpus: &[String]) -> bool {
        let offending = self.offending_codes(generated, corpus);
        if !offending.is_empty() {
            warn!(?offending, "generated text cites codes outside the corpus");
            return false;
        }
        true
    }
}

impl Default for Validator {
    fn default() -> Self {
        Validator::new()
    }
}

// ---------------------------
// ## Retry Gate
// ---------------------------

/// Wraps the generation collaborator with groundedness validation and a hard
/// retry bound. Calls are serialized: one in-flight request per prompt, the
/// next attempt only after the previous response failed validation.
pub struct RetryGate<P> {
    provider: P,
    max_retries: usize,
    validator: Validator,
}

impl<P: GenerationProvider> RetryGate<P> {
    /// `max_retries` is the total number of generation calls allowed before
    /// giving up.
    pub fn new(provider: P, max_retries: usize) -> RetryGate<P> {
        RetryGate {
            provider,
            max_retries,
            validator: Validator::new(),
        }
    }

    /// First grounded response wins; after `max_retries` ungrounded
    /// responses the gate fails terminally rather than returning unverified
    /// text.
    pub async fn generate_grounded(
        &self,
        prompt: &str,
        corpus: &GroundingCorpus,
    ) -> Result<String, GroundingError> {
        let mut offending = Vec::new();
        for attempt in 1..=self.max_retries {
            let text = self.provider.generate(prompt).await?;
            offending = self.validator.offending_codes(&text, corpus.sentences());
            if offending.is_empty() {
                debug!(attempt, "generated text is grounded");
                return Ok(text);
            }
            warn!(
                attempt,
                max_retries = self.max_retries,
                ?offending,
                "generated text is ungrounded; retrying"
            );
        }
        Err(GroundingError::Ungrounded {
            attempts: self.max_retries,
            offending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CelestialBody, CelestialPosition, House, HouseCusp, ZodiacSign};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<&str>) -> ScriptedProvider {
            ScriptedProvider {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn repeating(response: &str) -> ScriptedProvider {
            ScriptedProvider::new(vec![response])
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            let response = responses
                .get(index)
                .or_else(|| responses.last())
                .cloned()
                .ok_or(GenerationError {
                    message: "no scripted response".to_string(),
                })?;
            Ok(response)
        }
    }

    fn chart() -> NatalChart {
        let cusps: Vec<HouseCusp> = House::all()
            .enumerate()
            .map(|(i, house)| HouseCusp {
                house,
                sign: ZodiacSign::from_longitude(i as f64 * 30.0),
                degree: i as f64 * 30.0,
            })
            .collect();
        let positions = vec![
            CelestialPosition::new(CelestialBody::Sun, 10.0, House::First, false),
            CelestialPosition::new(CelestialBody::Moon, 100.0, House::Fourth, false),
            CelestialPosition::new(CelestialBody::Mars, 192.0, House::Seventh, true),
        ];
        NatalChart::new(positions, cusps).unwrap()
    }

    #[test]
    fn extracts_refs_with_and_without_marker() {
        let validator = Validator::new();
        assert_eq!(
            validator.extract_refs("Mars sits in Libra (ref: Pr-040607) and (A-001205)."),
            vec!["Pr-040607".to_string(), "A-001205".to_string()]
        );
        assert!(validator.extract_refs("no citations here").is_empty());
    }

    #[test]
    fn membership_decides_validation() {
        let validator = Validator::new();
        let corpus = vec!["The Sun trines the Moon (A-001205)".to_string()];
        assert!(validator.validate("as shown (A-001205)", &corpus));
        assert!(!validator.validate("as shown (A-999999)", &corpus));
    }

    #[test]
    fn text_without_citations_is_trivially_grounded() {
        let validator = Validator::new();
        let corpus = vec!["Some fact (A-001205)".to_string()];
        assert!(validator.validate("a reading with no citations", &corpus));
    }

    #[test]
    fn corpus_sentences_each_carry_one_ref() {
        let corpus = GroundingCorpus::build(&chart(), &OrbProfile::natal()).unwrap();
        assert!(!corpus.is_empty());
        let validator = Validator::new();
        for sentence in corpus.sentences() {
            assert_eq!(
                validator.extract_refs(sentence).len(),
                1,
                "expected exactly one citation in {sentence:?}"
            );
        }
        // Sun at 10° and Moon at 100° are square; the corpus must know it.
        assert!(corpus
            .sentences()
            .iter()
            .any(|s| s.contains("Sun forms an exact square to Moon")));
    }

    #[tokio::test]
    async fn grounded_response_passes_on_first_attempt() {
        let corpus = GroundingCorpus::build(&chart(), &OrbProfile::natal()).unwrap();
        let code = Validator::new().extract_refs(&corpus.sentences()[0])[0].clone();
        let provider = ScriptedProvider::repeating(&format!("A fine reading ({code})"));
        let gate = RetryGate::new(provider, 3);
        let text = gate.generate_grounded("prompt", &corpus).await.unwrap();
        assert!(text.contains(&code));
        assert_eq!(gate.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn hallucination_then_recovery_takes_two_calls() {
        let corpus = GroundingCorpus::build(&chart(), &OrbProfile::natal()).unwrap();
        let good = Validator::new().extract_refs(&corpus.sentences()[0])[0].clone();
        let provider = ScriptedProvider::new(vec![
            "made up (A-999999)",
            &format!("grounded ({good})"),
        ]);
        let gate = RetryGate::new(provider, 3);
        let text = gate.generate_grounded("prompt", &corpus).await.unwrap();
        assert!(text.contains(&good));
        assert_eq!(gate.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn persistent_hallucination_stops_at_the_bound() {
        let corpus = GroundingCorpus::build(&chart(), &OrbProfile::natal()).unwrap();
        let provider = ScriptedProvider::repeating("still made up (A-999999)");
        let gate = RetryGate::new(provider, 4);
        let err = gate.generate_grounded("prompt", &corpus).await.unwrap_err();
        match err {
            GroundingError::Ungrounded { attempts, offending } => {
                assert_eq!(attempts, 4);
                assert_eq!(offending, vec!["A-999999".to_string()]);
            }
            other => panic!("expected Ungrounded, got {other:?}"),
        }
        assert_eq!(gate.provider.call_count(), 4);
    }

    #[tokio::test]
    async fn provider_failure_propagates_without_retry() {
        struct FailingProvider;

        #[async_trait]
        impl GenerationProvider for FailingProvider {
            async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
                Err(GenerationError {
                    message: "socket closed".to_string(),
                })
            }
        }

        let corpus = GroundingCorpus::from_sentences(vec!["fact (A-001205)".to_string()]);
        let gate = RetryGate::new(FailingProvider, 3);
        let err = gate.generate_grounded("prompt", &corpus).await.unwrap_err();
        assert!(matches!(err, GroundingError::Generation(_)));
    }
}

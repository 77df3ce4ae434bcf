// Outcome oracle: asks an LLM judge who won, and falls back to a local
// ELO-weighted roll whenever the judge cannot produce a usable verdict.
//
// Callers never see an oracle error; `decide_outcome` always resolves.

pub mod client;
pub mod decode;
pub mod fallback;
pub mod prompt;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::metrics;
use crate::models::Character;
use decode::{Decode, Verdict, VerdictWinner};

pub use client::{LlmClient, LlmConfig};

/// Side of the oracle call, relative to its argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Character1,
    Character2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeSource {
    Oracle,
    Fallback,
}

/// Resolved battle. On a draw `winner` is only a nominal bookkeeping side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleOutcome {
    pub winner: Side,
    pub is_draw: bool,
    pub narrative: String,
    pub source: OutcomeSource,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("judge returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("judge returned no generated text")]
    EmptyResponse,
}

/// Text generator behind the oracle.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

pub struct OutcomeOracle {
    judge: Option<Arc<dyn Judge>>,
    timeout: Duration,
    seeded: Option<Mutex<StdRng>>,
}

impl OutcomeOracle {
    pub fn new(judge: Arc<dyn Judge>, timeout: Duration) -> Self {
        Self {
            judge: Some(judge),
            timeout,
            seeded: None,
        }
    }

    /// Oracle with no judge configured: every battle uses the local roll.
    pub fn fallback_only() -> Self {
        Self {
            judge: None,
            timeout: DEFAULT_TIMEOUT,
            seeded: None,
        }
    }

    /// Draw local rolls from a seeded generator instead of the thread rng,
    /// making fallback verdicts reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seeded = Some(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub async fn decide_outcome(&self, c1: &Character, c2: &Character) -> BattleOutcome {
        let Some(judge) = &self.judge else {
            return self.fallback(c1, c2, "disabled");
        };

        let prompt = prompt::build_prompt(c1, c2);
        let started = Instant::now();
        let reply = tokio::time::timeout(self.timeout, judge.generate(&prompt)).await;
        metrics::ORACLE_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

        let text = match reply {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, c1 = %c1.id, c2 = %c2.id, "Oracle call failed, using fallback");
                return self.fallback(c1, c2, "transport");
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, c1 = %c1.id, c2 = %c2.id, "Oracle call timed out, using fallback");
                return self.fallback(c1, c2, "timeout");
            }
        };

        match decode::decode_verdict(&text) {
            Decode::Decoded(verdict) => {
                metrics::ORACLE_VERDICTS_TOTAL.inc();
                match &self.seeded {
                    Some(rng) => {
                        let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
                        into_outcome(verdict, &mut *rng)
                    }
                    None => into_outcome(verdict, &mut rand::thread_rng()),
                }
            }
            Decode::Failure(reason) => {
                tracing::warn!(%reason, c1 = %c1.id, c2 = %c2.id, "Undecodable oracle verdict, using fallback");
                self.fallback(c1, c2, "decode")
            }
        }
    }

    fn fallback(&self, c1: &Character, c2: &Character, reason: &str) -> BattleOutcome {
        metrics::ORACLE_FALLBACKS_TOTAL
            .with_label_values(&[reason])
            .inc();
        match &self.seeded {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
                fallback::decide(c1, c2, &mut *rng)
            }
            None => fallback::decide(c1, c2, &mut rand::thread_rng()),
        }
    }
}

/// A `draw` verdict gets a random nominal winner; draw scoring is symmetric.
fn into_outcome<R: Rng>(verdict: Verdict, rng: &mut R) -> BattleOutcome {
    let winner = match verdict.winner {
        VerdictWinner::Character1 => Side::Character1,
        VerdictWinner::Character2 => Side::Character2,
        VerdictWinner::Draw => {
            if rng.gen_bool(0.5) {
                Side::Character1
            } else {
                Side::Character2
            }
        }
    };
    BattleOutcome {
        winner,
        is_draw: verdict.is_draw,
        narrative: verdict.narrative,
        source: OutcomeSource::Oracle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::League;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct FixedJudge(&'static str);

    #[async_trait]
    impl Judge for FixedJudge {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingJudge;

    #[async_trait]
    impl Judge for FailingJudge {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            Err(OracleError::Status {
                status: 503,
                body: "overloaded".into(),
            })
        }
    }

    struct SlowJudge;

    #[async_trait]
    impl Judge for SlowJudge {
        async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(r#"{"winner": "character1", "narrative": "too late"}"#.into())
        }
    }

    fn pair() -> (Character, Character) {
        (
            Character::new("0xa", "Ember Witch", "throws fire", League::General, 1),
            Character::new("0xb", "Tide Knight", "commands water", League::General, 2),
        )
    }

    #[tokio::test]
    async fn test_oracle_verdict_is_used() {
        let (a, b) = pair();
        let oracle = OutcomeOracle::new(
            Arc::new(FixedJudge(
                "```json\n{\"winner\": \"character2\", \"narrative\": \"The tide rose.\"}\n```",
            )),
            DEFAULT_TIMEOUT,
        );
        let outcome = oracle.decide_outcome(&a, &b).await;
        assert_eq!(outcome.source, OutcomeSource::Oracle);
        assert_eq!(outcome.winner, Side::Character2);
        assert!(!outcome.is_draw);
        assert_eq!(outcome.narrative, "The tide rose.");
    }

    #[tokio::test]
    async fn test_oracle_draw_is_normalized() {
        let (a, b) = pair();
        let oracle = OutcomeOracle::new(
            Arc::new(FixedJudge(r#"{"winner": "draw", "narrative": "Even."}"#)),
            DEFAULT_TIMEOUT,
        );
        let outcome = oracle.decide_outcome(&a, &b).await;
        assert_eq!(outcome.source, OutcomeSource::Oracle);
        assert!(outcome.is_draw);
    }

    #[tokio::test]
    async fn test_transport_error_falls_back() {
        let (a, b) = pair();
        let oracle = OutcomeOracle::new(Arc::new(FailingJudge), DEFAULT_TIMEOUT);
        let outcome = oracle.decide_outcome(&a, &b).await;
        assert_eq!(outcome.source, OutcomeSource::Fallback);
        assert!(outcome.narrative.contains("Ember Witch"));
    }

    #[tokio::test]
    async fn test_garbage_falls_back() {
        let (a, b) = pair();
        let oracle = OutcomeOracle::new(
            Arc::new(FixedJudge("I refuse to judge this battle.")),
            DEFAULT_TIMEOUT,
        );
        let outcome = oracle.decide_outcome(&a, &b).await;
        assert_eq!(outcome.source, OutcomeSource::Fallback);
    }

    #[tokio::test]
    async fn test_hanging_judge_times_out() {
        let (a, b) = pair();
        let oracle = OutcomeOracle::new(Arc::new(SlowJudge), Duration::from_millis(50));
        let outcome = oracle.decide_outcome(&a, &b).await;
        assert_eq!(outcome.source, OutcomeSource::Fallback);
    }

    #[tokio::test]
    async fn test_no_judge_uses_fallback() {
        let (a, b) = pair();
        let outcome = OutcomeOracle::fallback_only().decide_outcome(&a, &b).await;
        assert_eq!(outcome.source, OutcomeSource::Fallback);
    }

    #[tokio::test]
    async fn test_seeded_fallback_is_reproducible() {
        let (a, b) = pair();
        let oracle = OutcomeOracle::fallback_only().with_seed(42);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..8 {
            let expected = fallback::decide(&a, &b, &mut rng);
            assert_eq!(oracle.decide_outcome(&a, &b).await, expected);
        }
    }

    #[test]
    fn test_draw_nominal_winner_covers_both_sides() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let outcome = into_outcome(
                Verdict {
                    winner: VerdictWinner::Draw,
                    is_draw: true,
                    narrative: "Even.".into(),
                },
                &mut rng,
            );
            assert!(outcome.is_draw);
            seen.insert(outcome.winner);
        }
        assert_eq!(seen.len(), 2);
    }
}

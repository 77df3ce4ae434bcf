// Elo rating calculation for 1v1 battles.
//
// Ratings are whole numbers. Every update rounds half away from zero
// (`f64::round`), so 1000 vs 1000 moves by exactly 16 with K=32.

use serde::{Deserialize, Serialize};

pub const STARTING_ELO: i32 = 1000;
pub const K_FACTOR: i32 = 32;

/// Fraction of the rating lost when a character's traits are rewritten.
pub const TRAIT_UPDATE_PENALTY: f64 = 0.10;

/// Battle outcome from the perspective of one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Loss => 0.0,
        }
    }
}

/// Calculate expected score for player A against player B.
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) as f64 / 400.0))
}

/// Compute both post-battle ratings.
///
/// `winner_rating` is the nominal winner's rating. On a draw the roles only
/// fix the order of the returned pair; both sides are scored at 0.5.
pub fn compute_updated_ratings(
    winner_rating: i32,
    loser_rating: i32,
    is_draw: bool,
    k_factor: i32,
) -> (i32, i32) {
    let k = k_factor as f64;
    let expected_winner = expected_score(winner_rating, loser_rating);
    let expected_loser = 1.0 - expected_winner;

    let (winner_outcome, loser_outcome) = if is_draw {
        (Outcome::Draw, Outcome::Draw)
    } else {
        (Outcome::Win, Outcome::Loss)
    };

    let new_winner = winner_rating as f64 + k * (winner_outcome.score() - expected_winner);
    let new_loser = loser_rating as f64 + k * (loser_outcome.score() - expected_loser);
    (new_winner.round() as i32, new_loser.round() as i32)
}

/// Rating after a trait rewrite.
pub fn apply_trait_penalty(rating: i32) -> i32 {
    (rating as f64 * (1.0 - TRAIT_UPDATE_PENALTY)).round() as i32
}

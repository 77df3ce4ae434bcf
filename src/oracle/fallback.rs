// Local battle resolution used whenever the judge cannot give a verdict.
//
// One uniform roll decides everything: the lowest 15% is a draw, the rest is
// rescaled to [0, 1) and compared against the ELO-implied win chance.

use rand::Rng;

use super::{BattleOutcome, OutcomeSource, Side};
use crate::elo;
use crate::models::Character;

pub const DRAW_BAND: f64 = 0.15;

const TRAIT_EXCERPT_CHARS: usize = 120;

pub fn decide<R: Rng>(c1: &Character, c2: &Character, rng: &mut R) -> BattleOutcome {
    decide_with_roll(c1, c2, rng.gen::<f64>())
}

pub fn decide_with_roll(c1: &Character, c2: &Character, roll: f64) -> BattleOutcome {
    let p1 = elo::expected_score(c1.elo, c2.elo);

    if roll < DRAW_BAND {
        return BattleOutcome {
            winner: Side::Character1,
            is_draw: true,
            narrative: draw_narrative(c1, c2),
            source: OutcomeSource::Fallback,
        };
    }

    let scaled = (roll - DRAW_BAND) / (1.0 - DRAW_BAND);
    let (winner, narrative) = if scaled < p1 {
        (Side::Character1, win_narrative(c1, c2))
    } else {
        (Side::Character2, win_narrative(c2, c1))
    };
    BattleOutcome {
        winner,
        is_draw: false,
        narrative,
        source: OutcomeSource::Fallback,
    }
}

fn excerpt(traits: &str) -> String {
    let traits = traits.trim();
    if traits.chars().count() <= TRAIT_EXCERPT_CHARS {
        return traits.to_string();
    }
    let cut: String = traits.chars().take(TRAIT_EXCERPT_CHARS).collect();
    format!("{}...", cut.trim_end())
}

fn win_narrative(winner: &Character, loser: &Character) -> String {
    format!(
        "{} ({}) pressed the advantage against {} ({}) and claimed victory in a hard-fought clash.",
        winner.name,
        excerpt(&winner.traits),
        loser.name,
        excerpt(&loser.traits)
    )
}

fn draw_narrative(c1: &Character, c2: &Character) -> String {
    format!(
        "{} ({}) and {} ({}) traded blow for blow until neither could claim the field. The battle ends in a draw.",
        c1.name,
        excerpt(&c1.traits),
        c2.name,
        excerpt(&c2.traits)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::League;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pair(elo1: i32, elo2: i32) -> (Character, Character) {
        let mut a = Character::new("0xa", "Ember Witch", "throws fire", League::General, 1);
        let mut b = Character::new("0xb", "Tide Knight", "commands water", League::General, 2);
        a.elo = elo1;
        b.elo = elo2;
        (a, b)
    }

    #[test]
    fn test_roll_bands_at_equal_elo() {
        let (a, b) = pair(1000, 1000);

        let draw = decide_with_roll(&a, &b, 0.10);
        assert!(draw.is_draw);
        assert_eq!(draw.source, OutcomeSource::Fallback);

        // (0.5 - 0.15) / 0.85 = 0.41 < 0.5
        let first = decide_with_roll(&a, &b, 0.5);
        assert!(!first.is_draw);
        assert_eq!(first.winner, Side::Character1);

        // (0.6 - 0.15) / 0.85 = 0.53 >= 0.5
        let second = decide_with_roll(&a, &b, 0.6);
        assert_eq!(second.winner, Side::Character2);
    }

    #[test]
    fn test_narratives_mention_both_characters() {
        let (a, b) = pair(1000, 1000);
        for roll in [0.0, 0.3, 0.99] {
            let outcome = decide_with_roll(&a, &b, roll);
            assert!(outcome.narrative.contains("Ember Witch"));
            assert!(outcome.narrative.contains("Tide Knight"));
            assert!(outcome.narrative.contains("throws fire"));
            assert!(outcome.narrative.contains("commands water"));
        }
    }

    #[test]
    fn test_long_traits_are_excerpted() {
        let long = "x".repeat(500);
        let e = excerpt(&long);
        assert_eq!(e.chars().count(), TRAIT_EXCERPT_CHARS + 3);
        assert!(e.ends_with("..."));
    }

    #[test]
    fn test_equal_elo_rates_converge() {
        let (a, b) = pair(1000, 1000);
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 20_000;
        let (mut draws, mut first, mut second) = (0, 0, 0);
        for _ in 0..trials {
            let o = decide(&a, &b, &mut rng);
            match (o.is_draw, o.winner) {
                (true, _) => draws += 1,
                (false, Side::Character1) => first += 1,
                (false, Side::Character2) => second += 1,
            }
        }
        let draw_rate = draws as f64 / trials as f64;
        let decisive_share = first as f64 / (first + second) as f64;
        assert!((draw_rate - 0.15).abs() < 0.02, "draw rate {draw_rate}");
        assert!((decisive_share - 0.5).abs() < 0.02, "character1 share {decisive_share}");
    }

    #[test]
    fn test_stronger_side_wins_more_often() {
        let (a, b) = pair(1400, 1000);
        let mut rng = StdRng::seed_from_u64(11);
        let wins = (0..10_000)
            .map(|_| decide(&a, &b, &mut rng))
            .filter(|o| !o.is_draw && o.winner == Side::Character1)
            .count();
        // expected share of decisive battles is 0.909, of all battles 0.773
        let rate = wins as f64 / 10_000.0;
        assert!(rate > 0.72 && rate < 0.82, "win rate {rate}");
    }
}

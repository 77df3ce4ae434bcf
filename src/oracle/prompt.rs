// Prompt building for battle judgement.

use crate::models::Character;

/// ELO-implied chance that `elo1` beats `elo2`, softened for use as advisory
/// context in the prompt. The resolution itself uses the 400-point scale.
pub fn advisory_win_probability(elo1: i32, elo2: i32) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf(-((elo1 - elo2) as f64) / 1500.0))
}

/// Build the judging prompt for `character1` vs `character2`.
///
/// The model is asked to answer with a single JSON object so the reply can be
/// decoded by `decode::decode_verdict`.
pub fn build_prompt(character1: &Character, character2: &Character) -> String {
    let p1 = advisory_win_probability(character1.elo, character2.elo) * 100.0;
    let p2 = 100.0 - p1;
    format!(
        "You are the judge of a text battle between two characters.\n\n\
         Character 1: {name1}\n\
         Traits: {traits1}\n\
         ELO: {elo1}\n\n\
         Character 2: {name2}\n\
         Traits: {traits2}\n\
         ELO: {elo2}\n\n\
         Based on ELO alone, Character 1 would win about {p1:.1}% of the time \
         and Character 2 about {p2:.1}%.\n\n\
         Instructions:\n\
         Decide who wins. Weigh the characters' traits and how they would \
         play out against each other above raw ELO; use ELO only to break a \
         close call. A draw is allowed when neither side has an edge.\n\
         Reply with only a JSON object of this shape:\n\
         {{\"winner\": \"character1\" | \"character2\" | \"draw\", \
         \"narrative\": \"2-4 sentences describing the battle\", \
         \"isDraw\": true | false}}\n",
        name1 = character1.name,
        traits1 = character1.traits,
        elo1 = character1.elo,
        name2 = character2.name,
        traits2 = character2.traits,
        elo2 = character2.elo,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::League;

    #[test]
    fn test_advisory_probability() {
        assert!((advisory_win_probability(1000, 1000) - 0.5).abs() < 1e-9);
        // 1/(1+10^(-300/1500)) = 0.6131
        assert!((advisory_win_probability(1300, 1000) - 0.6131).abs() < 1e-3);
        let sum = advisory_win_probability(1100, 900) + advisory_win_probability(900, 1100);
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_prompt_contains_both_sides() {
        let mut a = Character::new("0xa", "Ember Witch", "throws fire", League::General, 1);
        a.elo = 1300;
        let b = Character::new("0xb", "Tide Knight", "commands water", League::General, 2);

        let prompt = build_prompt(&a, &b);
        assert!(prompt.contains("Character 1: Ember Witch"));
        assert!(prompt.contains("Traits: throws fire"));
        assert!(prompt.contains("ELO: 1300"));
        assert!(prompt.contains("Character 2: Tide Knight"));
        assert!(prompt.contains("Traits: commands water"));
        assert!(prompt.contains("about 61.3%"));
        assert!(prompt.contains("\"winner\""));
        assert!(prompt.contains("\"narrative\""));
    }
}

// Key layout shared by every store backend.

use crate::models::League;

pub const ALL_CHARACTERS: &str = "characters:all";
pub const GLOBAL_RANKING: &str = "rankings:global";

pub fn character(id: &str) -> String {
    format!("character:{id}")
}

pub fn owner_characters(owner: &str) -> String {
    format!("user:{owner}:characters")
}

pub fn league_ranking(league: League) -> String {
    format!("rankings:league:{}", league.as_str())
}

pub fn cooldown(character_id: &str) -> String {
    format!("cooldown:{character_id}")
}

/// Battle ids already carry the `battle:` prefix and double as keys.
pub fn battle(battle_id: &str) -> String {
    battle_id.to_string()
}

pub fn character_battles(character_id: &str) -> String {
    format!("character:{character_id}:battles")
}

pub fn owner_battles(owner: &str) -> String {
    format!("user:{owner}:battles")
}

pub fn rate_limit(kind: &str, owner: &str, window: i64) -> String {
    format!("ratelimit:{kind}:{owner}:{window}")
}

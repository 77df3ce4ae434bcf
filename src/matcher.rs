// Opponent selection by ELO proximity over the global ranking index.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::Character;
use crate::store::{keys, RankingStore, StoreResult};

/// Half-width of the preferred ELO window, inclusive on both ends.
pub const ELO_WINDOW: i32 = 200;

/// Ids the querying character may never be matched against.
pub struct Exclusions<'a> {
    character_id: &'a str,
    owner_prefix: String,
    owned: &'a HashSet<String>,
}

impl<'a> Exclusions<'a> {
    pub fn new(character: &'a Character, owned: &'a HashSet<String>) -> Self {
        Self {
            character_id: &character.id,
            owner_prefix: format!("{}_", character.owner),
            owned,
        }
    }

    pub fn allows(&self, id: &str) -> bool {
        id != self.character_id && !self.owned.contains(id) && !id.starts_with(&self.owner_prefix)
    }
}

/// Uniform pick among the in-window candidates that pass `exclusions`.
pub fn pick_in_window<R: Rng>(
    window: &[(String, f64)],
    exclusions: &Exclusions<'_>,
    rng: &mut R,
) -> Option<String> {
    let eligible: Vec<&String> = window
        .iter()
        .map(|(id, _)| id)
        .filter(|id| exclusions.allows(id))
        .collect();
    eligible.choose(rng).map(|id| (*id).clone())
}

/// Closest-by-ELO candidate over the whole index. `index` must be in ascending
/// score order; the first of several equally close candidates wins.
pub fn pick_closest(index: &[(String, f64)], elo: i32, exclusions: &Exclusions<'_>) -> Option<String> {
    let mut best: Option<(&String, f64)> = None;
    for (id, score) in index {
        if !exclusions.allows(id) {
            continue;
        }
        let diff = (score - f64::from(elo)).abs();
        if best.map_or(true, |(_, d)| diff < d) {
            best = Some((id, diff));
        }
    }
    best.map(|(id, _)| id.clone())
}

/// Select an opponent for `character`, or `None` when the index holds no
/// eligible character at all.
pub async fn find_opponent(
    store: &dyn RankingStore,
    character: &Character,
) -> StoreResult<Option<String>> {
    let owned: HashSet<String> = store
        .smembers(&keys::owner_characters(&character.owner))
        .await?
        .into_iter()
        .collect();
    let exclusions = Exclusions::new(character, &owned);

    let low = f64::from(character.elo - ELO_WINDOW);
    let high = f64::from(character.elo + ELO_WINDOW);
    let window = store
        .zrange_by_score(keys::GLOBAL_RANKING, low, high)
        .await?;
    let picked = pick_in_window(&window, &exclusions, &mut rand::thread_rng());
    if picked.is_some() {
        return Ok(picked);
    }

    let index = store
        .zrange_with_scores(keys::GLOBAL_RANKING, 0, -1)
        .await?;
    let closest = pick_closest(&index, character.elo, &exclusions);
    if let Some(ref id) = closest {
        tracing::debug!(character = %character.id, opponent = %id, "No opponent in window, using closest");
    }
    Ok(closest)
}

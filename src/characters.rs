// Character registry: creation, reads, trait updates, deletion cascade,
// leaderboards and ranking index reconciliation.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::elo;
use crate::error::{ArenaError, ArenaResult};
use crate::metrics;
use crate::models::{normalize_owner, Battle, Character, League, Provider};
use crate::store::{keys, RankingStore, StoreResult};

pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_TRAITS_CHARS: usize = 1000;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;
pub const MAX_LEADERBOARD_LIMIT: usize = 200;

pub async fn load_character(
    store: &dyn RankingStore,
    id: &str,
) -> StoreResult<Option<Character>> {
    let key = keys::character(id);
    let hash = store.hget_all(&key).await?;
    Character::from_hash(&key, &hash)
}

/// Ranking indexes a character is always written to: global, its own league,
/// and `general`. `with_genesis` adds the legacy mirror.
pub fn ranking_keys(character: &Character, with_genesis: bool) -> Vec<String> {
    let mut leagues = vec![character.league, League::General];
    if with_genesis {
        leagues.push(League::Genesis);
    }
    let mut out = vec![keys::GLOBAL_RANKING.to_string()];
    for league in leagues {
        let key = keys::league_ranking(league);
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

fn validate_name(name: &str) -> ArenaResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(ArenaError::Validation(format!(
            "name must be 1-{MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_traits(traits: &str) -> ArenaResult<String> {
    let traits = traits.trim();
    let len = traits.chars().count();
    if len == 0 || len > MAX_TRAITS_CHARS {
        return Err(ArenaError::Validation(format!(
            "traits must be 1-{MAX_TRAITS_CHARS} characters"
        )));
    }
    Ok(traits.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCharacter {
    /// 1-based position in the index the character was read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    #[serde(flatten)]
    pub character: Character,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub checked: usize,
    pub rescored: usize,
    pub pruned: usize,
}

#[derive(Clone)]
pub struct CharacterRegistry {
    store: Arc<dyn RankingStore>,
}

impl CharacterRegistry {
    pub fn new(store: Arc<dyn RankingStore>) -> Self {
        Self { store }
    }

    pub async fn create_character(
        &self,
        owner: &str,
        provider: Provider,
        name: &str,
        traits: &str,
        league: Option<&str>,
    ) -> ArenaResult<Character> {
        let name = validate_name(name)?;
        let traits = validate_traits(traits)?;
        let league = match league.map(str::trim).filter(|l| !l.is_empty()) {
            Some(raw) => raw.parse::<League>().map_err(ArenaError::Validation)?,
            None => League::default_for(provider),
        };

        let owner = normalize_owner(owner);
        if owner.is_empty() {
            return Err(ArenaError::Validation("owner is required".into()));
        }

        // Same owner, same millisecond: bump until the id is free.
        let mut created_at = chrono::Utc::now().timestamp_millis();
        let character = loop {
            let candidate = Character::new(&owner, &name, &traits, league, created_at);
            if !self.store.exists(&keys::character(&candidate.id)).await? {
                break candidate;
            }
            created_at += 1;
        };

        self.store
            .hset_all(&keys::character(&character.id), &character.to_hash())
            .await?;
        self.store
            .sadd(keys::ALL_CHARACTERS, &character.id)
            .await?;
        self.store
            .sadd(&keys::owner_characters(&owner), &character.id)
            .await?;
        for key in ranking_keys(&character, false) {
            self.store
                .zadd(&key, &character.id, f64::from(character.elo))
                .await?;
        }

        metrics::CHARACTERS_CREATED_TOTAL.inc();
        tracing::info!(id = %character.id, %owner, league = %league, "Character created");
        Ok(character)
    }

    /// Character with its global rank.
    pub async fn get_character(&self, id: &str) -> ArenaResult<RankedCharacter> {
        let character = load_character(self.store.as_ref(), id)
            .await?
            .ok_or(ArenaError::CharacterNotFound)?;
        let rank = self
            .store
            .zrevrank(keys::GLOBAL_RANKING, &character.id)
            .await?
            .map(|r| r + 1);
        Ok(RankedCharacter { rank, character })
    }

    /// Characters owned by `owner`, highest ELO first.
    pub async fn list_characters(&self, owner: &str) -> ArenaResult<Vec<Character>> {
        let ids = self
            .store
            .smembers(&keys::owner_characters(&normalize_owner(owner)))
            .await?;
        let store = self.store.as_ref();
        let loaded = join_all(ids.iter().map(|id| load_character(store, id))).await;

        let mut characters = Vec::with_capacity(loaded.len());
        for result in loaded {
            if let Some(c) = result? {
                characters.push(c);
            }
        }
        characters.sort_by(|a, b| b.elo.cmp(&a.elo).then_with(|| a.id.cmp(&b.id)));
        Ok(characters)
    }

    async fn owned_character(&self, owner: &str, id: &str) -> ArenaResult<Character> {
        let character = load_character(self.store.as_ref(), id.trim())
            .await?
            .ok_or(ArenaError::CharacterNotFound)?;
        if character.owner != normalize_owner(owner) {
            return Err(ArenaError::Forbidden);
        }
        Ok(character)
    }

    /// Replace a character's traits. Costs a fixed share of its ELO, which is
    /// rewritten into every index holding the character.
    pub async fn update_traits(&self, owner: &str, id: &str, traits: &str) -> ArenaResult<Character> {
        let traits = validate_traits(traits)?;
        let mut character = self.owned_character(owner, id).await?;
        let previous_elo = character.elo;
        character.traits = traits;
        character.elo = elo::apply_trait_penalty(character.elo);

        self.store
            .hset_all(&keys::character(&character.id), &character.to_hash())
            .await?;

        let mut targets: Vec<String> = ranking_keys(&character, false);
        let genesis = keys::league_ranking(League::Genesis);
        if !targets.contains(&genesis)
            && self.store.zscore(&genesis, &character.id).await?.is_some()
        {
            targets.push(genesis);
        }
        for key in targets {
            self.store
                .zadd(&key, &character.id, f64::from(character.elo))
                .await?;
        }

        tracing::info!(
            id = %character.id,
            previous_elo,
            elo = character.elo,
            "Character traits updated"
        );
        Ok(character)
    }

    /// Delete a character and everything hanging off it. Index removals run
    /// first so the matcher stops offering it as early as possible.
    pub async fn delete_character(&self, owner: &str, id: &str) -> ArenaResult<()> {
        let character = self.owned_character(owner, id).await?;
        let id = character.id.as_str();

        self.store.zrem(keys::GLOBAL_RANKING, id).await?;
        for league in League::ALL {
            self.store.zrem(&keys::league_ranking(league), id).await?;
        }
        self.store.srem(keys::ALL_CHARACTERS, id).await?;
        self.store
            .srem(&keys::owner_characters(&character.owner), id)
            .await?;
        self.store.del(&keys::cooldown(id)).await?;

        let history_key = keys::character_battles(id);
        let owner_history = keys::owner_battles(&character.owner);
        let battle_ids = self.store.lrange(&history_key, 0, -1).await?;
        for battle_id in &battle_ids {
            self.unlink_battle(id, battle_id).await?;
            self.store.lrem(&owner_history, battle_id).await?;
        }
        self.store.del(&history_key).await?;
        self.store.del(&keys::character(id)).await?;

        metrics::CHARACTERS_DELETED_TOTAL.inc();
        tracing::info!(%id, battles = battle_ids.len(), "Character deleted");
        Ok(())
    }

    /// Drop a battle record and its id from the other side's history lists:
    /// the opponent's list and, when the deleted character was matched
    /// against, the initiating owner's list.
    async fn unlink_battle(&self, deleted_id: &str, battle_id: &str) -> StoreResult<()> {
        let key = keys::battle(battle_id);
        let hash = self.store.hget_all(&key).await?;
        let battle = Battle::from_hash(&key, &hash).unwrap_or_else(|e| {
            tracing::warn!(battle = %battle_id, error = %e, "Unreadable battle record, deleting without unlinking");
            None
        });
        if let Some(battle) = battle {
            let other = if battle.character1 == deleted_id {
                &battle.character2
            } else {
                &battle.character1
            };
            self.store
                .lrem(&keys::character_battles(other), battle_id)
                .await?;
            if battle.character2 == deleted_id {
                let initiator = load_character(self.store.as_ref(), &battle.character1).await?;
                if let Some(initiator) = initiator {
                    self.store
                        .lrem(&keys::owner_battles(&initiator.owner), battle_id)
                        .await?;
                }
            }
        }
        self.store.del(&key).await
    }

    /// Top characters of a league, or of the global index when `league` is `None`.
    pub async fn leaderboard(
        &self,
        league: Option<League>,
        limit: Option<usize>,
    ) -> ArenaResult<Vec<RankedCharacter>> {
        let limit = limit
            .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
            .clamp(1, MAX_LEADERBOARD_LIMIT);
        let key = match league {
            Some(l) => keys::league_ranking(l),
            None => keys::GLOBAL_RANKING.to_string(),
        };

        let entries = self
            .store
            .zrevrange_with_scores(&key, 0, limit as isize - 1)
            .await?;
        let store = self.store.as_ref();
        let loaded = join_all(entries.iter().map(|(id, _)| load_character(store, id))).await;

        let mut board = Vec::with_capacity(loaded.len());
        for (position, result) in loaded.into_iter().enumerate() {
            if let Some(character) = result? {
                board.push(RankedCharacter {
                    rank: Some(position as u64 + 1),
                    character,
                });
            }
        }
        Ok(board)
    }

    /// Bring every ranking index back in line with the character hashes:
    /// rescore divergent entries and prune members whose hash is gone.
    pub async fn reconcile_indexes(&self) -> ArenaResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let genesis = keys::league_ranking(League::Genesis);
        let mut live: HashSet<String> = HashSet::new();

        for id in self.store.smembers(keys::ALL_CHARACTERS).await? {
            report.checked += 1;
            let Some(character) = load_character(self.store.as_ref(), &id).await? else {
                self.store.srem(keys::ALL_CHARACTERS, &id).await?;
                report.pruned += 1;
                continue;
            };

            let in_genesis = self.store.zscore(&genesis, &id).await?.is_some();
            let elo = f64::from(character.elo);
            for key in ranking_keys(&character, in_genesis) {
                if self.store.zscore(&key, &id).await? != Some(elo) {
                    self.store.zadd(&key, &id, elo).await?;
                    report.rescored += 1;
                }
            }
            live.insert(id);
        }

        let mut indexes = vec![keys::GLOBAL_RANKING.to_string()];
        indexes.extend(League::ALL.into_iter().map(keys::league_ranking));
        for key in indexes {
            for (member, _) in self.store.zrange_with_scores(&key, 0, -1).await? {
                if live.contains(&member) {
                    continue;
                }
                if !self.store.exists(&keys::character(&member)).await? {
                    self.store.zrem(&key, &member).await?;
                    report.pruned += 1;
                }
            }
        }

        metrics::INDEX_REPAIRS_TOTAL
            .with_label_values(&["rescored"])
            .inc_by(report.rescored as u64);
        metrics::INDEX_REPAIRS_TOTAL
            .with_label_values(&["pruned"])
            .inc_by(report.pruned as u64);
        tracing::info!(
            checked = report.checked,
            rescored = report.rescored,
            pruned = report.pruned,
            "Ranking indexes reconciled"
        );
        Ok(report)
    }
}

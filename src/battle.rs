// Battle orchestration: cooldown claim, opponent selection, oracle verdict,
// rating update and the persistence fan-out.
//
// Persistence is a fixed sequence of independent writes derived from one
// `RatingUpdate`. A failure stops the sequence; earlier writes stay in place
// and `CharacterRegistry::reconcile_indexes` repairs the indexes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;

use crate::characters::{load_character, ranking_keys};
use crate::config::DEFAULT_BATTLE_COOLDOWN;
use crate::elo;
use crate::error::{ArenaError, ArenaResult};
use crate::matcher;
use crate::metrics;
use crate::models::{normalize_owner, Battle, Character, League};
use crate::oracle::{BattleOutcome, OutcomeOracle, OutcomeSource, Side};
use crate::store::{keys, RankingStore, StoreResult};

/// Stale index entries tolerated per battle before giving up.
const MAX_OPPONENT_ATTEMPTS: usize = 3;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct BattleSettings {
    pub cooldown: Duration,
    pub k_factor: i32,
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_BATTLE_COOLDOWN,
            k_factor: elo::K_FACTOR,
        }
    }
}

/// Both characters after a resolved battle, with their ratings before it.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingUpdate {
    pub character: Character,
    pub opponent: Character,
    pub character_previous_elo: i32,
    pub opponent_previous_elo: i32,
}

impl RatingUpdate {
    pub fn compute(
        character: &Character,
        opponent: &Character,
        outcome: &BattleOutcome,
        k_factor: i32,
    ) -> Self {
        let mut c = character.clone();
        let mut o = opponent.clone();

        if outcome.is_draw {
            let (ce, oe) = elo::compute_updated_ratings(c.elo, o.elo, true, k_factor);
            c.elo = ce;
            o.elo = oe;
            c.draws += 1;
            o.draws += 1;
        } else {
            let (winner, loser) = match outcome.winner {
                Side::Character1 => (&mut c, &mut o),
                Side::Character2 => (&mut o, &mut c),
            };
            let (we, le) = elo::compute_updated_ratings(winner.elo, loser.elo, false, k_factor);
            winner.elo = we;
            loser.elo = le;
            winner.wins += 1;
            loser.losses += 1;
        }

        Self {
            character: c,
            opponent: o,
            character_previous_elo: character.elo,
            opponent_previous_elo: opponent.elo,
        }
    }

    /// Ordered writes persisting this update and its battle record.
    pub fn write_plan(&self, battle: &Battle, cooldown: Duration) -> Vec<WriteOp> {
        let c = &self.character;
        let o = &self.opponent;
        let mut ops = vec![
            WriteOp::PutHash {
                key: keys::character(&c.id),
                fields: c.to_hash(),
            },
            WriteOp::PutHash {
                key: keys::character(&o.id),
                fields: o.to_hash(),
            },
        ];

        let genesis_mirror = c.league == League::Genesis || o.league == League::Genesis;
        for ch in [c, o] {
            for key in ranking_keys(ch, genesis_mirror) {
                ops.push(WriteOp::Score {
                    key,
                    member: ch.id.clone(),
                    score: f64::from(ch.elo),
                });
            }
        }

        ops.push(WriteOp::PutHash {
            key: keys::battle(&battle.id),
            fields: battle.to_hash(),
        });
        ops.push(WriteOp::SetWithTtl {
            key: keys::cooldown(&c.id),
            value: battle.timestamp.to_string(),
            ttl: cooldown,
        });
        for key in [
            keys::character_battles(&c.id),
            keys::character_battles(&o.id),
            keys::owner_battles(&c.owner),
        ] {
            ops.push(WriteOp::Push {
                key,
                value: battle.id.clone(),
            });
        }
        ops
    }
}

/// One idempotent store write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    PutHash {
        key: String,
        fields: Vec<(String, String)>,
    },
    Score {
        key: String,
        member: String,
        score: f64,
    },
    SetWithTtl {
        key: String,
        value: String,
        ttl: Duration,
    },
    Push {
        key: String,
        value: String,
    },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::PutHash { key, .. }
            | WriteOp::Score { key, .. }
            | WriteOp::SetWithTtl { key, .. }
            | WriteOp::Push { key, .. } => key,
        }
    }

    pub async fn apply(&self, store: &dyn RankingStore) -> StoreResult<()> {
        match self {
            WriteOp::PutHash { key, fields } => store.hset_all(key, fields).await,
            WriteOp::Score { key, member, score } => store.zadd(key, member, *score).await,
            WriteOp::SetWithTtl { key, value, ttl } => store.set_ex(key, value, *ttl).await,
            WriteOp::Push { key, value } => store.lpush(key, value).await,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEntry {
    pub id: String,
    pub name: String,
    pub elo: i32,
    pub previous_elo: i32,
    pub elo_change: i32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl StatsEntry {
    fn new(character: &Character, previous_elo: i32) -> Self {
        Self {
            id: character.id.clone(),
            name: character.name.clone(),
            elo: character.elo,
            previous_elo,
            elo_change: character.elo - previous_elo,
            wins: character.wins,
            losses: character.losses,
            draws: character.draws,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatedStats {
    pub character: StatsEntry,
    pub opponent: StatsEntry,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleReport {
    pub battle: Battle,
    pub updated_stats: UpdatedStats,
}

/// Whose battle history to read.
#[derive(Debug, Clone)]
pub enum HistoryScope {
    Character(String),
    Owner(String),
}

#[derive(Clone)]
pub struct BattleService {
    store: Arc<dyn RankingStore>,
    oracle: Arc<OutcomeOracle>,
    settings: BattleSettings,
}

impl BattleService {
    pub fn new(
        store: Arc<dyn RankingStore>,
        oracle: Arc<OutcomeOracle>,
        settings: BattleSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            settings,
        }
    }

    /// Run one battle for `character_id` on behalf of `owner`.
    pub async fn start_battle(&self, owner: &str, character_id: &str) -> ArenaResult<BattleReport> {
        let started = Instant::now();
        let result = self.run(owner, character_id).await;
        metrics::BATTLE_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        if let Err(ref e) = result {
            let reason = match e {
                ArenaError::Validation(_) => "validation",
                ArenaError::Forbidden => "forbidden",
                ArenaError::CharacterNotFound => "not_found",
                ArenaError::NoOpponents => "no_opponents",
                ArenaError::Cooldown { .. } => "cooldown",
                _ => "",
            };
            if !reason.is_empty() {
                metrics::BATTLE_REJECTIONS_TOTAL
                    .with_label_values(&[reason])
                    .inc();
            }
        }
        result
    }

    async fn run(&self, owner: &str, character_id: &str) -> ArenaResult<BattleReport> {
        let character_id = character_id.trim();
        if character_id.is_empty() {
            return Err(ArenaError::Validation("characterId is required".into()));
        }
        let character = load_character(self.store.as_ref(), character_id)
            .await?
            .ok_or(ArenaError::CharacterNotFound)?;
        if character.owner != normalize_owner(owner) {
            return Err(ArenaError::Forbidden);
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        self.claim_cooldown(&character.id, now_ms).await?;

        let opponent = match self.select_opponent(&character).await {
            Ok(opponent) => opponent,
            Err(e) => {
                self.release_cooldown(&character.id).await;
                return Err(e);
            }
        };

        let outcome = self.oracle.decide_outcome(&character, &opponent).await;
        let update = RatingUpdate::compute(&character, &opponent, &outcome, self.settings.k_factor);

        let battle_id = match self.next_battle_id(now_ms).await {
            Ok(id) => id,
            Err(e) => {
                self.release_cooldown(&character.id).await;
                return Err(e.into());
            }
        };
        let winner = match outcome.winner {
            Side::Character1 => &character.id,
            Side::Character2 => &opponent.id,
        };
        let battle = Battle {
            id: battle_id,
            character1: character.id.clone(),
            character2: opponent.id.clone(),
            winner: winner.clone(),
            is_draw: outcome.is_draw,
            explanation: outcome.narrative.clone(),
            timestamp: now_ms,
            league: character.league,
        };

        self.persist(&update, &battle).await?;

        let outcome_label = if outcome.is_draw { "draw" } else { "win" };
        let source_label = match outcome.source {
            OutcomeSource::Oracle => "oracle",
            OutcomeSource::Fallback => "fallback",
        };
        metrics::BATTLES_TOTAL
            .with_label_values(&[outcome_label, source_label])
            .inc();
        tracing::info!(
            battle = %battle.id,
            character = %character.id,
            opponent = %opponent.id,
            winner = %battle.winner,
            is_draw = battle.is_draw,
            source = source_label,
            elo = update.character.elo,
            opponent_elo = update.opponent.elo,
            "Battle resolved"
        );

        Ok(BattleReport {
            updated_stats: UpdatedStats {
                character: StatsEntry::new(&update.character, update.character_previous_elo),
                opponent: StatsEntry::new(&update.opponent, update.opponent_previous_elo),
            },
            battle,
        })
    }

    /// Atomically claim the cooldown slot for `character_id`.
    ///
    /// Every write is conditional: either the key is absent or it still holds
    /// the exact stale value read here. Losing either race means another
    /// request holds a fresh claim.
    async fn claim_cooldown(&self, character_id: &str, now_ms: i64) -> ArenaResult<()> {
        let key = keys::cooldown(character_id);
        let stamp = now_ms.to_string();
        let ttl = self.settings.cooldown;
        if self.store.set_nx_ex(&key, &stamp, ttl).await? {
            return Ok(());
        }

        let cooldown_ms = ttl.as_millis() as i64;
        let claimed = match self.store.get(&key).await? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(last) if now_ms - last < cooldown_ms => {
                    let remaining_ms = cooldown_ms - (now_ms - last).max(0);
                    return Err(cooldown_error(character_id, remaining_ms));
                }
                // Key outlived its window or holds garbage.
                _ => self.store.replace_ex(&key, &raw, &stamp, ttl).await?,
            },
            // Expired between the two reads.
            None => self.store.set_nx_ex(&key, &stamp, ttl).await?,
        };
        if claimed {
            Ok(())
        } else {
            Err(cooldown_error(character_id, cooldown_ms))
        }
    }

    async fn release_cooldown(&self, character_id: &str) {
        if let Err(e) = self.store.del(&keys::cooldown(character_id)).await {
            tracing::warn!(character = %character_id, error = %e, "Failed to release cooldown claim");
        }
    }

    /// Matcher pick, skipping ids whose hash has disappeared.
    async fn select_opponent(&self, character: &Character) -> ArenaResult<Character> {
        for _ in 0..MAX_OPPONENT_ATTEMPTS {
            let Some(id) = matcher::find_opponent(self.store.as_ref(), character).await? else {
                return Err(ArenaError::NoOpponents);
            };
            if let Some(opponent) = load_character(self.store.as_ref(), &id).await? {
                return Ok(opponent);
            }
            tracing::warn!(opponent = %id, "Stale ranking entry, removing from global index");
            self.store.zrem(keys::GLOBAL_RANKING, &id).await?;
            metrics::INDEX_REPAIRS_TOTAL
                .with_label_values(&["pruned"])
                .inc();
        }
        Err(ArenaError::NoOpponents)
    }

    async fn next_battle_id(&self, now_ms: i64) -> StoreResult<String> {
        let base = format!("battle:{now_ms}");
        if !self.store.exists(&keys::battle(&base)).await? {
            return Ok(base);
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.store.exists(&keys::battle(&candidate)).await? {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    async fn persist(&self, update: &RatingUpdate, battle: &Battle) -> ArenaResult<()> {
        let plan = update.write_plan(battle, self.settings.cooldown);
        let total = plan.len();
        for (step, op) in plan.iter().enumerate() {
            if let Err(e) = op.apply(self.store.as_ref()).await {
                metrics::PERSISTENCE_FAILURES_TOTAL.inc();
                tracing::error!(
                    battle = %battle.id,
                    step,
                    total,
                    key = op.key(),
                    error = %e,
                    "Battle persistence failed partway; applied writes are kept"
                );
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Battle records newest first. Ids whose record is gone are skipped and
    /// the list is paged further until `limit` records are found or it ends.
    /// A zero limit reads nothing.
    pub async fn battle_history(
        &self,
        scope: &HistoryScope,
        limit: Option<usize>,
    ) -> ArenaResult<Vec<Battle>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT);
        let list_key = match scope {
            HistoryScope::Character(id) => keys::character_battles(id.trim()),
            HistoryScope::Owner(owner) => keys::owner_battles(&normalize_owner(owner)),
        };

        let store = self.store.as_ref();
        let mut battles = Vec::with_capacity(limit);
        let mut start = 0;
        while battles.len() < limit {
            let wanted = limit - battles.len();
            let ids = store
                .lrange(&list_key, start as isize, (start + wanted) as isize - 1)
                .await?;
            start += ids.len();

            let hashes = join_all(ids.iter().map(|id| async move {
                let key = keys::battle(id);
                let hash = store.hget_all(&key).await?;
                Battle::from_hash(&key, &hash)
            }))
            .await;
            for result in hashes {
                if let Some(battle) = result? {
                    battles.push(battle);
                }
            }
            if ids.len() < wanted {
                break;
            }
        }
        Ok(battles)
    }
}

fn cooldown_error(character_id: &str, remaining_ms: i64) -> ArenaError {
    let retry_after_secs = ((remaining_ms + 999) / 1000).max(1) as u64;
    tracing::debug!(character = %character_id, retry_after_secs, "Battle on cooldown");
    ArenaError::Cooldown { retry_after_secs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn pair(league1: League, league2: League) -> (Character, Character) {
        (
            Character::new("0xa", "A", "fire", league1, 1),
            Character::new("0xb", "B", "water", league2, 2),
        )
    }

    fn outcome(winner: Side, is_draw: bool) -> BattleOutcome {
        BattleOutcome {
            winner,
            is_draw,
            narrative: "n".into(),
            source: OutcomeSource::Fallback,
        }
    }

    fn battle_for(update: &RatingUpdate) -> Battle {
        Battle {
            id: "battle:5".into(),
            character1: update.character.id.clone(),
            character2: update.opponent.id.clone(),
            winner: update.character.id.clone(),
            is_draw: false,
            explanation: "n".into(),
            timestamp: 5,
            league: update.character.league,
        }
    }

    #[test]
    fn test_rating_update_for_win_and_loss() {
        let (a, b) = pair(League::General, League::General);
        let update = RatingUpdate::compute(&a, &b, &outcome(Side::Character1, false), 32);
        assert_eq!((update.character.elo, update.opponent.elo), (1016, 984));
        assert_eq!((update.character.wins, update.opponent.losses), (1, 1));
        assert_eq!((update.character.losses, update.opponent.wins), (0, 0));

        let update = RatingUpdate::compute(&a, &b, &outcome(Side::Character2, false), 32);
        assert_eq!((update.character.elo, update.opponent.elo), (984, 1016));
        assert_eq!((update.character.losses, update.opponent.wins), (1, 1));
        assert_eq!(update.character_previous_elo, 1000);
    }

    #[test]
    fn test_rating_update_for_draw() {
        let (a, b) = pair(League::General, League::General);
        let update = RatingUpdate::compute(&a, &b, &outcome(Side::Character2, true), 32);
        assert_eq!((update.character.elo, update.opponent.elo), (1000, 1000));
        assert_eq!((update.character.draws, update.opponent.draws), (1, 1));
        assert_eq!(update.character.wins + update.opponent.wins, 0);
    }

    #[test]
    fn test_write_plan_order_and_targets() {
        let (a, b) = pair(League::Elite, League::General);
        let update = RatingUpdate::compute(&a, &b, &outcome(Side::Character1, false), 32);
        let plan = update.write_plan(&battle_for(&update), Duration::from_secs(180));
        let keys: Vec<&str> = plan.iter().map(WriteOp::key).collect();
        assert_eq!(
            keys,
            vec![
                "character:0xa_1",
                "character:0xb_2",
                "rankings:global",
                "rankings:league:elite",
                "rankings:league:general",
                "rankings:global",
                "rankings:league:general",
                "battle:5",
                "cooldown:0xa_1",
                "character:0xa_1:battles",
                "character:0xb_2:battles",
                "user:0xa:battles",
            ]
        );
        assert!(!keys.contains(&"cooldown:0xb_2"));
    }

    #[test]
    fn test_write_plan_mirrors_genesis_for_both() {
        let (a, b) = pair(League::General, League::Genesis);
        let update = RatingUpdate::compute(&a, &b, &outcome(Side::Character1, false), 32);
        let plan = update.write_plan(&battle_for(&update), Duration::from_secs(180));
        let genesis: Vec<&str> = plan
            .iter()
            .filter_map(|op| match op {
                WriteOp::Score { key, member, .. } if key == "rankings:league:genesis" => {
                    Some(member.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(genesis, vec!["0xa_1", "0xb_2"]);
    }

    #[tokio::test]
    async fn test_cooldown_claim_and_retry_after() {
        let store = Arc::new(MemoryStore::new());
        let service = BattleService::new(
            store.clone(),
            Arc::new(OutcomeOracle::fallback_only()),
            BattleSettings::default(),
        );
        service.claim_cooldown("c", 1_000_000).await.unwrap();

        let Err(ArenaError::Cooldown { retry_after_secs }) =
            service.claim_cooldown("c", 1_000_000 + 60_500).await
        else {
            panic!("expected cooldown");
        };
        assert_eq!(retry_after_secs, 120);

        // Past the window but the key lingers: overwritten.
        store
            .set_ex(&keys::cooldown("d"), "1", Duration::from_secs(600))
            .await
            .unwrap();
        service.claim_cooldown("d", 1_000_000).await.unwrap();
        assert_eq!(
            store.get(&keys::cooldown("d")).await.unwrap().as_deref(),
            Some("1000000")
        );
    }

    #[tokio::test]
    async fn test_battle_ids_get_suffixes_on_collision() {
        let store = Arc::new(MemoryStore::new());
        let service = BattleService::new(
            store.clone(),
            Arc::new(OutcomeOracle::fallback_only()),
            BattleSettings::default(),
        );
        assert_eq!(service.next_battle_id(7).await.unwrap(), "battle:7");
        store
            .hset_all("battle:7", &[("id".into(), "battle:7".into())])
            .await
            .unwrap();
        assert_eq!(service.next_battle_id(7).await.unwrap(), "battle:7-1");
        store
            .hset_all("battle:7-1", &[("id".into(), "battle:7-1".into())])
            .await
            .unwrap();
        assert_eq!(service.next_battle_id(7).await.unwrap(), "battle:7-2");
    }
}

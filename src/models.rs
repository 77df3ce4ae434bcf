// Character and battle records, and their flat-hash encoding.
//
// Hash fields are strings on the wire. `from_hash` is the only place that
// coerces them back into numbers and booleans.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::elo::STARTING_ELO;
use crate::store::StoreError;

/// A named partition of the ranking index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    General,
    Rookie,
    Veteran,
    Elite,
    Champion,
    /// Legacy league whose index is mirrored for both sides of any battle
    /// that involves one of its members.
    Genesis,
}

impl League {
    pub const ALL: [League; 6] = [
        League::General,
        League::Rookie,
        League::Veteran,
        League::Elite,
        League::Champion,
        League::Genesis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            League::General => "general",
            League::Rookie => "rookie",
            League::Veteran => "veteran",
            League::Elite => "elite",
            League::Champion => "champion",
            League::Genesis => "genesis",
        }
    }

    /// Default league for a character created through the given login provider.
    pub fn default_for(provider: Provider) -> Self {
        match provider {
            Provider::Wallet => League::General,
            Provider::Discord => League::Rookie,
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for League {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        League::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown league '{s}'"))
    }
}

/// How the caller authenticated upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Wallet,
    Discord,
}

/// Normalize an owner id: wallet addresses are case-insensitive.
pub fn normalize_owner(owner: &str) -> String {
    let owner = owner.trim();
    if owner.starts_with("0x") || owner.starts_with("0X") {
        owner.to_ascii_lowercase()
    } else {
        owner.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub traits: String,
    pub elo: i32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub league: League,
    pub created_at: i64,
}

impl Character {
    pub fn new(owner: &str, name: &str, traits: &str, league: League, created_at: i64) -> Self {
        let owner = normalize_owner(owner);
        Self {
            id: format!("{owner}_{created_at}"),
            owner,
            name: name.to_string(),
            traits: traits.to_string(),
            elo: STARTING_ELO,
            wins: 0,
            losses: 0,
            draws: 0,
            league,
            created_at,
        }
    }

    pub fn to_hash(&self) -> Vec<(String, String)> {
        vec![
            ("id".into(), self.id.clone()),
            ("owner".into(), self.owner.clone()),
            ("name".into(), self.name.clone()),
            ("traits".into(), self.traits.clone()),
            ("elo".into(), self.elo.to_string()),
            ("wins".into(), self.wins.to_string()),
            ("losses".into(), self.losses.to_string()),
            ("draws".into(), self.draws.to_string()),
            ("league".into(), self.league.as_str().into()),
            ("createdAt".into(), self.created_at.to_string()),
        ]
    }

    /// Decode a stored hash. An empty hash means the character does not exist.
    pub fn from_hash(key: &str, hash: &HashMap<String, String>) -> Result<Option<Self>, StoreError> {
        if hash.is_empty() {
            return Ok(None);
        }
        let fields = HashFields { key, hash };
        Ok(Some(Self {
            id: fields.required("id")?,
            owner: fields.required("owner")?,
            name: fields.required("name")?,
            traits: fields.text("traits"),
            elo: fields.number("elo", STARTING_ELO)?,
            wins: fields.number("wins", 0)?,
            losses: fields.number("losses", 0)?,
            draws: fields.number("draws", 0)?,
            league: match hash.get("league") {
                Some(raw) => raw.parse().map_err(|reason| StoreError::Corrupt {
                    key: key.to_string(),
                    reason,
                })?,
                None => League::General,
            },
            created_at: fields.number("createdAt", 0)?,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    pub id: String,
    pub character1: String,
    pub character2: String,
    pub winner: String,
    pub is_draw: bool,
    pub explanation: String,
    pub timestamp: i64,
    pub league: League,
}

impl Battle {
    pub fn to_hash(&self) -> Vec<(String, String)> {
        vec![
            ("id".into(), self.id.clone()),
            ("character1".into(), self.character1.clone()),
            ("character2".into(), self.character2.clone()),
            ("winner".into(), self.winner.clone()),
            ("isDraw".into(), self.is_draw.to_string()),
            ("explanation".into(), self.explanation.clone()),
            ("timestamp".into(), self.timestamp.to_string()),
            ("league".into(), self.league.as_str().into()),
        ]
    }

    pub fn from_hash(key: &str, hash: &HashMap<String, String>) -> Result<Option<Self>, StoreError> {
        if hash.is_empty() {
            return Ok(None);
        }
        let fields = HashFields { key, hash };
        Ok(Some(Self {
            id: fields.required("id")?,
            character1: fields.required("character1")?,
            character2: fields.required("character2")?,
            winner: fields.required("winner")?,
            is_draw: matches!(
                hash.get("isDraw").map(String::as_str),
                Some("true") | Some("1")
            ),
            explanation: fields.text("explanation"),
            timestamp: fields.number("timestamp", 0)?,
            league: hash
                .get("league")
                .and_then(|l| l.parse().ok())
                .unwrap_or(League::General),
        }))
    }
}

struct HashFields<'a> {
    key: &'a str,
    hash: &'a HashMap<String, String>,
}

impl HashFields<'_> {
    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            key: self.key.to_string(),
            reason,
        }
    }

    fn required(&self, field: &str) -> Result<String, StoreError> {
        self.hash
            .get(field)
            .cloned()
            .ok_or_else(|| self.corrupt(format!("missing field '{field}'")))
    }

    fn text(&self, field: &str) -> String {
        self.hash.get(field).cloned().unwrap_or_default()
    }

    /// Numeric field, tolerating float spellings such as "1016.0".
    fn number<T>(&self, field: &str, default: T) -> Result<T, StoreError>
    where
        T: FromStr + TryFrom<i64>,
    {
        let Some(raw) = self.hash.get(field) else {
            return Ok(default);
        };
        let raw = raw.trim();
        if let Ok(v) = raw.parse::<T>() {
            return Ok(v);
        }
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .and_then(|f| T::try_from(f.round() as i64).ok())
            .ok_or_else(|| self.corrupt(format!("field '{field}' is not a number: {raw:?}")))
    }
}

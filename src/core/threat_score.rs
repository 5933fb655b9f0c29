//! Threat Score Ledger.
//!
//! A cumulative, advisory score per hashed identity. Points come from a closed set
//! of [`ThreatReason`]s; the level is a pure function of the score. Increments use
//! the store's atomic add only, so concurrent hits from one attacker interleave
//! without a global lock.
//!
//! The ledger also owns the two identity markers other countermeasures consult:
//! the flagged set (log poisoning) and the honeytoken mark (backfire on `/api/`).
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ports::kv_store::{KvStore, StoreResult};

const SCORE_PREFIX: &str = "threat:score:";
const FLAGGED_PREFIX: &str = "security:flagged:";
const HONEYTOKEN_PREFIX: &str = "security:honeytoken:";

/// Severity band derived from a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Low,
    Warn,
    Critical,
}

/// Lower bound (inclusive) of each level, highest first
const LEVEL_THRESHOLDS: &[(i64, ThreatLevel)] =
    &[(80, ThreatLevel::Critical), (30, ThreatLevel::Warn)];

impl ThreatLevel {
    /// Map a score onto its band.
    pub fn from_score(score: i64) -> Self {
        LEVEL_THRESHOLDS
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, level)| *level)
            .unwrap_or(ThreatLevel::Low)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Warn => "WARN",
            ThreatLevel::Critical => "CRITICAL",
        }
    }
}

/// Named point values. Callers cannot invent arbitrary weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatReason {
    /// Opened a decoy document
    HoneytokenAccess,
    /// A decoy phoned home from the attacker's browser
    CanaryBeacon,
    /// Crawled a path robots.txt asked not to be crawled
    RobotsViolation,
    /// Sent an injection payload
    SqlInjectionAttempt,
    /// Announced an offensive tool in its User-Agent
    ScannerUserAgent,
}

impl ThreatReason {
    pub fn points(&self) -> i64 {
        match self {
            ThreatReason::HoneytokenAccess => 50,
            ThreatReason::CanaryBeacon => 40,
            ThreatReason::RobotsViolation => 10,
            ThreatReason::SqlInjectionAttempt => 30,
            ThreatReason::ScannerUserAgent => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatReason::HoneytokenAccess => "HONEYTOKEN_ACCESS",
            ThreatReason::CanaryBeacon => "CANARY_BEACON",
            ThreatReason::RobotsViolation => "ROBOTS_VIOLATION",
            ThreatReason::SqlInjectionAttempt => "SQL_INJECTION_ATTEMPT",
            ThreatReason::ScannerUserAgent => "SCANNER_USER_AGENT",
        }
    }
}

/// A ledger reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatScore {
    pub key: String,
    pub score: i64,
    pub level: ThreatLevel,
}

impl ThreatScore {
    fn new(key: &str, score: i64) -> Self {
        Self {
            key: key.to_string(),
            score,
            level: ThreatLevel::from_score(score),
        }
    }

    /// Level the identity was at before `reason` was applied.
    pub fn previous_level(&self, reason: ThreatReason) -> ThreatLevel {
        ThreatLevel::from_score(self.score - reason.points())
    }

    /// Did applying `reason` move the identity into a higher band?
    pub fn escalated_by(&self, reason: ThreatReason) -> bool {
        self.level > self.previous_level(reason)
    }
}

fn score_key(key: &str) -> String {
    format!("{SCORE_PREFIX}{key}")
}

/// Add `reason`'s points to `key`'s score and return the new reading.
pub async fn increment_threat_score(
    store: &dyn KvStore,
    key: &str,
    reason: ThreatReason,
) -> StoreResult<ThreatScore> {
    let score = store.incr_by(&score_key(key), reason.points()).await?;
    Ok(ThreatScore::new(key, score))
}

/// Current reading for `key`. Unknown identities read as zero.
pub async fn threat_score(store: &dyn KvStore, key: &str) -> StoreResult<ThreatScore> {
    let score = store
        .get(&score_key(key))
        .await?
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(0);
    Ok(ThreatScore::new(key, score))
}

/// Explicitly clear an identity's score.
pub async fn reset_threat_score(store: &dyn KvStore, key: &str) -> StoreResult<()> {
    store.delete(&score_key(key)).await
}

/// Add an identity to the flagged set consulted by the log poisoner.
pub async fn flag_ip(store: &dyn KvStore, hashed_ip: &str, ttl: Duration) -> StoreResult<()> {
    store
        .set(&format!("{FLAGGED_PREFIX}{hashed_ip}"), "1", Some(ttl))
        .await
}

pub async fn is_flagged(store: &dyn KvStore, hashed_ip: &str) -> StoreResult<bool> {
    store.exists(&format!("{FLAGGED_PREFIX}{hashed_ip}")).await
}

/// Remember that an identity was served a decoy document.
pub async fn mark_honeytoken_access(
    store: &dyn KvStore,
    hashed_ip: &str,
    ttl: Duration,
) -> StoreResult<()> {
    store
        .set(&format!("{HONEYTOKEN_PREFIX}{hashed_ip}"), "1", Some(ttl))
        .await
}

pub async fn has_honeytoken_access(store: &dyn KvStore, hashed_ip: &str) -> StoreResult<bool> {
    store.exists(&format!("{HONEYTOKEN_PREFIX}{hashed_ip}")).await
}

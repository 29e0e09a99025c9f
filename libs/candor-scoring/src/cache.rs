//! Content-addressed rationale cache
//!
//! **Core Responsibility:**
//! Avoid calling the reasoning service again when nothing it would see has
//! changed. An entry pairs two hashes with the narrative they produced:
//!
//! - `resume_hash` over skills, stated experience and raw resume text
//! - `data_hash` over every numeric fact, the chat reply and `resume_hash`
//!
//! A stored entry with an empty or unparseable narrative is corrupt and is
//! reported as a miss so the narrative gets regenerated.

use crate::error::CacheError;
use crate::facts::CandidateFacts;
use crate::narrative;
use async_trait::async_trait;
use candor_common::redis::rationale_key;
use candor_common::types::{CandidateId, ResumeFacts};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;

const HASH_HEX_CHARS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub resume_hash: String,
    pub data_hash: String,
    pub narrative: String,
}

impl CacheEntry {
    pub fn matches(&self, resume_hash: &str, data_hash: &str) -> bool {
        self.resume_hash == resume_hash && self.data_hash == data_hash
    }

    fn is_usable(&self) -> bool {
        !self.narrative.trim().is_empty() && narrative::parse(&self.narrative).is_ok()
    }
}

/// sha256 of the canonical JSON form, truncated
///
/// `serde_json::Value` objects are ordered maps, so key order never
/// changes the hash.
fn stable_hash(value: &Value) -> String {
    let digest = Sha256::digest(value.to_string().as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_HEX_CHARS);
    hex
}

pub fn resume_hash(resume: &ResumeFacts) -> String {
    stable_hash(&json!({
        "skills": resume.skills,
        "experience_years": resume.experience_years,
        "raw_text": resume.raw_text,
    }))
}

pub fn data_hash(facts: &CandidateFacts, resume_hash: &str) -> String {
    stable_hash(&json!({
        "technical_score": facts.technical_score,
        "integrity_score": facts.integrity.score,
        "total_events": facts.integrity.total_events,
        "high_severity_count": facts.integrity.high_severity_count,
        "medium_severity_count": facts.integrity.medium_severity_count,
        "low_severity_count": facts.integrity.low_severity_count,
        "originality_ratio": facts.originality_ratio,
        "teamwork_score": facts.teamwork_score,
        "behavioral_score": facts.behavioral_score,
        "submissions_count": facts.submissions_count,
        "passed_submissions": facts.passed_submissions,
        "unisolated_submissions": facts.unisolated_submissions,
        "chat_response": facts.chat_response,
        "resume_hash": resume_hash,
    }))
}

#[async_trait]
pub trait RationaleCache: Send + Sync {
    /// Usable entry for a candidate, if any
    async fn get(&self, candidate_id: CandidateId) -> Result<Option<CacheEntry>, CacheError>;
    async fn put(&self, candidate_id: CandidateId, entry: &CacheEntry) -> Result<(), CacheError>;
}

fn usable(candidate_id: CandidateId, entry: CacheEntry) -> Option<CacheEntry> {
    if entry.is_usable() {
        Some(entry)
    } else {
        warn!(candidate_id, "Cached rationale is corrupt, treating as a miss");
        None
    }
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CandidateId, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RationaleCache for InMemoryCache {
    async fn get(&self, candidate_id: CandidateId) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.entries.read().await.get(&candidate_id).cloned();
        Ok(entry.and_then(|entry| usable(candidate_id, entry)))
    }

    async fn put(&self, candidate_id: CandidateId, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(candidate_id, entry.clone());
        Ok(())
    }
}

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RationaleCache for RedisCache {
    async fn get(&self, candidate_id: CandidateId) -> Result<Option<CacheEntry>, CacheError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(rationale_key(candidate_id)).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str::<CacheEntry>(&payload) {
            Ok(entry) => Ok(usable(candidate_id, entry)),
            Err(e) => {
                warn!(candidate_id, error = %e, "Cached rationale does not decode, treating as a miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, candidate_id: CandidateId, entry: &CacheEntry) -> Result<(), CacheError> {
        let payload = serde_json::to_string(entry)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(rationale_key(candidate_id), payload).await?;
        Ok(())
    }
}

//! Verdict Engine (GenerateVerdict)
//!
//! **Core Responsibility:**
//! Turn one candidate's facts into a [`Verdict`] without ever failing:
//!
//! 1. Hash resume facts and assessment facts
//! 2. Reuse the cached narrative when both hashes match the stored pair
//! 3. Otherwise ask the reasoning service, falling back to the rules on
//!    any fault or malformed reply
//! 4. Re-derive confidence caps from the current facts on every path
//!
//! Work for one candidate is serialised by a keyed lock so cache writes
//! never interleave; different candidates never contend.

use crate::cache::{data_hash, resume_hash, CacheEntry, RationaleCache};
use crate::decision::{
    apply_confidence_caps, consistency_risk, decide, fallback_narrative, mentions_consistency_risk,
    resume_consistency, ResumeConsistency, Rule, Thresholds,
};
use crate::error::ReasoningError;
use crate::facts::CandidateFacts;
use crate::narrative::{self, Narrative, NO_SUMMARY};
use crate::prompt::render_prompt;
use crate::reasoning::ReasoningClient;
use candor_common::types::{CandidateId, Statement, Verdict};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    Generated,
    Fallback,
    Cached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictOutcome {
    pub candidate_id: CandidateId,
    pub verdict: Verdict,
    pub source: NarrativeSource,
    /// Rule the deterministic path picks for the current facts
    pub rule: Rule,
    pub resume_consistency: ResumeConsistency,
    pub resume_hash: String,
    pub data_hash: String,
    /// Final five-section text, caps and notes included
    pub narrative: String,
}

pub struct VerdictEngine {
    reasoning: Arc<dyn ReasoningClient>,
    cache: Arc<dyn RationaleCache>,
    thresholds: Thresholds,
    expected_questions: usize,
    locks: Mutex<HashMap<CandidateId, Arc<Mutex<()>>>>,
}

impl VerdictEngine {
    pub fn new(reasoning: Arc<dyn ReasoningClient>, cache: Arc<dyn RationaleCache>) -> Self {
        Self {
            reasoning,
            cache,
            thresholds: Thresholds::default(),
            expected_questions: 0,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Size of the question set the technical score was computed over
    pub fn with_expected_questions(mut self, count: usize) -> Self {
        self.expected_questions = count;
        self
    }

    async fn candidate_lock(&self, candidate_id: CandidateId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(candidate_id).or_default())
    }

    /// Drop the map entry once no other call holds or waits on it
    async fn release_lock(&self, candidate_id: CandidateId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks
            .get(&candidate_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&candidate_id);
        }
    }

    pub async fn generate_verdict(&self, facts: &CandidateFacts) -> VerdictOutcome {
        let lock = self.candidate_lock(facts.candidate_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.evaluate(facts).await
        };
        self.release_lock(facts.candidate_id, lock).await;
        outcome
    }

    async fn evaluate(&self, facts: &CandidateFacts) -> VerdictOutcome {
        let consistency = resume_consistency(facts, &self.thresholds);
        let rule = decide(facts, &self.thresholds);
        let resume_hash = resume_hash(&facts.resume);
        let data_hash = data_hash(facts, &resume_hash);

        let (narrative, source) = match self.cached(facts.candidate_id, &resume_hash, &data_hash).await {
            Some(narrative) => (narrative, NarrativeSource::Cached),
            None => {
                let (narrative, source) = self.produce(facts, &consistency).await;
                if source == NarrativeSource::Generated {
                    self.store(facts.candidate_id, &resume_hash, &data_hash, &narrative).await;
                }
                (narrative, source)
            }
        };

        let verdict = finalize(narrative, facts);
        info!(
            candidate_id = facts.candidate_id,
            recommendation = %verdict.recommendation,
            confidence = verdict.confidence,
            source = ?source,
            consistency = ?consistency.flag,
            "Verdict generated"
        );

        VerdictOutcome {
            candidate_id: facts.candidate_id,
            narrative: narrative::render_verdict(&verdict),
            verdict,
            source,
            rule,
            resume_consistency: consistency,
            resume_hash,
            data_hash,
        }
    }

    async fn cached(&self, candidate_id: CandidateId, resume_hash: &str, data_hash: &str) -> Option<Narrative> {
        let entry = match self.cache.get(candidate_id).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(candidate_id, error = %e, "Rationale cache read failed, regenerating");
                return None;
            }
        };
        if !entry.matches(resume_hash, data_hash) {
            debug!(candidate_id, "Rationale cache stale");
            return None;
        }
        narrative::parse(&entry.narrative).ok()
    }

    async fn store(&self, candidate_id: CandidateId, resume_hash: &str, data_hash: &str, narrative: &Narrative) {
        let entry = CacheEntry {
            resume_hash: resume_hash.to_string(),
            data_hash: data_hash.to_string(),
            narrative: narrative::render(narrative),
        };
        if let Err(e) = self.cache.put(candidate_id, &entry).await {
            warn!(candidate_id, error = %e, "Rationale cache write failed");
        }
    }

    /// Raw narrative before caps: generated when possible, rules otherwise
    async fn produce(&self, facts: &CandidateFacts, consistency: &ResumeConsistency) -> (Narrative, NarrativeSource) {
        match self.request_narrative(facts, consistency).await {
            Ok(narrative) => (narrative, NarrativeSource::Generated),
            Err(e) => {
                match e {
                    ReasoningError::Disabled => debug!(candidate_id = facts.candidate_id, "Reasoning disabled, using rules"),
                    e => warn!(candidate_id = facts.candidate_id, error = %e, "Reasoning failed, using rules"),
                }
                (
                    fallback_narrative(facts, consistency, &self.thresholds),
                    NarrativeSource::Fallback,
                )
            }
        }
    }

    async fn request_narrative(
        &self,
        facts: &CandidateFacts,
        consistency: &ResumeConsistency,
    ) -> Result<Narrative, ReasoningError> {
        let prompt = render_prompt(facts, consistency, self.expected_questions)?;
        let text = self.reasoning.generate(&prompt).await?;
        let mut narrative = narrative::parse(&text).map_err(|e| ReasoningError::Malformed(e.to_string()))?;

        if consistency.is_mismatch() && !mentions_consistency_risk(&narrative.risks) {
            narrative.risks.extend(consistency_risk(consistency));
        }
        Ok(narrative)
    }
}

/// Apply caps from the current facts and fill placeholders
fn finalize(mut narrative: Narrative, facts: &CandidateFacts) -> Verdict {
    let (confidence, notes) = apply_confidence_caps(narrative.confidence, facts);
    narrative.confidence = confidence;
    if !notes.is_empty() {
        let note = notes.join("; ");
        narrative.summary = Some(match narrative.summary.take() {
            Some(summary) => Statement::new(format!("{} ({})", summary.text, note), summary.evidence),
            None => Statement::plain(format!("{} ({})", NO_SUMMARY, note)),
        });
    }
    narrative.into_verdict()
}

pub mod cache;
pub mod collaboration;
pub mod decision;
pub mod engine;
pub mod error;
pub mod facts;
pub mod integrity;
pub mod narrative;
pub mod prompt;
pub mod reasoning;
pub mod technical;

pub use cache::{InMemoryCache, RationaleCache, RedisCache};
pub use collaboration::{analyze_chat, ChatAnalysis};
pub use decision::{ConsistencyFlag, ResumeConsistency, Rule, Thresholds};
pub use engine::{NarrativeSource, VerdictEngine, VerdictOutcome};
pub use facts::{AssessmentInput, CandidateFacts};
pub use integrity::{assess, compute_integrity_score, IntegrityReport, IntegritySummary};
pub use reasoning::{reasoning_client, ReasoningClient};

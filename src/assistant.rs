//! Top-level facade: one call takes a question and a frame through the full
//! synthesize → execute → answer round.

use crate::answer::generate_answer;
use crate::config::AssistantConfig;
use crate::error::Result;
use crate::llm::{BackendProbe, LlmClient};
use crate::schema::SchemaSnapshot;
use crate::synthesis::{AttemptError, SynthesisLoop};
use polars::prelude::DataFrame;
use tracing::info;
use uuid::Uuid;

/// Everything a caller needs from one question round.
#[derive(Debug)]
pub struct AssistantResponse {
    /// Correlates the round's log lines and attempt records.
    pub round_id: Uuid,
    pub answer: String,
    /// The script that produced the derived frame.
    pub script: String,
    pub frame: DataFrame,
    pub attempts: u8,
    pub error_history: Vec<AttemptError>,
}

pub struct DataAssistant {
    llm: LlmClient,
    config: AssistantConfig,
}

impl DataAssistant {
    pub fn new(config: AssistantConfig) -> Self {
        let llm = LlmClient::new(config.backend.clone());
        Self { llm, config }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Check backend reachability and served models before a round.
    pub async fn probe(&self) -> Result<BackendProbe> {
        Ok(self.llm.probe().await?)
    }

    /// Answer `question` against `df`: snapshot the schema, run the bounded
    /// synthesis loop, then compose the natural-language answer from the
    /// derived frame.
    pub async fn ask(&self, question: &str, df: &DataFrame) -> Result<AssistantResponse> {
        let round_id = Uuid::new_v4();
        info!(
            "round {} started: {:?} against {} rows x {} columns",
            round_id,
            question,
            df.height(),
            df.width()
        );

        let snapshot = SchemaSnapshot::from_frame(df, self.config.sample_rows)?;
        let outcome = SynthesisLoop::new(self.config.max_attempts)
            .run(&self.llm, question, df, &snapshot)
            .await?;

        let answer = generate_answer(&self.llm, question, &outcome.frame).await?;
        info!(
            "round {} finished after {} attempt(s)",
            round_id, outcome.attempts
        );

        Ok(AssistantResponse {
            round_id,
            answer,
            script: outcome.code,
            frame: outcome.frame,
            attempts: outcome.attempts,
            error_history: outcome.error_history,
        })
    }
}

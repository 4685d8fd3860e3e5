//! The retry state machine: Generating → Extracting → Executing, then Done,
//! Repairing, or Exhausted.
//!
//! Extraction and execution failures feed the next attempt's repair prompt
//! (current error plus the full prior history, oldest first). Backend
//! failures are never retried here; they propagate immediately as terminal
//! for the round.

use crate::error::{AssistantError, Result};
use crate::executor::{ExecutionOutcome, Executor};
use crate::extract::{extract_code, ExtractorConfig};
use crate::llm::TextCompletion;
use crate::prompts::{generation_prompt, repair_prompt};
use crate::schema::SchemaSnapshot;
use crate::synthesis::error_classifier::{classify, ScriptErrorClass};
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Synthetic error recorded when no extraction strategy produced code.
const EXTRACTION_FAILURE_MSG: &str =
    "no executable code could be extracted from the model response";

/// One failed attempt, in attempt order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptError {
    pub attempt: u8,
    pub message: String,
    pub class: Option<ScriptErrorClass>,
    pub at: DateTime<Utc>,
}

impl AttemptError {
    pub fn new(attempt: u8, message: impl Into<String>, class: Option<ScriptErrorClass>) -> Self {
        Self {
            attempt,
            message: message.into(),
            class,
            at: Utc::now(),
        }
    }
}

/// Successful round: the script that worked, the derived frame, and the
/// failures that preceded it.
#[derive(Debug)]
pub struct SynthesisOutcome {
    pub code: String,
    pub frame: DataFrame,
    pub attempts: u8,
    pub error_history: Vec<AttemptError>,
}

pub struct SynthesisLoop {
    max_attempts: u8,
    extractor: ExtractorConfig,
    executor: Executor,
}

impl SynthesisLoop {
    pub fn new(max_attempts: u8) -> Self {
        let extractor = ExtractorConfig::default();
        let executor = Executor::new(
            extractor.input_var.clone(),
            extractor.output_var.clone(),
        );
        Self {
            max_attempts,
            extractor,
            executor,
        }
    }

    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.executor = Executor::new(
            extractor.input_var.clone(),
            extractor.output_var.clone(),
        );
        self.extractor = extractor;
        self
    }

    /// Run one synthesis round for `question` against `df`.
    pub async fn run<C: TextCompletion + ?Sized>(
        &self,
        llm: &C,
        question: &str,
        df: &DataFrame,
        snapshot: &SchemaSnapshot,
    ) -> Result<SynthesisOutcome> {
        let mut history: Vec<AttemptError> = Vec::new();
        let mut prompt = generation_prompt(question, snapshot);
        let mut last_code = String::new();

        for attempt in 1..=self.max_attempts {
            info!("synthesis attempt {} of {}", attempt, self.max_attempts);

            // Backend failures are terminal for the round.
            let response = llm.complete(&prompt).await.map_err(AssistantError::Backend)?;

            let failure = match extract_code(&response, &self.extractor) {
                None => {
                    warn!("attempt {}: {}", attempt, EXTRACTION_FAILURE_MSG);
                    AttemptError::new(
                        attempt,
                        EXTRACTION_FAILURE_MSG,
                        Some(ScriptErrorClass::ExtractionFailure),
                    )
                }
                Some(code) => {
                    last_code = code.clone();
                    match self.executor.execute(&code, df) {
                        ExecutionOutcome::Success(frame) => {
                            info!("attempt {} succeeded, {} rows derived", attempt, frame.height());
                            return Ok(SynthesisOutcome {
                                code,
                                frame,
                                attempts: attempt,
                                error_history: history,
                            });
                        }
                        ExecutionOutcome::Failure(message) => {
                            warn!("attempt {} failed: {}", attempt, message);
                            let class = classify(&message);
                            AttemptError::new(attempt, message, Some(class))
                        }
                    }
                }
            };

            history.push(failure);

            if attempt < self.max_attempts {
                // The current error is the last history entry; everything
                // before it is the prior history, oldest first.
                let (prior, current) = history.split_at(history.len() - 1);
                prompt = repair_prompt(&last_code, &current[0].message, prior);
            }
        }

        Err(AssistantError::RetryExhausted {
            attempts: self.max_attempts,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use async_trait::async_trait;
    use polars::prelude::*;
    use std::sync::Mutex;

    enum Reply {
        Text(&'static str),
        RateLimited,
    }

    /// Scripted backend: hands out canned replies and records every prompt.
    struct ScriptedBackend {
        replies: Mutex<Vec<Reply>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn prompt(&self, idx: usize) -> String {
            self.prompts.lock().unwrap()[idx].clone()
        }
    }

    #[async_trait]
    impl TextCompletion for ScriptedBackend {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(BackendError::UnexpectedResponse(
                    "scripted backend ran out of replies".to_string(),
                ));
            }
            match replies.remove(0) {
                Reply::Text(text) => Ok(text.to_string()),
                Reply::RateLimited => Err(BackendError::RateLimited("try later".to_string())),
            }
        }
    }

    fn sample_frame() -> DataFrame {
        df![
            "district" => ["A", "B", "C"],
            "floor" => [3i64, 7, 5],
        ]
        .unwrap()
    }

    fn snapshot(df: &DataFrame) -> SchemaSnapshot {
        SchemaSnapshot::from_frame(df, 5).unwrap()
    }

    #[tokio::test]
    async fn first_attempt_success_makes_exactly_one_call() {
        let backend = ScriptedBackend::new(vec![Reply::Text(
            "<result>\nfinal_df = df.sort(\"floor\", descending=true)\n</result>",
        )]);
        let frame = sample_frame();
        let outcome = SynthesisLoop::new(3)
            .run(&backend, "Which district has the highest floor count?", &frame, &snapshot(&frame))
            .await
            .unwrap();

        assert_eq!(backend.calls(), 1);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.error_history.is_empty());
        // Full sorted context, not just the single maximum row.
        assert_eq!(outcome.frame.height(), 3);
        let districts: Vec<&str> = outcome
            .frame
            .column("district")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(districts, vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn misspelled_column_is_repaired_on_second_attempt() {
        let backend = ScriptedBackend::new(vec![
            Reply::Text("<result>\nfinal_df = df.sort(\"florr\", descending=true)\n</result>"),
            Reply::Text("<result>\nfinal_df = df.sort(\"floor\", descending=true)\n</result>"),
        ]);
        let frame = sample_frame();
        let outcome = SynthesisLoop::new(3)
            .run(&backend, "Highest floor?", &frame, &snapshot(&frame))
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error_history.len(), 1);
        assert_eq!(
            outcome.error_history[0].class,
            Some(ScriptErrorClass::ColumnNotFound)
        );
        // The repair prompt must carry the exact failure text and the
        // failing script.
        let repair = backend.prompt(1);
        assert!(repair.contains("column 'florr' not found"));
        assert!(repair.contains("final_df = df.sort(\"florr\", descending=true)"));
    }

    #[tokio::test]
    async fn exhaustion_returns_full_ordered_history() {
        let backend = ScriptedBackend::new(vec![
            Reply::Text("<result>\nfinal_df = df.sort(\"a\")\n</result>"),
            Reply::Text("<result>\nfinal_df = df.sort(\"b\")\n</result>"),
            Reply::Text("<result>\nfinal_df = df.sort(\"c\")\n</result>"),
        ]);
        let frame = sample_frame();
        let err = SynthesisLoop::new(3)
            .run(&backend, "Question", &frame, &snapshot(&frame))
            .await
            .unwrap_err();

        // No fourth generation call.
        assert_eq!(backend.calls(), 3);
        match err {
            AssistantError::RetryExhausted { attempts, history } => {
                assert_eq!(attempts, 3);
                assert_eq!(history.len(), 3);
                assert_eq!(history[0].attempt, 1);
                assert_eq!(history[1].attempt, 2);
                assert_eq!(history[2].attempt, 3);
                assert!(history[0].message.contains("'a'"));
                assert!(history[2].message.contains("'c'"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn repair_prompt_accumulates_prior_errors() {
        let backend = ScriptedBackend::new(vec![
            Reply::Text("<result>\nfinal_df = df.sort(\"a\")\n</result>"),
            Reply::Text("<result>\nfinal_df = df.sort(\"b\")\n</result>"),
            Reply::Text("<result>\nfinal_df = df.sort(\"c\")\n</result>"),
        ]);
        let frame = sample_frame();
        let _ = SynthesisLoop::new(3)
            .run(&backend, "Question", &frame, &snapshot(&frame))
            .await;

        // Third prompt carries the current (second) error plus the first
        // attempt's error as history.
        let third = backend.prompt(2);
        assert!(third.contains("'b'"));
        assert!(third.contains("Attempt 1 failed"));
        assert!(third.contains("'a'"));
    }

    #[tokio::test]
    async fn extraction_failure_enters_the_error_history() {
        let backend = ScriptedBackend::new(vec![
            Reply::Text("I cannot produce a script for this question."),
            Reply::Text("Still no script, sorry."),
        ]);
        let frame = sample_frame();
        let err = SynthesisLoop::new(2)
            .run(&backend, "Question", &frame, &snapshot(&frame))
            .await
            .unwrap_err();

        match err {
            AssistantError::RetryExhausted { history, .. } => {
                assert_eq!(history.len(), 2);
                assert!(history[0].message.contains("no executable code"));
                assert_eq!(
                    history[0].class,
                    Some(ScriptErrorClass::ExtractionFailure)
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn backend_error_is_terminal_and_never_retried() {
        let backend = ScriptedBackend::new(vec![Reply::RateLimited]);
        let frame = sample_frame();
        let err = SynthesisLoop::new(3)
            .run(&backend, "Question", &frame, &snapshot(&frame))
            .await
            .unwrap_err();

        assert_eq!(backend.calls(), 1);
        assert!(matches!(
            err,
            AssistantError::Backend(BackendError::RateLimited(_))
        ));
    }
}

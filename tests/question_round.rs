//! End-to-end round over the public API with a scripted backend: generation,
//! extraction, execution, repair, and answer composition.

use async_trait::async_trait;
use polars::prelude::*;
use std::sync::Mutex;
use tablechat::answer::generate_answer;
use tablechat::llm::TextCompletion;
use tablechat::schema::SchemaSnapshot;
use tablechat::synthesis::SynthesisLoop;
use tablechat::BackendError;

struct ScriptedBackend {
    replies: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl TextCompletion for ScriptedBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(BackendError::UnexpectedResponse(
                "no replies left".to_string(),
            ));
        }
        Ok(replies.remove(0))
    }
}

fn apartments() -> DataFrame {
    df![
        "district" => ["Gangnam", "Mapo", "Jongno", "Mapo"],
        "floors" => [45i64, 22, 18, 31],
        "year_built" => [2011i64, 1998, 2005, 2016],
    ]
    .unwrap()
}

#[tokio::test]
async fn full_round_with_a_clean_first_reply() {
    let backend = ScriptedBackend::new(vec![
        "Here is the script.\n<result>\nfinal_df = df.sort(\"floors\", descending=true)\n</result>",
        "The tallest building is in Gangnam with 45 floors.",
    ]);
    let frame = apartments();
    let snapshot = SchemaSnapshot::from_frame(&frame, 5).unwrap();

    let outcome = SynthesisLoop::new(3)
        .run(&backend, "Which district has the tallest building?", &frame, &snapshot)
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.frame.height(), 4);

    let answer = generate_answer(&backend, "Which district has the tallest building?", &outcome.frame)
        .await
        .unwrap();
    assert!(answer.contains("Gangnam"));
}

#[tokio::test]
async fn full_round_recovers_from_a_bad_first_script() {
    let backend = ScriptedBackend::new(vec![
        // Misspelled column, then an unfenced but extractable correction.
        "<result>\nfinal_df = df.sort(\"flors\", descending=true)\n</result>",
        "Apologies. Corrected:\ngrouped = df.group_by(\"district\").agg(max(\"floors\"))\nfinal_df = grouped.sort(\"floors\", descending=true)",
        "Gangnam has the tallest building.",
    ]);
    let frame = apartments();
    let snapshot = SchemaSnapshot::from_frame(&frame, 5).unwrap();

    let outcome = SynthesisLoop::new(3)
        .run(&backend, "Which district has the tallest building?", &frame, &snapshot)
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.error_history.len(), 1);
    assert!(outcome.error_history[0].message.contains("'flors'"));
    // One row per district after the aggregation.
    assert_eq!(outcome.frame.height(), 3);

    let answer = generate_answer(&backend, "Which district has the tallest building?", &outcome.frame)
        .await
        .unwrap();
    assert!(answer.contains("Gangnam"));
}

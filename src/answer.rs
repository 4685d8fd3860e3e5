//! Turns a derived frame back into a natural-language answer with one
//! backend call.

use crate::error::Result;
use crate::llm::TextCompletion;
use crate::prompts::answer_prompt;
use crate::schema::frame_to_rows;
use polars::prelude::DataFrame;
use tracing::warn;

/// Serialize `frame` as a JSON array of row objects for the answer prompt.
/// The whole derived frame goes in: the synthesis step already reduced the
/// dataset to what the question needs, and a partial payload would ground
/// the answer in partial data. Serialization problems degrade to an empty
/// array rather than failing the round; the model still gets the question.
pub fn frame_to_answer_json(frame: &DataFrame) -> String {
    match frame_to_rows(frame, frame.height()) {
        Ok(rows) => serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string()),
        Err(e) => {
            warn!("failed to serialize derived frame for answering: {}", e);
            "[]".to_string()
        }
    }
}

/// Generate the final answer for `question` from the derived `frame`.
pub async fn generate_answer<C: TextCompletion + ?Sized>(
    llm: &C,
    question: &str,
    frame: &DataFrame,
) -> Result<String> {
    let data_json = frame_to_answer_json(frame);
    let prompt = answer_prompt(question, &data_json);
    let answer = llm.complete(&prompt).await?;
    Ok(answer.trim().to_string())
}

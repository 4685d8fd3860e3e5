//! Prompt construction for the three model calls: script generation, script
//! repair, and answer generation.

use crate::schema::SchemaSnapshot;
use crate::synthesis::AttemptError;
use itertools::Itertools;

/// Reference block describing the pipeline script language. Embedded in the
/// generation and repair prompts so the model emits only the enumerable
/// operation set the executor understands.
pub const SCRIPT_REFERENCE: &str = r#"The script language supports these operations, chained with '.':
- select("col_a", "col_b")                keep only the named columns
- filter(col > value)                     keep rows matching one comparison (==, !=, >, >=, <, <=); string values in quotes
- sort("col", descending=true)            sort by a column (default ascending)
- group_by("col").agg(max("other"))       group then aggregate; aggregations: sum, mean, min, max, median, count(), n_unique
- head(n)                                 first n rows
- unique()                                drop duplicate rows
- drop_nulls()                            drop rows with missing values
- count()                                 single-row frame with the row count

Each line is `name = pipeline`. The input table is bound to `df`. The final
result MUST be assigned to `final_df`."#;

/// Build the code-generation prompt for a fresh question.
pub fn generation_prompt(question: &str, snapshot: &SchemaSnapshot) -> String {
    format!(
        r#"Here is a preview of the table `df` ({rows} rows x {cols} columns):
{preview}

Each column has the following type:
{types}

Write a pipeline script that extracts the information needed to answer this question:
"{question}"

{reference}

Even if the question asks for a single value (a maximum, a minimum, the top
entry), `final_df` must contain the full relevant context: return all rows
sorted by the relevant column rather than just the single best row, so the
answer can include comparisons and proportions.

Requirements:
1. Put the script inside <result></result> tags.
2. Use only the operations listed above; no imports, no prints.
3. The script must end by assigning `final_df`.
4. Do not add explanations inside the tags.

## Response example
<result>
by_district = df.group_by("district").agg(max("floor"))
final_df = by_district.sort("floor", descending=true)
</result>

## Now write the script for the question above inside <result> tags."#,
        rows = snapshot.row_count,
        cols = snapshot.column_count,
        preview = snapshot.preview_json(),
        types = snapshot.types_json(),
        question = question,
        reference = SCRIPT_REFERENCE,
    )
}

/// Build the repair prompt for a retry attempt. Carries the failing script,
/// the error that just occurred, and the full history of earlier failures
/// (oldest first) so the model does not repeat itself.
pub fn repair_prompt(failing_code: &str, error: &str, prior_errors: &[AttemptError]) -> String {
    let history = if prior_errors.is_empty() {
        "(none)".to_string()
    } else {
        prior_errors
            .iter()
            .map(|e| format!("Attempt {} failed: {}", e.attempt, e.message))
            .join("\n")
    };

    format!(
        r#"The following script failed:
{code}

Error message:
{error}

Errors from earlier attempts:
{history}

{reference}

Fix the script. In particular:
1. Use only column names that exist in the table.
2. Use only the operations listed above.
3. Handle the data types correctly (quote string values, not numbers).
4. End by assigning the result frame to `final_df`.
5. Do not repeat a mistake already listed in the earlier errors.

Write the corrected script inside <result></result> tags."#,
        code = failing_code,
        error = error,
        history = history,
        reference = SCRIPT_REFERENCE,
    )
}

/// Build the answer-generation prompt from the question and the serialized
/// derived data.
pub fn answer_prompt(question: &str, data_json: &str) -> String {
    let context = serde_json::json!({
        "query": question,
        "data": data_json,
    });
    format!(
        r#"Given the following context:
{context}

Answer the question using only the data provided. The answer should be clear
and concise, without unnecessary formatting. Answer in the same language as
the question."#,
        context = context,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaSnapshot;
    use crate::synthesis::AttemptError;
    use polars::prelude::*;

    fn snapshot() -> SchemaSnapshot {
        let frame = df![
            "district" => ["A", "B"],
            "floor" => [3i64, 7],
        ]
        .unwrap();
        SchemaSnapshot::from_frame(&frame, 5).unwrap()
    }

    #[test]
    fn generation_prompt_embeds_question_and_schema() {
        let prompt = generation_prompt("Which district has the highest floor?", &snapshot());
        assert!(prompt.contains("Which district has the highest floor?"));
        assert!(prompt.contains("\"district\""));
        assert!(prompt.contains("integer"));
        assert!(prompt.contains("<result>"));
    }

    #[test]
    fn repair_prompt_carries_error_and_history() {
        let history = vec![AttemptError::new(1, "column 'florr' not found", None)];
        let prompt = repair_prompt("final_df = df.filter(florr > 1)", "type mismatch", &history);
        assert!(prompt.contains("final_df = df.filter(florr > 1)"));
        assert!(prompt.contains("type mismatch"));
        assert!(prompt.contains("Attempt 1 failed: column 'florr' not found"));
    }

    #[test]
    fn answer_prompt_embeds_data() {
        let prompt = answer_prompt("How many?", "[{\"count\":3}]");
        assert!(prompt.contains("How many?"));
        assert!(prompt.contains("count"));
    }
}

//! Code Extractor
//!
//! Pulls an executable pipeline script out of free-form model output. Model
//! formatting is not guaranteed, so extraction is an ordered cascade of
//! strategies with decreasing precision; the first non-empty hit wins, and
//! the caller validates the result by executing it rather than trusting the
//! extraction. Returns `None` only when no strategy yields anything — never
//! an error.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

/// Extraction knobs. The keyword heuristics in the lower-precision
/// strategies are deliberately configurable rather than contractual.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Name of the pre-bound input frame in the script scope.
    pub input_var: String,
    /// Name of the output binding a script must assign.
    pub output_var: String,
    /// Lines containing any of these count as script-like in the fallback
    /// strategies.
    pub keywords: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            input_var: "df".to_string(),
            output_var: "final_df".to_string(),
            keywords: vec![
                "df".to_string(),
                "final_df".to_string(),
                "group_by".to_string(),
                "filter".to_string(),
                "sort".to_string(),
                "agg".to_string(),
                "select".to_string(),
            ],
        }
    }
}

lazy_static! {
    // Marker pairs, case-insensitive and tolerant of whitespace inside the
    // tags. `<result>` is canonical; `<code>` and `<query>` are accepted as
    // synonyms.
    static ref MARKER_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?is)<\s*result\s*>(.*?)<\s*/\s*result\s*>").unwrap(),
        Regex::new(r"(?is)<\s*code\s*>(.*?)<\s*/\s*code\s*>").unwrap(),
        Regex::new(r"(?is)<\s*query\s*>(.*?)<\s*/\s*query\s*>").unwrap(),
    ];
    static ref FENCE_OPEN: Regex = Regex::new(r"```[a-zA-Z]*\n?").unwrap();
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[a-zA-Z]*\n?(.*?)```").unwrap();
}

/// Run the cascade. `Some` is always non-empty.
pub fn extract_code(text: &str, config: &ExtractorConfig) -> Option<String> {
    type Strategy = fn(&str, &ExtractorConfig) -> Option<String>;
    let cascade: &[(&str, Strategy)] = &[
        ("marker-tags", from_marker_tags),
        ("fenced-block", from_fenced_blocks),
        ("line-scan", from_line_scan),
        ("keyword-lines", from_keyword_lines),
    ];

    for (name, strategy) in cascade {
        if let Some(code) = strategy(text, config) {
            debug!("extracted {} chars via {}", code.len(), name);
            if *name == "keyword-lines" {
                warn!("extraction fell through to low-confidence keyword collection");
            }
            return Some(code);
        }
    }
    None
}

/// Strategy 1: designated marker pair (highest precision). Nested fence
/// markers inside the tag body are stripped.
fn from_marker_tags(text: &str, _config: &ExtractorConfig) -> Option<String> {
    for pattern in MARKER_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(text) {
            let body = captures.get(1).map(|m| m.as_str()).unwrap_or("");
            let stripped = FENCE_OPEN.replace_all(body, "");
            let stripped = stripped.trim();
            if !stripped.is_empty() {
                return Some(stripped.to_string());
            }
        }
    }
    None
}

/// Strategy 2: first generic fenced block whose content looks like a script
/// (keyword filter rejects fenced prose examples).
fn from_fenced_blocks(text: &str, config: &ExtractorConfig) -> Option<String> {
    for captures in FENCED_BLOCK.captures_iter(text) {
        let body = captures.get(1).map(|m| m.as_str()).unwrap_or("").trim();
        if body.is_empty() {
            continue;
        }
        let lowered = body.to_lowercase();
        if config.keywords.iter().any(|k| lowered.contains(k.as_str())) {
            return Some(body.to_string());
        }
    }
    None
}

/// Strategy 3: best-effort line scan. Start capturing at the first
/// keyword-bearing assignment line; a keyword alone is not enough, since
/// surrounding prose routinely mentions operation names ("first we sort
/// ..."), so the line must also contain `=`. Stop inclusive at the
/// output-variable assignment, or at the first blank / non-assignment line
/// once capture has started.
fn from_line_scan(text: &str, config: &ExtractorConfig) -> Option<String> {
    let output_assign = format!("{} =", config.output_var);
    let mut captured: Vec<&str> = Vec::new();
    let mut capturing = false;

    for raw in text.lines() {
        let line = raw.trim();
        if !capturing {
            if !line.is_empty()
                && line.contains('=')
                && config.keywords.iter().any(|k| line.contains(k.as_str()))
            {
                capturing = true;
                captured.push(line);
                if line.starts_with(&output_assign) {
                    break;
                }
            }
            continue;
        }

        if line.is_empty() {
            break;
        }
        if line.starts_with(&output_assign) || line.contains(&output_assign) {
            captured.push(line);
            break;
        }
        if line.starts_with('#') || line.contains('=') {
            captured.push(line);
            continue;
        }
        break;
    }

    if captured.is_empty() {
        None
    } else {
        Some(captured.join("\n"))
    }
}

/// Strategy 4: last resort — every line across the whole text mentioning the
/// input or output variable, in original order. Low confidence, but a
/// plausible script is never silently dropped.
fn from_keyword_lines(text: &str, config: &ExtractorConfig) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| {
            !l.is_empty() && (l.contains(&config.input_var) || l.contains(&config.output_var))
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ExtractorConfig {
        ExtractorConfig::default()
    }

    #[test]
    fn marker_tags_win_over_fenced_blocks() {
        let text = "prose\n<result>\nfinal_df = df.sort(\"floor\")\n</result>\n```\nfinal_df = df.head(1)\n```";
        let code = extract_code(text, &cfg()).unwrap();
        assert_eq!(code, "final_df = df.sort(\"floor\")");
    }

    #[test]
    fn marker_match_is_case_insensitive_and_whitespace_tolerant() {
        let text = "< Result >\nfinal_df = df\n</ RESULT >";
        let code = extract_code(text, &cfg()).unwrap();
        assert_eq!(code, "final_df = df");
    }

    #[test]
    fn code_synonym_tag_is_accepted() {
        let text = "<code>final_df = df.head(3)</code>";
        assert_eq!(extract_code(text, &cfg()).unwrap(), "final_df = df.head(3)");
    }

    #[test]
    fn nested_fences_inside_marker_are_stripped() {
        let text = "<result>\n```\nfinal_df = df.head(2)\n```\n</result>";
        assert_eq!(extract_code(text, &cfg()).unwrap(), "final_df = df.head(2)");
    }

    #[test]
    fn empty_marker_falls_through_to_fenced_block() {
        let text = "<result>   </result>\n```\nfinal_df = df.sort(\"x\")\n```";
        assert_eq!(extract_code(text, &cfg()).unwrap(), "final_df = df.sort(\"x\")");
    }

    #[test]
    fn fenced_block_with_language_tag() {
        let text = "Here is the script:\n```text\nsorted = df.sort(\"floor\", descending=true)\nfinal_df = sorted\n```\nDone.";
        let code = extract_code(text, &cfg()).unwrap();
        assert!(code.contains("final_df = sorted"));
    }

    #[test]
    fn fenced_prose_without_keywords_is_rejected() {
        let text = "```\njust some prose, nothing tabular\n```\nbut later:\nfinal_df = df.head(1)";
        let code = extract_code(text, &cfg()).unwrap();
        // Strategy 3 picks the assignment line instead of the prose fence.
        assert_eq!(code, "final_df = df.head(1)");
    }

    #[test]
    fn prose_mentioning_keywords_does_not_start_capture() {
        let text = "First we sort the data and filter it.\nfinal_df = df.head(2)";
        assert_eq!(extract_code(text, &cfg()).unwrap(), "final_df = df.head(2)");
    }

    #[test]
    fn line_scan_stops_at_output_assignment() {
        let text = "Explanation first.\nsorted = df.sort(\"floor\")\nfinal_df = sorted\nTrailing prose that is not code.";
        let code = extract_code(text, &cfg()).unwrap();
        assert_eq!(code, "sorted = df.sort(\"floor\")\nfinal_df = sorted");
    }

    #[test]
    fn line_scan_stops_at_blank_line() {
        let text = "top = df.head(5)\n\nfinal_df would be assigned here but after a break";
        let code = extract_code(text, &cfg()).unwrap();
        assert_eq!(code, "top = df.head(5)");
    }

    #[test]
    fn any_output_var_line_yields_non_empty_result() {
        // Extraction totality: a keyword-bearing line always produces output.
        let text = "The model rambled, then mentioned final_df somewhere mid-prose without assignment.";
        assert!(extract_code(text, &cfg()).is_some());
    }

    #[test]
    fn no_code_at_all_returns_none() {
        let text = "I am sorry, I cannot help with that question.";
        assert!(extract_code(text, &cfg()).is_none());
    }
}

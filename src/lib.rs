//! tablechat: ask natural-language questions about a tabular dataset.
//!
//! A question goes through one bounded round: the model gateway asks the
//! configured backend for a pipeline script, the extractor pulls the script
//! out of the free-form response, the executor runs it against the frame
//! with a safe enumerable operation set, and failures feed a repair prompt
//! until the retry budget runs out. A final model call turns the derived
//! frame into a natural-language answer.

pub mod answer;
pub mod assistant;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fuzzy_matcher;
pub mod llm;
pub mod prompts;
pub mod schema;
pub mod script;
pub mod synthesis;

pub use assistant::{AssistantResponse, DataAssistant};
pub use config::{AssistantConfig, BackendConfig, BackendKind};
pub use error::{AssistantError, BackendError, Result};
pub use synthesis::{AttemptError, SynthesisOutcome};

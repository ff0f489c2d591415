//! Reply synthesis.
//!
//! Tool-augmented turns always produce a reply: the model writes a report
//! from the extracted fields, and if it cannot, a fixed template lists the
//! fields instead. Direct turns (chat, knowledge) have nothing to fall back
//! on, so a model failure there is surfaced as
//! [`Error::ServiceUnavailable`].

use crate::extract::{ExtractedFields, extract_fields};
use crate::llm::ModelClient;
use crate::state::PipelineState;
use std::time::Duration;
use vireo_core::error::{Error, StageError};
use vireo_core::memory::Memory;
use vireo_core::message::Message;
use vireo_memory::DocumentHit;

/// Reply text carried by [`Error::ServiceUnavailable`].
pub const SERVICE_UNAVAILABLE_REPLY: &str = "service temporarily unavailable";

const PERSONA: &str = "You are Vireo, an assistant that helps creators understand their videos and audience. \
Answer in the user's language. Be concise and concrete.";

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub reply: String,
    pub fields: ExtractedFields,
    /// Set when the template was used instead of the model.
    pub fallback: Option<StageError>,
}

pub struct ResponseSynthesizer {
    llm: ModelClient,
    synthesis_timeout: Duration,
    chat_timeout: Duration,
    entity: String,
}

impl ResponseSynthesizer {
    pub fn new(llm: ModelClient, synthesis_timeout: Duration, chat_timeout: Duration) -> Self {
        Self {
            llm,
            synthesis_timeout,
            chat_timeout,
            entity: "video".into(),
        }
    }

    /// Entity name tool payloads nest their fields under.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = entity.into();
        self
    }

    /// Report on tool results. Never fails.
    ///
    /// The model gets the synthesis timeout or `budget`, whichever is
    /// shorter, so the template still lands inside the request deadline.
    pub async fn synthesize_tool_augmented(
        &self,
        state: &PipelineState,
        context: Vec<Message>,
        budget: Duration,
    ) -> Synthesis {
        let fields = extract_fields(&state.tool_results, &self.entity);
        let mut messages = vec![Message::system(PERSONA)];
        messages.extend(context);
        messages.push(Message::user(report_prompt(state, &fields)));

        let outcome = self
            .llm
            .complete("synthesis", messages, self.synthesis_timeout.min(budget))
            .await
            .map_err(|e| e.into_stage("synthesis", StageError::Synthesis))
            .and_then(|reply| {
                if reply.trim().is_empty() {
                    Err(StageError::Synthesis("model returned an empty reply".into()))
                } else {
                    Ok(reply)
                }
            });

        match outcome {
            Ok(reply) => Synthesis {
                reply,
                fields,
                fallback: None,
            },
            Err(e) => Synthesis {
                reply: fallback_report(state, &fields),
                fields,
                fallback: Some(e),
            },
        }
    }

    /// Answer from conversation context, plus retrieved memories and
    /// documents on the knowledge branch.
    pub async fn synthesize_direct(
        &self,
        context: Vec<Message>,
        knowledge: &[Memory],
        documents: &[DocumentHit],
        budget: Duration,
    ) -> Result<String, Error> {
        let mut system = PERSONA.to_string();
        if !documents.is_empty() {
            system.push_str("\n\nReference documents (prefer these over general knowledge):\n");
            for (i, hit) in documents.iter().enumerate() {
                system.push_str(&format!("[{}] {}\n", i + 1, hit.document.content));
            }
        }
        if !knowledge.is_empty() {
            system.push_str("\n\nRelevant notes from earlier conversations:\n");
            for memory in knowledge {
                system.push_str("- ");
                system.push_str(&memory.content);
                system.push('\n');
            }
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(context);

        let reply = self
            .llm
            .complete("chat", messages, self.chat_timeout.min(budget))
            .await
            .map_err(|e| Error::ServiceUnavailable {
                reason: e.to_string(),
                reply: SERVICE_UNAVAILABLE_REPLY.into(),
            })?;

        if reply.trim().is_empty() {
            return Err(Error::ServiceUnavailable {
                reason: "model returned an empty reply".into(),
                reply: SERVICE_UNAVAILABLE_REPLY.into(),
            });
        }
        Ok(reply)
    }
}

fn report_prompt(state: &PipelineState, fields: &ExtractedFields) -> String {
    let data = serde_json::to_string_pretty(fields).unwrap_or_default();
    let mut prompt = format!(
        "Analyse the following data for the request \"{message}\" (intent: {intent}).\n\n\
         Data (JSON):\n{data}\n\n\
         Use the exact numbers above. Reply in this format:\n\
         [Summary] one sentence based on the title and description\n\
         [Data] views {views}, likes {likes}, comments {comments}\n\
         [Sentiment] positive / negative / neutral\n\
         [Key points] 1. title 2. topic 3. performance\n\
         [Suggestions] 1. optimisation 2. promotion",
        message = state.original_message,
        intent = state.intent_label(),
        views = fields.view_count,
        likes = fields.like_count,
        comments = fields.comment_count,
    );

    let errors = tool_errors(state);
    if !errors.is_empty() {
        prompt.push_str("\n\nSome tools failed; mention that the data may be incomplete:\n");
        prompt.push_str(&errors);
    }
    prompt
}

/// Deterministic report used when the model is unavailable.
pub fn fallback_report(state: &PipelineState, fields: &ExtractedFields) -> String {
    let mut out = String::from(
        "Analysis report (simplified)\n\n\
         The analysis model is busy, so here is the data the tools returned:\n",
    );
    if !fields.title.is_empty() {
        out.push_str(&format!("- Title: {}\n", fields.title));
    }
    if !fields.author.is_empty() {
        out.push_str(&format!("- Author: {}\n", fields.author));
    }
    out.push_str(&format!("- Views: {}\n", fields.view_count));
    out.push_str(&format!("- Likes: {}\n", fields.like_count));
    out.push_str(&format!("- Comments: {}\n", fields.comment_count));
    if !fields.description.is_empty() {
        out.push_str(&format!("- Description: {}\n", fields.description));
    }

    let errors = tool_errors(state);
    if !errors.is_empty() {
        out.push_str("\nTool errors:\n");
        out.push_str(&errors);
    }
    if state.tool_results.is_empty() {
        out.push_str("\nNo tool data was available for this request.\n");
    }
    out.push_str("\nPlease try again later for a full analysis.");
    out
}

fn tool_errors(state: &PipelineState) -> String {
    state
        .tool_results
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| format!("- {}: {}\n", r.tool_name, e)))
        .collect()
}

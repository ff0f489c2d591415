//! Intent classification.
//!
//! The model gets first say. If it fails, times out, or answers with
//! something that is not JSON, a keyword classifier takes over. A model
//! answer below the acceptance threshold is weighed against the keyword
//! result and the more confident of the two wins.
//!
//! Entities (video identifiers, URLs) are always extracted locally and
//! merged into whichever result is returned.

use crate::llm::{ModelClient, json_object_span};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};
use vireo_core::error::StageError;
use vireo_core::intent::{Entity, Intent, IntentKind};
use vireo_core::message::Message;

pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Entity kind for a video identifier.
pub const VIDEO_ID: &str = "video_id";
pub const URL: &str = "url";

static BV_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Bb][Vv][a-zA-Z0-9]{10}").expect("valid regex"));
static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{8,}").expect("valid regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

/// Keyword tables, checked in order. The first hit wins.
const RULES: &[(IntentKind, f32, &[&str])] = &[
    (
        IntentKind::VideoAnalysis,
        0.8,
        &["分析视频", "视频分析", "这个视频", "视频内容", "视频讲了", "视频总结", "analyze video", "analyse video", "this video"],
    ),
    (
        IntentKind::Recommendation,
        0.8,
        &["推荐", "类似", "相似", "想看", "找一找", "recommend", "similar"],
    ),
    (
        IntentKind::WeeklyReport,
        0.8,
        &["周报", "这周", "本周数据", "数据分析", "我的数据", "weekly report", "this week"],
    ),
    (
        IntentKind::TopicAnalysis,
        0.8,
        &["选题", "主题", "这个题材", "内容方向", "topic"],
    ),
    (
        IntentKind::KnowledgeQa,
        0.7,
        &["什么是", "怎么", "如何", "为什么", "介绍一下", "what is", "how to", "how do", "why "],
    ),
];

const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Which classifier produced the returned intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    Model,
    Rules,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::Model => "model",
            IntentSource::Rules => "rules",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    pub source: IntentSource,
    /// Set when the model path failed and the keyword result was used.
    pub fallback: Option<StageError>,
}

#[derive(Debug, Deserialize)]
struct ModelIntent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    entities: Vec<Entity>,
}

pub struct IntentClassifier {
    llm: ModelClient,
    threshold: f32,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(llm: ModelClient, timeout: Duration) -> Self {
        Self {
            llm,
            threshold: DEFAULT_THRESHOLD,
            timeout,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub async fn recognize(&self, utterance: &str) -> Classification {
        let (mut intent, source, fallback) = match self.ask_model(utterance).await {
            Ok(model) if model.confidence >= self.threshold => (model, IntentSource::Model, None),
            Ok(model) => {
                let rules = classify_by_rules(utterance);
                debug!(
                    model_intent = %model.kind,
                    model_confidence = model.confidence,
                    rule_intent = %rules.kind,
                    rule_confidence = rules.confidence,
                    "Low-confidence model intent, comparing with rules"
                );
                if rules.confidence > model.confidence {
                    (rules, IntentSource::Rules, None)
                } else {
                    (model, IntentSource::Model, None)
                }
            }
            Err(e) => {
                info!(error = %e, "Intent model unavailable, using keyword rules");
                (classify_by_rules(utterance), IntentSource::Rules, Some(e))
            }
        };

        merge_entities(&mut intent.entities, extract_entities(utterance));
        Classification {
            intent,
            source,
            fallback,
        }
    }

    async fn ask_model(&self, utterance: &str) -> Result<Intent, StageError> {
        let messages = vec![
            Message::system("You classify user requests for a video-platform assistant. Reply with JSON only."),
            Message::user(classification_prompt(utterance)),
        ];
        let reply = self
            .llm
            .complete("intent", messages, self.timeout)
            .await
            .map_err(|e| e.into_stage("intent", StageError::Classification))?;

        let span = json_object_span(&reply)
            .ok_or_else(|| StageError::Classification("reply contained no JSON object".into()))?;
        let parsed: ModelIntent = serde_json::from_str(span)
            .map_err(|e| StageError::Classification(format!("unparsable intent JSON: {e}")))?;

        let mut intent = Intent::new(IntentKind::from_label(&parsed.kind), parsed.confidence, utterance);
        intent.entities = parsed.entities;
        Ok(intent)
    }
}

fn classification_prompt(utterance: &str) -> String {
    let mut taxonomy = String::new();
    for (i, kind) in IntentKind::ALL.iter().enumerate() {
        taxonomy.push_str(&format!("{}. {} - {}\n", i + 1, kind.as_str(), kind.description()));
    }
    format!(
        "Classify the user's request and extract entities.\n\n\
         User request: \"{utterance}\"\n\n\
         Intent types:\n{taxonomy}\n\
         Respond with JSON in exactly this shape:\n\
         {{\"type\": \"<intent type>\", \"confidence\": 0.95, \
         \"entities\": [{{\"type\": \"<entity type>\", \"value\": \"<value>\", \"start\": 0, \"end\": 5}}]}}"
    )
}

/// Keyword classifier. Always succeeds; unmatched input is general chat.
pub fn classify_by_rules(utterance: &str) -> Intent {
    let lowered = utterance.to_lowercase();
    let (kind, confidence) = RULES
        .iter()
        .find(|(_, _, keywords)| keywords.iter().any(|k| lowered.contains(*k)))
        .map(|(kind, confidence, _)| (*kind, *confidence))
        .unwrap_or((IntentKind::GeneralChat, DEFAULT_CONFIDENCE));

    let mut intent = Intent::new(kind, confidence, utterance);
    intent.entities = extract_entities(utterance);
    intent
}

/// Video identifiers and URLs, with byte offsets into `utterance`.
pub fn extract_entities(utterance: &str) -> Vec<Entity> {
    let mut entities = Vec::new();

    if let Some(m) = BV_ID.find(utterance).or_else(|| NUMERIC_ID.find(utterance)) {
        entities.push(Entity {
            kind: VIDEO_ID.into(),
            value: normalize_identifier(m.as_str()),
            start: m.start(),
            end: m.end(),
        });
    }

    if let Some(m) = LINK.find(utterance) {
        entities.push(Entity {
            kind: URL.into(),
            value: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        });
    }

    entities
}

/// The video identifier mentioned in `utterance`, if any.
pub fn extract_identifier(utterance: &str) -> Option<String> {
    BV_ID
        .find(utterance)
        .or_else(|| NUMERIC_ID.find(utterance))
        .map(|m| normalize_identifier(m.as_str()))
}

/// `bv…` → `BV…`. The rest of the identifier is case-sensitive and kept.
fn normalize_identifier(raw: &str) -> String {
    match raw.get(..2) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bv") => format!("BV{}", &raw[2..]),
        _ => raw.to_string(),
    }
}

/// Add local entities the model did not report. Local values replace
/// model values of the same kind, since they carry exact offsets.
fn merge_entities(entities: &mut Vec<Entity>, local: Vec<Entity>) {
    for entity in local {
        entities.retain(|e| e.kind != entity.kind);
        entities.push(entity);
    }
}

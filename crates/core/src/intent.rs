//! Intent taxonomy.

use serde::{Deserialize, Serialize};

/// What the user is trying to do. The taxonomy is closed; unknown labels
/// read as [`IntentKind::GeneralChat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    VideoAnalysis,
    Recommendation,
    KnowledgeQa,
    WeeklyReport,
    TopicAnalysis,
    KnowledgeBase,
    ContentCreation,
    UserProfile,
    DanmakuAnalysis,
    TrendTracking,
    CompetitorAnalysis,
    #[serde(other)]
    GeneralChat,
}

impl IntentKind {
    pub const ALL: [IntentKind; 12] = [
        IntentKind::VideoAnalysis,
        IntentKind::Recommendation,
        IntentKind::KnowledgeQa,
        IntentKind::WeeklyReport,
        IntentKind::TopicAnalysis,
        IntentKind::KnowledgeBase,
        IntentKind::ContentCreation,
        IntentKind::UserProfile,
        IntentKind::DanmakuAnalysis,
        IntentKind::TrendTracking,
        IntentKind::CompetitorAnalysis,
        IntentKind::GeneralChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::VideoAnalysis => "video_analysis",
            IntentKind::Recommendation => "recommendation",
            IntentKind::KnowledgeQa => "knowledge_qa",
            IntentKind::WeeklyReport => "weekly_report",
            IntentKind::TopicAnalysis => "topic_analysis",
            IntentKind::KnowledgeBase => "knowledge_base",
            IntentKind::ContentCreation => "content_creation",
            IntentKind::UserProfile => "user_profile",
            IntentKind::DanmakuAnalysis => "danmaku_analysis",
            IntentKind::TrendTracking => "trend_tracking",
            IntentKind::CompetitorAnalysis => "competitor_analysis",
            IntentKind::GeneralChat => "general_chat",
        }
    }

    /// Parse a label. Unknown labels map to general chat.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == label)
            .unwrap_or(IntentKind::GeneralChat)
    }

    /// One-line description used when presenting the taxonomy to a model.
    pub fn description(&self) -> &'static str {
        match self {
            IntentKind::VideoAnalysis => "analyse a specific video's content and performance",
            IntentKind::Recommendation => "recommend similar or related content",
            IntentKind::KnowledgeQa => "answer a factual or how-to question",
            IntentKind::WeeklyReport => "summarise the user's own recent data",
            IntentKind::TopicAnalysis => "evaluate a topic or content direction",
            IntentKind::KnowledgeBase => "look something up in the knowledge base",
            IntentKind::ContentCreation => "help write or plan new content",
            IntentKind::UserProfile => "describe an author's or audience's profile",
            IntentKind::DanmakuAnalysis => "analyse live comments on a video",
            IntentKind::TrendTracking => "track trending topics",
            IntentKind::CompetitorAnalysis => "compare against competing creators",
            IntentKind::GeneralChat => "small talk or anything else",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span of the utterance recognised as something specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// e.g. "video_id", "url"
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    /// Byte offsets into the utterance.
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
}

/// The classified purpose of one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f32,
    pub raw_query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
}

impl Intent {
    pub fn new(kind: IntentKind, confidence: f32, raw_query: impl Into<String>) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            raw_query: raw_query.into(),
            entities: Vec::new(),
        }
    }

    pub fn entity(&self, kind: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.kind == kind)
    }
}

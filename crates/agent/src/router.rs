//! Intent → pipeline branch.

use serde::{Deserialize, Serialize};
use vireo_core::intent::IntentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Answered from retrieved long-term memory.
    Knowledge,
    /// Grounded in tool results.
    ToolAugmented,
    GeneralChat,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Knowledge => "knowledge",
            Branch::ToolAugmented => "tool_augmented",
            Branch::GeneralChat => "general_chat",
        }
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn route(kind: IntentKind) -> Branch {
    match kind {
        IntentKind::KnowledgeQa | IntentKind::KnowledgeBase => Branch::Knowledge,
        IntentKind::VideoAnalysis
        | IntentKind::Recommendation
        | IntentKind::WeeklyReport
        | IntentKind::TopicAnalysis
        | IntentKind::ContentCreation
        | IntentKind::UserProfile
        | IntentKind::DanmakuAnalysis
        | IntentKind::TrendTracking
        | IntentKind::CompetitorAnalysis => Branch::ToolAugmented,
        IntentKind::GeneralChat => Branch::GeneralChat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_intent_has_a_branch() {
        let tool_augmented = IntentKind::ALL
            .iter()
            .filter(|k| route(**k) == Branch::ToolAugmented)
            .count();
        assert_eq!(tool_augmented, 9);
        assert_eq!(route(IntentKind::KnowledgeQa), Branch::Knowledge);
        assert_eq!(route(IntentKind::KnowledgeBase), Branch::Knowledge);
        assert_eq!(route(IntentKind::GeneralChat), Branch::GeneralChat);
        assert_eq!(route(IntentKind::from_label("unheard_of")), Branch::GeneralChat);
    }
}

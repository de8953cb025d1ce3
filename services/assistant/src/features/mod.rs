//! Assistant features. Each one contributes an instruction, one tool
//! declaration and the handler answering calls to it.

pub mod calendar;
pub mod email;
pub mod youtube;

use gemini_live::types::ToolDeclaration;
use gemini_live::{LiveSession, SetConfigOutcome, ToolHandler};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Calendar,
    Email,
    YouTube,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 3] = [FeatureKind::Calendar, FeatureKind::Email, FeatureKind::YouTube];

    /// Parses a comma separated list such as `"calendar, youtube"`.
    /// Duplicates are dropped; the first occurrence keeps its position.
    pub fn parse_list(list: &str) -> Result<Vec<FeatureKind>, String> {
        let mut kinds = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind = item.parse::<FeatureKind>()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    pub fn build(self) -> Box<dyn Feature> {
        match self {
            FeatureKind::Calendar => Box::new(calendar::Calendar::default()),
            FeatureKind::Email => Box::new(email::EmailDrafts::default()),
            FeatureKind::YouTube => Box::new(youtube::YouTubeSuggestions::default()),
        }
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calendar" => Ok(FeatureKind::Calendar),
            "email" => Ok(FeatureKind::Email),
            "youtube" => Ok(FeatureKind::YouTube),
            other => Err(format!("unknown feature '{other}'")),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Calendar => "calendar",
            FeatureKind::Email => "email",
            FeatureKind::YouTube => "youtube",
        };
        f.write_str(name)
    }
}

pub trait Feature: Send + Sync {
    fn kind(&self) -> FeatureKind;

    /// Text merged into the session's system instruction.
    fn instruction(&self) -> &'static str;

    fn declaration(&self) -> ToolDeclaration;

    fn handler(&self) -> Arc<dyn ToolHandler>;

    /// Declares the tool on `session` and installs the handler.
    fn mount(&self, session: &LiveSession) -> SetConfigOutcome {
        let declaration = self.declaration();
        info!(feature = %self.kind(), tool = %declaration.name, "Mounting feature");
        let outcome = session.register_tool(declaration, self.handler());
        if outcome.staged {
            warn!(feature = %self.kind(), "Mounted while streaming; the tool is offered from the next connection");
        }
        outcome
    }

    /// Removes the tool again. The shared connection is left alone.
    fn unmount(&self, session: &LiveSession) -> bool {
        let name = self.declaration().name;
        info!(feature = %self.kind(), tool = %name, "Unmounting feature");
        session.unregister_tool(&name)
    }
}

/// One system instruction covering every mounted feature.
pub fn combined_instruction(features: &[Box<dyn Feature>]) -> String {
    let mut text = String::from("You are my helpful assistant.");
    for feature in features {
        text.push_str("\n\n");
        text.push_str(feature.instruction());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feature_lists() {
        assert_eq!(
            FeatureKind::parse_list(" YouTube,email,,youtube "),
            Ok(vec![FeatureKind::YouTube, FeatureKind::Email])
        );
        assert_eq!(FeatureKind::parse_list(""), Ok(vec![]));
        assert!(FeatureKind::parse_list("calendar,maps").is_err());
    }

    #[test]
    fn every_feature_declares_a_distinct_tool() {
        let features: Vec<_> = FeatureKind::ALL.iter().map(|k| k.build()).collect();
        let mut names: Vec<_> = features.iter().map(|f| f.declaration().name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names, vec!["book_calendar", "draft_email", "search_youtube"]);
    }

    #[test]
    fn mount_and_unmount_round_trip_on_the_session() {
        let session = LiveSession::new();
        let feature = FeatureKind::Email.build();

        let outcome = feature.mount(&session);
        assert!(outcome.collisions.is_empty());
        assert!(!outcome.staged);
        assert!(session.registry().contains("draft_email"));

        assert!(feature.unmount(&session));
        assert!(!session.registry().contains("draft_email"));
        assert!(!feature.unmount(&session));
    }

    #[test]
    fn combined_instruction_mentions_each_tool() {
        let features: Vec<_> = FeatureKind::ALL.iter().map(|k| k.build()).collect();
        let text = combined_instruction(&features);
        for name in ["book_calendar", "draft_email", "search_youtube"] {
            assert!(text.contains(name), "{name} missing from instruction");
        }
    }
}

//! Turns video requests into YouTube search suggestions.

use super::{Feature, FeatureKind};
use anyhow::bail;
use gemini_live::types::{Schema, ToolDeclaration};
use gemini_live::{ToolHandler, typed_tool};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;
use url::Url;

pub const TOOL_NAME: &str = "search_youtube";
const SEARCH_PAGE: &str = "https://www.youtube.com/results";
const DEFAULT_MAX_RESULTS: u32 = 5;
const MAX_RESULTS_CAP: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(rename = "maxResults", default)]
    pub max_results: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub query: String,
    pub max_results: u32,
    pub search_url: String,
}

#[derive(Debug, Default)]
pub struct SuggestionLog {
    suggestions: Mutex<Vec<Suggestion>>,
}

impl SuggestionLog {
    pub fn suggest(&self, args: SearchArgs) -> anyhow::Result<Suggestion> {
        let query = args.query.split_whitespace().collect::<Vec<_>>().join(" ");
        if query.is_empty() {
            bail!("search query is empty");
        }
        let max_results = args
            .max_results
            .filter(|n| n.is_finite())
            .map(|n| n.round().clamp(1.0, MAX_RESULTS_CAP as f64) as u32)
            .unwrap_or(DEFAULT_MAX_RESULTS);
        let search_url = Url::parse_with_params(SEARCH_PAGE, &[("search_query", query.as_str())])?;

        let suggestion = Suggestion {
            query,
            max_results,
            search_url: search_url.to_string(),
        };
        info!(query = %suggestion.query, max_results, "Suggested YouTube search");
        self.suggestions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(suggestion.clone());
        Ok(suggestion)
    }

    pub fn history(&self) -> Vec<Suggestion> {
        self.suggestions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Default)]
pub struct YouTubeSuggestions {
    log: Arc<SuggestionLog>,
}

impl YouTubeSuggestions {
    pub fn log(&self) -> &Arc<SuggestionLog> {
        &self.log
    }
}

impl Feature for YouTubeSuggestions {
    fn kind(&self) -> FeatureKind {
        FeatureKind::YouTube
    }

    fn instruction(&self) -> &'static str {
        "When I ask for video suggestions, use the search_youtube function. \
         Understand my intent and create a specific search query, for example \
         \"python full stack web development tutorial step by step\" for \
         \"python full stack tutorial\". Explain why you chose the search terms."
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(TOOL_NAME, "Searches for YouTube videos based on a query.")
            .with_parameters(
                Schema::object()
                    .required_property(
                        "query",
                        Schema::string().describe("Search query for YouTube videos"),
                    )
                    .property(
                        "maxResults",
                        Schema::number()
                            .describe("Maximum number of results to return (default: 5)"),
                    ),
            )
    }

    fn handler(&self) -> Arc<dyn ToolHandler> {
        let log = self.log.clone();
        typed_tool(move |args: SearchArgs| {
            let log = log.clone();
            async move {
                let suggestion = log.suggest(args)?;
                Ok::<Value, anyhow::Error>(json!({ "success": true, "suggestion": suggestion }))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(query: &str, max_results: Option<f64>) -> SearchArgs {
        SearchArgs {
            query: query.to_string(),
            max_results,
        }
    }

    #[test]
    fn builds_an_encoded_search_url() {
        let log = SuggestionLog::default();
        let suggestion = log.suggest(args("  rust  async & tokio ", None)).unwrap();

        assert_eq!(suggestion.query, "rust async & tokio");
        assert_eq!(suggestion.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(
            suggestion.search_url,
            "https://www.youtube.com/results?search_query=rust+async+%26+tokio"
        );
    }

    #[test]
    fn clamps_result_count() {
        let log = SuggestionLog::default();
        assert_eq!(log.suggest(args("a", Some(0.0))).unwrap().max_results, 1);
        assert_eq!(log.suggest(args("a", Some(7.4))).unwrap().max_results, 7);
        assert_eq!(log.suggest(args("a", Some(500.0))).unwrap().max_results, 50);
        assert_eq!(log.history().len(), 3);
    }

    #[test]
    fn empty_query_is_an_error() {
        let log = SuggestionLog::default();
        assert!(log.suggest(args("   ", None)).is_err());
        assert!(log.history().is_empty());
    }

    #[tokio::test]
    async fn handler_returns_the_suggestion() {
        let feature = YouTubeSuggestions::default();
        let call = gemini_live::types::FunctionCall {
            id: "1".to_string(),
            name: TOOL_NAME.to_string(),
            args: json!({ "query": "axum tutorial", "maxResults": 3 })
                .as_object()
                .cloned()
                .unwrap(),
        };

        let response = feature.handler().call(call).await.unwrap();
        assert_eq!(response["suggestion"]["maxResults"], 3);
        assert_eq!(feature.log().history()[0].query, "axum tutorial");
    }
}

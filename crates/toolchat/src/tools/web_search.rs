use std::fmt::Write as _;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use toolchat_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{WebToolsConfig, request_error};

const MAX_RELATED_TOPICS: usize = 10;

/// Input of [`WebSearchTool`].
#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "The search query.")]
    query: String,
}

/// A tool that looks up instant answers with DuckDuckGo.
pub struct WebSearchTool {
    config: WebToolsConfig,
    parameter_schema: Value,
}

impl WebSearchTool {
    /// Creates a new web search tool.
    #[inline]
    pub fn new(config: WebToolsConfig) -> Self {
        Self {
            config,
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }
}

impl Tool for WebSearchTool {
    type Input = WebSearchParameters;

    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for a quick answer: a summary, a definition or a \
list of related topics with links. Use fetch_page to read a linked page."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: WebSearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.config.client.clone();
        let url = self.config.search_endpoint.clone();
        async move {
            let query = input.query.trim().to_owned();
            if query.is_empty() {
                return Err(ToolError::invalid_input()
                    .with_reason("the query must not be empty"));
            }
            let answer: InstantAnswer = client
                .get(url)
                .query(&[
                    ("q", query.as_str()),
                    ("format", "json"),
                    ("no_html", "1"),
                    ("skip_disambig", "1"),
                ])
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .map_err(request_error)?
                .json()
                .await
                .map_err(request_error)?;
            Ok(format_answer(&query, &answer))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    abstract_source: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    answer: Value,
    definition: String,
    #[serde(rename = "DefinitionURL")]
    definition_url: String,
    redirect: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Topic {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<RelatedTopic>,
    },
}

fn collect_topics<'a>(topics: &'a [RelatedTopic], out: &mut Vec<(&'a str, &'a str)>) {
    for topic in topics {
        if out.len() >= MAX_RELATED_TOPICS {
            return;
        }
        match topic {
            RelatedTopic::Topic { text, first_url } => {
                out.push((text.as_str(), first_url.as_str()));
            }
            RelatedTopic::Group { topics } => collect_topics(topics, out),
        }
    }
}

fn format_answer(query: &str, answer: &InstantAnswer) -> String {
    let mut out = String::new();
    if !answer.heading.is_empty() {
        let _ = writeln!(out, "# {}", answer.heading);
    }
    if !answer.abstract_text.is_empty() {
        let _ = writeln!(out, "{}", answer.abstract_text);
        if !answer.abstract_url.is_empty() {
            let _ = writeln!(
                out,
                "Source: {} ({})",
                answer.abstract_source, answer.abstract_url
            );
        }
    }
    // `Answer` is a string for most queries and an object for calculators
    // and the like.
    match &answer.answer {
        Value::String(text) if !text.is_empty() => {
            let _ = writeln!(out, "Answer: {text}");
        }
        Value::Null | Value::String(_) => {}
        other => {
            let _ = writeln!(out, "Answer: {other}");
        }
    }
    if !answer.definition.is_empty() {
        let _ = writeln!(
            out,
            "Definition: {} ({})",
            answer.definition, answer.definition_url
        );
    }
    if !answer.redirect.is_empty() {
        let _ = writeln!(out, "Redirect: {}", answer.redirect);
    }

    let mut topics = vec![];
    collect_topics(&answer.related_topics, &mut topics);
    if !topics.is_empty() {
        out.push_str("Related topics:\n");
        for (text, url) in topics {
            if url.is_empty() {
                let _ = writeln!(out, "- {text}");
            } else {
                let _ = writeln!(out, "- {text} ({url})");
            }
        }
    }

    if out.is_empty() {
        return format!(
            "No instant answer found for \"{query}\". Try a more specific \
query, or fetch a page that is likely to answer it."
        );
    }
    out.truncate(out.trim_end().len());
    out
}

use mime::Mime;
use reqwest::{Response, Url, header};
use schemars::{JsonSchema, schema_for};
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use serde_json::Value;
use toolchat_core::tool::{Error as ToolError, Tool, ToolResult};

use super::{WebToolsConfig, request_error, truncate_on_char_boundary};

const DEFAULT_MAX_LENGTH: usize = 20_000;
const SKIPPED_TAGS: [&str; 4] = ["script", "style", "noscript", "svg"];
/// Elements that start and end a line of text.
const BLOCK_TAGS: [&str; 28] = [
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl",
    "dt", "figcaption", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "p", "pre", "section", "td", "tr",
];

/// Input of [`FetchPageTool`].
#[derive(Deserialize, JsonSchema)]
pub struct FetchPageParameters {
    #[schemars(description = "The http or https URL of the page.")]
    url: String,
    #[schemars(description = "Maximum length of the returned text in bytes. \
Defaults to 20000.")]
    max_length: Option<usize>,
}

/// A tool that fetches a web page and returns its readable text.
pub struct FetchPageTool {
    config: WebToolsConfig,
    parameter_schema: Value,
}

impl FetchPageTool {
    /// Creates a new page fetching tool.
    #[inline]
    pub fn new(config: WebToolsConfig) -> Self {
        Self {
            config,
            parameter_schema: schema_for!(FetchPageParameters).to_value(),
        }
    }
}

impl Tool for FetchPageTool {
    type Input = FetchPageParameters;

    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Opens a web page and returns its title and readable text, without \
markup, scripts or styles. Long pages are truncated."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: FetchPageParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.config.client.clone();
        let max_body_size = self.config.max_body_size;
        async move {
            let url = parse_web_url(&input.url)?;
            let max_length = input.max_length.unwrap_or(DEFAULT_MAX_LENGTH);

            let resp = client
                .get(url)
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .map_err(request_error)?;
            let final_url = resp.url().to_string();
            let is_html = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<Mime>().ok())
                .is_some_and(|m| {
                    m.subtype() == mime::HTML || m.subtype().as_str() == "xhtml+xml"
                });
            let body = read_body(resp, max_body_size).await?;
            let body = String::from_utf8_lossy(&body).into_owned();

            let mut out = String::new();
            let text = if is_html {
                let page = extract_page(&body);
                if let Some(title) = page.title {
                    out.push_str(&format!("Title: {title}\n"));
                }
                page.text
            } else {
                body
            };
            out.push_str(&format!("URL: {final_url}\n\n"));

            let kept = truncate_on_char_boundary(&text, max_length);
            out.push_str(kept);
            if kept.len() < text.len() {
                out.push_str(&format!(
                    "\n\n[truncated at {} of {} bytes]",
                    kept.len(),
                    text.len()
                ));
            }
            Ok(out)
        }
    }
}

fn parse_web_url(raw: &str) -> Result<Url, ToolError> {
    let url = Url::parse(raw.trim()).map_err(|err| {
        ToolError::invalid_input().with_reason(format!("invalid URL `{raw}`: {err}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ToolError::invalid_input()
            .with_reason(format!("unsupported URL scheme `{scheme}`"))),
    }
}

/// Reads the body, giving up as soon as it grows past `max_size`.
async fn read_body(
    mut resp: Response,
    max_size: usize,
) -> Result<Vec<u8>, ToolError> {
    let too_large = || {
        ToolError::execution_error().with_reason(format!(
            "response too large (limit is {max_size} bytes)"
        ))
    };
    if resp.content_length().is_some_and(|len| len > max_size as u64) {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await.map_err(request_error)? {
        if body.len() + chunk.len() > max_size {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

struct Page {
    title: Option<String>,
    text: String,
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn extract_page(html: &str) -> Page {
    let document = Html::parse_document(html);

    let title = select_first(&document, "title")
        .map(|title| collapse_whitespace(&title.text().collect::<String>()))
        .filter(|title| !title.is_empty());

    let root = select_first(&document, "body")
        .unwrap_or_else(|| document.root_element());
    let mut lines = Lines::default();
    collect_text(root, &mut lines);
    lines.break_line();

    Page {
        title,
        text: lines.done.join("\n"),
    }
}

#[derive(Default)]
struct Lines {
    done: Vec<String>,
    /// Raw text of the line being built, collapsed when it ends.
    current: String,
}

impl Lines {
    fn break_line(&mut self) {
        let line = collapse_whitespace(&self.current);
        self.current.clear();
        if !line.is_empty() {
            self.done.push(line);
        }
    }
}

fn collect_text(element: ElementRef<'_>, lines: &mut Lines) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    let is_block = BLOCK_TAGS.contains(&name);
    if is_block {
        lines.break_line();
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => lines.current.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, lines);
                }
            }
            _ => {}
        }
    }
    if is_block {
        lines.break_line();
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

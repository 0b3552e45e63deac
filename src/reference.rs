//! Optional reference page: fetch it, strip it down to readable text.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::constants::REFERENCE_MAX_CHARS;
use crate::error::ReferenceFetchError;

#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    /// Returns the raw HTML behind `url`.
    async fn fetch(&self, url: &str) -> Result<String, ReferenceFetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, ReferenceFetchError> {
        let parsed = reqwest::Url::parse(url.trim()).map_err(|_| ReferenceFetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ReferenceFetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| ReferenceFetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReferenceFetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ReferenceFetchError::Request {
                url: url.to_string(),
                source,
            })?;
        debug!(bytes = body.len(), "Fetched reference page");
        Ok(body)
    }
}

lazy_static::lazy_static! {
    static ref BODY: Regex = Regex::new(r"(?is)<body[^>]*>(.*?)(?:</body\s*>|\z)").unwrap();
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    // Opening or closing tag of each element that is dropped with its content.
    // Script and style bodies are raw text, so they never nest.
    static ref DROPPED: Vec<(Regex, bool)> = [
        ("script", false),
        ("style", false),
        ("nav", true),
        ("footer", true),
        ("header", true),
    ]
    .iter()
    .map(|(tag, nests)| (Regex::new(&format!(r"(?i)<(/?){}\b[^>]*>", tag)).unwrap(), *nests))
    .collect();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    // Markup that only shows up once entities are decoded. Stricter than TAG
    // so text like "a < b" survives.
    static ref DECODED_TAG: Regex = Regex::new(r"</?[A-Za-z][^<>]*>").unwrap();
    static ref STRAY_OPENER: Regex = Regex::new(r"(?i)</?(?:script|style)\b").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Reduces an HTML page to plain text: body only, no script/style/nav/footer/
/// header blocks, whitespace collapsed, at most [`REFERENCE_MAX_CHARS`] chars.
pub fn clean_html(html: &str) -> String {
    let body = BODY
        .captures(html)
        .and_then(|c| c.get(1))
        .map_or(html, |m| m.as_str());

    let text = drop_elements(&COMMENT.replace_all(body, " "));
    let text = TAG.replace_all(&text, " ");

    // Escaped markup turns back into tags here and gets the same treatment.
    let text = drop_elements(&decode_entities(&text));
    let text = DECODED_TAG.replace_all(&text, " ");
    let text = STRAY_OPENER.replace_all(&text, " ");

    let collapsed = WHITESPACE.replace_all(&text, " ");
    collapsed.trim().chars().take(REFERENCE_MAX_CHARS).collect()
}

fn drop_elements(text: &str) -> String {
    DROPPED
        .iter()
        .fold(text.to_string(), |text, (tag, nests)| drop_element(&text, tag, *nests))
}

/// Removes every outermost element matched by `tag`, content included. An
/// element left open runs to the end of the text.
fn drop_element(text: &str, tag: &Regex, nests: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut kept_from = 0;
    let mut depth = 0usize;
    for caps in tag.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let closing = caps.get(1).is_some_and(|g| !g.as_str().is_empty());
        if closing {
            // stray closers are left for the tag pass
            if depth == 0 {
                continue;
            }
            depth -= 1;
            if depth == 0 {
                kept_from = whole.end();
                out.push(' ');
            }
        } else if depth == 0 {
            out.push_str(&text[kept_from..whole.start()]);
            depth = 1;
        } else if nests {
            depth += 1;
        }
    }
    if depth == 0 {
        out.push_str(&text[kept_from..]);
    }
    out
}

fn decode_entities(text: &str) -> String {
    // &amp; goes last so "&amp;lt;" stays "&lt;"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Fetches and cleans `url`. Empty cleaned text counts as a failure.
pub async fn load_reference(
    fetcher: &dyn ReferenceFetcher,
    url: &str,
) -> Result<String, ReferenceFetchError> {
    let html = fetcher.fetch(url).await?;
    let text = clean_html(&html);
    if text.is_empty() {
        return Err(ReferenceFetchError::Empty {
            url: url.to_string(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_boilerplate_elements() {
        let html = r#"<html><head><title>Title</title><style>body { color: red }</style></head>
            <body>
              <header><h1>Site name</h1></header>
              <nav><a href="/">Home</a></nav>
              <SCRIPT type="text/javascript">var x = "<p>";</SCRIPT>
              <article><p>Remote   work   is
              <b>growing</b>.</p></article>
              <!-- tracking -->
              <footer>Copyright</footer>
            </body></html>"#;
        assert_eq!(clean_html(html), "Remote work is growing .");
    }

    #[test]
    fn test_without_body_uses_whole_document() {
        assert_eq!(clean_html("<p>Just a fragment</p>"), "Just a fragment");
    }

    #[test]
    fn test_decodes_entities() {
        assert_eq!(
            clean_html("<body>Fish &amp; chips &lt;3 &quot;yes&quot;&nbsp;&amp;lt;</body>"),
            "Fish & chips <3 \"yes\" &lt;"
        );
    }

    #[test]
    fn test_unclosed_script_is_dropped() {
        let cleaned = clean_html("<body><p>Keep</p><script>never closed <style>");
        assert_eq!(cleaned, "Keep");
        assert!(!cleaned.contains("<script"));
    }

    #[test]
    fn test_truncates_to_char_limit() {
        let html = format!("<body>{}</body>", "é ".repeat(10_000));
        let cleaned = clean_html(&html);
        assert_eq!(cleaned.chars().count(), REFERENCE_MAX_CHARS);
    }

    #[test]
    fn test_no_script_or_style_remnants() {
        let html = "<body><style>.a{}</style><p>a</p><script src='x.js'></script>\
                    <script>alert(1)</script><p>b</p></body>";
        let cleaned = clean_html(html);
        assert_eq!(cleaned, "a b");
        assert!(!cleaned.contains("<style") && !cleaned.contains("alert"));
    }

    #[test]
    fn test_escaped_markup_does_not_come_back() {
        let cleaned = clean_html(
            "<body><p>Example: &lt;script&gt;alert(1)&lt;/script&gt; and &lt;style&gt;</p></body>",
        );
        assert!(!cleaned.contains("<script"));
        assert!(!cleaned.contains("<style"));
        assert!(!cleaned.contains("alert"));
        assert_eq!(cleaned, "Example: and");
    }

    #[test]
    fn test_escaped_tags_are_stripped_but_comparisons_kept() {
        assert_eq!(
            clean_html("<body>&lt;b&gt;bold&lt;/b&gt; and 1 &lt; 2</body>"),
            "bold and 1 < 2"
        );
    }

    #[test]
    fn test_nested_dropped_elements_go_entirely() {
        let html = "<body><nav><ul><nav>inner</nav>NAVLEAK</ul></nav><p>Keep</p>\
                    <header><header>a</header>HEADLEAK</header></body>";
        assert_eq!(clean_html(html), "Keep");
    }

    #[test]
    fn test_script_text_mentioning_its_own_tag() {
        let html = r#"<body><script>document.write("<script>x");</script><p>After</p></body>"#;
        assert_eq!(clean_html(html), "After");
    }
}

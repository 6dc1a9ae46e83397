use serde::{Deserialize, Serialize};

/// Configuration for the text dialect (comment-line directives).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Marker after the comment prefix that introduces a block directive.
    pub block_sign: String,
    /// Marker after the comment prefix that introduces a reveal line.
    pub reveal_sign: String,
    /// Prefix of full-line instructions such as `no-rewrite`.
    pub instruction_sign: String,
    /// Comment-line prefixes that may carry directives.
    pub comment_prefixes: Vec<String>,
    /// Opening and closing expression delimiters.
    pub delimiters: (String, String),
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            block_sign: "=".to_owned(),
            reveal_sign: ":".to_owned(),
            instruction_sign: "@rw:".to_owned(),
            comment_prefixes: vec!["#".to_owned(), "//".to_owned()],
            delimiters: ("{{".to_owned(), "}}".to_owned()),
        }
    }
}

/// Configuration for the HTML dialect (attribute operators).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlOptions {
    /// Prefix of block operator attributes (`v-if`, `v-for`, ...).
    pub operator_prefix: String,
    /// Prefix of interpolated attributes (`:class="expr"`).
    pub bound_prefix: String,
    /// Opening and closing expression delimiters.
    pub delimiters: (String, String),
    /// Tags with no inner content and no closing tag.
    pub void_tags: Vec<String>,
    /// Tags whose inner content is opaque text up to the exact closing tag.
    pub text_tags: Vec<String>,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            operator_prefix: "v-".to_owned(),
            bound_prefix: ":".to_owned(),
            delimiters: ("{{".to_owned(), "}}".to_owned()),
            void_tags: [
                "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
                "param", "source", "track", "wbr",
            ]
            .map(str::to_owned)
            .to_vec(),
            text_tags: ["script", "style"].map(str::to_owned).to_vec(),
        }
    }
}

/// Combined per-dialect configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteOptions {
    pub text: TextOptions,
    pub html: HtmlOptions,
}

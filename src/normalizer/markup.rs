//! Markup extraction
//!
//! Flattens a markdown message body into display text plus style spans. The
//! parser's event stream is walked with an explicit token stack, so nesting
//! depth never turns into call-stack depth.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use super::types::{StyleKind, StyleSpan};

const DEL_OPEN: &str = "<del>";
const DEL_CLOSE: &str = "</del>";

/// Flattened text with the formatting found in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub spans: Vec<StyleSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Italic,
    Bold,
    /// `~~strike~~`
    Strikethrough,
    /// `<del>` inline html
    Del,
    Link(String),
    Pre(Option<String>),
}

impl TokenKind {
    fn span(self, from: usize, to: usize) -> StyleSpan {
        match self {
            TokenKind::Italic => StyleSpan::new(from, to, StyleKind::Italic),
            TokenKind::Bold => StyleSpan::new(from, to, StyleKind::Bold),
            TokenKind::Strikethrough | TokenKind::Del => {
                StyleSpan::new(from, to, StyleKind::Strikethrough)
            }
            TokenKind::Link(target) => StyleSpan::link(from, to, target),
            TokenKind::Pre(language) => StyleSpan {
                code_language: language,
                ..StyleSpan::new(from, to, StyleKind::Pre)
            },
        }
    }
}

#[derive(Debug)]
struct Token {
    kind: TokenKind,
    from: usize,
}

/// Nesting went past the configured bound
#[derive(Debug)]
struct DepthExceeded;

struct Extractor {
    output: String,
    /// Length of `output` in chars
    len: usize,
    stack: Vec<Token>,
    spans: Vec<StyleSpan>,
    max_depth: usize,
}

impl Extractor {
    fn new(max_depth: usize) -> Self {
        Self {
            output: String::new(),
            len: 0,
            stack: Vec::new(),
            spans: Vec::new(),
            max_depth,
        }
    }

    fn append(&mut self, text: &str) {
        self.output.push_str(text);
        self.len += text.chars().count();
    }

    fn push(&mut self, kind: TokenKind) -> Result<(), DepthExceeded> {
        if self.stack.len() >= self.max_depth {
            return Err(DepthExceeded);
        }
        self.stack.push(Token {
            kind,
            from: self.len,
        });
        Ok(())
    }

    /// Closes the innermost open token accepted by `matches`. Leaving a node
    /// whose token is not on the stack is a no-op.
    fn close(&mut self, matches: impl Fn(&TokenKind) -> bool) {
        let Some(index) = self.stack.iter().rposition(|token| matches(&token.kind)) else {
            return;
        };
        let token = self.stack.remove(index);
        let span = token.kind.span(token.from, self.len);
        self.spans.push(span);
    }

    /// `</del>` only closes a `<del>` sitting on top of the stack.
    fn close_del(&mut self) {
        if matches!(self.stack.last(), Some(Token { kind: TokenKind::Del, .. })) {
            self.close(|kind| *kind == TokenKind::Del);
        }
    }

    fn handle(&mut self, event: Event<'_>) -> Result<(), DepthExceeded> {
        match event {
            Event::Start(tag) => match tag {
                Tag::Emphasis => self.push(TokenKind::Italic)?,
                Tag::Strong => self.push(TokenKind::Bold)?,
                Tag::Strikethrough => self.push(TokenKind::Strikethrough)?,
                Tag::Link { dest_url, .. } => self.push(TokenKind::Link(dest_url.to_string()))?,
                Tag::CodeBlock(kind) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    self.push(TokenKind::Pre(language))?;
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Paragraph | TagEnd::Heading(_) => self.append("\n\n"),
                TagEnd::Item => self.append("\n"),
                TagEnd::Emphasis => self.close(|kind| *kind == TokenKind::Italic),
                TagEnd::Strong => self.close(|kind| *kind == TokenKind::Bold),
                TagEnd::Strikethrough => self.close(|kind| *kind == TokenKind::Strikethrough),
                TagEnd::Link => self.close(|kind| matches!(kind, TokenKind::Link(_))),
                TagEnd::CodeBlock => self.close(|kind| matches!(kind, TokenKind::Pre(_))),
                _ => {}
            },
            Event::Text(text) => self.append(&text),
            Event::Code(code) => {
                let from = self.len;
                self.append(&code);
                self.spans.push(StyleSpan::new(from, self.len, StyleKind::Code));
            }
            Event::InlineHtml(html) => {
                if html.eq_ignore_ascii_case(DEL_OPEN) {
                    self.push(TokenKind::Del)?;
                } else if html.eq_ignore_ascii_case(DEL_CLOSE) {
                    self.close_del();
                }
            }
            Event::SoftBreak | Event::HardBreak => self.append("\n"),
            _ => {}
        }
        Ok(())
    }

    /// Trims the output and re-bases spans onto the trimmed text.
    fn finish(self) -> ExtractedText {
        let leading = self
            .output
            .chars()
            .take_while(|c| c.is_whitespace())
            .count();
        let text = self.output.trim().to_string();
        let text_len = text.chars().count();

        let spans = self
            .spans
            .into_iter()
            .map(|mut span| {
                span.from = span.from.saturating_sub(leading).min(text_len);
                span.to = span.to.saturating_sub(leading).min(text_len);
                span
            })
            .filter(|span| span.from < span.to)
            .collect();

        ExtractedText { text, spans }
    }
}

/// Extracts display text and style spans from a markdown body.
///
/// Returns `None` for an empty source. Input nested deeper than `max_depth`
/// is returned as trimmed plain text without spans.
pub fn extract_markup(source: &str, max_depth: usize) -> Option<ExtractedText> {
    if source.is_empty() {
        return None;
    }

    let mut extractor = Extractor::new(max_depth);
    for event in Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH) {
        if extractor.handle(event).is_err() {
            tracing::debug!(
                target: "threadline::normalizer::markup",
                "Markup nesting exceeds {} levels, treating body as plain text",
                max_depth
            );
            return Some(ExtractedText {
                text: source.trim().to_string(),
                spans: Vec::new(),
            });
        }
    }

    Some(extractor.finish())
}

//! Default conversion capability built on `scraper` (html5ever).
//!
//! Walks the parsed `<body>` once, rendering block and inline elements to
//! CommonMark. Rendering is deterministic: identical input and options give
//! identical output.

use std::collections::HashMap;
use std::time::Instant;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{
    CodeBlockStyle, ConversionMeta, ConversionRequest, ConversionResult, ConversionStats,
    ConvertOptions, Converter, ConverterInfo, HeadingStyle, ImageInfo, LinkInfo,
};
use crate::types::{Error, Result};
use crate::validation::validate_html;

const PLUGIN_BASE: &str = "base";
const PLUGIN_COMMONMARK: &str = "commonmark";
const PLUGIN_TABLE: &str = "table";
const PLUGIN_STRIKETHROUGH: &str = "strikethrough";

const SUPPORTED_PLUGINS: &[&str] = &[PLUGIN_BASE, PLUGIN_COMMONMARK, PLUGIN_TABLE, PLUGIN_STRIKETHROUGH];

/// Elements removed together with their content.
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "iframe", "object", "embed", "head", "svg", "canvas",
];

/// Containers rendered as their children separated by blank lines.
const BLOCK_CONTAINERS: &[&str] = &[
    "div", "section", "article", "main", "header", "footer", "nav", "aside", "figure",
    "figcaption", "form", "fieldset", "details", "summary", "address", "dl", "dt", "dd",
];

/// Inline wrappers passed through without markup.
const TRANSPARENT_INLINE: &[&str] = &[
    "span", "small", "sub", "sup", "abbr", "cite", "time", "mark", "u", "ins", "label", "font",
    "q", "dfn", "kbd", "samp", "var", "tbody", "thead", "tfoot",
];

/// Element nesting rendered as Markdown; anything deeper is flattened to text.
pub const MAX_NESTING_DEPTH: usize = 256;

/// HTML to Markdown converter using html5ever parsing.
#[derive(Debug, Clone, Default)]
pub struct HtmlConverter;

impl HtmlConverter {
    pub fn new() -> Self {
        Self
    }
}

impl Converter for HtmlConverter {
    fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult> {
        let started = Instant::now();
        validate_html(&request.html)?;

        let base = match request.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(domain) => Some(
                Url::parse(domain)
                    .map_err(|e| Error::validation(format!("invalid domain '{}': {}", domain, e)))?,
            ),
            None => None,
        };

        let mut warnings = Vec::new();
        let plugins = resolve_plugins(&request.plugins, &mut warnings);
        let options = request.options.clone().unwrap_or_default();

        let document = Html::parse_document(&request.html);
        let body = select_first(&document, "body")
            .ok_or_else(|| Error::conversion("document has no body"))?;

        let mut renderer = Renderer {
            options: &options,
            base: base.as_ref(),
            tables: plugins.iter().any(|p| p == PLUGIN_TABLE),
            strikethrough: plugins.iter().any(|p| p == PLUGIN_STRIKETHROUGH),
            list_depth: 0,
            depth: 0,
            flattened: false,
            counts: Counts::default(),
        };
        let raw = renderer.children(body);
        let markdown = finalize(&raw, options.trim_spaces);
        if renderer.flattened {
            tracing::debug!(max_depth = MAX_NESTING_DEPTH, "conversion_nesting_flattened");
            warnings.push(format!(
                "document nesting exceeds {} levels; deeper content rendered as plain text",
                MAX_NESTING_DEPTH
            ));
        }

        let metadata = extract_metadata(&document, body, &options, base.as_ref());

        Ok(ConversionResult {
            stats: ConversionStats {
                input_size: request.html.len(),
                output_size: markdown.len(),
                processing_time: started.elapsed(),
                elements_count: renderer.counts.elements,
                converted_count: renderer.counts.converted,
                skipped_count: renderer.counts.skipped,
                plugins_used: plugins,
            },
            markdown,
            warnings,
            metadata,
        })
    }

    fn info(&self) -> ConverterInfo {
        ConverterInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            supported_plugins: SUPPORTED_PLUGINS.iter().map(|p| p.to_string()).collect(),
            features: vec![
                "CommonMark output".to_string(),
                "Fenced and indented code blocks".to_string(),
                "Link and image resolution against a base domain".to_string(),
                "GFM tables".to_string(),
                "Strikethrough".to_string(),
                "Document metadata extraction".to_string(),
            ],
        }
    }
}

/// Dedupe requested plugins preserving order; unknown names become warnings.
fn resolve_plugins(requested: &[String], warnings: &mut Vec<String>) -> Vec<String> {
    let mut used: Vec<String> = Vec::new();
    for name in requested {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() || used.contains(&name) {
            continue;
        }
        if SUPPORTED_PLUGINS.contains(&name.as_str()) {
            used.push(name);
        } else {
            warnings.push(format!("unknown plugin '{}' ignored", name));
        }
    }
    used
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next()
}

#[derive(Debug, Default)]
struct Counts {
    elements: usize,
    converted: usize,
    skipped: usize,
}

struct Renderer<'a> {
    options: &'a ConvertOptions,
    base: Option<&'a Url>,
    tables: bool,
    strikethrough: bool,
    list_depth: usize,
    /// Element nesting of the node being rendered.
    depth: usize,
    flattened: bool,
    counts: Counts,
}

impl Renderer<'_> {
    fn children(&mut self, el: ElementRef<'_>) -> String {
        let mut out = String::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(&collapse_whitespace(text)),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        out.push_str(&self.element(child_el));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn element(&mut self, el: ElementRef<'_>) -> String {
        if self.depth >= MAX_NESTING_DEPTH {
            return self.flatten(el);
        }
        self.depth += 1;
        let rendered = self.render(el);
        self.depth -= 1;
        rendered
    }

    /// Text content of a subtree too deep to render, without recursing.
    fn flatten(&mut self, el: ElementRef<'_>) -> String {
        let nested = el.descendants().filter(|n| n.value().is_element()).count();
        self.counts.elements += nested;
        self.counts.skipped += nested;
        self.flattened = true;
        collapse_whitespace(&el.text().collect::<String>())
    }

    fn render(&mut self, el: ElementRef<'_>) -> String {
        let tag = el.value().name();
        self.counts.elements += 1;

        if DROPPED_TAGS.contains(&tag) {
            self.counts.skipped += 1;
            return String::new();
        }

        let rendered = match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                let text = self.children(el).trim().to_string();
                self.heading(level, &text)
            }
            "p" => block(self.children(el).trim()),
            "br" => "  \n".to_string(),
            "hr" => block("---"),
            "strong" | "b" => wrap_inline(&self.children(el), self.options.bold_style.delimiter()),
            "em" | "i" => wrap_inline(&self.children(el), self.options.emphasis_style.delimiter()),
            "del" | "s" | "strike" => {
                let inner = self.children(el);
                if self.strikethrough {
                    wrap_inline(&inner, "~~")
                } else {
                    inner
                }
            }
            "code" => {
                let text: String = el.text().collect();
                inline_code(&text)
            }
            "pre" => self.code_block(el),
            "blockquote" => {
                let inner = finalize(&self.children(el), false);
                let quoted: Vec<String> = inner
                    .lines()
                    .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {}", line) })
                    .collect();
                block(&quoted.join("\n"))
            }
            "ul" => self.list(el, None),
            "ol" => {
                let start = el
                    .value()
                    .attr("start")
                    .and_then(|s| s.trim().parse::<usize>().ok())
                    .unwrap_or(1);
                self.list(el, Some(start))
            }
            "li" => self.children(el),
            "a" => self.link(el),
            "img" => self.image(el),
            "table" => self.table(el),
            "body" | "html" => self.children(el),
            t if BLOCK_CONTAINERS.contains(&t) => block(self.children(el).trim()),
            t if TRANSPARENT_INLINE.contains(&t) => self.children(el),
            _ => {
                self.counts.skipped += 1;
                return if self.options.keep_unknown_tags {
                    el.html()
                } else {
                    self.children(el)
                };
            }
        };

        self.counts.converted += 1;
        rendered
    }

    fn heading(&self, level: usize, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        if self.options.heading_style == HeadingStyle::Setext && level <= 2 {
            let underline = if level == 1 { "=" } else { "-" };
            let width = text.lines().map(|l| l.chars().count()).max().unwrap_or(1).max(3);
            return block(&format!("{}\n{}", text, underline.repeat(width)));
        }
        block(&format!("{} {}", "#".repeat(level), text.replace('\n', " ")))
    }

    fn code_block(&mut self, el: ElementRef<'_>) -> String {
        let raw: String = el.text().collect();
        let code = raw.strip_prefix('\n').unwrap_or(&raw).trim_end_matches('\n');

        // Nested <code> counts as part of the block.
        for descendant in el.descendants().skip(1) {
            if descendant.value().is_element() {
                self.counts.elements += 1;
                self.counts.converted += 1;
            }
        }

        match self.options.code_block_style {
            CodeBlockStyle::Fenced => {
                let lang = code_language(el).unwrap_or_default();
                let fence = if code.contains("```") { "~~~" } else { "```" };
                block(&format!("{fence}{lang}\n{code}\n{fence}"))
            }
            CodeBlockStyle::Indented => {
                let indented: Vec<String> = code.lines().map(|l| format!("    {}", l)).collect();
                block(&indented.join("\n"))
            }
        }
    }

    fn list(&mut self, el: ElementRef<'_>, ordered_start: Option<usize>) -> String {
        self.list_depth += 1;
        let mut items = Vec::new();
        let mut index = 0usize;

        for child in el.children() {
            let Some(item) = ElementRef::wrap(child) else {
                continue;
            };
            if item.value().name() != "li" {
                let stray = finalize(&self.element(item), false);
                if !stray.is_empty() {
                    items.push(stray);
                }
                continue;
            }
            self.counts.elements += 1;
            self.counts.converted += 1;

            let marker = match ordered_start {
                Some(start) => format!("{}{}", start + index, self.options.ordered_list_marker.as_str()),
                None => self.options.bullet_list_marker.as_str().to_string(),
            };
            index += 1;

            let content = finalize(&self.children(item), false);
            let pad = " ".repeat(marker.len() + 1);
            let mut lines = content.lines().filter(|l| !l.trim().is_empty());
            let first = lines.next().unwrap_or("");
            let mut rendered = format!("{} {}", marker, first);
            for line in lines {
                rendered.push('\n');
                rendered.push_str(&pad);
                rendered.push_str(line);
            }
            items.push(rendered);
        }

        self.list_depth -= 1;
        let body = items.join("\n");
        if self.list_depth > 0 {
            // Nested lists stay attached to their parent item.
            format!("\n{}\n", body)
        } else {
            block(&body)
        }
    }

    fn link(&mut self, el: ElementRef<'_>) -> String {
        let text = self.children(el).trim().to_string();
        let Some(href) = el.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            return text;
        };
        let href = resolve(self.base, href);
        let label = if text.is_empty() { href.clone() } else { text };
        match el.value().attr("title").filter(|t| !t.is_empty()) {
            Some(title) => format!("[{}]({} \"{}\")", label, href, title.replace('"', "\\\"")),
            None => format!("[{}]({})", label, href),
        }
    }

    fn image(&mut self, el: ElementRef<'_>) -> String {
        let Some(src) = el.value().attr("src").map(str::trim).filter(|s| !s.is_empty()) else {
            return String::new();
        };
        let src = if self.options.image_absolute_path {
            resolve(self.base, src)
        } else {
            src.to_string()
        };
        let alt = el.value().attr("alt").unwrap_or("");
        match el.value().attr("title").filter(|t| !t.is_empty()) {
            Some(title) => format!("![{}]({} \"{}\")", alt, src, title.replace('"', "\\\"")),
            None => format!("![{}]({})", alt, src),
        }
    }

    fn table(&mut self, el: ElementRef<'_>) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in el.descendants().filter_map(ElementRef::wrap) {
            match row.value().name() {
                "tr" => {
                    self.counts.elements += 1;
                    self.counts.converted += 1;
                    let mut cells = Vec::new();
                    for cell in row.children().filter_map(ElementRef::wrap) {
                        if matches!(cell.value().name(), "td" | "th") {
                            self.counts.elements += 1;
                            self.counts.converted += 1;
                            let text = finalize(&self.children(cell), false);
                            cells.push(text.replace('\n', " ").replace('|', "\\|"));
                        }
                    }
                    rows.push(cells);
                }
                "thead" | "tbody" | "tfoot" => {
                    self.counts.elements += 1;
                    self.counts.converted += 1;
                }
                _ => {}
            }
        }

        if rows.is_empty() {
            return String::new();
        }

        if !self.tables {
            let lines: Vec<String> = rows.iter().map(|r| r.join(" ")).collect();
            return block(&lines.join("  \n"));
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let compact = self.options.table_compact;
        let format_row = |cells: &[String]| -> String {
            let mut padded: Vec<String> = cells.to_vec();
            padded.resize(width, String::new());
            if compact {
                format!("|{}|", padded.join("|"))
            } else {
                format!("| {} |", padded.join(" | "))
            }
        };

        let mut lines = vec![format_row(&rows[0])];
        let rule = vec!["---".to_string(); width];
        lines.push(if compact {
            format!("|{}|", rule.join("|"))
        } else {
            format!("| {} |", rule.join(" | "))
        });
        for row in &rows[1..] {
            lines.push(format_row(row));
        }
        block(&lines.join("\n"))
    }
}

fn block(content: &str) -> String {
    if content.is_empty() {
        String::new()
    } else {
        format!("\n\n{}\n\n", content)
    }
}

fn wrap_inline(inner: &str, delimiter: &str) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    // Keep surrounding whitespace outside the delimiters.
    let leading = if inner.starts_with(char::is_whitespace) { " " } else { "" };
    let trailing = if inner.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{leading}{delimiter}{trimmed}{delimiter}{trailing}")
}

fn inline_code(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.contains('`') {
        format!("`` {} ``", text)
    } else {
        format!("`{}`", text)
    }
}

fn code_language(pre: ElementRef<'_>) -> Option<String> {
    let class_of = |el: ElementRef<'_>| -> Option<String> {
        el.value()
            .classes()
            .find_map(|c| c.strip_prefix("language-").or_else(|| c.strip_prefix("lang-")))
            .map(str::to_string)
    };
    class_of(pre).or_else(|| {
        pre.children()
            .filter_map(ElementRef::wrap)
            .find(|c| c.value().name() == "code")
            .and_then(class_of)
    })
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

fn resolve(base: Option<&Url>, reference: &str) -> String {
    match base {
        Some(base) => base
            .join(reference)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string()),
        None => reference.to_string(),
    }
}

/// Collapse blank-line runs to one, strip stray indentation outside code and
/// nested lists, and trim the document. Fenced code is left untouched.
fn finalize(raw: &str, trim_spaces: bool) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut fence: Option<&str> = None;
    let mut blank_run = 0;

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            lines.push(line.trim_end().to_string());
            blank_run = 0;
            continue;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence = Some(&trimmed[..3]);
        }

        let line = normalize_line(line, trim_spaces);
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }
    lines.join("\n").trim_matches('\n').to_string()
}

fn normalize_line(line: &str, trim_spaces: bool) -> String {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trim_spaces {
        return trimmed.to_string();
    }
    let keep_indent = line.starts_with("    ") || (line.starts_with(' ') && is_list_item(trimmed));
    let body = if keep_indent { line.trim_end() } else { trimmed };
    if line.ends_with("  ") {
        format!("{}  ", body)
    } else {
        body.to_string()
    }
}

fn is_list_item(trimmed: &str) -> bool {
    if ["- ", "* ", "+ "].iter().any(|m| trimmed.starts_with(m)) {
        return true;
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && (trimmed[digits..].starts_with(". ") || trimmed[digits..].starts_with(") "))
}

fn extract_metadata(
    document: &Html,
    body: ElementRef<'_>,
    options: &ConvertOptions,
    base: Option<&Url>,
) -> Option<ConversionMeta> {
    let mut meta = ConversionMeta {
        title: select_first(document, "title")
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty()),
        language: document
            .root_element()
            .value()
            .attr("lang")
            .map(str::to_string)
            .filter(|l| !l.is_empty()),
        ..Default::default()
    };

    if let Ok(selector) = Selector::parse("meta[name], meta[property]") {
        let mut custom = HashMap::new();
        for el in document.select(&selector) {
            let key = el
                .value()
                .attr("name")
                .or_else(|| el.value().attr("property"))
                .unwrap_or("")
                .to_ascii_lowercase();
            let Some(content) = el.value().attr("content").map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };
            match key.as_str() {
                "description" => meta.description = Some(content.to_string()),
                "author" => meta.author = Some(content.to_string()),
                "keywords" => {
                    meta.keywords = content
                        .split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "" => {}
                other => {
                    custom.insert(other.to_string(), content.to_string());
                }
            }
        }
        meta.custom_meta = custom;
    }

    if let Ok(selector) = Selector::parse("img[src]") {
        meta.images = body
            .select(&selector)
            .filter_map(|img| {
                let src = img.value().attr("src")?.trim();
                if src.is_empty() {
                    return None;
                }
                let attr = |name: &str| img.value().attr(name).map(str::to_string).filter(|v| !v.is_empty());
                Some(ImageInfo {
                    src: if options.image_absolute_path {
                        resolve(base, src)
                    } else {
                        src.to_string()
                    },
                    alt: attr("alt"),
                    title: attr("title"),
                    width: img.value().attr("width").and_then(|w| w.trim().parse().ok()),
                    height: img.value().attr("height").and_then(|h| h.trim().parse().ok()),
                })
            })
            .collect();
    }

    if let Ok(selector) = Selector::parse("a[href]") {
        meta.links = body
            .select(&selector)
            .filter_map(|a| {
                let href = a.value().attr("href")?.trim();
                if href.is_empty() {
                    return None;
                }
                Some(LinkInfo {
                    href: resolve(base, href),
                    text: collapse_whitespace(&a.text().collect::<String>()).trim().to_string(),
                    title: a.value().attr("title").map(str::to_string).filter(|t| !t.is_empty()),
                    target: a
                        .value()
                        .attr("target")
                        .map(str::to_string)
                        .or_else(|| options.link_target.clone()),
                })
            })
            .collect();
    }

    if meta == ConversionMeta::default() {
        None
    } else {
        Some(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{BulletMarker, ConvertOptions, EmphasisStyle};
    use pretty_assertions::assert_eq;

    fn convert(html: &str) -> ConversionResult {
        HtmlConverter::new()
            .convert(&ConversionRequest::new(html))
            .unwrap()
    }

    fn convert_with(html: &str, options: ConvertOptions, plugins: &[&str]) -> ConversionResult {
        let request = ConversionRequest {
            html: html.to_string(),
            options: Some(options),
            plugins: plugins.iter().map(|p| p.to_string()).collect(),
            domain: None,
        };
        HtmlConverter::new().convert(&request).unwrap()
    }

    #[test]
    fn test_heading_stats_match_sizes() {
        let html = "<h1>Hello World</h1>";
        let result = convert(html);
        assert_eq!(result.markdown, "# Hello World");
        assert_eq!(result.stats.input_size, html.len());
        assert_eq!(result.stats.output_size, result.markdown.len());
        assert_eq!(result.stats.elements_count, 1);
        assert_eq!(result.stats.converted_count, 1);
        assert_eq!(result.stats.skipped_count, 0);
    }

    #[test]
    fn test_rejects_empty_and_tagless_input() {
        let converter = HtmlConverter::new();
        assert!(matches!(
            converter.convert(&ConversionRequest::new("")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            converter.convert(&ConversionRequest::new("just words")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_paragraph_with_emphasis() {
        let result = convert("<p>This is <strong>bold</strong> and <em>italic</em>.</p>");
        assert_eq!(result.markdown, "This is **bold** and *italic*.");
    }

    #[test]
    fn test_emphasis_style_option() {
        let options = ConvertOptions {
            emphasis_style: EmphasisStyle::Underscore,
            ..Default::default()
        };
        let result = convert_with("<p><em>x</em></p>", options, &[]);
        assert_eq!(result.markdown, "_x_");
    }

    #[test]
    fn test_unordered_list_with_marker_option() {
        let options = ConvertOptions {
            bullet_list_marker: BulletMarker::Asterisk,
            ..Default::default()
        };
        let result = convert_with("<ul><li>one</li><li>two</li></ul>", options, &[]);
        assert_eq!(result.markdown, "* one\n* two");
    }

    #[test]
    fn test_ordered_list_respects_start() {
        let result = convert(r#"<ol start="3"><li>a</li><li>b</li></ol>"#);
        assert_eq!(result.markdown, "3. a\n4. b");
    }

    #[test]
    fn test_fenced_code_block_with_language() {
        let result = convert("<pre><code class=\"language-rust\">fn main() {}\n</code></pre>");
        assert_eq!(result.markdown, "```rust\nfn main() {}\n```");
    }

    #[test]
    fn test_script_is_dropped_and_counted_as_skipped() {
        let result = convert("<p>kept</p><script>alert(1)</script>");
        assert_eq!(result.markdown, "kept");
        assert_eq!(result.stats.skipped_count, 1);
        assert_eq!(
            result.stats.elements_count,
            result.stats.converted_count + result.stats.skipped_count
        );
    }

    #[test]
    fn test_links_resolve_against_domain() {
        let request = ConversionRequest {
            html: r#"<p><a href="/docs">Docs</a></p>"#.to_string(),
            domain: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let result = HtmlConverter::new().convert(&request).unwrap();
        assert_eq!(result.markdown, "[Docs](https://example.com/docs)");
        let meta = result.metadata.unwrap();
        assert_eq!(meta.links[0].href, "https://example.com/docs");
    }

    #[test]
    fn test_table_requires_plugin() {
        let html = "<table><tr><th>a</th><th>b</th></tr><tr><td>1</td><td>2</td></tr></table>";
        let with_plugin = convert_with(html, ConvertOptions::default(), &["table"]);
        assert_eq!(with_plugin.markdown, "| a | b |\n| --- | --- |\n| 1 | 2 |");
        assert_eq!(with_plugin.stats.plugins_used, vec!["table"]);
    }

    #[test]
    fn test_unknown_plugin_warns() {
        let result = convert_with("<p>x</p>", ConvertOptions::default(), &["commonmark", "emoji", "commonmark"]);
        assert_eq!(result.stats.plugins_used, vec!["commonmark"]);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("emoji"));
    }

    #[test]
    fn test_metadata_extraction() {
        let html = r#"<html lang="en"><head><title> Page </title>
            <meta name="description" content="A page">
            <meta name="keywords" content="a, b">
            <meta property="og:type" content="article"></head>
            <body><p>hi</p></body></html>"#;
        let meta = convert(html).metadata.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Page"));
        assert_eq!(meta.description.as_deref(), Some("A page"));
        assert_eq!(meta.keywords, vec!["a", "b"]);
        assert_eq!(meta.language.as_deref(), Some("en"));
        assert_eq!(meta.custom_meta.get("og:type").map(String::as_str), Some("article"));
    }

    #[test]
    fn test_deep_nesting_is_flattened_not_recursed() {
        let depth = 50_000;
        let html = format!("{}x{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let result = convert(&html);
        assert_eq!(result.markdown, "x");
        assert_eq!(result.stats.elements_count, depth);
        assert_eq!(
            result.stats.elements_count,
            result.stats.converted_count + result.stats.skipped_count
        );
        assert_eq!(result.stats.converted_count, MAX_NESTING_DEPTH);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("nesting"));
    }

    #[test]
    fn test_nesting_within_limit_has_no_warning() {
        let html = format!("{}<em>x</em>{}", "<div>".repeat(20), "</div>".repeat(20));
        let result = convert(&html);
        assert_eq!(result.markdown, "*x*");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let html = "<h2>T</h2><ul><li>a<ul><li>b</li></ul></li></ul><blockquote><p>q</p></blockquote>";
        let first = convert(html);
        let second = convert(html);
        assert_eq!(first.markdown, second.markdown);
        assert_eq!(first.stats.output_size, second.stats.output_size);
    }
}

//! HTML → Markdown for the general-purpose backend.
//!
//! A single walk over the `scraper` DOM. Block elements open a paragraph,
//! headings become `#` lines, list items `- ` / `1. ` lines indented by
//! nesting depth, tables GFM pipe tables. `head`, `script` and `style` are
//! dropped. When the body has no `h1`, the document `<title>` becomes the
//! top heading.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());

const SKIPPED: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "nav", "aside",
    "blockquote", "figure", "figcaption", "form", "dl", "dt", "dd", "address",
    "body", "html",
];

/// Convert an HTML document to Markdown text.
pub fn html_to_markdown(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut w = Writer::default();

    if doc.select(&H1).next().is_none() {
        if let Some(title) = doc.select(&TITLE).next() {
            let title = collapse(&title.text().collect::<String>());
            if !title.is_empty() {
                w.out.push_str("# ");
                w.out.push_str(&title);
                w.block();
            }
        }
    }

    w.element(doc.root_element());
    w.out.trim().to_string()
}

#[derive(Default)]
struct Writer {
    out: String,
    /// Whitespace seen since the last word.
    space: bool,
    /// One entry per open list: `Some(counter)` for `ol`, `None` for `ul`.
    lists: Vec<Option<usize>>,
}

impl Writer {
    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED.contains(&name) {
            return;
        }

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = collapse(&el.text().collect::<String>());
                if !text.is_empty() {
                    self.block();
                    self.out.push_str(&"#".repeat(level));
                    self.out.push(' ');
                    self.out.push_str(&text);
                    self.block();
                }
            }
            "br" => {
                self.trim_line_end();
                self.out.push('\n');
                self.space = false;
            }
            "hr" => {
                self.block();
                self.out.push_str("---");
                self.block();
            }
            "pre" => {
                self.block();
                let code: String = el.text().collect();
                self.out.push_str("```\n");
                self.out.push_str(code.trim_end_matches('\n'));
                self.out.push_str("\n```");
                self.block();
            }
            "strong" | "b" => self.wrapped(el, "**"),
            "em" | "i" => self.wrapped(el, "*"),
            "code" => self.wrapped(el, "`"),
            "a" => self.link(el),
            "ul" | "ol" => {
                if self.lists.is_empty() {
                    self.block();
                }
                self.lists.push((name == "ol").then_some(0));
                self.children(el);
                self.lists.pop();
                if self.lists.is_empty() {
                    self.block();
                }
            }
            "li" => {
                self.line();
                let depth = self.lists.len().max(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        *n += 1;
                        format!("{n}. ")
                    }
                    _ => "- ".to_string(),
                };
                self.out.push_str(&"  ".repeat(depth - 1));
                self.out.push_str(&marker);
                self.space = false;
                self.children(el);
                self.line();
            }
            "table" => {
                self.block();
                self.table(el);
                self.block();
            }
            n if BLOCKS.contains(&n) => {
                self.block();
                self.children(el);
                self.block();
            }
            _ => self.children(el),
        }
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => self.text(t),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn text(&mut self, t: &str) {
        let mut words = t.split_whitespace().peekable();
        if words.peek().is_none() {
            self.space |= !t.is_empty();
            return;
        }
        if (self.space || t.starts_with(char::is_whitespace)) && self.needs_space() {
            self.out.push(' ');
        }
        let mut first = true;
        for word in words {
            if !first {
                self.out.push(' ');
            }
            self.out.push_str(word);
            first = false;
        }
        self.space = t.ends_with(char::is_whitespace);
    }

    fn wrapped(&mut self, el: ElementRef<'_>, mark: &str) {
        let text = collapse(&el.text().collect::<String>());
        if text.is_empty() {
            return;
        }
        if self.space && self.needs_space() {
            self.out.push(' ');
        }
        self.out.push_str(mark);
        self.out.push_str(&text);
        self.out.push_str(mark);
        self.space = false;
    }

    fn link(&mut self, el: ElementRef<'_>) {
        let href = el.value().attr("href").unwrap_or("").trim();
        let external = !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:");
        if !external {
            self.children(el);
            return;
        }
        let text = collapse(&el.text().collect::<String>());
        if text.is_empty() {
            return;
        }
        if self.space && self.needs_space() {
            self.out.push(' ');
        }
        self.out.push_str(&format!("[{text}]({href})"));
        self.space = false;
    }

    fn table(&mut self, el: ElementRef<'_>) {
        let rows: Vec<Vec<String>> = el
            .select(&ROW)
            .map(|row| {
                row.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| matches!(c.value().name(), "td" | "th"))
                    .map(|c| collapse(&c.text().collect::<String>()).replace('|', "\\|"))
                    .collect()
            })
            .filter(|cells: &Vec<String>| !cells.is_empty())
            .collect();

        self.out.push_str(&gfm_table(&rows));
    }

    fn needs_space(&self) -> bool {
        !self.out.is_empty() && !self.out.ends_with([' ', '\n'])
    }

    fn trim_line_end(&mut self) {
        let len = self.out.trim_end_matches(' ').len();
        self.out.truncate(len);
    }

    /// End the current line.
    fn line(&mut self) {
        self.trim_line_end();
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.space = false;
    }

    /// End the current paragraph.
    fn block(&mut self) {
        if !self.lists.is_empty() {
            self.line();
            return;
        }
        self.line();
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

/// Render rows as a GFM pipe table, first row as header. Short rows are
/// padded to the widest row.
pub(crate) fn gfm_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let fmt_row = |row: &[String]| {
        let mut line = String::from("|");
        for i in 0..width {
            line.push(' ');
            line.push_str(row.get(i).map(String::as_str).unwrap_or(""));
            line.push_str(" |");
        }
        line
    };

    let mut out = Vec::with_capacity(rows.len() + 1);
    out.push(fmt_row(&rows[0]));
    out.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        out.push(fmt_row(row));
    }
    out.join("\n")
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

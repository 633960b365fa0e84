//! Office Open XML readers: DOCX, XLSX and PPTX.
//!
//! All three formats are zip packages of XML parts. Each reader opens the
//! package with `zip`, pulls the parts it needs and streams them through
//! `quick-xml`, keeping only the structure that survives in Markdown:
//!
//! | Format | Parts read | Output |
//! |---|---|---|
//! | DOCX | `word/document.xml` | paragraphs, `#` headings from styles, `- ` list items, GFM tables |
//! | XLSX | workbook, rels, shared strings, worksheets | `## <sheet>` + GFM table per sheet |
//! | PPTX | `ppt/slides/slideN.xml` | `<!-- Slide N -->` + paragraphs, `#` for title placeholders |
//!
//! Element matching is on local names, so documents written with unusual
//! namespace prefixes parse the same way.

use crate::backend::html::gfm_table;
use crate::error::BackendError;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Upper bound on one decompressed XML part.
const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;

type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

fn open_package(bytes: &[u8]) -> Result<Package<'_>, BackendError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BackendError::Corrupt(format!("not a valid Office package: {e}")))
}

/// Read a part as text. `Ok(None)` if the package has no such part.
fn read_part(archive: &mut Package<'_>, name: &str) -> Result<Option<String>, BackendError> {
    let part = match archive.by_name(name) {
        Ok(part) => part,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(BackendError::Corrupt(format!("{name}: {e}"))),
    };

    let mut buf = Vec::new();
    part.take(MAX_PART_BYTES)
        .read_to_end(&mut buf)
        .map_err(|e| BackendError::Corrupt(format!("{name}: {e}")))?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn xml_err(e: quick_xml::Error) -> BackendError {
    BackendError::Parse(e.to_string())
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .map(|a| match a.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

fn text_of(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

/// Whitespace-collapsed, pipe-escaped table cell.
fn cell_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Receives the events of one XML part.
trait PartHandler {
    fn open(&mut self, e: &BytesStart<'_>);
    fn close(&mut self, local: &[u8]);
    fn text(&mut self, text: &str);
}

/// Drive `handler` over `xml`. Self-closing elements produce `open` then
/// `close`.
fn walk_part<H: PartHandler>(xml: &str, handler: &mut H) -> Result<(), BackendError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => handler.open(&e),
            Event::Empty(e) => {
                handler.open(&e);
                handler.close(e.local_name().as_ref());
            }
            Event::End(e) => handler.close(e.local_name().as_ref()),
            Event::Text(t) => handler.text(&text_of(&t)),
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

// ── DOCX ─────────────────────────────────────────────────────────────────────

/// Convert a `.docx` package to Markdown.
pub fn docx_to_markdown(bytes: &[u8]) -> Result<String, BackendError> {
    let mut archive = open_package(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?
        .ok_or_else(|| BackendError::Corrupt("word/document.xml missing".into()))?;
    docx_body_to_markdown(&xml)
}

fn docx_body_to_markdown(xml: &str) -> Result<String, BackendError> {
    let mut doc = DocxBody::default();
    walk_part(xml, &mut doc)?;
    Ok(doc.blocks.join())
}

#[derive(Default)]
struct Paragraph {
    text: String,
    style: Option<String>,
    list: bool,
    level: usize,
}

impl Paragraph {
    fn render(&self) -> Option<String> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(level) = self.style.as_deref().and_then(heading_level) {
            let single_line = text.replace(['\n', '\t'], " ");
            return Some(format!("{} {}", "#".repeat(level), single_line));
        }
        if self.list {
            return Some(format!("{}- {}", "  ".repeat(self.level), text));
        }
        Some(text.to_string())
    }
}

/// `Heading1`, `heading 2`, `Title` … → Markdown heading level.
fn heading_level(style: &str) -> Option<usize> {
    let s = style.to_ascii_lowercase().replace([' ', '_', '-'], "");
    match s.as_str() {
        "title" => Some(1),
        "subtitle" => Some(2),
        _ => s
            .strip_prefix("heading")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| (1..=6).contains(n)),
    }
}

/// Output blocks; consecutive list items stay tight.
#[derive(Default)]
struct Blocks(Vec<(String, bool)>);

impl Blocks {
    fn push(&mut self, text: String, list_item: bool) {
        self.0.push((text, list_item));
    }

    fn join(&self) -> String {
        let mut out = String::new();
        let mut prev_list = false;
        for (i, (text, list)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push_str(if prev_list && *list { "\n" } else { "\n\n" });
            }
            out.push_str(text);
            prev_list = *list;
        }
        out
    }
}

#[derive(Default)]
struct DocxBody {
    blocks: Blocks,
    /// Open paragraphs; text boxes nest a paragraph inside a run.
    paras: Vec<Paragraph>,
    in_text: bool,
    in_props: bool,
    table_depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Option<String>,
}

impl DocxBody {
    fn para(&mut self) -> Option<&mut Paragraph> {
        self.paras.last_mut()
    }

    fn finish_paragraph(&mut self) {
        let Some(p) = self.paras.pop() else { return };
        if let Some(cell) = self.cell.as_mut() {
            let text = p.text.trim();
            if !text.is_empty() {
                if !cell.is_empty() {
                    cell.push(' ');
                }
                cell.push_str(text);
            }
            return;
        }
        if let Some(line) = p.render() {
            self.blocks.push(line, p.list);
        }
    }
}

impl PartHandler for DocxBody {
    fn open(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"p" => self.paras.push(Paragraph::default()),
            b"pPr" => self.in_props = true,
            b"pStyle" => {
                let style = attr(e, b"val");
                if let Some(p) = self.para() {
                    p.style = style;
                }
            }
            b"numPr" => {
                if let Some(p) = self.para() {
                    p.list = true;
                }
            }
            b"ilvl" => {
                let level = attr(e, b"val").and_then(|v| v.parse().ok()).unwrap_or(0);
                if let Some(p) = self.para() {
                    p.level = level;
                }
            }
            b"t" => self.in_text = true,
            // Tab stops inside paragraph properties are not content.
            b"tab" if !self.in_props => {
                if let Some(p) = self.para() {
                    p.text.push('\t');
                }
            }
            b"br" | b"cr" => {
                if let Some(p) = self.para() {
                    p.text.push('\n');
                }
            }
            b"tbl" => {
                self.table_depth += 1;
                if self.table_depth == 1 {
                    self.rows.clear();
                }
            }
            b"tr" if self.table_depth == 1 => self.row.clear(),
            b"tc" if self.table_depth == 1 => self.cell = Some(String::new()),
            _ => {}
        }
    }

    fn close(&mut self, local: &[u8]) {
        match local {
            b"t" => self.in_text = false,
            b"pPr" => self.in_props = false,
            b"p" => self.finish_paragraph(),
            b"tc" if self.table_depth == 1 => {
                if let Some(cell) = self.cell.take() {
                    self.row.push(cell_text(&cell));
                }
            }
            b"tr" if self.table_depth == 1 => {
                let row = std::mem::take(&mut self.row);
                if !row.is_empty() {
                    self.rows.push(row);
                }
            }
            b"tbl" => {
                if self.table_depth == 1 {
                    let rows = std::mem::take(&mut self.rows);
                    if !rows.is_empty() {
                        self.blocks.push(gfm_table(&rows), false);
                    }
                }
                self.table_depth = self.table_depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text {
            if let Some(p) = self.paras.last_mut() {
                p.text.push_str(text);
            }
        }
    }
}

// ── XLSX ─────────────────────────────────────────────────────────────────────

/// Convert an `.xlsx` package to Markdown, one section per worksheet.
pub fn xlsx_to_markdown(bytes: &[u8]) -> Result<String, BackendError> {
    let mut archive = open_package(bytes)?;

    let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheets = workbook_sheets(&mut archive)?;
    if sheets.is_empty() {
        return Err(BackendError::Corrupt("workbook has no worksheets".into()));
    }

    let mut sections = Vec::with_capacity(sheets.len());
    for (name, part) in sheets {
        let Some(xml) = read_part(&mut archive, &part)? else {
            warn!("Worksheet '{}' missing at {}", name, part);
            continue;
        };
        let rows = parse_sheet(&xml, &shared)?;
        debug!("Sheet '{}': {} rows", name, rows.len());

        let mut section = format!("## {name}");
        if !rows.is_empty() {
            section.push_str("\n\n");
            section.push_str(&gfm_table(&rows));
        }
        sections.push(section);
    }

    Ok(sections.join("\n\n"))
}

/// `(sheet name, part path)` in workbook order.
fn workbook_sheets(archive: &mut Package<'_>) -> Result<Vec<(String, String)>, BackendError> {
    let declared = match read_part(archive, "xl/workbook.xml")? {
        Some(xml) => {
            let mut wb = WorkbookSheets::default();
            walk_part(&xml, &mut wb)?;
            wb.sheets
        }
        None => Vec::new(),
    };

    let targets = match read_part(archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => {
            let mut rels = Relationships::default();
            walk_part(&xml, &mut rels)?;
            rels.targets
        }
        None => HashMap::new(),
    };

    let resolved: Vec<(String, String)> = declared
        .into_iter()
        .filter_map(|(name, rel_id)| {
            let target = targets.get(&rel_id)?;
            let part = match target.strip_prefix('/') {
                Some(abs) => abs.to_string(),
                None => format!("xl/{target}"),
            };
            Some((name, part))
        })
        .collect();

    if !resolved.is_empty() {
        return Ok(resolved);
    }

    // No usable workbook metadata: fall back to the worksheet parts themselves.
    let mut numbered: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|n| {
            let k = n
                .strip_prefix("xl/worksheets/sheet")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((k, n.to_string()))
        })
        .collect();
    numbered.sort_by_key(|(k, _)| *k);
    Ok(numbered
        .into_iter()
        .map(|(k, part)| (format!("Sheet{k}"), part))
        .collect())
}

#[derive(Default)]
struct WorkbookSheets {
    sheets: Vec<(String, String)>,
}

impl PartHandler for WorkbookSheets {
    fn open(&mut self, e: &BytesStart<'_>) {
        if e.local_name().as_ref() == b"sheet" {
            if let (Some(name), Some(id)) = (attr(e, b"name"), attr(e, b"id")) {
                self.sheets.push((name, id));
            }
        }
    }
    fn close(&mut self, _: &[u8]) {}
    fn text(&mut self, _: &str) {}
}

#[derive(Default)]
struct Relationships {
    targets: HashMap<String, String>,
}

impl PartHandler for Relationships {
    fn open(&mut self, e: &BytesStart<'_>) {
        if e.local_name().as_ref() == b"Relationship" {
            if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                self.targets.insert(id, target);
            }
        }
    }
    fn close(&mut self, _: &[u8]) {}
    fn text(&mut self, _: &str) {}
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, BackendError> {
    let mut sst = SharedStrings::default();
    walk_part(xml, &mut sst)?;
    Ok(sst.strings)
}

#[derive(Default)]
struct SharedStrings {
    strings: Vec<String>,
    current: Option<String>,
    in_text: bool,
    /// Phonetic runs (`rPh`) repeat the text in another script.
    in_phonetic: bool,
}

impl PartHandler for SharedStrings {
    fn open(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"si" => self.current = Some(String::new()),
            b"t" => self.in_text = true,
            b"rPh" => self.in_phonetic = true,
            _ => {}
        }
    }

    fn close(&mut self, local: &[u8]) {
        match local {
            b"si" => {
                if let Some(s) = self.current.take() {
                    self.strings.push(s);
                }
            }
            b"t" => self.in_text = false,
            b"rPh" => self.in_phonetic = false,
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text && !self.in_phonetic {
            if let Some(s) = self.current.as_mut() {
                s.push_str(text);
            }
        }
    }
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, BackendError> {
    let mut sheet = SheetRows {
        shared,
        rows: Vec::new(),
        row: Vec::new(),
        cell: None,
        in_value: false,
    };
    walk_part(xml, &mut sheet)?;
    Ok(sheet.rows)
}

struct Cell {
    col: usize,
    kind: Option<String>,
    value: String,
}

struct SheetRows<'a> {
    shared: &'a [String],
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Option<Cell>,
    in_value: bool,
}

impl SheetRows<'_> {
    fn resolve(&self, cell: &Cell) -> String {
        let raw = cell.value.trim();
        let value = match cell.kind.as_deref() {
            Some("s") => raw
                .parse::<usize>()
                .ok()
                .and_then(|i| self.shared.get(i))
                .cloned()
                .unwrap_or_default(),
            Some("b") => match raw {
                "1" => "TRUE".to_string(),
                "0" => "FALSE".to_string(),
                other => other.to_string(),
            },
            _ => raw.to_string(),
        };
        cell_text(&value)
    }
}

impl PartHandler for SheetRows<'_> {
    fn open(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"row" => self.row.clear(),
            b"c" => {
                let col = attr(e, b"r")
                    .and_then(|r| column_index(&r))
                    .unwrap_or(self.row.len());
                if col >= MAX_COLUMNS {
                    warn!(col, "Dropping cell past the last spreadsheet column");
                    self.cell = None;
                    return;
                }
                self.cell = Some(Cell {
                    col,
                    kind: attr(e, b"t"),
                    value: String::new(),
                });
            }
            // `<v>` for stored values, `<t>` inside `<is>` for inline strings.
            b"v" | b"t" => self.in_value = self.cell.is_some(),
            _ => {}
        }
    }

    fn close(&mut self, local: &[u8]) {
        match local {
            b"v" | b"t" => self.in_value = false,
            b"c" => {
                if let Some(cell) = self.cell.take() {
                    let value = self.resolve(&cell);
                    if self.row.len() <= cell.col {
                        self.row.resize(cell.col + 1, String::new());
                    }
                    self.row[cell.col] = value;
                }
            }
            b"row" => {
                let mut row = std::mem::take(&mut self.row);
                while row.last().is_some_and(|c| c.is_empty()) {
                    row.pop();
                }
                if !row.is_empty() {
                    self.rows.push(row);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_value {
            if let Some(cell) = self.cell.as_mut() {
                cell.value.push_str(text);
            }
        }
    }
}

/// Column count of an OOXML sheet (`A` through `XFD`).
const MAX_COLUMNS: usize = 16_384;

/// `"C7"` → 2. `None` if the reference has no column letters. References
/// too long to fold saturate to `usize::MAX`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let n = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
    });
    Some(n.map_or(usize::MAX, |n| n - 1))
}

// ── PPTX ─────────────────────────────────────────────────────────────────────

/// Convert a `.pptx` package to Markdown, slides in numeric order.
pub fn pptx_to_markdown(bytes: &[u8]) -> Result<String, BackendError> {
    let mut archive = open_package(bytes)?;

    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|n| slide_number(n).map(|k| (k, n.to_string())))
        .collect();
    slides.sort_by_key(|(k, _)| *k);

    if slides.is_empty() {
        return Err(BackendError::Corrupt("presentation has no slides".into()));
    }

    let mut sections = Vec::with_capacity(slides.len());
    for (position, (_, part)) in slides.iter().enumerate() {
        let Some(xml) = read_part(&mut archive, part)? else {
            continue;
        };
        let body = slide_to_markdown(&xml)?;
        let mut section = format!("<!-- Slide {} -->", position + 1);
        if !body.is_empty() {
            section.push_str("\n\n");
            section.push_str(&body);
        }
        sections.push(section);
    }

    Ok(sections.join("\n\n"))
}

/// `ppt/slides/slide12.xml` → 12.
fn slide_number(part: &str) -> Option<usize> {
    part.strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

fn slide_to_markdown(xml: &str) -> Result<String, BackendError> {
    let mut slide = SlideText::default();
    walk_part(xml, &mut slide)?;
    Ok(slide.lines.join("\n\n"))
}

#[derive(Default)]
struct SlideText {
    lines: Vec<String>,
    para: Option<String>,
    in_text: bool,
    title_shape: bool,
}

impl PartHandler for SlideText {
    fn open(&mut self, e: &BytesStart<'_>) {
        match e.local_name().as_ref() {
            b"sp" => self.title_shape = false,
            b"ph" => {
                if matches!(attr(e, b"type").as_deref(), Some("title" | "ctrTitle")) {
                    self.title_shape = true;
                }
            }
            b"p" => self.para = Some(String::new()),
            b"t" => self.in_text = true,
            b"br" => {
                if let Some(p) = self.para.as_mut() {
                    p.push('\n');
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, local: &[u8]) {
        match local {
            b"sp" => self.title_shape = false,
            b"t" => self.in_text = false,
            b"p" => {
                let Some(p) = self.para.take() else { return };
                let text = p.trim();
                if text.is_empty() {
                    return;
                }
                if self.title_shape {
                    self.lines.push(format!("# {}", text.replace('\n', " ")));
                } else {
                    self.lines.push(text.to_string());
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text {
            if let Some(p) = self.para.as_mut() {
                p.push_str(text);
            }
        }
    }
}

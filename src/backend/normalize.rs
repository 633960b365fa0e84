//! Deterministic cleanup of backend output before it reaches a caller.
//!
//! Each built-in backend runs its text through [`normalize_markdown`]. Pages
//! transcribed by a vision model additionally go through
//! [`clean_transcription`], which repairs the table and image artefacts
//! models tend to produce.
//!
//! Rules are pure `&str -> String` passes applied in a fixed order: line
//! endings are normalised before trimming, fences stripped before anything
//! looks at line starts.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise converted text.
///
/// 1. Strip an outer ```` ```markdown ```` fence
/// 2. CRLF / CR → LF
/// 3. Trim trailing whitespace per line
/// 4. Collapse 4+ consecutive newlines to 3
/// 5. Remove invisible Unicode (zero-width, BOM, soft hyphen)
/// 6. End with exactly one newline; empty stays empty
pub fn normalize_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    single_final_newline(&s)
}

/// Extra repairs for one page of vision-model output.
///
/// Inserts a missing GFM header separator, drops separator rows the model
/// repeated inside a table body and turns placeholder image links into an
/// italic caption. Run before [`normalize_markdown`].
pub fn clean_transcription(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = fix_missing_table_separator(&s);
    let s = remove_mid_table_separators(&s);
    remove_placeholder_images(&s)
}

// ── Fences ───────────────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn single_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

// ── Tables ───────────────────────────────────────────────────────────────────

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// A table whose first row is directly followed by a data row gets a
/// separator inserted after the first row.
fn fix_missing_table_separator(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out = Vec::with_capacity(lines.len() + 4);
    let mut prev_is_row = false;

    for (i, line) in lines.iter().enumerate() {
        out.push(line.to_string());
        let row = is_table_row(line);
        let starts_table = row && !prev_is_row && !is_separator_row(line);
        if starts_table {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
                out.push(format!("|{}", " --- |".repeat(cols)));
            }
        }
        prev_is_row = row;
    }

    out.join("\n")
}

/// Keep only the separator in position two of each table.
fn remove_mid_table_separators(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut row_index = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            row_index += 1;
            if is_separator_row(line) && row_index != 2 {
                continue;
            }
        } else {
            row_index = 0;
        }
        out.push(line);
    }

    out.join("\n")
}

// ── Images ───────────────────────────────────────────────────────────────────

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "dummyimage.com",
    "picsum.photos",
    "placehold.it",
];

fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    let absolute = u.starts_with("http://") || u.starts_with("https://");
    !absolute || PLACEHOLDER_HOSTS.iter().any(|h| u.contains(h))
}

fn remove_placeholder_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if !is_placeholder_url(&caps[2]) {
                return caps[0].to_string();
            }
            match caps[1].trim() {
                "" => String::new(),
                alt => format!("*{alt}*"),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_outer_fence() {
        assert_eq!(normalize_markdown("```markdown\n# Hi\ntext\n```"), "# Hi\ntext\n");
        assert_eq!(normalize_markdown("```\n# Hi\n```"), "# Hi\n");
    }

    #[test]
    fn inner_code_block_survives() {
        let input = "# Code\n\n```rust\nfn main() {}\n```\n\nafter";
        assert_eq!(normalize_markdown(input), format!("{input}\n"));
    }

    #[test]
    fn line_endings_and_trailing_space() {
        assert_eq!(normalize_markdown("a  \r\nb\t\rc"), "a\nb\nc\n");
    }

    #[test]
    fn long_blank_runs_collapse() {
        assert_eq!(normalize_markdown("a\n\n\n\n\n\nb"), "a\n\n\nb\n");
        assert_eq!(normalize_markdown("a\n\n\nb"), "a\n\n\nb\n");
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(normalize_markdown("\u{FEFF}he\u{200B}llo"), "hello\n");
    }

    #[test]
    fn single_final_newline_and_empty_input() {
        assert_eq!(normalize_markdown("x\n\n\n"), "x\n");
        assert_eq!(normalize_markdown(""), "");
        assert_eq!(normalize_markdown(" \n\t\n"), "");
    }

    #[test]
    fn idempotent() {
        let once = normalize_markdown("```markdown\n# T\r\n\r\nbody  \n\n\n\n\nend\n```");
        assert_eq!(normalize_markdown(&once), once);
    }

    #[test]
    fn transcription_inserts_missing_separator() {
        let out = clean_transcription("| A | B |\n| 1 | 2 |");
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines, vec!["| A | B |", "| --- | --- |", "| 1 | 2 |"]);
    }

    #[test]
    fn transcription_keeps_well_formed_table() {
        let table = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |";
        assert_eq!(clean_transcription(table), table);
    }

    #[test]
    fn transcription_drops_body_separators() {
        let out = clean_transcription("| A |\n| --- |\n| 1 |\n| --- |\n| 2 |");
        assert_eq!(out.lines().filter(|l| is_separator_row(l)).count(), 1);
        assert!(out.contains("| 2 |"));
    }

    #[test]
    fn transcription_replaces_placeholder_images() {
        let out = clean_transcription("![Chart](chart.png) and ![](https://example.com/x.png)");
        assert_eq!(out, "*Chart* and ");
        let real = "![Fig](https://arxiv.org/fig1.png)";
        assert_eq!(clean_transcription(real), real);
    }
}

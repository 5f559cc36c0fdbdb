//! Cleanup of text extracted from paged documents.
//!
//! pdfium returns page text with whatever line endings, trailing blanks and
//! invisible code points the producing application embedded. These rules
//! make the `.txt`/`.md` output stable and diff-friendly without touching the
//! words themselves.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF / CR → LF)
//! 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! 3. Trim trailing whitespace per line
//! 4. Collapse 3+ consecutive blank lines down to 2
//! 5. Ensure the text ends with exactly one newline
//!
//! Every rule is idempotent, so cleaning cleaned text is a no-op.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw extracted text.
pub fn clean_extracted_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

/// Wrap cleaned text in the Markdown document used for `.md` targets.
pub fn wrap_markdown(text: &str) -> String {
    let fence = code_fence(text);
    format!("# Extracted Text\n\n{fence}text\n{}{fence}\n", ensure_final_newline(text))
}

/// A backtick fence longer than any backtick run inside `body`, so the body
/// can never close the block early.
pub fn code_fence(body: &str) -> String {
    let longest = body
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible characters ──────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").to_string()
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Ensure text ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_normalised() {
        assert_eq!(clean_extracted_text("a\r\nb\rc"), "a\nb\nc\n");
    }

    #[test]
    fn trailing_spaces_trimmed() {
        assert_eq!(clean_extracted_text("hello   \nworld\t"), "hello\nworld\n");
    }

    #[test]
    fn blank_runs_collapsed() {
        assert_eq!(clean_extracted_text("a\n\n\n\n\n\nb"), "a\n\n\nb\n");
    }

    #[test]
    fn invisible_removed() {
        assert_eq!(clean_extracted_text("\u{FEFF}in\u{200B}visible"), "invisible\n");
    }

    #[test]
    fn empty_becomes_single_newline() {
        assert_eq!(clean_extracted_text("   \n\n"), "\n");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let raw = "Title \r\n\r\n\r\n\r\n\u{00AD}Body\u{200D} text  \n";
        let once = clean_extracted_text(raw);
        assert_eq!(clean_extracted_text(&once), once);
    }

    #[test]
    fn fence_outgrows_backticks_in_text() {
        assert_eq!(code_fence("plain"), "```");
        assert_eq!(code_fence("a `b` c"), "```");
        assert_eq!(code_fence("```\ncode\n```"), "````");

        let md = wrap_markdown("before\n```\nafter\n");
        assert_eq!(md, "# Extracted Text\n\n````text\nbefore\n```\nafter\n````\n");
    }

    #[test]
    fn markdown_wrapper_fences_text() {
        let md = wrap_markdown("line one\nline two\n");
        assert_eq!(
            md,
            "# Extracted Text\n\n```text\nline one\nline two\n```\n"
        );
    }
}

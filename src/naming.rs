//! Output file naming.
//!
//! The PDF handed back to the user is named after the client. Client names
//! are free text, so everything but word characters, whitespace and hyphens
//! is dropped before the name touches the file system. Unicode letters are
//! word characters, so "ООО Ромашка" keeps its Cyrillic.

use once_cell::sync::Lazy;
use regex::Regex;

/// Stem used when nothing survives sanitising.
pub const FALLBACK_STEM: &str = "document";

/// Longest stem, in characters.
const MAX_STEM_CHARS: usize = 100;

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Reduce `name` to a safe file stem.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned = RE_UNSAFE.replace_all(name, "");
    let collapsed = RE_WHITESPACE.replace_all(cleaned.trim(), " ");
    let stem: String = collapsed.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end();
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

/// `<sanitised client>.pdf`
pub fn pdf_file_name(client: &str) -> String {
    format!("{}.pdf", sanitize_file_stem(client))
}

/// `<sanitised client>.docx`
pub fn docx_file_name(client: &str) -> String {
    format!("{}.docx", sanitize_file_stem(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_words_spaces_and_hyphens() {
        assert_eq!(sanitize_file_stem("ACME Ltd"), "ACME Ltd");
        assert_eq!(sanitize_file_stem("Smith-Jones"), "Smith-Jones");
    }

    #[test]
    fn strips_path_and_punctuation() {
        assert_eq!(sanitize_file_stem("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_file_stem("A.C.M.E., Inc!"), "ACME Inc");
        assert_eq!(sanitize_file_stem("  a \t\n b  "), "a b");
    }

    #[test]
    fn keeps_unicode_letters() {
        assert_eq!(sanitize_file_stem("ООО «Ромашка»"), "ООО Ромашка");
    }

    #[test]
    fn empty_falls_back() {
        assert_eq!(sanitize_file_stem("!!!"), FALLBACK_STEM);
        assert_eq!(sanitize_file_stem(""), FALLBACK_STEM);
        assert_eq!(pdf_file_name("///"), "document.pdf");
    }

    #[test]
    fn long_names_are_capped() {
        let stem = sanitize_file_stem(&"x".repeat(500));
        assert_eq!(stem.chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn file_names() {
        assert_eq!(pdf_file_name("ACME Ltd"), "ACME Ltd.pdf");
        assert_eq!(docx_file_name("ACME Ltd"), "ACME Ltd.docx");
    }
}

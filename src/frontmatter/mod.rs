pub mod types;

use once_cell::sync::Lazy;
use regex::Regex;

use types::{Frontmatter, FrontmatterValue, RawFrontmatter, SplitContent};

const DELIMITER: &str = "---";
const BOM: char = '\u{feff}';

/// `key: value` (value may be empty). Indented lines never match.
static KEY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w[\w-]*):\s*(.*)$").expect("valid key regex"));

/// `  - item` inside a block list
static BLOCK_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*- (.*)$").expect("valid block item regex"));

pub struct FrontmatterParser;

impl FrontmatterParser {
    /// Locate the frontmatter block at the head of `content`.
    ///
    /// Returns `None` when the document does not open with the delimiter or
    /// when the block is never closed; both cases mean "no frontmatter".
    pub fn extract_raw(content: &str) -> Option<RawFrontmatter> {
        let (text, bom_len) = match content.strip_prefix(BOM) {
            Some(rest) => (rest, BOM.len_utf8()),
            None => (content, 0),
        };

        if !text.starts_with(DELIMITER) {
            return None;
        }

        let close = match text[DELIMITER.len()..].find(DELIMITER) {
            Some(idx) => DELIMITER.len() + idx,
            None => {
                log::debug!("[Frontmatter] Unterminated frontmatter block, treating document as body");
                return None;
            }
        };

        Some(RawFrontmatter {
            raw: text[DELIMITER.len()..close].trim().to_string(),
            end_index: close + DELIMITER.len() + bom_len,
            bom_offset: if bom_len > 0 { 1 } else { 0 },
        })
    }

    /// Parse the constrained YAML subset into a key -> value map
    pub fn parse(content: &str) -> Frontmatter {
        let mut result = Frontmatter::new();
        let raw = match Self::extract_raw(content) {
            Some(fm) => fm.raw,
            None => return result,
        };

        // Key that ended with an empty value and may collect `- item` lines
        let mut pending: Option<(String, Vec<String>)> = None;

        for line in raw.lines() {
            if let Some((_, items)) = pending.as_mut() {
                if let Some(cap) = BLOCK_ITEM.captures(line) {
                    let item = cap[1].trim();
                    if !item.is_empty() {
                        items.push(item.to_string());
                    }
                    continue;
                }
            }

            let Some(cap) = KEY_LINE.captures(line) else {
                continue;
            };

            if let Some((key, items)) = pending.take() {
                finish_block_list(&mut result, key, items);
            }

            let key = cap[1].to_string();
            let value = cap[2].trim();

            if value.is_empty() {
                pending = Some((key, Vec::new()));
                continue;
            }

            if value.starts_with('[') && value.ends_with(']') {
                let inner = &value[1..value.len() - 1];
                result.insert(key, FrontmatterValue::List(split_tokens(inner)));
                continue;
            }

            let mut tokens = split_tokens(value);
            match tokens.len() {
                0 => {}
                1 => {
                    result.insert(key, FrontmatterValue::Scalar(tokens.remove(0)));
                }
                _ => {
                    result.insert(key, FrontmatterValue::List(tokens));
                }
            }
        }

        if let Some((key, items)) = pending.take() {
            finish_block_list(&mut result, key, items);
        }

        result
    }

    /// Split a document into raw frontmatter text and body
    pub fn split(content: &str) -> SplitContent {
        match Self::extract_raw(content) {
            Some(fm) => SplitContent {
                frontmatter: Some(fm.raw),
                body: content[fm.end_index..].trim_start().to_string(),
            },
            None => SplitContent {
                frontmatter: None,
                body: content.to_string(),
            },
        }
    }

    /// Set a single scalar key, leaving every other frontmatter line untouched.
    ///
    /// Repeated occurrences of `key` collapse into the replaced line, and a
    /// block list that belonged to the old value is dropped with it.
    pub fn update_key(content: &str, key: &str, value: &str) -> String {
        let new_line = format!("{}: {}", key, value);
        let eol = line_ending(content);

        let fm = match Self::extract_raw(content) {
            Some(fm) => fm,
            None => {
                let (bom, rest) = match content.strip_prefix(BOM) {
                    Some(rest) => ("\u{feff}", rest),
                    None => ("", content),
                };
                return format!(
                    "{}{}{}{}{}{}{}{}{}",
                    bom, DELIMITER, eol, new_line, eol, DELIMITER, eol, eol, rest
                );
            }
        };

        // Untrimmed text between the delimiters, so blank lines and line
        // endings inside the block survive the rewrite
        let bom = if fm.bom_offset > 0 { "\u{feff}" } else { "" };
        let block = &content[bom.len() + DELIMITER.len()..fm.end_index - DELIMITER.len()];

        let mut out = String::with_capacity(block.len() + new_line.len() + eol.len());
        let mut replaced = false;
        let mut dropping_items = false;

        for piece in block.split_inclusive('\n') {
            let line = piece.trim_end_matches(|c: char| c == '\r' || c == '\n');
            let ending = &piece[line.len()..];

            if dropping_items {
                if BLOCK_ITEM.is_match(line) {
                    continue;
                }
                dropping_items = false;
            }

            let is_target = KEY_LINE
                .captures(line)
                .map(|cap| &cap[1] == key)
                .unwrap_or(false);

            if is_target {
                if !replaced {
                    out.push_str(&new_line);
                    out.push_str(ending);
                    replaced = true;
                }
                dropping_items = true;
                continue;
            }

            out.push_str(piece);
        }

        if !replaced {
            if !out.ends_with('\n') {
                out.push_str(eol);
            }
            out.push_str(&new_line);
            out.push_str(eol);
        }

        format!("{}{}{}{}{}", bom, DELIMITER, out, DELIMITER, &content[fm.end_index..])
    }
}

/// `\r\n` if the document uses it anywhere, `\n` otherwise
fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn finish_block_list(result: &mut Frontmatter, key: String, items: Vec<String>) {
    // `key:` with nothing under it is dropped, same as `key: ,,`
    if !items.is_empty() {
        result.insert(key, FrontmatterValue::List(items));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> FrontmatterValue {
        FrontmatterValue::List(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_extract_raw_basic() {
        let content = "---\ntitle: Hello\n---\n\nBody";
        let fm = FrontmatterParser::extract_raw(content).unwrap();
        assert_eq!(fm.raw, "title: Hello");
        assert_eq!(fm.bom_offset, 0);
        assert_eq!(&content[fm.end_index..], "\n\nBody");
    }

    #[test]
    fn test_extract_raw_with_bom() {
        let content = "\u{feff}---\ntitle: Hello\n---\nBody";
        let fm = FrontmatterParser::extract_raw(content).unwrap();
        assert_eq!(fm.bom_offset, 1);
        assert_eq!(fm.raw, "title: Hello");
        assert_eq!(&content[fm.end_index..], "\nBody");
    }

    #[test]
    fn test_extract_raw_requires_leading_delimiter() {
        assert!(FrontmatterParser::extract_raw("\n---\ntags: a\n---\n").is_none());
        assert!(FrontmatterParser::extract_raw("").is_none());
        assert!(FrontmatterParser::extract_raw("Just text").is_none());
    }

    #[test]
    fn test_unterminated_frontmatter_is_absent() {
        let content = "---\ntags: a, b\nno closing delimiter";
        assert!(FrontmatterParser::extract_raw(content).is_none());
        assert!(FrontmatterParser::parse(content).is_empty());
        let split = FrontmatterParser::split(content);
        assert!(split.frontmatter.is_none());
        assert_eq!(split.body, content);
    }

    #[test]
    fn test_parse_three_list_syntaxes_agree() {
        let comma = FrontmatterParser::parse("---\ntags: a, b, c\n---\n");
        let bracket = FrontmatterParser::parse("---\ntags: [a, b, c]\n---\n");
        let block = FrontmatterParser::parse("---\ntags:\n  - a\n  - b\n  - c\n---\n");

        let expected = list(&["a", "b", "c"]);
        assert_eq!(comma.get("tags"), Some(&expected));
        assert_eq!(bracket.get("tags"), Some(&expected));
        assert_eq!(block.get("tags"), Some(&expected));
    }

    #[test]
    fn test_parse_scalar_is_not_wrapped() {
        let fm = FrontmatterParser::parse("---\ntags: solo\ntitle: My Note\n---\n");
        assert_eq!(fm.get("tags"), Some(&FrontmatterValue::Scalar("solo".to_string())));
        assert_eq!(fm.get("title").and_then(|v| v.as_str()), Some("My Note"));
    }

    #[test]
    fn test_parse_empty_bracket_list() {
        let fm = FrontmatterParser::parse("---\ntags: []\n---\n");
        assert_eq!(fm.get("tags"), Some(&FrontmatterValue::List(vec![])));
    }

    #[test]
    fn test_parse_zero_token_value_is_omitted() {
        let fm = FrontmatterParser::parse("---\ntags: ,,\ntitle: x\n---\n");
        assert!(!fm.contains_key("tags"));
        assert!(fm.contains_key("title"));
    }

    #[test]
    fn test_block_list_finalized_by_next_key() {
        let fm = FrontmatterParser::parse("---\ntags:\n  - one\n  - two\ntitle: T\n---\n");
        assert_eq!(fm.get("tags"), Some(&list(&["one", "two"])));
        assert_eq!(fm.get("title").and_then(|v| v.as_str()), Some("T"));
    }

    #[test]
    fn test_last_scalar_wins() {
        let fm = FrontmatterParser::parse("---\ntitle: first\ntitle: second\n---\n");
        assert_eq!(fm.get("title").and_then(|v| v.as_str()), Some("second"));
    }

    #[test]
    fn test_nested_mapping_lines_are_ignored() {
        let content = "---\nstate:\n  workflow: draft\n  maturity: 1\ntags: [x]\n---\n";
        let fm = FrontmatterParser::parse(content);
        assert!(!fm.contains_key("state"));
        assert!(!fm.contains_key("workflow"));
        assert_eq!(fm.get("tags"), Some(&list(&["x"])));
    }

    #[test]
    fn test_crlf_lines() {
        let fm = FrontmatterParser::parse("---\r\ntags: a, b\r\n---\r\nBody");
        assert_eq!(fm.get("tags"), Some(&list(&["a", "b"])));
    }

    #[test]
    fn test_split_trims_leading_body_whitespace() {
        let split = FrontmatterParser::split("---\ntitle: T\n---\n\n\n# Heading\n");
        assert_eq!(split.frontmatter.as_deref(), Some("title: T"));
        assert_eq!(split.body, "# Heading\n");
    }

    #[test]
    fn test_update_key_replaces_existing() {
        let content = "---\ntitle: Old\ntags:\n  - a\n  - b\n---\n\nBody";
        let updated = FrontmatterParser::update_key(content, "title", "New");
        assert_eq!(updated, "---\ntitle: New\ntags:\n  - a\n  - b\n---\n\nBody");
    }

    #[test]
    fn test_update_key_appends_missing() {
        let content = "---\ntitle: T\n---\nBody";
        let updated = FrontmatterParser::update_key(content, "modified", "2025-01-24");
        assert_eq!(updated, "---\ntitle: T\nmodified: 2025-01-24\n---\nBody");
        let fm = FrontmatterParser::parse(&updated);
        assert_eq!(fm.get("modified").and_then(|v| v.as_str()), Some("2025-01-24"));
    }

    #[test]
    fn test_update_key_drops_old_block_items() {
        let content = "---\ntags:\n  - a\n  - b\ntitle: T\n---\n";
        let updated = FrontmatterParser::update_key(content, "tags", "solo");
        assert_eq!(updated, "---\ntags: solo\ntitle: T\n---\n");
    }

    #[test]
    fn test_update_key_without_frontmatter_keeps_bom() {
        let updated = FrontmatterParser::update_key("\u{feff}Body text", "title", "T");
        assert_eq!(updated, "\u{feff}---\ntitle: T\n---\n\nBody text");
        let fm = FrontmatterParser::extract_raw(&updated).unwrap();
        assert_eq!(fm.bom_offset, 1);
        assert_eq!(fm.raw, "title: T");
    }

    #[test]
    fn test_update_key_keeps_crlf_line_endings() {
        let content = "---\r\ntitle: Old\r\ntags: a\r\n---\r\n\r\nBody\r\n";

        let replaced = FrontmatterParser::update_key(content, "title", "New");
        assert_eq!(replaced, "---\r\ntitle: New\r\ntags: a\r\n---\r\n\r\nBody\r\n");

        let appended = FrontmatterParser::update_key(content, "status", "done");
        assert_eq!(
            appended,
            "---\r\ntitle: Old\r\ntags: a\r\nstatus: done\r\n---\r\n\r\nBody\r\n"
        );
        assert!(!appended.replace("\r\n", "").contains('\n'));

        let created = FrontmatterParser::update_key("Body\r\nmore", "title", "T");
        assert_eq!(created, "---\r\ntitle: T\r\n---\r\n\r\nBody\r\nmore");
    }

    #[test]
    fn test_update_key_keeps_blank_lines_in_block() {
        let content = "---\n\ntitle: T\n\ntags: [a]\n---\nBody";
        let updated = FrontmatterParser::update_key(content, "title", "U");
        assert_eq!(updated, "---\n\ntitle: U\n\ntags: [a]\n---\nBody");
        assert_eq!(FrontmatterParser::parse(&updated).get("tags"), Some(&list(&["a"])));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single frontmatter value: either a bare scalar or an ordered list.
///
/// `tags: solo` stays a scalar; `tags: a, b`, `tags: [a, b]` and the
/// indented block list all become `List`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontmatterValue {
    Scalar(String),
    List(Vec<String>),
}

impl FrontmatterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FrontmatterValue::Scalar(s) => Some(s),
            FrontmatterValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FrontmatterValue::Scalar(_) => None,
            FrontmatterValue::List(items) => Some(items),
        }
    }

    /// Flatten into a list (a scalar becomes a one-element list)
    pub fn into_list(self) -> Vec<String> {
        match self {
            FrontmatterValue::Scalar(s) => vec![s],
            FrontmatterValue::List(items) => items,
        }
    }
}

pub type Frontmatter = HashMap<String, FrontmatterValue>;

/// Location of the frontmatter block inside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrontmatter {
    /// Trimmed text between the two delimiters
    pub raw: String,
    /// Byte offset into the original content just past the closing delimiter
    pub end_index: usize,
    /// 1 if the content started with a byte order mark, 0 otherwise
    pub bom_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitContent {
    pub frontmatter: Option<String>,
    pub body: String,
}

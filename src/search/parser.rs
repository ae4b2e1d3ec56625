use crate::frontmatter::types::FrontmatterValue;
use crate::frontmatter::FrontmatterParser;

const TAGS_FIELD: &str = "tags";

/// Extract tags from the frontmatter of a document.
///
/// Absent field -> empty, list -> as-is, scalar -> one-element list.
/// Tags are not validated or normalized here; callers that care about a
/// tag family (e.g. a task prefix) filter the result with [`tags_with_prefix`].
pub fn extract_tags(content: &str) -> Vec<String> {
    let mut frontmatter = FrontmatterParser::parse(content);
    match frontmatter.remove(TAGS_FIELD) {
        Some(FrontmatterValue::List(tags)) => tags,
        Some(FrontmatterValue::Scalar(tag)) => vec![tag],
        None => Vec::new(),
    }
}

/// Keep only the tags that start with `prefix`
pub fn tags_with_prefix<'a, I>(tags: I, prefix: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    tags.into_iter()
        .filter(|tag| tag.starts_with(prefix))
        .cloned()
        .collect()
}

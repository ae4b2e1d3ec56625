use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Characters of offset that cost a full point of score
const LOCATION_DISTANCE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSearchResult {
    pub tag: String,
    pub count: usize,
    /// Fuzzy match score, lower is better. `None` for plain enumeration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl From<TagCount> for TagSearchResult {
    fn from(tc: TagCount) -> Self {
        Self {
            tag: tc.tag,
            count: tc.count,
            score: None,
        }
    }
}

struct SearchEntry {
    tag: TagCount,
    folded: Vec<char>,
}

/// Approximate matcher over the flat tag list.
///
/// Rebuilt wholesale from `all_tags` whenever tag membership changes; the
/// structure is a plain list, so rebuild cost is linear in the tag count.
pub struct TagSearch {
    entries: Vec<SearchEntry>,
    threshold: f64,
    built: bool,
}

impl TagSearch {
    pub fn new(threshold: f64) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
            built: false,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn rebuild_from(&mut self, all_tags: &[TagCount]) {
        self.entries = all_tags
            .iter()
            .map(|tc| SearchEntry {
                tag: tc.clone(),
                folded: tc.tag.to_lowercase().chars().collect(),
            })
            .collect();
        self.built = true;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.built = false;
    }

    /// Ranked matches for `query`, best first
    pub fn search(&self, query: &str) -> Vec<TagSearchResult> {
        let query: Vec<char> = query.trim().to_lowercase().chars().collect();
        if query.is_empty() || !self.built {
            return Vec::new();
        }

        let mut hits: Vec<TagSearchResult> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = match_score(&query, &entry.folded)?;
                (score <= self.threshold).then(|| TagSearchResult {
                    tag: entry.tag.tag.clone(),
                    count: entry.tag.count,
                    score: Some(score),
                })
            })
            .collect();

        // Stable: equal scores keep index order
        hits.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
        });
        hits
    }

    /// Every tag, most used first
    pub fn all_ranked_by_count(&self) -> Vec<TagCount> {
        let mut all: Vec<TagCount> = self.entries.iter().map(|e| e.tag.clone()).collect();
        all.sort_by(|a, b| b.count.cmp(&a.count));
        all
    }
}

/// Best approximate-substring score of `pattern` inside `text`.
///
/// Score = edits / pattern length + match start / LOCATION_DISTANCE, so an
/// exact match at the start of the tag scores 0.
fn match_score(pattern: &[char], text: &[char]) -> Option<f64> {
    let m = pattern.len();
    if m == 0 {
        return None;
    }

    // (edit cost, start column) per text position; row 0 lets a match start anywhere
    let mut prev: Vec<(usize, usize)> = (0..=text.len()).map(|j| (0, j)).collect();
    let mut cur: Vec<(usize, usize)> = vec![(0, 0); text.len() + 1];

    for i in 1..=m {
        cur[0] = (i, 0);
        for j in 1..=text.len() {
            let substitute = (
                prev[j - 1].0 + usize::from(pattern[i - 1] != text[j - 1]),
                prev[j - 1].1,
            );
            let skip_pattern = (prev[j].0 + 1, prev[j].1);
            let skip_text = (cur[j - 1].0 + 1, cur[j - 1].1);
            cur[j] = substitute.min(skip_pattern).min(skip_text);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    prev.iter()
        .map(|&(cost, start)| cost as f64 / m as f64 + start as f64 / LOCATION_DISTANCE)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[(&str, usize)]) -> Vec<TagCount> {
        items
            .iter()
            .map(|(t, c)| TagCount { tag: t.to_string(), count: *c })
            .collect()
    }

    fn built(items: &[(&str, usize)]) -> TagSearch {
        let mut search = TagSearch::new(0.4);
        search.rebuild_from(&tags(items));
        search
    }

    #[test]
    fn test_unbuilt_or_empty_query_returns_nothing() {
        let search = TagSearch::new(0.4);
        assert!(search.search("rust").is_empty());

        let search = built(&[("rust", 1)]);
        assert!(search.search("").is_empty());
        assert!(search.search("   ").is_empty());
    }

    #[test]
    fn test_exact_prefix_scores_zero() {
        let search = built(&[("project", 4)]);
        let hits = search.search("proj");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].tag, "project");
        assert_eq!(hits[0].count, 4);
        assert_eq!(hits[0].score, Some(0.0));
    }

    #[test]
    fn test_ranking_prefers_exact_substring() {
        let search = built(&[("rust", 3), ("rest", 1), ("first", 2), ("python", 9)]);
        let hits = search.search("rst");
        let names: Vec<&str> = hits.iter().map(|h| h.tag.as_str()).collect();
        assert_eq!(names, vec!["first", "rust", "rest"]);
        assert!(hits.iter().all(|h| h.score.unwrap() <= 0.4));
    }

    #[test]
    fn test_typo_within_threshold() {
        let search = built(&[("meeting", 2), ("memo", 1)]);
        let hits = search.search("meetng");
        assert_eq!(hits.first().map(|h| h.tag.as_str()), Some("meeting"));
    }

    #[test]
    fn test_unrelated_query_filtered_by_threshold() {
        let search = built(&[("project", 1), ("idea", 1)]);
        assert!(search.search("xyzw").is_empty());
    }

    #[test]
    fn test_case_insensitive() {
        let search = built(&[("Domain/특허", 1)]);
        assert_eq!(search.search("domain").len(), 1);
        assert_eq!(search.search("특허").len(), 1);
    }

    #[test]
    fn test_all_ranked_by_count() {
        let search = built(&[("a", 1), ("b", 5), ("c", 3)]);
        let ranked = search.all_ranked_by_count();
        let names: Vec<&str> = ranked.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_rebuild_replaces_entries() {
        let mut search = built(&[("old", 1)]);
        search.rebuild_from(&tags(&[("new", 1)]));
        assert!(search.search("old").is_empty());
        assert_eq!(search.search("new").len(), 1);
        search.clear();
        assert!(!search.is_built());
    }
}

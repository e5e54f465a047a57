//! Keyword Lister (§4.L): aggregates `keyword -> videos` across a scope.

use crate::model::VideoId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct KeywordAggregator {
    counts: HashMap<String, HashSet<VideoId>>,
}

impl KeywordAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, keywords: &[String], video_id: &VideoId) {
        for kw in keywords {
            self.counts
                .entry(kw.clone())
                .or_default()
                .insert(video_id.clone());
        }
    }

    /// Ordered keyword -> count, by count descending then keyword ascending
    /// (§4.L, scenario S5).
    pub fn ordered_counts(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = self
            .counts
            .iter()
            .map(|(k, videos)| (k.clone(), videos.len()))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    pub fn videos_for(&self, keyword: &str) -> Vec<&VideoId> {
        self.counts
            .get(keyword)
            .map(|s| s.iter().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_keyword_counts_scenario() {
        let mut agg = KeywordAggregator::new();
        agg.add(&["a".into(), "b".into()], &VideoId::new("v1"));
        agg.add(&["b".into(), "c".into()], &VideoId::new("v2"));
        agg.add(&["b".into()], &VideoId::new("v3"));

        let ordered = agg.ordered_counts();
        assert_eq!(
            ordered,
            vec![("b".to_string(), 3), ("a".to_string(), 1), ("c".to_string(), 1)]
        );
    }

    #[test]
    fn same_video_counted_once_per_keyword() {
        let mut agg = KeywordAggregator::new();
        agg.add(&["a".into()], &VideoId::new("v1"));
        agg.add(&["a".into()], &VideoId::new("v1"));
        assert_eq!(agg.ordered_counts(), vec![("a".to_string(), 1)]);
    }
}

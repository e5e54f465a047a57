//! Padded Match & MatchedText (§4.K): match ranges with context padding, group
//! splitting, and overlap merging.

use serde::{Deserialize, Serialize};

/// A match location relative to the start of its containing interval/text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedMatch {
    pub start: usize,
    pub length: usize,
}

/// A closed interval `[start, end]` into a containing text, plus the matches
/// it covers (relative to `start`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddedMatch {
    pub start: usize,
    pub end: usize,
    pub included: Vec<IncludedMatch>,
}

impl PaddedMatch {
    /// Builds the padded interval for one absolute match `[abs_start, abs_start+len)`,
    /// clamped to `[0, text_len - 1]`.
    pub fn from_absolute(abs_start: usize, len: usize, padding: usize, text_len: usize) -> Self {
        let start = abs_start.saturating_sub(padding);
        let end = (abs_start + len + padding)
            .saturating_sub(1)
            .min(text_len.saturating_sub(1));
        Self {
            start,
            end,
            included: vec![IncludedMatch {
                start: abs_start - start,
                length: len,
            }],
        }
    }

    fn touches_or_overlaps(&self, other: &PaddedMatch) -> bool {
        self.start <= other.end + 1 && other.start <= self.end + 1
    }

    /// Merges `other` into `self` in place, re-indexing included matches
    /// relative to the merged interval (§4.K).
    fn merge_in_place(&mut self, other: PaddedMatch) {
        let new_start = self.start.min(other.start);
        let new_end = self.end.max(other.end);
        let shift_self = self.start - new_start;
        let shift_other = other.start - new_start;

        for m in self.included.iter_mut() {
            m.start += shift_self;
        }
        for mut m in other.included {
            m.start += shift_other;
            self.included.push(m);
        }
        self.included.sort_by_key(|m| m.start);
        self.included.dedup();
        self.start = new_start;
        self.end = new_end;
    }
}

/// Merges adjacent/overlapping padded intervals over one common text (§4.K,
/// §8 property 5). Idempotent and commutative; output is sorted by `start`.
pub fn merge_padded_matches(mut matches: Vec<PaddedMatch>) -> Vec<PaddedMatch> {
    matches.sort_by_key(|m| m.start);
    let mut out: Vec<PaddedMatch> = Vec::with_capacity(matches.len());
    for m in matches {
        if let Some(last) = out.last_mut() {
            if last.touches_or_overlaps(&m) {
                last.merge_in_place(m);
                continue;
            }
        }
        out.push(m);
    }
    out
}

/// A piece of text plus the ordered, distinct locations of matches within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedText {
    pub text: String,
    /// Sorted by `start`, distinct.
    pub matches: Vec<IncludedMatch>,
}

impl MatchedText {
    pub fn new(text: impl Into<String>, mut matches: Vec<IncludedMatch>) -> Self {
        matches.sort_by_key(|m| m.start);
        matches.dedup_by_key(|m| (m.start, m.length));
        Self {
            text: text.into(),
            matches,
        }
    }

    /// Splits into groups where two adjacent matches belong to the same group
    /// iff `next.start <= prev.end + padding` (§4.K). Each group's matches keep
    /// their absolute `start` into the original text.
    pub fn group_split(&self, padding: usize) -> Vec<MatchedText> {
        let mut groups: Vec<Vec<IncludedMatch>> = Vec::new();
        for m in &self.matches {
            let belongs_to_last = groups.last().and_then(|g: &Vec<IncludedMatch>| g.last()).is_some_and(
                |prev: &IncludedMatch| m.start <= prev.start + prev.length + padding,
            );
            if belongs_to_last {
                groups.last_mut().unwrap().push(*m);
            } else {
                groups.push(vec![*m]);
            }
        }
        groups
            .into_iter()
            .map(|g| MatchedText::new(self.text.clone(), g))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_idempotent_and_commutative() {
        let a = PaddedMatch::from_absolute(5, 3, 2, 100);
        let b = PaddedMatch::from_absolute(8, 3, 2, 100);
        let once = merge_padded_matches(vec![a.clone(), b.clone()]);
        let twice = merge_padded_matches(once.clone());
        assert_eq!(once, twice);
        let reversed = merge_padded_matches(vec![b, a]);
        assert_eq!(once, reversed);
    }

    #[test]
    fn merged_interval_spans_min_to_max() {
        let a = PaddedMatch::from_absolute(5, 3, 2, 100);
        let b = PaddedMatch::from_absolute(20, 3, 2, 100);
        let far_apart = merge_padded_matches(vec![a.clone(), b.clone()]);
        assert_eq!(far_apart.len(), 2);

        let c = PaddedMatch::from_absolute(9, 3, 2, 100);
        let merged = merge_padded_matches(vec![a, c]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, 3);
        assert_eq!(merged[0].end, 13);
    }

    #[test]
    fn group_split_round_trips_all_matches() {
        let text = MatchedText::new(
            "the quick brown fox",
            vec![
                IncludedMatch { start: 0, length: 3 },
                IncludedMatch { start: 4, length: 5 },
                IncludedMatch { start: 16, length: 3 },
            ],
        );
        let groups = text.group_split(1);
        let total: usize = groups.iter().map(|g| g.matches.len()).sum();
        assert_eq!(total, 3);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn clamps_to_text_bounds() {
        let m = PaddedMatch::from_absolute(0, 2, 5, 10);
        assert_eq!(m.start, 0);
        assert_eq!(m.end, 6);
        let m2 = PaddedMatch::from_absolute(8, 2, 5, 10);
        assert_eq!(m2.end, 9);
    }
}

use std::collections::{HashMap, HashSet};

/// Progress of one collection run. Lives only as long as the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub target_count: usize,
    accepted_count: usize,
    exhausted_sources: HashSet<(String, String)>,
    per_keyword_cursor: HashMap<String, usize>,
}

impl RunState {
    /// `accepted_count` starts at `seeded_count`: clips collected by earlier runs count
    /// toward the target.
    pub fn new(target_count: usize, seeded_count: usize) -> Self {
        Self {
            target_count,
            accepted_count: seeded_count,
            ..Self::default()
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted_count
    }

    pub fn target_reached(&self) -> bool {
        self.accepted_count >= self.target_count
    }

    pub fn record_accepted(&mut self) {
        self.accepted_count += 1;
    }

    /// Stop searching `source_name` for `keyword` for the rest of the run.
    pub fn mark_exhausted(&mut self, source_name: &str, keyword: &str) {
        self.exhausted_sources
            .insert((source_name.to_string(), keyword.to_string()));
    }

    pub fn is_exhausted(&self, source_name: &str, keyword: &str) -> bool {
        self.exhausted_sources
            .contains(&(source_name.to_string(), keyword.to_string()))
    }

    /// Count one more candidate consumed for `keyword`, across all sources.
    pub fn advance_cursor(&mut self, keyword: &str) -> usize {
        let cursor = self
            .per_keyword_cursor
            .entry(keyword.to_string())
            .or_default();
        *cursor += 1;
        *cursor
    }

    pub fn cursor(&self, keyword: &str) -> usize {
        self.per_keyword_cursor.get(keyword).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seeded_count_counts_toward_target() {
        let mut state = RunState::new(3, 2);
        assert!(!state.target_reached());
        state.record_accepted();
        assert!(state.target_reached());
        state.record_accepted();
        assert_eq!(state.accepted_count(), 4);
        assert!(state.target_reached());

        assert!(RunState::new(5, 5).target_reached());
    }

    #[test]
    fn test_exhaustion_is_per_source_and_keyword() {
        let mut state = RunState::new(1, 0);
        state.mark_exhausted("youtube", "rain");
        assert!(state.is_exhausted("youtube", "rain"));
        assert!(!state.is_exhausted("tiktok", "rain"));
        assert!(!state.is_exhausted("youtube", "desert"));
    }

    #[test]
    fn test_cursor() {
        let mut state = RunState::new(1, 0);
        assert_eq!(state.cursor("rain"), 0);
        assert_eq!(state.advance_cursor("rain"), 1);
        assert_eq!(state.advance_cursor("rain"), 2);
        assert_eq!(state.cursor("rain"), 2);
        assert_eq!(state.cursor("desert"), 0);
    }
}

use glob::Pattern;
use regex::Regex;
use std::collections::HashSet;

use crate::error::ConfigError;
use crate::process::{ProcessIdentity, ProcessTable};

/// Compiled command-name patterns. A name matches if it matches any wildcard
/// or any regex; empty criteria match nothing.
#[derive(Debug, Default, Clone)]
pub struct MatchCriteria {
    wildcards: Vec<Pattern>,
    regexes: Vec<Regex>,
}

impl MatchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shell-style wildcard, matched against the whole command name.
    pub fn add_wildcard(&mut self, pattern: &str) -> Result<(), ConfigError> {
        let compiled = Pattern::new(pattern).map_err(|source| ConfigError::Wildcard {
            pattern: pattern.to_string(),
            source,
        })?;
        self.wildcards.push(compiled);
        Ok(())
    }

    /// Adds a regular expression. Unanchored expressions match anywhere in the
    /// command name.
    pub fn add_regex(&mut self, pattern: &str) -> Result<(), ConfigError> {
        let compiled = Regex::new(pattern).map_err(|source| ConfigError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        self.regexes.push(compiled);
        Ok(())
    }

    pub fn condition_count(&self) -> usize {
        self.wildcards.len() + self.regexes.len()
    }

    pub fn is_match(&self, command: &str) -> bool {
        self.wildcards.iter().any(|w| w.matches(command))
            || self.regexes.iter().any(|r| r.is_match(command))
    }
}

/// Every identity the matcher has ever yielded. Only grows.
#[derive(Debug, Default)]
pub struct SeenIdentitySet {
    seen: HashSet<ProcessIdentity>,
}

impl SeenIdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `identity`, returning `true` if it had not been seen before.
    pub fn insert(&mut self, identity: ProcessIdentity) -> bool {
        self.seen.insert(identity)
    }

    #[cfg(test)]
    pub fn contains(&self, identity: &ProcessIdentity) -> bool {
        self.seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Turns [`MatchCriteria`] into concrete PIDs by scanning the process table.
#[derive(Debug, Default)]
pub struct ProcessMatcher {
    criteria: MatchCriteria,
}

impl ProcessMatcher {
    pub fn new(criteria: MatchCriteria) -> Self {
        Self { criteria }
    }

    pub fn condition_count(&self) -> usize {
        self.criteria.condition_count()
    }

    /// Scans the table once and returns the PIDs of matching processes whose
    /// identity is not yet in `seen`, marking each one as seen. A process is
    /// therefore returned at most once across all calls sharing `seen`.
    pub fn matching_new(
        &self,
        table: &mut dyn ProcessTable,
        seen: &mut SeenIdentitySet,
    ) -> Vec<u32> {
        if self.criteria.condition_count() == 0 {
            return Vec::new();
        }
        let mut found: Vec<u32> = table
            .list_all()
            .filter(|entry| self.criteria.is_match(&entry.name))
            .filter(|entry| seen.insert(entry.identity))
            .map(|entry| entry.identity.pid)
            .collect();
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeTable;

    fn criteria(wildcards: &[&str], regexes: &[&str]) -> MatchCriteria {
        let mut c = MatchCriteria::new();
        for w in wildcards {
            c.add_wildcard(w).unwrap();
        }
        for r in regexes {
            c.add_regex(r).unwrap();
        }
        c
    }

    // ── MatchCriteria ─────────────────────────────────────────────────────────

    #[test]
    fn wildcard_matches_whole_name() {
        let c = criteria(&["myapp*"], &[]);
        assert!(c.is_match("myapp_worker"));
        assert!(c.is_match("myapp"));
        assert!(!c.is_match("otherapp"));
        assert!(!c.is_match("not_myapp"));
    }

    #[test]
    fn wildcard_supports_single_char_and_classes() {
        let c = criteria(&["job?", "w[0-9]"], &[]);
        assert!(c.is_match("job1"));
        assert!(!c.is_match("job12"));
        assert!(c.is_match("w7"));
        assert!(!c.is_match("wx"));
    }

    #[test]
    fn regex_requires_digits() {
        let c = criteria(&[], &[r"exec\d+"]);
        assert!(c.is_match("exec42"));
        assert!(!c.is_match("exec"));
    }

    #[test]
    fn criteria_are_disjunctive() {
        let c = criteria(&["alpha*"], &["^beta$"]);
        assert!(c.is_match("alpha1"));
        assert!(c.is_match("beta"));
        assert!(!c.is_match("gamma"));
        assert_eq!(c.condition_count(), 2);
    }

    #[test]
    fn empty_criteria_match_nothing() {
        let c = MatchCriteria::new();
        assert_eq!(c.condition_count(), 0);
        assert!(!c.is_match(""));
        assert!(!c.is_match("anything"));
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let mut c = MatchCriteria::new();
        let err = c.add_regex("exec(").unwrap_err();
        assert!(matches!(err, ConfigError::Regex { .. }));
        assert_eq!(c.condition_count(), 0);
    }

    #[test]
    fn bad_wildcard_is_a_config_error() {
        let mut c = MatchCriteria::new();
        let err = c.add_wildcard("[abc").unwrap_err();
        assert!(matches!(err, ConfigError::Wildcard { .. }));
    }

    // ── ProcessMatcher ────────────────────────────────────────────────────────

    #[test]
    fn matching_new_yields_only_matching_pids() {
        let mut table = FakeTable::new();
        table.spawn(10, 1, "myapp_worker");
        table.spawn(11, 1, "otherapp");
        table.spawn(12, 1, "exec42");
        let matcher = ProcessMatcher::new(criteria(&["myapp*"], &[r"exec\d+"]));
        let mut seen = SeenIdentitySet::new();

        assert_eq!(matcher.matching_new(&mut table, &mut seen), vec![10, 12]);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn matching_new_is_idempotent_on_unchanged_table() {
        let mut table = FakeTable::new();
        table.spawn(10, 1, "myapp");
        let matcher = ProcessMatcher::new(criteria(&["myapp*"], &[]));
        let mut seen = SeenIdentitySet::new();

        assert_eq!(matcher.matching_new(&mut table, &mut seen), vec![10]);
        assert!(matcher.matching_new(&mut table, &mut seen).is_empty());
    }

    #[test]
    fn matching_new_reports_newly_spawned_processes() {
        let mut table = FakeTable::new();
        table.spawn(10, 1, "myapp");
        let matcher = ProcessMatcher::new(criteria(&["myapp*"], &[]));
        let mut seen = SeenIdentitySet::new();
        matcher.matching_new(&mut table, &mut seen);

        table.spawn(20, 3, "myapp_2");
        assert_eq!(matcher.matching_new(&mut table, &mut seen), vec![20]);
    }

    #[test]
    fn matching_new_treats_reused_pid_as_new_instance() {
        let mut table = FakeTable::new();
        table.spawn(10, 1, "myapp");
        let matcher = ProcessMatcher::new(criteria(&["myapp"], &[]));
        let mut seen = SeenIdentitySet::new();
        matcher.matching_new(&mut table, &mut seen);

        table.kill(10);
        table.spawn(10, 50, "myapp");
        assert_eq!(matcher.matching_new(&mut table, &mut seen), vec![10]);
        assert!(seen.contains(&ProcessIdentity::new(10, 1)));
        assert!(seen.contains(&ProcessIdentity::new(10, 50)));
    }

    #[test]
    fn matching_new_without_conditions_does_not_scan() {
        let mut table = FakeTable::new();
        table.spawn(10, 1, "myapp");
        let matcher = ProcessMatcher::default();
        let mut seen = SeenIdentitySet::new();
        assert!(matcher.matching_new(&mut table, &mut seen).is_empty());
        assert!(seen.is_empty());
    }
}

//! Desired-vs-actual partitioning.
//!
//! Hostname is the only join key. The desired record is kept as-is; the
//! actual set only answers "is this hostname present locally".

use std::collections::HashSet;

/// Desired entries split by what the node has to do with them.
///
/// Each bucket keeps the order of the desired set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<T> {
    /// Wanted, not present locally.
    pub to_create: Vec<T>,

    /// Wanted and already present.
    pub present: Vec<T>,

    /// Marked for deletion and present locally.
    pub to_delete: Vec<T>,

    /// Marked for deletion but already gone.
    pub absent: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            present: Vec::new(),
            to_delete: Vec::new(),
            absent: Vec::new(),
        }
    }
}

impl<T> Diff<T> {
    /// Returns true if neither a create nor a delete is needed.
    pub fn is_converged(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Partition `desired` against the hostnames in `actual`.
///
/// `is_deletion` decides whether a desired entry is a deletion candidate;
/// every other entry is a creation candidate.
pub fn diff_by_hostname<I, A, H, D>(
    desired: I,
    actual: A,
    hostname: H,
    is_deletion: D,
) -> Diff<I::Item>
where
    I: IntoIterator,
    A: IntoIterator,
    A::Item: AsRef<str>,
    H: Fn(&I::Item) -> &str,
    D: Fn(&I::Item) -> bool,
{
    let actual: HashSet<String> = actual
        .into_iter()
        .map(|h| h.as_ref().to_string())
        .collect();

    let mut diff = Diff::default();
    for entry in desired {
        let is_present = actual.contains(hostname(&entry));
        match (is_deletion(&entry), is_present) {
            (false, false) => diff.to_create.push(entry),
            (false, true) => diff.present.push(entry),
            (true, true) => diff.to_delete.push(entry),
            (true, false) => diff.absent.push(entry),
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[(&str, bool)]) -> Vec<String> {
        entries.iter().map(|(h, _)| h.to_string()).collect()
    }

    #[test]
    fn test_reference_scenario() {
        let desired = vec![
            ("test-c-01", false),
            ("test-c-02", false),
            ("test-c-03", false),
            ("test-c-04", true),
        ];
        let actual = ["test-c-01", "test-c-02", "test-c-04"];

        let diff = diff_by_hostname(desired, actual, |(h, _)| *h, |(_, del)| *del);

        assert_eq!(names(&diff.to_create), vec!["test-c-03"]);
        assert_eq!(names(&diff.present), vec!["test-c-01", "test-c-02"]);
        assert_eq!(names(&diff.to_delete), vec!["test-c-04"]);
        assert!(diff.absent.is_empty());
        assert!(!diff.is_converged());
    }

    #[test]
    fn test_empty_desired_is_converged() {
        let desired: Vec<(&str, bool)> = vec![];
        let diff = diff_by_hostname(desired, ["stray-01"], |(h, _)| *h, |(_, del)| *del);
        assert!(diff.is_converged());
        assert!(diff.present.is_empty());
    }

    #[test]
    fn test_actual_only_hostnames_are_ignored() {
        // Containers the control plane does not know about are never touched.
        let desired = vec![("web-01", false)];
        let diff = diff_by_hostname(desired, ["web-01", "legacy-01"], |(h, _)| *h, |(_, d)| *d);
        assert!(diff.is_converged());
        assert_eq!(names(&diff.present), vec!["web-01"]);
    }

    #[test]
    fn test_deletion_of_missing_container() {
        let desired = vec![("gone-01", true)];
        let diff = diff_by_hostname(desired, Vec::<String>::new(), |(h, _)| *h, |(_, d)| *d);
        assert!(diff.to_delete.is_empty());
        assert_eq!(names(&diff.absent), vec!["gone-01"]);
    }

    #[test]
    fn test_every_entry_lands_in_exactly_one_bucket() {
        let desired: Vec<(String, bool)> = (0..20)
            .map(|i| (format!("c-{i:02}"), i % 3 == 0))
            .collect();
        let actual: Vec<String> = (0..20)
            .filter(|i| i % 2 == 0)
            .map(|i| format!("c-{i:02}"))
            .collect();

        let diff = diff_by_hostname(desired.clone(), &actual, |(h, _)| h.as_str(), |(_, d)| *d);

        let total =
            diff.to_create.len() + diff.present.len() + diff.to_delete.len() + diff.absent.len();
        assert_eq!(total, desired.len());

        for (h, del) in &diff.to_create {
            assert!(!del && !actual.contains(h));
        }
        for (h, del) in &diff.to_delete {
            assert!(*del && actual.contains(h));
        }
    }
}

//! Deduplication of merged provider results by foreign id.

use std::collections::HashSet;

use tracing::debug;

use crate::metadata::ForeignKeyed;

/// Deduplicate results by kind and foreign id.
///
/// The first occurrence of each id wins, so callers must pass results in
/// provider priority order. Results without a foreign id cannot be joined
/// across providers and are dropped.
pub fn deduplicate<T, I>(results: I) -> Vec<T>
where
    T: ForeignKeyed,
    I: IntoIterator<Item = T>,
{
    let mut seen: HashSet<(&'static str, String)> = HashSet::new();
    let mut unique = Vec::new();

    for item in results {
        let id = item.foreign_id();
        if id.is_empty() {
            debug!("Dropping result without foreign id");
            continue;
        }
        if seen.insert((item.kind(), id.to_string())) {
            unique.push(item);
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_first_occurrence_wins() {
        let mut shadow = fixtures::author("OL1A", "Shadowed Copy");
        shadow.work_count = 1;

        let results = vec![
            fixtures::author("OL1A", "Ursula K. Le Guin"),
            fixtures::author("OL2A", "Octavia E. Butler"),
            shadow,
            fixtures::author("OL3A", "N. K. Jemisin"),
        ];

        let unique = deduplicate(results);
        let ids: Vec<_> = unique.iter().map(|a| a.foreign_id.as_str()).collect();
        assert_eq!(ids, vec!["OL1A", "OL2A", "OL3A"]);
        assert_eq!(unique[0].name, "Ursula K. Le Guin");
    }

    #[test]
    fn test_drops_results_without_id() {
        let results = vec![
            fixtures::book("", "Untitled", "OL1A"),
            fixtures::book("OL1W", "Dune", "OL1A"),
        ];
        let unique = deduplicate(results);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].foreign_id, "OL1W");
    }

    #[test]
    fn test_authors_and_books_do_not_share_ids() {
        use crate::metadata::SearchEntity;

        let results = vec![
            SearchEntity::Author(fixtures::author("X1", "Frank Herbert")),
            SearchEntity::Book(fixtures::book("X1", "Dune", "X1")),
            SearchEntity::Book(fixtures::book("X1", "Dune (duplicate)", "X1")),
        ];

        let unique = deduplicate(results);
        assert_eq!(unique.len(), 2);
        assert!(matches!(&unique[0], SearchEntity::Author(a) if a.name == "Frank Herbert"));
        assert!(matches!(&unique[1], SearchEntity::Book(b) if b.title == "Dune"));
    }

    #[test]
    fn test_empty_input() {
        let unique: Vec<crate::metadata::Book> = deduplicate(Vec::new());
        assert!(unique.is_empty());
    }
}

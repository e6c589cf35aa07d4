//! Relevance gate and scoring for search results.
//!
//! Provider search endpoints are high-recall and low-precision. Author search
//! results first pass a word-match gate, then every ranked result is scored
//! by name match quality plus small, individually capped popularity and
//! completeness signals.

use std::cmp::Ordering;

use crate::metadata::{Author, Book, Ratings, SearchEntity};

// =============================================================================
// Weights
// =============================================================================

const EXACT_MATCH: f64 = 1000.0;
/// Equal once spacing is ignored, e.g. "J. K." against "J.K.".
const EXACT_IGNORING_SPACES: f64 = 900.0;
const NORMALIZED_CONTAINS: f64 = 500.0;
const RAW_CONTAINS: f64 = 400.0;
const WORD_OVERLAP: f64 = 300.0;
const PARTIAL_OVERLAP_PENALTY: f64 = 200.0;
const ALIAS_SCALE: f64 = 0.8;

const WORK_COUNT_WEIGHT: f64 = 0.5;
const WORK_COUNT_CAP: u32 = 100;
const RATING_VOTES_CAP: f64 = 30.0;
const RATING_VALUE_WEIGHT: f64 = 4.0;
const RATING_VALUE_CAP: f64 = 20.0;
const LIFE_DATE_BONUS: f64 = 5.0;
const OVERVIEW_BONUS: f64 = 10.0;
const IMAGE_WEIGHT: f64 = 2.0;
const IMAGE_CAP: f64 = 10.0;
const SPARSE_WORKS_THRESHOLD: u32 = 5;
const SPARSE_WORKS_PENALTY: f64 = 100.0;

/// Lowercase, strip periods and commas, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace(['.', ','], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn query_words(query: &str) -> Vec<String> {
    normalize_name(query)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Fraction of query words contained in the normalized candidate.
fn word_overlap(words: &[String], normalized_candidate: &str) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let matched = words
        .iter()
        .filter(|w| normalized_candidate.contains(w.as_str()))
        .count();
    matched as f64 / words.len() as f64
}

// =============================================================================
// Gate
// =============================================================================

/// Whether an author search result is related enough to the query to keep.
///
/// - one word: it must appear in the name
/// - two words: both must appear in the name or in one alias
/// - three or more: at least 75% must appear in the name or in one alias
pub fn passes_gate(query: &str, author: &Author) -> bool {
    let words = query_words(query);
    let name = normalize_name(&author.name);

    match words.len() {
        0 => true,
        1 => name.contains(words[0].as_str()),
        n => {
            let best = std::iter::once(name)
                .chain(author.aliases.iter().map(|a| normalize_name(a)))
                .map(|candidate| {
                    words
                        .iter()
                        .filter(|w| candidate.contains(w.as_str()))
                        .count()
                })
                .max()
                .unwrap_or(0);

            if n == 2 {
                best == 2
            } else {
                best * 4 >= n * 3
            }
        }
    }
}

// =============================================================================
// Scoring
// =============================================================================

/// Tiered match score of a query against one name or title.
pub fn match_score(query: &str, candidate: &str) -> f64 {
    let normalized_query = normalize_name(query);
    let normalized_candidate = normalize_name(candidate);
    if normalized_query.is_empty() || normalized_candidate.is_empty() {
        return 0.0;
    }

    let mut score = if normalized_query == normalized_candidate {
        EXACT_MATCH
    } else if normalized_query.replace(' ', "") == normalized_candidate.replace(' ', "") {
        EXACT_IGNORING_SPACES
    } else if normalized_candidate.contains(&normalized_query) {
        NORMALIZED_CONTAINS
    } else if candidate
        .to_lowercase()
        .contains(&query.trim().to_lowercase())
    {
        RAW_CONTAINS
    } else {
        0.0
    };

    let words: Vec<String> = normalized_query
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let ratio = word_overlap(&words, &normalized_candidate);
    score += WORD_OVERLAP * ratio;
    if ratio < 1.0 {
        score -= PARTIAL_OVERLAP_PENALTY * (1.0 - ratio);
    }

    score
}

fn ratings_score(ratings: &Ratings) -> f64 {
    if ratings.votes == 0 {
        return 0.0;
    }
    let votes = (10.0 * (ratings.votes as f64 + 1.0).log10()).min(RATING_VOTES_CAP);
    let value = (ratings.value as f64 * RATING_VALUE_WEIGHT).min(RATING_VALUE_CAP);
    votes + value
}

fn image_score(count: usize) -> f64 {
    (IMAGE_WEIGHT * count as f64).min(IMAGE_CAP)
}

fn work_count_score(count: u32) -> f64 {
    count.min(WORK_COUNT_CAP) as f64 * WORK_COUNT_WEIGHT
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Score an author against a name query.
pub fn score_author(query: &str, author: &Author) -> f64 {
    let name_score = match_score(query, &author.name);
    let alias_score = author
        .aliases
        .iter()
        .map(|alias| match_score(query, alias) * ALIAS_SCALE)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut score = if alias_score > name_score {
        alias_score
    } else {
        name_score
    };

    score += work_count_score(author.work_count);
    score += ratings_score(&author.ratings);
    if has_text(&author.birth_date) {
        score += LIFE_DATE_BONUS;
    }
    if has_text(&author.death_date) {
        score += LIFE_DATE_BONUS;
    }
    if has_text(&author.overview) {
        score += OVERVIEW_BONUS;
    }
    score += image_score(author.images.len());

    if author.work_count < SPARSE_WORKS_THRESHOLD {
        score -= SPARSE_WORKS_PENALTY;
    }

    score
}

/// Score a book against a title query.
pub fn score_book(query: &str, book: &Book) -> f64 {
    let mut score = match_score(query, &book.title);

    score += work_count_score(book.edition_count);
    score += ratings_score(&book.ratings);
    if has_text(&book.overview) {
        score += OVERVIEW_BONUS;
    }
    score += image_score(book.images.len());

    score
}

pub fn score_entity(query: &str, entity: &SearchEntity) -> f64 {
    match entity {
        SearchEntity::Author(author) => score_author(query, author),
        SearchEntity::Book(book) => score_book(query, book),
    }
}

/// Sort by descending score. Equal scores keep their input order.
pub fn rank_by<T>(items: Vec<T>, score: impl Fn(&T) -> f64) -> Vec<T> {
    let mut scored: Vec<(f64, T)> = items.into_iter().map(|item| (score(&item), item)).collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, item)| item).collect()
}

/// Gate then rank author search results.
pub fn filter_and_rank_authors(query: &str, authors: Vec<Author>) -> Vec<Author> {
    let kept: Vec<Author> = authors
        .into_iter()
        .filter(|author| passes_gate(query, author))
        .collect();
    rank_by(kept, |author| score_author(query, author))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn names(authors: &[Author]) -> Vec<&str> {
        authors.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("J.K.  Rowling,"), "jk rowling");
        assert_eq!(normalize_name("  Le Guin, Ursula K. "), "le guin ursula k");
    }

    #[test]
    fn test_gate_three_word_query() {
        let candidates = vec![
            fixtures::author("1", "J.K. Rowling"),
            fixtures::author("2", "Jane Doe"),
            fixtures::author("3", "Robert Rowling"),
        ];

        let kept: Vec<Author> = candidates
            .into_iter()
            .filter(|a| passes_gate("J. K. Rowling", a))
            .collect();
        assert_eq!(names(&kept), vec!["J.K. Rowling"]);
    }

    #[test]
    fn test_gate_single_word_checks_name_only() {
        let mut pseudonym = fixtures::author("1", "Stephen King");
        pseudonym.aliases = vec!["Richard Bachman".to_string()];

        assert!(passes_gate("tolkien", &fixtures::author("2", "J.R.R. Tolkien")));
        assert!(!passes_gate("tolkien", &fixtures::author("3", "Christopher Paolini")));
        assert!(!passes_gate("bachman", &pseudonym));
    }

    #[test]
    fn test_gate_two_words_accepts_alias() {
        let mut author = fixtures::author("1", "Sir Terence Pratchett");
        author.aliases = vec!["Terry Pratchett".to_string()];

        assert!(passes_gate("Terry Pratchett", &author));
        assert!(!passes_gate("Terry Goodkind", &author));
    }

    #[test]
    fn test_gate_requires_three_quarters() {
        let le_guin = fixtures::author("1", "Ursula K. Le Guin");
        let williams = fixtures::author("2", "Ursula Moray Williams");

        assert!(passes_gate("ursula kroeber le guin", &le_guin));
        assert!(!passes_gate("ursula kroeber le guin", &williams));
    }

    #[test]
    fn test_match_tiers() {
        assert_eq!(match_score("le guin", "Le Guin"), EXACT_MATCH + WORD_OVERLAP);
        assert_eq!(
            match_score("J. K. Rowling", "J.K. Rowling"),
            EXACT_IGNORING_SPACES + WORD_OVERLAP
        );
        assert_eq!(
            match_score("le guin", "Ursula K. Le Guin"),
            NORMALIZED_CONTAINS + WORD_OVERLAP
        );
        // Half the words match: +150 overlap, -100 penalty.
        assert_eq!(match_score("ursula butler", "Ursula K. Le Guin"), 50.0);
    }

    #[test]
    fn test_exact_name_outranks_partial() {
        let results = vec![
            fixtures::author("1", "Ursula K. Le Guin"),
            fixtures::author("2", "Le Guin"),
        ];
        let ranked = filter_and_rank_authors("Le Guin", results);
        assert_eq!(names(&ranked), vec!["Le Guin", "Ursula K. Le Guin"]);
    }

    #[test]
    fn test_sparse_works_sink() {
        let mut sparse = fixtures::author("1", "Stephen King");
        sparse.work_count = 2;
        let prolific = fixtures::detailed_author("2", "Stephen King", 60);

        let ranked = filter_and_rank_authors("Stephen King", vec![sparse, prolific]);
        assert_eq!(ranked[0].foreign_id, "2");
        let gap = score_author("Stephen King", &ranked[0]) - score_author("Stephen King", &ranked[1]);
        assert!(gap > SPARSE_WORKS_PENALTY);
    }

    #[test]
    fn test_alias_scaled_below_exact_name() {
        let mut king = fixtures::author("1", "Stephen King");
        king.aliases = vec!["Richard Bachman".to_string()];
        let bachman = fixtures::author("2", "Richard Bachman");

        let alias_score = score_author("Richard Bachman", &king);
        let name_score = score_author("Richard Bachman", &bachman);
        assert!(alias_score > 0.0);
        assert!(alias_score < name_score);
    }

    #[test]
    fn test_popularity_signals_are_capped() {
        let base = fixtures::author("1", "Octavia Butler");
        let mut famous = base.clone();
        famous.work_count = 10_000;
        famous.ratings = Ratings {
            votes: u32::MAX,
            value: 5.0,
        };
        famous.images = vec!["x".to_string(); 50];

        let gain = score_author("Octavia Butler", &famous) - score_author("Octavia Butler", &base);
        // +40 works, +30 votes, +20 rating value, +10 images
        assert!(gain <= 100.0);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let results = vec![
            fixtures::author("1", "Anne Rice"),
            fixtures::author("2", "Anne Rice"),
            fixtures::author("3", "Anne Rice"),
        ];
        let ranked = rank_by(results, |a| score_author("Anne Rice", a));
        let ids: Vec<_> = ranked.iter().map(|a| a.foreign_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_book_scoring_uses_title() {
        let dune = fixtures::book("1", "Dune", "OL1A");
        let messiah = fixtures::book("2", "Dune Messiah", "OL1A");
        let ranked = rank_by(vec![messiah, dune], |b| score_book("dune", b));
        assert_eq!(ranked[0].title, "Dune");
    }
}

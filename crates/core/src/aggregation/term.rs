//! Parsing of free-form interactive search terms.

/// What an interactive search term asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    Isbn(String),
    Asin(String),
    /// Author lookup by foreign id.
    AuthorId(String),
    /// Book (work) lookup by foreign id.
    BookId(String),
    /// Name or title text.
    Text(String),
}

const PREFIXES: &[(&str, fn(String) -> SearchTerm)] = &[
    ("isbn:", SearchTerm::Isbn),
    ("asin:", SearchTerm::Asin),
    ("author:", SearchTerm::AuthorId),
    ("work:", SearchTerm::BookId),
    ("book:", SearchTerm::BookId),
];

/// Classify a search term.
///
/// Recognizes `isbn:`, `asin:`, `author:`, `work:` and `book:` prefixes (case
/// insensitive) and bare ISBN-10 / ISBN-13 strings. Anything else is text.
pub fn parse_search_term(term: &str) -> SearchTerm {
    let term = term.trim();

    for (prefix, build) in PREFIXES {
        let matches = term
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            let value = term[prefix.len()..].trim();
            if !value.is_empty() {
                return build(value.to_string());
            }
        }
    }

    if looks_like_isbn(term) {
        return SearchTerm::Isbn(term.to_string());
    }

    SearchTerm::Text(term.to_string())
}

/// Whether a string has the shape of an ISBN-10 or ISBN-13, ignoring hyphens and spaces.
pub fn looks_like_isbn(value: &str) -> bool {
    let compact: Vec<char> = value
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();

    match compact.len() {
        13 => compact.iter().all(|c| c.is_ascii_digit()),
        10 => {
            compact[..9].iter().all(|c| c.is_ascii_digit())
                && (compact[9].is_ascii_digit() || compact[9] == 'X' || compact[9] == 'x')
        }
        _ => false,
    }
}

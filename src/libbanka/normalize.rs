use regex::Regex;
use std::sync::LazyLock;

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

fn fold_turkish(c: char) -> char {
    match c {
        'ı' | 'İ' | 'î' | 'Î' => 'i',
        'ş' | 'Ş' => 's',
        'ç' | 'Ç' => 'c',
        'ğ' | 'Ğ' => 'g',
        'ö' | 'Ö' => 'o',
        'ü' | 'Ü' | 'û' | 'Û' => 'u',
        'â' | 'Â' => 'a',
        other => other,
    }
}

/// Matching key for question text: case, punctuation, Turkish diacritics and
/// whitespace runs are all ignored. Empty input gives an empty key.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(fold_turkish)
        .flat_map(char::to_lowercase)
        .collect();
    PUNCTUATION
        .replace_all(&folded, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-cases with the Turkish dotted/dotless `i` rules, leaving other letters as they are.
pub fn lowercase_tr(text: &str) -> String {
    text.chars()
        .flat_map(|c| match c {
            'İ' => 'i'.to_lowercase(),
            'I' => 'ı'.to_lowercase(),
            other => other.to_lowercase(),
        })
        .collect()
}

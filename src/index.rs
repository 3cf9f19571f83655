//! Lexical token index over course text.
//!
//! Built once at startup from every course's name and description. Each
//! word is registered under two independent normalizations:
//!
//! - a **stem** (Snowball English stemmer, uppercased), and
//! - a **phonetic code** (American Soundex of the stem, not truncated).
//!
//! A query word matches a course when either its stem or its phonetic
//! code was registered for that course. Lookups for unknown words yield
//! an empty set.

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::models::Course;

/// Common English words that carry no search meaning.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "etc",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "may", "me", "more", "most", "my", "myself", "no", "nor", "not", "of",
    "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own",
    "same", "she", "should", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "upon", "very", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "whom", "why", "will", "with", "within", "would", "you", "your",
    "yours", "yourself", "yourselves",
];

/// Splits text into words on every non-alphanumeric character.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

pub fn is_stop_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
}

/// American Soundex without the usual four-character truncation.
///
/// Returns `None` when the word does not start with an ASCII letter.
/// Codes shorter than four characters are zero-padded.
pub fn soundex(word: &str) -> Option<String> {
    let mut letters = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase());
    let first = word.chars().next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    let first = letters.next()?;

    let mut code = String::with_capacity(8);
    code.push(first);
    let mut last = soundex_digit(first);
    for c in letters {
        // H and W neither emit a digit nor separate equal digits.
        if c == 'H' || c == 'W' {
            continue;
        }
        let digit = soundex_digit(c);
        if let Some(d) = digit {
            if digit != last {
                code.push(d);
            }
        }
        last = digit;
    }
    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

/// The two index keys derived from a single word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenForms {
    pub stem: String,
    pub phonetic: Option<String>,
}

/// Read-only mapping from stem / phonetic code to course keys.
pub struct TokenIndex {
    stemmer: Stemmer,
    stems: HashMap<String, HashSet<String>>,
    phonetics: HashMap<String, HashSet<String>>,
}

impl TokenIndex {
    /// Builds the index from every course's name and description.
    pub fn build(courses: &[Course]) -> Self {
        let mut index = Self {
            stemmer: Stemmer::create(Algorithm::English),
            stems: HashMap::new(),
            phonetics: HashMap::new(),
        };

        for course in courses {
            let key = course.key();
            let text = format!("{} {}", course.name, course.description);
            for word in words(&text) {
                let Some(forms) = index.forms(word) else {
                    continue;
                };
                index
                    .stems
                    .entry(forms.stem)
                    .or_default()
                    .insert(key.clone());
                if let Some(phonetic) = forms.phonetic {
                    index
                        .phonetics
                        .entry(phonetic)
                        .or_default()
                        .insert(key.clone());
                }
            }
        }

        index
    }

    /// Normalizes a single word into its stem and phonetic forms.
    ///
    /// Returns `None` for stop words and words that stem to nothing.
    pub fn forms(&self, word: &str) -> Option<TokenForms> {
        if word.is_empty() || is_stop_word(word) {
            return None;
        }
        let stem = self.stemmer.stem(&word.to_lowercase()).to_uppercase();
        if stem.is_empty() {
            return None;
        }
        let phonetic = soundex(&stem);
        Some(TokenForms { stem, phonetic })
    }

    /// Course keys matching `word` through either channel.
    pub fn lookup(&self, word: &str) -> HashSet<&str> {
        self.forms(word)
            .map(|forms| self.lookup_forms(&forms))
            .unwrap_or_default()
    }

    /// Course keys whose text shares the stem or the phonetic code.
    pub fn lookup_forms(&self, forms: &TokenForms) -> HashSet<&str> {
        let mut matched = HashSet::new();
        if let Some(keys) = self.stems.get(&forms.stem) {
            matched.extend(keys.iter().map(String::as_str));
        }
        if let Some(keys) = forms
            .phonetic
            .as_ref()
            .and_then(|p| self.phonetics.get(p))
        {
            matched.extend(keys.iter().map(String::as_str));
        }
        matched
    }

    pub fn stem_count(&self) -> usize {
        self.stems.len()
    }

    pub fn phonetic_count(&self) -> usize {
        self.phonetics.len()
    }
}

impl fmt::Debug for TokenIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIndex")
            .field("stems", &self.stems.len())
            .field("phonetics", &self.phonetics.len())
            .finish()
    }
}

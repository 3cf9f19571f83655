//! The course query engine.
//!
//! Evaluation is a strictly ordered reduction over the stored dataset:
//!
//! ```text
//! sources ──▶ normalize + merge ──▶ sort keys by priority ──▶ fold steps ──▶ shape
//! ```
//!
//! Each step takes the current working list and returns a new one. The
//! working list only borrows records from the [`CourseStore`], so the
//! backing dataset is never reordered or modified, and concurrent queries
//! need no coordination.
//!
//! # Step semantics
//!
//! | Param | Behaviour |
//! |-------|-----------|
//! | `subject`/`code`/`units` | case-insensitive prefix match, OR across values |
//! | `isLab` | name contains the word `Lab`, or code ends in `L`/`C` |
//! | `keywords` | AND across words, each matched via stem or phonetic index |
//! | `sortBy` | stable ascending sort by property |
//! | `reverseOrder` | reverse the working list |
//! | `skip` / `limit` | pagination |
//! | `excludes` | drop properties from the shaped records |

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::index::{words, TokenIndex};
use crate::models::{Course, CourseProperty, PartialCourse, ResultShape};
use crate::params::{normalize_all, Param, ParamValue, RawParams, ValidatedParams};
use crate::store::CourseStore;

/// Default cap on the number of words in `keywords`.
pub const DEFAULT_MAX_KEYWORDS: usize = 5;

/// Evaluates parameter sets against a shared dataset and token index.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<CourseStore>,
    index: Arc<TokenIndex>,
    max_keywords: usize,
}

/// Working state threaded through the fold.
struct Working<'a> {
    courses: Vec<&'a Course>,
    excluded: Vec<CourseProperty>,
}

impl QueryEngine {
    pub fn new(store: Arc<CourseStore>, index: Arc<TokenIndex>) -> Self {
        Self {
            store,
            index,
            max_keywords: DEFAULT_MAX_KEYWORDS,
        }
    }

    /// Builds the token index for `store` and wraps both.
    pub fn from_store(store: CourseStore) -> Self {
        let index = TokenIndex::build(store.all());
        Self::new(Arc::new(store), Arc::new(index))
    }

    pub fn with_max_keywords(mut self, max_keywords: usize) -> Self {
        self.max_keywords = max_keywords;
        self
    }

    pub fn store(&self) -> &CourseStore {
        &self.store
    }

    pub fn index(&self) -> &TokenIndex {
        &self.index
    }

    /// Normalizes and merges every source, then evaluates the result.
    pub fn query_by(&self, sources: &[RawParams]) -> QueryResult<ResultShape> {
        let params = normalize_all(sources)?;
        self.evaluate(&params)
    }

    /// Folds the validated parameters over the dataset in priority order.
    pub fn evaluate(&self, params: &ValidatedParams) -> QueryResult<ResultShape> {
        let mut working = Working {
            courses: self.store.all().iter().collect(),
            excluded: Vec::new(),
        };

        for (param, value) in params.by_priority() {
            working = self.apply(param, value, working)?;
        }

        let total = working.courses.len();
        let results = working
            .courses
            .into_iter()
            .map(|course| PartialCourse::from_course(course, &working.excluded))
            .collect();

        Ok(ResultShape { total, results })
    }

    fn apply<'a>(
        &self,
        param: Param,
        value: &ParamValue,
        working: Working<'a>,
    ) -> QueryResult<Working<'a>> {
        let Working { courses, excluded } = working;
        let courses = match (param, value) {
            (_, ParamValue::Prefixes(prefixes)) => match param.property() {
                Some(property) => filter_prefixes(&courses, property, prefixes),
                None => return Err(mismatch(param)),
            },
            (Param::IsLab, ParamValue::Flag) => filter_labs(&courses),
            (Param::Keywords, ParamValue::Keywords(text)) => {
                self.filter_keywords(&courses, text)?
            }
            (Param::SortBy, ParamValue::SortBy(property)) => {
                sort_by_property(&courses, *property)
            }
            (Param::ReverseOrder, ParamValue::Flag) => courses.iter().rev().copied().collect(),
            (Param::Skip, ParamValue::Count(n)) => courses.iter().skip(*n).copied().collect(),
            (Param::Limit, ParamValue::Count(n)) => courses.iter().take(*n).copied().collect(),
            (Param::Excludes, ParamValue::Excludes(names)) => {
                return Ok(Working {
                    courses,
                    excluded: resolve_excludes(names),
                })
            }
            _ => return Err(mismatch(param)),
        };
        Ok(Working { courses, excluded })
    }

    /// Keeps courses matching every meaningful keyword.
    fn filter_keywords<'a>(
        &self,
        courses: &[&'a Course],
        text: &str,
    ) -> QueryResult<Vec<&'a Course>> {
        let tokens: Vec<&str> = words(text).collect();
        if tokens.len() > self.max_keywords {
            return Err(QueryError::validation(format!(
                "Number of keywords exceeds limit of {}.",
                self.max_keywords
            )));
        }

        let mut matched: Option<HashSet<&str>> = None;
        for token in tokens {
            let Some(forms) = self.index.forms(token) else {
                continue;
            };
            let keys = self.index.lookup_forms(&forms);
            matched = Some(match matched {
                None => keys,
                Some(acc) => acc.intersection(&keys).copied().collect(),
            });
        }

        // Keywords made only of stop words (or no words at all) match nothing.
        let Some(matched) = matched else {
            return Ok(Vec::new());
        };
        Ok(courses
            .iter()
            .filter(|course| matched.contains(course.key().as_str()))
            .copied()
            .collect())
    }
}

fn mismatch(param: Param) -> QueryError {
    QueryError::Internal(anyhow::anyhow!(
        "parameter {} carried a value of the wrong shape",
        param.name()
    ))
}

/// OR across prefixes; each course appears at most once, in working order.
fn filter_prefixes<'a>(
    courses: &[&'a Course],
    property: CourseProperty,
    prefixes: &[String],
) -> Vec<&'a Course> {
    courses
        .iter()
        .filter(|course| {
            let field = course.get(property).to_uppercase();
            prefixes.iter().any(|prefix| field.starts_with(prefix.as_str()))
        })
        .copied()
        .collect()
}

fn filter_labs<'a>(courses: &[&'a Course]) -> Vec<&'a Course> {
    courses
        .iter()
        .filter(|course| {
            let lab_section = matches!(course.code.chars().last(), Some('L') | Some('C'));
            lab_section || words(&course.name).any(|w| w == "Lab")
        })
        .copied()
        .collect()
}

fn sort_by_property<'a>(courses: &[&'a Course], property: CourseProperty) -> Vec<&'a Course> {
    let mut sorted = courses.to_vec();
    sorted.sort_by(|a, b| locale_cmp(a.get(property), b.get(property)));
    sorted
}

/// Case-insensitive ordering with an ordinal tiebreak, so the result is a
/// total order.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn resolve_excludes(names: &[String]) -> Vec<CourseProperty> {
    if names.iter().any(|n| n == "*") {
        return CourseProperty::ALL.to_vec();
    }
    names
        .iter()
        .filter_map(|n| CourseProperty::from_name(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = include_str!("../data/course-data.json");

    fn engine() -> QueryEngine {
        QueryEngine::from_store(CourseStore::from_json(DATA).unwrap())
    }

    fn query(engine: &QueryEngine, pairs: &[(&str, &str)]) -> QueryResult<ResultShape> {
        let mut raw = RawParams::new();
        for (k, v) in pairs {
            raw.push(*k, *v);
        }
        engine.query_by(&[raw])
    }

    fn keys(shape: &ResultShape) -> Vec<String> {
        shape
            .results
            .iter()
            .map(|c| {
                format!(
                    "{}{}",
                    c.subject.as_deref().unwrap_or(""),
                    c.code.as_deref().unwrap_or("")
                )
            })
            .collect()
    }

    fn all_keys(engine: &QueryEngine) -> Vec<String> {
        engine.store().all().iter().map(|c| c.key()).collect()
    }

    #[test]
    fn test_empty_query_returns_whole_dataset_in_order() {
        let engine = engine();
        let shape = query(&engine, &[]).unwrap();
        assert_eq!(shape.total, engine.store().len());
        assert_eq!(keys(&shape), all_keys(&engine));
    }

    #[test]
    fn test_subject_prefix_case_insensitive() {
        let engine = engine();
        let shape = query(&engine, &[("subject", "cop")]).unwrap();
        assert!(shape.total > 0);
        for c in &shape.results {
            assert!(c.subject.as_deref().unwrap().starts_with("COP"));
        }
        let expected = engine
            .store()
            .all()
            .iter()
            .filter(|c| c.subject.starts_with("COP"))
            .count();
        assert_eq!(shape.total, expected);
    }

    #[test]
    fn test_single_letter_subject_prefix() {
        let engine = engine();
        let shape = query(&engine, &[("subject", "C")]).unwrap();
        assert!(shape.total > 0);
        assert!(shape
            .results
            .iter()
            .all(|c| c.subject.as_deref().unwrap().starts_with('C')));
    }

    #[test]
    fn test_multi_value_subject_has_no_duplicates() {
        let engine = engine();
        let shape = query(
            &engine,
            &[("subject", "COP"), ("subject", "C"), ("subject", "AST"), ("subject", "A")],
        )
        .unwrap();
        let k = keys(&shape);
        let unique: HashSet<&String> = k.iter().collect();
        assert_eq!(unique.len(), k.len());
        let expected = engine
            .store()
            .all()
            .iter()
            .filter(|c| c.subject.starts_with('C') || c.subject.starts_with('A'))
            .count();
        assert_eq!(shape.total, expected);
    }

    #[test]
    fn test_different_keys_compose_as_and() {
        let engine = engine();
        let shape = query(
            &engine,
            &[("subject", "ch"), ("units", "1.00"), ("isLab", ""), ("code", "10")],
        )
        .unwrap();
        assert!(shape.total > 0);
        for c in &shape.results {
            assert!(c.subject.as_deref().unwrap().starts_with("CH"));
            assert!(c.units.as_deref().unwrap().starts_with("1.00"));
            assert!(c.code.as_deref().unwrap().starts_with("10"));
        }
    }

    #[test]
    fn test_multiple_multi_value_keys() {
        let engine = engine();
        let shape = query(
            &engine,
            &[
                ("subject", "COP"),
                ("subject", "AST"),
                ("units", "1"),
                ("units", "3"),
                ("code", "2"),
                ("code", "3"),
            ],
        )
        .unwrap();
        assert!(shape.total > 0);
        for c in &shape.results {
            let subject = c.subject.as_deref().unwrap();
            let code = c.code.as_deref().unwrap();
            let units = c.units.as_deref().unwrap();
            assert!(subject.starts_with("COP") || subject.starts_with("AST"));
            assert!(code.starts_with('2') || code.starts_with('3'));
            assert!(units.starts_with('1') || units.starts_with('3'));
        }
    }

    #[test]
    fn test_is_lab() {
        let engine = engine();
        let shape = query(&engine, &[("isLab", "")]).unwrap();
        assert!(shape.total > 0);
        for c in &shape.results {
            let code = c.code.as_deref().unwrap();
            let name = c.name.as_deref().unwrap();
            let lab_section = code.ends_with('L') || code.ends_with('C');
            assert!(lab_section || words(name).any(|w| w == "Lab"), "{} {}", code, name);
        }
        let k = keys(&shape);
        assert!(k.contains(&"ART1300C".to_string()));
        assert!(k.contains(&"EEL3110L".to_string()));
        assert!(!k.contains(&"CHM1045".to_string()));
    }

    #[test]
    fn test_keyword_variants_match_identically() {
        let engine = engine();
        let a = query(&engine, &[("keywords", "distribution")]).unwrap();
        let b = query(&engine, &[("keywords", "distributed")]).unwrap();
        let c = query(&engine, &[("keywords", "distribute")]).unwrap();
        assert!(a.total > 0);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_multiple_keywords_are_anded() {
        let engine = engine();
        let shape = query(&engine, &[("keywords", "electricity magnets theory")]).unwrap();
        assert_eq!(keys(&shape), vec!["PHY2049"]);
    }

    #[test]
    fn test_misspelled_keyword_matches_like_correct_spelling() {
        let engine = engine();
        let correct = query(&engine, &[("keywords", "programming")]).unwrap();
        let misspelled = query(&engine, &[("keywords", "progrmming")]).unwrap();
        assert!(correct.total > 0);
        assert!(keys(&correct).contains(&"COP2210".to_string()));
        assert_eq!(misspelled, correct);
    }

    #[test]
    fn test_keyword_missing_both_channels_matches_nothing() {
        let engine = engine();
        let shape = query(&engine, &[("keywords", "electrisity")]).unwrap();
        assert_eq!(shape.total, 0);
    }

    #[test]
    fn test_keyword_limit() {
        let engine = engine();
        let err = query(&engine, &[("keywords", "a b c d e f")]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("exceeds limit of 5"));
        assert!(query(&engine, &[("keywords", "a b c d e")]).is_ok());
    }

    #[test]
    fn test_keyword_limit_configurable() {
        let engine = engine().with_max_keywords(2);
        assert!(query(&engine, &[("keywords", "data mining")]).is_ok());
        assert!(query(&engine, &[("keywords", "data mining rules")]).is_err());
    }

    #[test]
    fn test_unknown_keyword_returns_nothing() {
        let engine = engine();
        assert_eq!(query(&engine, &[("keywords", "😋")]).unwrap().total, 0);
        assert_eq!(query(&engine, &[("keywords", "zzyzx")]).unwrap().total, 0);
        assert_eq!(query(&engine, &[("keywords", "the and")]).unwrap().total, 0);
    }

    #[test]
    fn test_excludes_single_property() {
        let engine = engine();
        let shape = query(&engine, &[("excludes", "description")]).unwrap();
        assert_eq!(shape.total, engine.store().len());
        for c in &shape.results {
            let fields: Vec<CourseProperty> = c.fields().map(|(p, _)| p).collect();
            assert_eq!(
                fields,
                vec![
                    CourseProperty::Subject,
                    CourseProperty::Code,
                    CourseProperty::Name,
                    CourseProperty::Units
                ]
            );
        }
    }

    #[test]
    fn test_excludes_multiple_properties() {
        let engine = engine();
        let shape = query(&engine, &[("excludes", "description units name")]).unwrap();
        for c in &shape.results {
            let fields: Vec<CourseProperty> = c.fields().map(|(p, _)| p).collect();
            assert_eq!(fields, vec![CourseProperty::Subject, CourseProperty::Code]);
        }
    }

    #[test]
    fn test_excludes_star_keeps_total() {
        let engine = engine();
        let shape = query(&engine, &[("subject", "COP"), ("excludes", "*")]).unwrap();
        let cop = query(&engine, &[("subject", "COP")]).unwrap();
        assert_eq!(shape.total, cop.total);
        assert_eq!(shape.results.len(), cop.total);
        assert!(shape.results.iter().all(PartialCourse::is_empty));
    }

    #[test]
    fn test_excludes_unknown_names_ignored() {
        let engine = engine();
        let shape = query(&engine, &[("excludes", "color")]).unwrap();
        assert!(shape.results.iter().all(|c| c.fields().count() == 5));
    }

    #[test]
    fn test_excludes_does_not_affect_earlier_filters() {
        let engine = engine();
        let shape = query(&engine, &[("excludes", "subject"), ("subject", "AST")]).unwrap();
        assert_eq!(shape.total, 3);
        assert!(shape.results.iter().all(|c| c.subject.is_none()));
    }

    #[test]
    fn test_limit() {
        let engine = engine();
        let shape = query(&engine, &[("limit", "10")]).unwrap();
        assert_eq!(shape.total, 10);
        assert_eq!(keys(&shape), all_keys(&engine)[..10].to_vec());
        assert_eq!(query(&engine, &[("limit", "0")]).unwrap().total, 0);
        assert!(query(&engine, &[("limit", "-5")]).unwrap_err().is_validation());
    }

    #[test]
    fn test_skip_past_end_is_empty() {
        let engine = engine();
        let shape = query(&engine, &[("skip", "1000")]).unwrap();
        assert_eq!(shape.total, 0);
        assert!(shape.results.is_empty());
    }

    #[test]
    fn test_pagination_reconstructs_dataset() {
        let engine = engine();
        let everything = keys(&query(&engine, &[]).unwrap());
        for limit in [1usize, 3, 7, 40, 100] {
            let mut pages = Vec::new();
            let mut skip = 0;
            while skip < everything.len() {
                let page = query(
                    &engine,
                    &[
                        ("skip", skip.to_string().as_str()),
                        ("limit", limit.to_string().as_str()),
                    ],
                )
                .unwrap();
                assert!(page.total <= limit);
                pages.extend(keys(&page));
                skip += limit;
            }
            assert_eq!(pages, everything, "limit {}", limit);
        }
    }

    #[test]
    fn test_sort_by_name_ascending_and_reversed() {
        let engine = engine();
        let shape = query(&engine, &[("sortBy", "name")]).unwrap();
        assert_eq!(shape.total, engine.store().len());
        let names: Vec<&str> = shape.results.iter().map(|c| c.name.as_deref().unwrap()).collect();
        for pair in names.windows(2) {
            assert_ne!(locale_cmp(pair[0], pair[1]), Ordering::Greater);
        }

        let reversed = query(&engine, &[("sortBy", "NAME"), ("reverseOrder", "")]).unwrap();
        let names: Vec<&str> = reversed
            .results
            .iter()
            .map(|c| c.name.as_deref().unwrap())
            .collect();
        for pair in names.windows(2) {
            assert_ne!(locale_cmp(pair[0], pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn test_sort_is_stable() {
        let engine = engine();
        let shape = query(&engine, &[("sortBy", "units")]).unwrap();
        let three: Vec<String> = keys(&shape)
            .into_iter()
            .zip(shape.results.iter())
            .filter(|(_, c)| c.units.as_deref() == Some("3.00"))
            .map(|(k, _)| k)
            .collect();
        let expected: Vec<String> = engine
            .store()
            .all()
            .iter()
            .filter(|c| c.units == "3.00")
            .map(|c| c.key())
            .collect();
        assert_eq!(three, expected);
    }

    #[test]
    fn test_sort_then_paginate() {
        let engine = engine();
        let sorted = keys(&query(&engine, &[("sortBy", "name")]).unwrap());
        let page = query(&engine, &[("limit", "5"), ("skip", "5"), ("sortBy", "name")]).unwrap();
        assert_eq!(keys(&page), sorted[5..10].to_vec());
    }

    #[test]
    fn test_reverse_without_sort() {
        let engine = engine();
        let mut expected = all_keys(&engine);
        expected.reverse();
        let shape = query(&engine, &[("reverseOrder", "")]).unwrap();
        assert_eq!(keys(&shape), expected);
    }

    #[test]
    fn test_unknown_parameter() {
        let engine = engine();
        let err = query(&engine, &[("foo", "bar")]).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_exact_course_lookup() {
        let engine = engine();
        let shape = query(&engine, &[("subject", "COP"), ("code", "2210")]).unwrap();
        assert_eq!(shape.total, 1);
        let course = &shape.results[0];
        assert_eq!(course.name.as_deref(), Some("Programming I"));
        assert_eq!(course.fields().count(), 5);
    }

    #[test]
    fn test_multiple_sources_merge() {
        let engine = engine();
        let query_string = RawParams::new().with("subject", "COP");
        let body = RawParams::new().with("subject", "CAP").with("limit", "100");
        let shape = engine.query_by(&[query_string, body]).unwrap();
        assert!(shape
            .results
            .iter()
            .all(|c| matches!(c.subject.as_deref(), Some("COP") | Some("CAP"))));
        assert!(shape.results.iter().any(|c| c.subject.as_deref() == Some("CAP")));
    }

    #[test]
    fn test_queries_never_mutate_store() {
        let engine = engine();
        let before = all_keys(&engine);
        for _ in 0..3 {
            query(&engine, &[("sortBy", "description"), ("reverseOrder", "")]).unwrap();
            query(&engine, &[("subject", "PHY"), ("excludes", "*")]).unwrap();
        }
        assert_eq!(all_keys(&engine), before);
        assert_eq!(keys(&query(&engine, &[]).unwrap()), before);
    }

    #[test]
    fn test_repeated_queries_are_reproducible() {
        let engine = engine();
        let pairs = [("keywords", "data"), ("sortBy", "name"), ("limit", "4")];
        assert_eq!(query(&engine, &pairs).unwrap(), query(&engine, &pairs).unwrap());
    }
}

//! Star patterns.
//!
//! User-facing filters (URLs, titles, mimetypes) are written in a tiny glob
//! dialect: `*` matches any run of characters (including none) and `\`
//! makes the following character literal. Everything else is literal.
//!
//! A pattern has two compiled forms that must agree on every input:
//!
//! - a `LIKE` pattern for SQLite, used with `ESCAPE '\'` and bound as a
//!   statement parameter
//! - an anchored [`Regex`] for matching candidates in-process
//!
//! Connections run with `case_sensitive_like = ON`, so both forms are
//! case-sensitive.

use std::fmt;

use regex::Regex;

/// Wildcard token of SQLite's `LIKE`.
pub const LIKE_JOKER: &str = "%";

/// Escape character declared in every `LIKE ... ESCAPE` clause we emit.
pub const LIKE_ESCAPE: char = '\\';

/// Translate a star pattern, replacing every unescaped `*` with `joker` and
/// passing each literal run through `escape`.
///
/// Escapes are resolved before `escape` sees a run, so `a\*b` hands it the
/// three characters `a*b`. A trailing lone backslash is kept as a literal
/// backslash.
pub fn parse_star_pattern<F>(pattern: &str, joker: &str, escape: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut result = String::with_capacity(pattern.len() + pattern.len() / 2);
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => literal.push(chars.next().unwrap_or('\\')),
            '*' => {
                result.push_str(&escape(&literal));
                result.push_str(joker);
                literal.clear();
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        result.push_str(&escape(&literal));
    }

    result
}

/// Escape a literal for use inside a `LIKE ... ESCAPE '\'` pattern.
///
/// Neutralizes `%`, `_` and the escape character itself. Patterns are always
/// bound as parameters, so quote characters need no treatment.
pub fn escape_like(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Escape arbitrary text so it reads as a literal star pattern.
pub fn escape_star_pattern(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Resolve escapes without interpreting wildcards.
///
/// For a pattern with no unescaped `*` this is the only string it matches.
pub fn unescape_star_pattern(pattern: &str) -> String {
    parse_star_pattern(pattern, "*", |s| s.to_string())
}

/// Compile a star pattern into a `LIKE` pattern.
pub fn star_pattern_to_like(pattern: &str) -> String {
    parse_star_pattern(pattern, LIKE_JOKER, escape_like)
}

/// Compile a star pattern into an anchored regex.
///
/// `(?s)` lets the wildcard cross newlines, as `%` does.
pub fn star_pattern_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let parsed = parse_star_pattern(pattern, ".*", regex::escape);
    Regex::new(&format!(r"(?s)\A(?:{parsed})\z"))
}

/// A star pattern compiled to both of its forms.
#[derive(Debug, Clone)]
pub struct StarPattern {
    source: String,
    like: String,
    regex: Regex,
}

impl StarPattern {
    pub fn compile(pattern: impl Into<String>) -> Result<Self, regex::Error> {
        let source = pattern.into();
        let like = star_pattern_to_like(&source);
        let regex = star_pattern_to_regex(&source)?;
        Ok(Self {
            source,
            like,
            regex,
        })
    }

    /// The pattern as written by the caller.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The `LIKE` form, to be bound as a parameter.
    pub fn like(&self) -> &str {
        &self.like
    }

    /// Whether the pattern accepts every string (`*`, `**`, ...).
    pub fn matches_anything(&self) -> bool {
        !self.like.is_empty() && self.like.trim_start_matches(LIKE_JOKER).is_empty()
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

impl PartialEq for StarPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for StarPattern {}

impl fmt::Display for StarPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Reference implementation of SQLite's case-sensitive `LIKE` with
    /// `ESCAPE '\'`.
    fn like_matches(pattern: &str, candidate: &str) -> bool {
        fn go(p: &[char], s: &[char]) -> bool {
            match p.split_first() {
                None => s.is_empty(),
                Some(('%', rest)) => (0..=s.len()).any(|i| go(rest, &s[i..])),
                Some(('_', rest)) => !s.is_empty() && go(rest, &s[1..]),
                Some(('\\', rest)) if !rest.is_empty() => {
                    s.first() == Some(&rest[0]) && go(&rest[1..], &s[1..])
                }
                Some((c, rest)) => s.first() == Some(c) && go(rest, &s[1..]),
            }
        }
        let p: Vec<char> = pattern.chars().collect();
        let s: Vec<char> = candidate.chars().collect();
        go(&p, &s)
    }

    const PATTERNS: &[&str] = &[
        "",
        "*",
        "**",
        "file:///home/*",
        "*.txt",
        "*report*",
        "a*b*c",
        "100%",
        "snake_case",
        "it's",
        r"literal\*star",
        r"back\\slash*",
        r"trailing\",
        "ünï*cødé",
    ];

    const CANDIDATES: &[&str] = &[
        "",
        "a",
        "abc",
        "axxbyyc",
        "file:///home/user/notes.txt",
        "file:///etc/passwd",
        "annual report 2015.odt",
        "100%",
        "1000",
        "snake_case",
        "snakeXcase",
        "it's",
        "literal*star",
        "literalXstar",
        r"back\slash and more",
        r"trailing\",
        "ünïcødé",
        "ünï\ncødé",
        "REPORT",
    ];

    #[test]
    fn test_like_and_regex_forms_agree() {
        for pattern in PATTERNS {
            let compiled = StarPattern::compile(*pattern).unwrap();
            for candidate in CANDIDATES {
                assert_eq!(
                    compiled.is_match(candidate),
                    like_matches(compiled.like(), candidate),
                    "pattern {pattern:?} against {candidate:?} (like {:?})",
                    compiled.like()
                );
            }
        }
    }

    #[test]
    fn test_patterns_without_star_match_only_their_unescaped_text() {
        let has_wildcard = |p: &str| !parse_star_pattern(p, "*", |_| String::new()).is_empty();
        for pattern in PATTERNS.iter().filter(|p| !has_wildcard(p)) {
            let compiled = StarPattern::compile(*pattern).unwrap();
            let expected = unescape_star_pattern(pattern);
            for candidate in CANDIDATES {
                assert_eq!(compiled.is_match(candidate), *candidate == expected);
            }
            assert!(compiled.is_match(&expected));
        }
    }

    #[test]
    fn test_escaped_literal_never_acts_as_wildcard() {
        let literal = r"50%_off*\sale";
        let compiled = StarPattern::compile(escape_star_pattern(literal)).unwrap();

        assert_eq!(compiled.like(), r"50\%\_off*\\sale");
        assert!(compiled.is_match(literal));
        assert!(like_matches(compiled.like(), literal));
        for near_miss in [r"50%Xoff*\sale", r"50XX_off*\sale", r"50%_offANY\sale"] {
            assert!(!compiled.is_match(near_miss));
            assert!(!like_matches(compiled.like(), near_miss));
        }
    }

    #[test]
    fn test_translation() {
        assert_eq!(star_pattern_to_like("*"), "%");
        assert_eq!(star_pattern_to_like("/home/*"), "/home/%");
        assert_eq!(star_pattern_to_like("*_x%*"), r"%\_x\%%");
        assert_eq!(star_pattern_to_like(r"a\*b"), "a*b");
        assert_eq!(star_pattern_to_like(""), "");
        assert_eq!(unescape_star_pattern(r"a\*b\\c"), r"a*b\c");
    }

    #[test]
    fn test_empty_and_star() {
        let empty = StarPattern::compile("").unwrap();
        assert!(empty.is_match(""));
        assert!(!empty.is_match("x"));
        assert!(!empty.matches_anything());

        let star = StarPattern::compile("*").unwrap();
        assert!(star.matches_anything());
        assert!(star.is_match(""));
        assert!(star.is_match("anything\nat all"));

        assert!(StarPattern::compile("***").unwrap().matches_anything());
        assert!(!StarPattern::compile(r"*\**").unwrap().matches_anything());
        assert!(!StarPattern::compile("*a*").unwrap().matches_anything());
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let compiled = StarPattern::compile("*Report*").unwrap();
        assert!(compiled.is_match("Annual Report"));
        assert!(!compiled.is_match("annual report"));
    }
}

//! `.dockerignore` parsing and matching.
//!
//! A path is excluded when the last pattern matching it, or one of its parent
//! directories, is not an exception (`!pattern`).

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Result};
use regex::Regex;

pub const DOCKERIGNORE: &str = ".dockerignore";

pub struct IgnorePattern {
    raw: String,
    exclusion: bool,
    regex: Regex,
}

impl IgnorePattern {
    pub fn new(pattern: &str) -> Result<IgnorePattern> {
        let (exclusion, body) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        if body.is_empty() {
            return Err(anyhow!("illegal exclusion pattern: \"{}\"", pattern));
        }
        let regex = Regex::new(&pattern_to_regex(body))
            .map_err(|err| anyhow!("invalid .dockerignore pattern \"{}\": {}", pattern, err))?;
        Ok(IgnorePattern {
            raw: body.to_string(),
            exclusion,
            regex,
        })
    }

    pub fn is_exclusion(&self) -> bool {
        self.exclusion
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

impl std::fmt::Debug for IgnorePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exclusion {
            write!(f, "!{}", self.raw)
        } else {
            f.write_str(&self.raw)
        }
    }
}

#[derive(Debug, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<IgnoreMatcher> {
        let patterns = patterns
            .iter()
            .map(|pattern| IgnorePattern::new(pattern.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(IgnoreMatcher { patterns })
    }

    /// Reads `<context>/.dockerignore`; a missing file yields an empty matcher.
    pub fn from_context(context_dir: &Path) -> Result<IgnoreMatcher> {
        let path = context_dir.join(DOCKERIGNORE);
        if !path.is_file() {
            return Ok(IgnoreMatcher::default());
        }
        let patterns = read_patterns(File::open(&path)?)?;
        Self::new(&patterns)
    }

    pub fn push(&mut self, pattern: &str) -> Result<()> {
        self.patterns.push(IgnorePattern::new(pattern)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn has_exclusions(&self) -> bool {
        self.patterns.iter().any(IgnorePattern::is_exclusion)
    }

    /// `path` is relative to the context root and slash separated.
    pub fn is_ignored(&self, path: &str) -> bool {
        let parents: Vec<&str> = path.split('/').collect();
        let mut ignored = false;
        for pattern in &self.patterns {
            let mut matched = pattern.matches(path);
            if !matched && parents.len() > 1 {
                for end in 1..parents.len() {
                    if pattern.matches(&parents[..end].join("/")) {
                        matched = true;
                        break;
                    }
                }
            }
            if matched {
                ignored = !pattern.exclusion;
            }
        }
        ignored
    }
}

/// Reads patterns: `#` comments and blank lines are skipped, paths are cleaned
/// and made relative to the context root.
pub fn read_patterns<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut patterns = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (invert, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let mut body = if body.is_empty() { String::new() } else { clean_path(body) };
        if body.len() > 1 && body.starts_with('/') {
            body.remove(0);
        }
        patterns.push(if invert { format!("!{}", body) } else { body });
    }
    Ok(patterns)
}

/// Lexical path cleaning: drops `.` and empty segments and resolves `..`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn pattern_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    i += 1;
                    if chars.get(i + 1) == Some(&'/') {
                        // `**/` also matches zero directories
                        i += 1;
                        regex.push_str("(.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            '\\' => {
                i += 1;
                match chars.get(i) {
                    Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                    None => regex.push_str(r"\\"),
                }
            }
            '[' => match class_to_regex(&chars[i + 1..]) {
                Some((class, consumed)) => {
                    regex.push_str(&class);
                    i += consumed;
                }
                None => regex.push_str(r"\["),
            },
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }
    regex.push('$');
    regex
}

/// Translates the glob class following a `[`. Members are escaped one by one so that
/// regex class syntax such as `&&` or nested `[` stays literal; only a leading `!`/`^`
/// and `-` ranges keep their meaning. Returns the class and the number of chars used.
fn class_to_regex(rest: &[char]) -> Option<(String, usize)> {
    let mut class = String::from("[");
    let mut j = 0;
    if matches!(rest.first(), Some('!') | Some('^')) {
        class.push('^');
        j = 1;
    }
    let first = j;
    while j < rest.len() {
        let member = match rest[j] {
            ']' if j > first => {
                class.push(']');
                return Some((class, j + 1));
            }
            ']' => return None,
            '\\' => {
                j += 1;
                *rest.get(j)?
            }
            other => other,
        };
        j += 1;
        class.push_str(&regex::escape(&member.to_string()));
        if rest.get(j) == Some(&'-') && rest.get(j + 1).is_some_and(|next| *next != ']') {
            j += 1;
            let mut end = rest[j];
            if end == '\\' {
                j += 1;
                end = *rest.get(j)?;
            }
            j += 1;
            class.push('-');
            class.push_str(&regex::escape(&end.to_string()));
        }
    }
    None
}

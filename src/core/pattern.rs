//! # Path Pattern Module / 路径模式模块
//!
//! `testMatch` / `testIgnore` rules as plain values with a pure
//! [`Pattern::matches`] contract, so matching can be tested without a
//! scheduler or a filesystem.
//!
//! 将 `testMatch` / `testIgnore` 规则表示为具有纯函数 [`Pattern::matches`]
//! 契约的值类型，使匹配逻辑可以脱离调度器和文件系统独立测试。
//!
//! Two flavors exist:
//! - **Regex**: searched anywhere in the forward-slash relative path, the way a
//!   JavaScript `RegExp` is tested against a file path.
//! - **Glob**: anchored. A glob without `/` is matched against the file name,
//!   otherwise against the whole relative path. `**` crosses directories,
//!   `*` and `?` do not.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single compiled path pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    Regex { source: String, regex: Regex },
    Glob { source: String, regex: Regex },
}

impl Pattern {
    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    pub fn glob(source: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Glob {
            source: source.to_string(),
            regex: Regex::new(&glob_to_regex(source))?,
        })
    }

    /// Returns `true` if `path` (relative, `/`-separated) is selected by this pattern.
    /// 如果 `path`（相对路径，以 `/` 分隔）被此模式选中，则返回 `true`。
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::Regex { regex, .. } => regex.is_match(path),
            Pattern::Glob { source, regex } => {
                if source.contains('/') {
                    regex.is_match(path)
                } else {
                    let file_name = path.rsplit('/').next().unwrap_or(path);
                    regex.is_match(file_name)
                }
            }
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Pattern::Regex { source, .. } | Pattern::Glob { source, .. } => source,
        }
    }

    pub fn is_glob(&self) -> bool {
        matches!(self, Pattern::Glob { .. })
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.is_glob() == other.is_glob() && self.source() == other.source()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Regex { source, .. } => write!(f, "/{source}/"),
            Pattern::Glob { source, .. } => write!(f, "{source}"),
        }
    }
}

/// An ordered set of patterns; a path matches the set if it matches any member.
/// An empty set matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet(Vec<Pattern>);

impl PatternSet {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self(patterns)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|p| p.matches(path))
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.0
    }
}

/// The configuration-file shape of a pattern: a bare string is a regex,
/// `{ glob = "..." }` is a glob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSource {
    Regex(String),
    Glob { glob: String },
}

impl PatternSource {
    pub fn compile(&self) -> Result<Pattern, regex::Error> {
        match self {
            PatternSource::Regex(source) => Pattern::regex(source),
            PatternSource::Glob { glob } => Pattern::glob(glob),
        }
    }
}

/// One pattern or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    One(PatternSource),
    Many(Vec<PatternSource>),
}

impl PatternSpec {
    pub fn compile(&self) -> Result<PatternSet, regex::Error> {
        let sources: Vec<&PatternSource> = match self {
            PatternSpec::One(source) => vec![source],
            PatternSpec::Many(sources) => sources.iter().collect(),
        };
        sources
            .into_iter()
            .map(PatternSource::compile)
            .collect::<Result<Vec<_>, _>>()
            .map(PatternSet::new)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

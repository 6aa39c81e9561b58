use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::ConfigurationError;

/// A value bound to a named `:placeholder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl SqlParam {
    /// Binds a typed id. Ids beyond `i64::MAX` cannot exist in `SQLite` and
    /// are bound as text, which matches no row.
    #[must_use]
    pub fn id(value: u64) -> Self {
        i64::try_from(value).map_or_else(|_| Self::Text(value.to_string()), Self::Int)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Named parameters of a query fragment, keyed without the leading colon.
pub type ParamMap = BTreeMap<String, SqlParam>;

/// Hands out call-site prefixes so that parameter names and table aliases
/// produced by different fragments never collide.
#[derive(Debug, Default)]
pub struct ParamNamer {
    next: u32,
}

impl ParamNamer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `"{base}{n}_"` with `n` unique for this namer.
    pub fn prefix(&mut self, base: &str) -> String {
        let n = self.next;
        self.next += 1;
        format!("{base}{n}_")
    }
}

/// Moves every entry of `from` into `into`.
///
/// # Errors
///
/// Returns `ConfigurationError::DuplicateParameter` if a name is already bound.
pub fn merge_params(into: &mut ParamMap, from: ParamMap) -> Result<(), ConfigurationError> {
    for (name, value) in from {
        if into.contains_key(&name) {
            return Err(ConfigurationError::DuplicateParameter(name));
        }
        into.insert(name, value);
    }
    Ok(())
}

/// Renders `= :p` / `IN (:p0, :p1)` (or the negated forms when `equal` is
/// false) for a list of integers, binding them as `{prefix}{i}`.
///
/// An empty list matches nothing when `equal` and every non-null value
/// otherwise.
#[must_use]
pub fn in_or_equal(values: &[i64], prefix: &str, equal: bool) -> (String, ParamMap) {
    let mut params = ParamMap::new();
    let names: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let name = format!("{prefix}{i}");
            params.insert(name.clone(), SqlParam::Int(*v));
            format!(":{name}")
        })
        .collect();

    let sql = match (names.as_slice(), equal) {
        ([], true) => "IN (NULL)".to_owned(),
        ([], false) => "IS NOT NULL".to_owned(),
        ([one], true) => format!("= {one}"),
        ([one], false) => format!("<> {one}"),
        (many, true) => format!("IN ({})", many.join(", ")),
        (many, false) => format!("NOT IN ({})", many.join(", ")),
    };
    (sql, params)
}

/// Rewrites `:name` placeholders into `SQLite` `?N` placeholders.
///
/// Returns the rewritten SQL and the arguments in binding order. A name used
/// twice reuses its index. Text inside single quotes is copied verbatim.
///
/// # Errors
///
/// Returns `ConfigurationError::UnboundParameter` if the SQL references a
/// name missing from `params`.
pub fn to_positional(
    sql: &str,
    params: &ParamMap,
) -> Result<(String, Vec<SqlParam>), ConfigurationError> {
    let mut out = String::with_capacity(sql.len());
    let mut args: Vec<SqlParam> = Vec::new();
    let mut indexes: HashMap<&str, usize> = HashMap::new();
    let mut in_quote = false;
    let mut prev: Option<char> = None;

    let mut chars = sql.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        if c == '\'' {
            in_quote = !in_quote;
            out.push(c);
            prev = Some(c);
            continue;
        }
        let starts_name = !in_quote
            && c == ':'
            && prev != Some(':')
            && chars
                .peek()
                .is_some_and(|(_, n)| n.is_ascii_alphabetic() || *n == '_');
        if !starts_name {
            out.push(c);
            prev = Some(c);
            continue;
        }

        let start = pos + 1;
        let mut end = start;
        while let Some((i, n)) = chars.peek().copied() {
            if n.is_ascii_alphanumeric() || n == '_' {
                end = i + n.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let name = &sql[start..end];
        let (key, value) = params
            .get_key_value(name)
            .ok_or_else(|| ConfigurationError::UnboundParameter(name.to_owned()))?;
        let index = match indexes.get(key.as_str()) {
            Some(index) => *index,
            None => {
                args.push(value.clone());
                indexes.insert(key.as_str(), args.len());
                args.len()
            }
        };
        out.push('?');
        out.push_str(&index.to_string());
        prev = name.chars().last();
    }

    Ok((out, args))
}

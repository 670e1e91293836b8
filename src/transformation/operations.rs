//! String operators and parameter parsing
//!
//! Pure functions behind the string operators. They never touch models;
//! the performer reads the inputs and writes the results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use tracing::warn;

use crate::error::StepError;
use crate::value::Value;

/// Typed access to a step's string parameters
pub struct StepParams<'a> {
    params: &'a BTreeMap<String, String>,
}

impl<'a> StepParams<'a> {
    pub fn new(params: &'a BTreeMap<String, String>) -> Self {
        Self { params }
    }

    pub fn optional(&self, name: &str) -> Option<&'a str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn required(&self, name: &str) -> Result<&'a str, StepError> {
        self.optional(name)
            .ok_or_else(|| StepError::MissingParameter(name.to_string()))
    }

    /// Non-negative integer; a missing or malformed value falls back to `default`
    pub fn lenient_index(&self, name: &str, default: usize) -> usize {
        match self.optional(name) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(param = name, value = raw, default, "parameter is not a number, using default");
                default
            }),
        }
    }

    /// Non-negative integer that must be present and well formed
    pub fn strict_index(&self, name: &str) -> Result<usize, StepError> {
        let raw = self.required(name)?;
        raw.trim().parse().map_err(|_| StepError::InvalidNumber {
            param: name.to_string(),
            value: raw.to_string(),
        })
    }
}

/// Side a pad operation fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadDirection {
    #[default]
    Start,
    End,
}

impl fmt::Display for PadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PadDirection::Start => write!(f, "Start"),
            PadDirection::End => write!(f, "End"),
        }
    }
}

impl FromStr for PadDirection {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(PadDirection::Start),
            "end" => Ok(PadDirection::End),
            _ => Err(StepError::InvalidParameter {
                param: "direction".to_string(),
                reason: format!("'{}' is neither Start nor End", s),
            }),
        }
    }
}

fn compile(regex: &str) -> Result<Regex, StepError> {
    Regex::new(regex).map_err(|e| StepError::InvalidRegex {
        regex: regex.to_string(),
        reason: e.to_string(),
    })
}

pub fn concat(values: &[String], separator: &str) -> String {
    values.join(separator)
}

/// Part `index` of `value` split on a literal delimiter; empty when out of range
pub fn split(value: &str, delimiter: &str, index: usize) -> String {
    match value.split(delimiter).nth(index) {
        Some(part) => part.to_string(),
        None => {
            warn!(index, delimiter, "split has not enough parts for the index, using the empty string");
            String::new()
        }
    }
}

/// The `index`-th match of `regex` in `value`
pub fn split_regex(value: &str, regex: &str, index: usize) -> Result<String, StepError> {
    let re = compile(regex)?;
    let found = re.find_iter(value).nth(index);
    found
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| StepError::NoRegexMatch {
            regex: regex.to_string(),
            index,
        })
}

/// Characters `from..to`, with `to` clamped to the length
pub fn substring(value: &str, from: usize, to: usize) -> Result<String, StepError> {
    let length = value.chars().count();
    let to = if to > length {
        warn!(to, length, "substring end is past the end of the string, clamping");
        length
    } else {
        to
    };
    if from > to {
        return Err(StepError::InvalidRange { from, to, length });
    }
    Ok(value.chars().skip(from).take(to - from).collect())
}

pub fn reverse(value: &str) -> String {
    value.chars().rev().collect()
}

/// Pad with `character` until the string is `length` characters long
pub fn pad(value: &str, length: usize, character: char, direction: PadDirection) -> String {
    let current = value.chars().count();
    if current >= length {
        return value.to_string();
    }
    let fill: String = std::iter::repeat(character).take(length - current).collect();
    match direction {
        PadDirection::Start => format!("{}{}", fill, value),
        PadDirection::End => format!("{}{}", value, fill),
    }
}

/// Remove a match of `regex` anchored at the start of `value`.
///
/// With `max_length` only the first `max_length` characters are searched.
pub fn remove_leading(value: &str, regex: &str, max_length: Option<usize>) -> Result<String, StepError> {
    let re = compile(regex)?;
    let region_end = match max_length {
        Some(limit) => value
            .char_indices()
            .nth(limit)
            .map(|(offset, _)| offset)
            .unwrap_or(value.len()),
        None => value.len(),
    };
    let found = re.find(&value[..region_end]);
    match found {
        Some(m) if m.start() == 0 => Ok(value[m.end()..].to_string()),
        _ => Ok(value.to_string()),
    }
}

/// Parse `value` into the named scalar type
pub fn instantiate(value: &str, target_type: &str) -> Result<Value, StepError> {
    let fail = || StepError::Instantiation {
        target_type: target_type.to_string(),
        value: value.to_string(),
    };
    match target_type.to_ascii_lowercase().as_str() {
        "string" => Ok(Value::String(value.to_string())),
        "integer" | "int" | "long" => value.trim().parse().map(Value::Integer).map_err(|_| fail()),
        "float" | "double" => value.trim().parse().map(Value::Float).map_err(|_| fail()),
        "boolean" | "bool" => value.trim().parse().map(Value::Boolean).map_err(|_| fail()),
        _ => Err(StepError::InvalidParameter {
            param: "targetType".to_string(),
            reason: format!("unsupported type '{}'", target_type),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_out_of_range_is_empty() {
        assert_eq!(split("a.b.c", ".", 1), "b");
        assert_eq!(split("a.b.c", ".", 5), "");
    }

    #[test]
    fn test_split_regex() {
        assert_eq!(split_regex("test3#test4", "[^#]+", 0).unwrap(), "test3");
        assert_eq!(split_regex("test3#test4", "[^#]+", 1).unwrap(), "test4");
        assert!(matches!(
            split_regex("test3#test4", "[^#]+", 2),
            Err(StepError::NoRegexMatch { index: 2, .. })
        ));
        assert!(matches!(split_regex("x", "(", 0), Err(StepError::InvalidRegex { .. })));
    }

    #[test]
    fn test_substring_clamps_end() {
        assert_eq!(substring("hello", 1, 3).unwrap(), "el");
        assert_eq!(substring("hello", 2, 99).unwrap(), "llo");
        assert!(substring("hello", 4, 2).is_err());
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad("7", 5, '0', PadDirection::Start), "00007");
        assert_eq!(pad("7", 3, '-', PadDirection::End), "7--");
        assert_eq!(pad("123456", 5, '0', PadDirection::Start), "123456");
        assert_eq!("end".parse::<PadDirection>().unwrap(), PadDirection::End);
        assert!("middle".parse::<PadDirection>().is_err());
    }

    #[test]
    fn test_remove_leading() {
        assert_eq!(remove_leading("#?##blub", "[#?]+", Some(3)).unwrap(), "#blub");
        assert_eq!(remove_leading("##blub", "#+", Some(2)).unwrap(), "blub");
        assert_eq!(remove_leading("#?#?#?test", "[#?]+", None).unwrap(), "test");
        assert_eq!(remove_leading("#?#?#?test", "#+", Some(3)).unwrap(), "?#?#?test");
        assert_eq!(remove_leading("blub#", "#", None).unwrap(), "blub#");
    }

    #[test]
    fn test_instantiate() {
        assert_eq!(instantiate("42", "integer").unwrap(), Value::Integer(42));
        assert_eq!(instantiate("true", "Boolean").unwrap(), Value::Boolean(true));
        assert!(matches!(instantiate("x", "integer"), Err(StepError::Instantiation { .. })));
        assert!(matches!(instantiate("x", "Date"), Err(StepError::InvalidParameter { .. })));
    }

    #[test]
    fn test_params_lenient_and_strict() {
        let mut raw = BTreeMap::new();
        raw.insert("index".to_string(), "two".to_string());
        raw.insert("length".to_string(), "5".to_string());
        let params = StepParams::new(&raw);
        assert_eq!(params.lenient_index("index", 0), 0);
        assert_eq!(params.lenient_index("missing", 3), 3);
        assert_eq!(params.strict_index("length").unwrap(), 5);
        assert!(matches!(params.strict_index("index"), Err(StepError::InvalidNumber { .. })));
        assert!(matches!(params.required("regex"), Err(StepError::MissingParameter(_))));
    }
}

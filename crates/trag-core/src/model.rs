use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Error category of a failing verdict.
///
/// The harness produces the first three itself; anything else is whatever the engine
/// reported and is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    RunnerFailure,
    UnexpectedSuccess,
    Engine(String),
}

impl ErrorCategory {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RunnerFailure => "runner failure",
            ErrorCategory::UnexpectedSuccess => "unexpected success",
            ErrorCategory::Engine(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "timeout" => ErrorCategory::Timeout,
            "runner failure" => ErrorCategory::RunnerFailure,
            "unexpected success" => ErrorCategory::UnexpectedSuccess,
            other => ErrorCategory::Engine(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ErrorCategory::parse(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCategory::Timeout, "runner timed out")
    }

    pub fn unexpected_success() -> Self {
        Self::new(
            ErrorCategory::UnexpectedSuccess,
            "error expected, but test run fine",
        )
    }
}

/// Classified outcome of one test invocation.
///
/// The serialized form is also the line format accepted by ingestion, so exported
/// verdicts can be re-ingested as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub testcase: String,
    pub version: String,
    #[serde(with = "strict_flag")]
    pub use_strict: bool,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// `use_strict` is written as 0/1; older files carry a JSON boolean.
mod strict_flag {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(v: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        struct FlagVisitor;

        impl<'de> Visitor<'de> for FlagVisitor {
            type Value = bool;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("0, 1 or a boolean")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
                Ok(v)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
                match v {
                    0 => Ok(false),
                    1 => Ok(true),
                    other => Err(E::invalid_value(de::Unexpected::Unsigned(other), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
                match v {
                    0 => Ok(false),
                    1 => Ok(true),
                    other => Err(E::invalid_value(de::Unexpected::Signed(other), &self)),
                }
            }
        }

        d.deserialize_any(FlagVisitor)
    }
}

/// Expected-error descriptor of a negative test (`negative:` in the front matter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NegativeExpectation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<NegativeExpectation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TestMetadata {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn is_negative(&self) -> bool {
        self.negative.is_some()
    }

    /// Strictness modes this test runs in, non-strict first.
    pub fn strict_modes(&self) -> Vec<bool> {
        let mut modes = Vec::with_capacity(2);
        if !self.has_flag("onlyStrict") {
            modes.push(false);
        }
        if !self.has_flag("noStrict") {
            modes.push(true);
        }
        modes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub path: String,
    pub metadata: TestMetadata,
}

impl TestCase {
    pub fn group(&self) -> &str {
        group_of(&self.path)
    }
}

/// Directory part of a test path: `"a/b/c.js"` is in group `"a/b"`, `"c.js"` in `""`.
pub fn group_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

use serde::Serialize;
use serde_json::Value;

/// Outcome carried alongside output through the handler chain so handlers
/// can behave differently on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Error,
}

impl ProcessingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Caller-supplied options for the output format, always an ordered
/// sequence regardless of the shape the caller sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormatOptions(Vec<Value>);

impl FormatOptions {
    /// Normalizes any shape into a sequence: arrays are taken as-is, a
    /// missing value becomes empty, anything else becomes a one-element
    /// sequence.
    #[must_use]
    pub fn normalize(raw: Option<Value>) -> Self {
        match raw {
            None => Self::default(),
            Some(Value::Array(items)) => Self(items),
            Some(scalar) => Self(vec![scalar]),
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a FormatOptions {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scalar_is_wrapped() {
        let opts = FormatOptions::normalize(Some(json!("PRETTY_PRINT")));
        assert_eq!(opts.as_slice(), &[json!("PRETTY_PRINT")]);
    }

    #[test]
    fn array_is_kept() {
        let opts = FormatOptions::normalize(Some(json!(["A", 128])));
        assert_eq!(opts.as_slice(), &[json!("A"), json!(128)]);
    }

    #[test]
    fn absent_is_empty() {
        assert!(FormatOptions::normalize(None).is_empty());
    }

    #[test]
    fn object_is_wrapped_whole() {
        let opts = FormatOptions::normalize(Some(json!({"k": 1})));
        assert_eq!(opts.as_slice().len(), 1);
    }

    #[test]
    fn status_labels() {
        assert_eq!(ProcessingStatus::Success.as_str(), "success");
        assert_eq!(ProcessingStatus::Error.as_str(), "error");
        assert!(!ProcessingStatus::Error.is_success());
    }
}

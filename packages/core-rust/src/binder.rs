//! Static method metadata and name-based argument binding.
//!
//! Every callable method declares its parameters up front in a
//! [`MethodSpec`]. [`bind_arguments`] walks that table in declaration order
//! and pulls matching values out of the caller's unordered name/value map.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::DispatchError;

/// Unordered caller-supplied arguments, keyed by parameter name.
pub type Arguments = HashMap<String, Value>;

/// One declared parameter of a method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    /// `None` marks the parameter as required.
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub doc: &'static str,
}

impl ParamSpec {
    #[must_use]
    pub fn required(name: &'static str) -> Self {
        Self {
            name,
            default: None,
            doc: "",
        }
    }

    #[must_use]
    pub fn optional(name: &'static str, default: impl Into<Value>) -> Self {
        Self {
            name,
            default: Some(default.into()),
            doc: "",
        }
    }

    #[must_use]
    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = doc;
        self
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

/// Declared shape of one externally callable method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSpec {
    pub name: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub doc: &'static str,
    pub params: Vec<ParamSpec>,
}

impl MethodSpec {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            doc: "",
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn doc(mut self, doc: &'static str) -> Self {
        self.doc = doc;
        self
    }

    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Positional argument `index`, or the declared default of the parameter
    /// at that position when the bound sequence is shorter.
    ///
    /// Callees use this to apply their own defaults: the binder never
    /// backfills them.
    #[must_use]
    pub fn arg<'a>(&'a self, args: &'a [Value], index: usize) -> Option<&'a Value> {
        args.get(index)
            .or_else(|| self.params.get(index).and_then(|p| p.default.as_ref()))
    }
}

/// Orders `arguments` to match `method`'s declared parameters.
///
/// Parameters present in the map are emitted in declaration order. Absent
/// optional parameters are skipped, so the result may be shorter than the
/// parameter list; absent required parameters fail. Unknown map entries are
/// dropped. Values are passed through untouched.
///
/// # Errors
///
/// Returns [`DispatchError::MissingArgument`] naming the first required
/// parameter with no entry in `arguments`.
pub fn bind_arguments(method: &MethodSpec, arguments: &Arguments) -> Result<Vec<Value>, DispatchError> {
    let mut bound = Vec::with_capacity(method.params.len());
    for param in &method.params {
        if let Some(value) = arguments.get(param.name) {
            bound.push(value.clone());
        } else if !param.is_optional() {
            return Err(DispatchError::MissingArgument {
                name: param.name.to_string(),
            });
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn args(pairs: &[(&str, Value)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn get_method() -> MethodSpec {
        MethodSpec::new("get")
            .param(ParamSpec::required("type"))
            .param(ParamSpec::required("identifier"))
    }

    #[test]
    fn binds_in_declaration_order() {
        let bound = bind_arguments(
            &get_method(),
            &args(&[("identifier", json!("42")), ("type", json!("user"))]),
        )
        .unwrap();
        assert_eq!(bound, vec![json!("user"), json!("42")]);
    }

    #[test]
    fn missing_required_names_the_parameter() {
        let err = bind_arguments(&get_method(), &args(&[("type", json!("user"))])).unwrap_err();
        assert_eq!(
            err,
            DispatchError::MissingArgument {
                name: "identifier".to_string()
            }
        );
        assert_eq!(err.code(), "pre-6");
        assert_eq!(err.to_string(), "Missing argument: 'identifier'");
    }

    #[test]
    fn absent_optional_is_omitted_not_defaulted() {
        let method = MethodSpec::new("ping").param(ParamSpec::optional("pong", "pong"));
        let bound = bind_arguments(&method, &Arguments::new()).unwrap();
        assert!(bound.is_empty());
        assert_eq!(method.arg(&bound, 0), Some(&json!("pong")));
    }

    #[test]
    fn omitted_optional_shortens_the_sequence() {
        let method = MethodSpec::new("m")
            .param(ParamSpec::required("a"))
            .param(ParamSpec::optional("b", 0))
            .param(ParamSpec::optional("c", 0));
        let bound = bind_arguments(&method, &args(&[("a", json!(1)), ("c", json!(3))])).unwrap();
        assert_eq!(bound, vec![json!(1), json!(3)]);
    }

    #[test]
    fn extra_arguments_are_dropped() {
        let method = MethodSpec::new("ping").param(ParamSpec::optional("pong", "pong"));
        let bound = bind_arguments(
            &method,
            &args(&[("pong", json!("hi")), ("format-options", json!("PRETTY_PRINT"))]),
        )
        .unwrap();
        assert_eq!(bound, vec![json!("hi")]);
    }

    #[test]
    fn values_are_not_coerced() {
        let method = MethodSpec::new("m").param(ParamSpec::required("x"));
        let bound = bind_arguments(&method, &args(&[("x", json!(["a", 1]))])).unwrap();
        assert_eq!(bound, vec![json!(["a", 1])]);
    }

    proptest! {
        #[test]
        fn bound_order_follows_declaration(count in 1usize..8, seed in any::<u64>()) {
            let names: Vec<&'static str> = ["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"][..count].to_vec();
            let method = names.iter().fold(MethodSpec::new("m"), |m, n| m.param(ParamSpec::required(*n)));

            // Insert in a seed-dependent rotation so map construction order varies.
            let rotate = usize::try_from(seed % count as u64).unwrap();
            let mut supplied = Arguments::new();
            for i in 0..count {
                let idx = (i + rotate) % count;
                supplied.insert(names[idx].to_string(), json!(idx));
            }

            let bound = bind_arguments(&method, &supplied).unwrap();
            let expected: Vec<Value> = (0..count).map(|i| json!(i)).collect();
            prop_assert_eq!(bound, expected);
        }

        #[test]
        fn absent_optional_never_errors(present in proptest::collection::vec(any::<bool>(), 1..6)) {
            let all = ["o0", "o1", "o2", "o3", "o4", "o5"];
            let method = all[..present.len()]
                .iter()
                .fold(MethodSpec::new("m"), |m, n| m.param(ParamSpec::optional(*n, Value::Null)));
            let supplied: Arguments = all
                .iter()
                .zip(&present)
                .filter(|(_, keep)| **keep)
                .map(|(n, _)| ((*n).to_string(), json!(true)))
                .collect();

            let bound = bind_arguments(&method, &supplied).unwrap();
            prop_assert_eq!(bound.len(), present.iter().filter(|p| **p).count());
        }
    }
}

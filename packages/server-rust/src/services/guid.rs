use std::sync::LazyLock;

use rpcgate_core::{MethodSpec, ParamSpec, Value};
use sha2::{Digest, Sha512};

use super::{spec_for, string_arg};
use crate::traits::{CallScope, Service, ServiceError};

static METHODS: LazyLock<Vec<MethodSpec>> = LazyLock::new(|| {
    vec![MethodSpec::new("get")
        .doc("Stable 128-character identifier for a typed external id.")
        .param(ParamSpec::required("type").with_doc("Kind of identifier."))
        .param(ParamSpec::required("identifier").with_doc("The identifier."))]
});

/// Derives deterministic identifiers: lowercase hex SHA-512 of
/// `salt ++ type ++ "__" ++ identifier`.
#[derive(Clone)]
pub struct GuidService {
    salt: String,
}

impl GuidService {
    #[must_use]
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    #[must_use]
    pub fn guid(&self, kind: &str, identifier: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(b"__");
        hasher.update(identifier.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for GuidService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuidService").finish_non_exhaustive()
    }
}

impl Service for GuidService {
    fn name(&self) -> &'static str {
        "guid"
    }

    fn default_method(&self) -> Option<&'static str> {
        Some("get")
    }

    fn methods(&self) -> &[MethodSpec] {
        &METHODS
    }

    fn call(&self, method: &str, args: &[Value], _scope: &CallScope<'_>) -> Result<Value, ServiceError> {
        let spec = spec_for(&METHODS, method)?;
        let kind = string_arg(spec, args, 0)?;
        let identifier = string_arg(spec, args, 1)?;
        Ok(Value::String(self.guid(&kind, &identifier)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_is_salted_sha512_hex() {
        let service = GuidService::new("");
        let mut hasher = Sha512::new();
        hasher.update(b"user__42");
        assert_eq!(service.guid("user", "42"), hex::encode(hasher.finalize()));
    }

    #[test]
    fn guid_is_128_lowercase_hex_chars() {
        let guid = GuidService::new("salt").guid("user", "42");
        assert_eq!(guid.len(), 128);
        assert!(guid.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn salt_changes_the_result() {
        assert_ne!(
            GuidService::new("a").guid("user", "42"),
            GuidService::new("b").guid("user", "42")
        );
    }
}

//! `rpcgate` core: component registry, argument binding, route pattern, and
//! dispatch error taxonomy.

pub mod binder;
pub mod error;
pub mod registry;
pub mod route;
pub mod types;

pub use binder::{bind_arguments, Arguments, MethodSpec, ParamSpec};
pub use error::DispatchError;
pub use registry::{factory, Factory, Registry, RegistryError, DEFAULT_NAME};
pub use route::RouteMatch;
pub use serde_json::Value;
pub use types::{FormatOptions, ProcessingStatus};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}

//! Plugin lifecycle
//!
//! A plugin is a [`PluginDescriptor`]: metadata, namespaced schema, routes,
//! data directories and a [`Producer`]. The [`PluginRegistry`] owns the
//! descriptors in declaration order and drives setup, aggregation and runs.

mod descriptor;
mod producer;
mod registry;
mod template;

pub use descriptor::{PluginDescriptor, PluginSummary, Route};
pub use producer::Producer;
pub use registry::{PluginRegistry, RunReport};
pub use template::{Namespace, StatementTemplate, PLACEHOLDER};

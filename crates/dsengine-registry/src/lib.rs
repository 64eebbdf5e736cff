//! Process-wide adapter registry and factory.
//!
//! Each adapter package registers its three capability factories once, at
//! process start, via [`register`]. Upper layers resolve a kind tag through
//! [`build_tester`]/[`build_discoverer`]/[`build_executor`] without knowing
//! which adapter package backs it.

mod error;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{
    build_discoverer, build_executor, build_tester, list, register, AdapterInfo,
    DiscovererFactory, ExecutorFactory, FactoryArgs, TesterFactory,
};

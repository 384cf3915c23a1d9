mod builder;
mod registry;

pub use builder::{build_context, build_context_with};
pub use registry::ServiceContext;

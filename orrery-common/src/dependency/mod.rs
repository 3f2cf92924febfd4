pub mod definition;
pub mod requirement;
pub mod resolver;

pub use definition::{Dependency, DependencyTag};
pub use requirement::Requirement;
pub use resolver::{
    check_catalog, DependencyResolver, ResolutionContext, ResolvedFormula, ResolvedGraph,
};

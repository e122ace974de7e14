pub mod deps;
pub mod jobs;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use traits::{
    BaseEmailSender, BaseLeadEnricher, BaseLeadResearcher, BaseLeadSearch, BaseOutreachComposer,
};

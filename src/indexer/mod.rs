pub mod classifier;
pub mod identity;
pub mod ignore_rules;
pub mod walker;

pub use classifier::{ClassificationVerdict, ContentClassifier};
pub use identity::{DeterministicId, IdentityError, IdentityGenerator, IdentityKey, Md5IdentityGenerator};
pub use ignore_rules::RuleSet;
pub use walker::{DiscoveredFile, FileDiscoverer};

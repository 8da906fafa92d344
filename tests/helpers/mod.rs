// Test helper modules
pub mod test_doubles;
pub mod test_harness;

pub use test_doubles::{CancellingEmbedder, FlakyStore};
pub use test_harness::TestHarness;

//! Purpose-built containers for canonical-text keys.

mod hash_map;

pub use hash_map::{StringMap, StringSet};

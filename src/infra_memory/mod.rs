//! Process-local adapters for every port. Used by the `memory` backends and by tests.

mod catalog_repo_memory;
mod catalog_source_scripted;
mod clock_manual;
mod counter_store_memory;
mod credential_store_memory;
mod user_directory_memory;

pub use catalog_repo_memory::*;
pub use catalog_source_scripted::*;
pub use clock_manual::*;
pub use counter_store_memory::*;
pub use credential_store_memory::*;
pub use user_directory_memory::*;

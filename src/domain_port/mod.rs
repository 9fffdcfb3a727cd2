mod clock;

pub use clock::*;

// store

mod counter_store;
mod credential_store;

pub use counter_store::*;
pub use credential_store::*;

// repo

mod catalog_repo;
mod user_directory;

pub use catalog_repo::*;
pub use user_directory::*;

// source

mod catalog_source;

pub use catalog_source::*;

mod access_guard;
mod auth_service;
mod catalog_sync;
mod visitor_counter;

pub use access_guard::*;
pub use auth_service::*;
pub use catalog_sync::*;
pub use visitor_counter::*;

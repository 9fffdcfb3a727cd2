mod access_guard_impl;
mod auth_service_impl;
mod catalog_sync_impl;
mod credential_hasher_argon2;
mod token_codec_jwt;
mod visitor_counter_impl;

pub use access_guard_impl::*;
pub use auth_service_impl::*;
pub use catalog_sync_impl::*;
pub use credential_hasher_argon2::*;
pub use token_codec_jwt::*;
pub use visitor_counter_impl::*;

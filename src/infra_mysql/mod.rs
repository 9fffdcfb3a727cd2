mod catalog_repo_mysql;
mod credential_store_mysql;
mod user_directory_mysql;

pub use catalog_repo_mysql::*;
pub use credential_store_mysql::*;
pub use user_directory_mysql::*;

mod util;

//! `Settings` is loaded once at startup from a TOML file. Signing keys and the TMDB API key
//! are not stored in it, only the names of the environment variables that carry them. DSNs
//! and seed passwords are held as `SecretString` and print as redacted.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;

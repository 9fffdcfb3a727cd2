mod tmdb_source;

pub use tmdb_source::*;

use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "moviehub", about = "Movie catalog API server")]
pub struct Cli {
    /// Path to a settings file. Defaults to `settings/dev.toml` or `settings/release.toml`.
    #[arg(long)]
    pub settings: Option<String>,
}

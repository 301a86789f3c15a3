//! CLI argument parsing via clap.

use clap::Parser;

/// Interactive terminal client for a remote reasoning agent.
#[derive(Debug, Parser)]
#[command(name = "colloquy", version)]
pub struct Args {
    /// Prompt to send. If provided, runs in one-shot mode and exits.
    pub prompt: Option<String>,

    /// Path to config file (default: ./colloquy.toml or
    /// ~/.config/colloquy/colloquy.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override the backend base URL.
    #[arg(long = "backend-url")]
    pub backend_url: Option<String>,

    /// Disable color output.
    #[arg(long = "no-color")]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::Args;
    use clap::Parser;

    #[test]
    fn bare_invocation_is_interactive() {
        let args = Args::parse_from(["colloquy"]);
        assert!(args.prompt.is_none());
        assert!(!args.no_color);
    }

    #[test]
    fn positional_prompt_selects_one_shot_mode() {
        let args = Args::parse_from(["colloquy", "what changed last week?"]);
        assert_eq!(args.prompt.as_deref(), Some("what changed last week?"));
    }

    #[test]
    fn backend_url_override_parses() {
        let args = Args::parse_from(["colloquy", "--backend-url", "http://agent:9000", "--no-color"]);
        assert_eq!(args.backend_url.as_deref(), Some("http://agent:9000"));
        assert!(args.no_color);
    }
}

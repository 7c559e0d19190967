use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "inbox-relay")]
#[command(about = "Relays an IMAP inbox into an external message importer", long_about = None)]
pub struct Cli {
    /// Connect, list the server's folders, and exit
    #[arg(long, default_value = "false")]
    pub check: bool,

    /// Path to an alternate .env file
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["inbox-relay"]).unwrap();
        assert!(!cli.check);
        assert!(cli.env_file.is_none());
    }

    #[test]
    fn test_cli_check_mode() {
        let cli = Cli::try_parse_from(["inbox-relay", "--check", "--env-file", "relay.env"]).unwrap();
        assert!(cli.check);
        assert_eq!(cli.env_file.as_deref(), Some("relay.env"));
    }
}

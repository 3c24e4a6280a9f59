//! The root CLI structure. Grounded on the teacher's `gglib-cli::parser`
//! shape (a single `clap::Parser` struct carrying global flags), scoped down
//! since the runtime has no subcommands of its own (spec §9: "CLI packaging
//! concerns left out").

use clap::Parser;

/// Command-line interface for the opencane runtime binary.
#[derive(Parser)]
#[command(name = "opencane")]
#[command(about = "Run the opencane assistive smart-cane backend runtime")]
#[command(version = opencane_build_info::LONG_VERSION)]
pub struct Cli {
    /// Validate configuration and exit without starting the runtime (exit
    /// code 1 on an invalid configuration, 0 otherwise).
    #[arg(long)]
    pub check_config: bool,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_parser_builds() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn check_config_flag_parses() {
        let cli = Cli::parse_from(["opencane", "--check-config"]);
        assert!(cli.check_config);
    }

    #[test]
    fn defaults_to_no_check_config() {
        let cli = Cli::parse_from(["opencane"]);
        assert!(!cli.check_config);
    }
}

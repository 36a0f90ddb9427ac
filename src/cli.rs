use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-slice")]
#[command(about = "Inspect Java class roots: dependencies, package slices, rule checks and duplicate classes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Class directory or jar; repeatable, kept in order.
    #[arg(long = "root", value_name = "PATH", global = true)]
    pub roots: Vec<PathBuf>,

    /// Class path string using the platform path separator.
    #[arg(long, value_name = "PATHS", global = true)]
    pub cp: Option<String>,

    /// Directory whose jars (recursively) are added as roots.
    #[arg(long, value_name = "DIR", global = true)]
    pub lib: Option<PathBuf>,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Report classes present in more than one root.
    Duplicates {
        #[arg(long, value_name = "ALGORITHM")]
        hash_algorithm: Option<String>,

        #[arg(long)]
        ignore_equal_duplicates: bool,

        #[arg(long)]
        continue_on_duplicate: bool,
    },
    /// Print the decoded structure of one class.
    Dump { class_name: String },
    /// List the dependencies of the classes matching a pattern.
    Deps { pattern: String },
    /// Fail when classes matching PATTERN use classes matching any rule.
    Check {
        pattern: String,

        #[arg(long = "must-not-use", value_name = "PATTERN", required = true)]
        must_not_use: Vec<String>,
    },
    /// Count classes per package.
    Packages { prefix: Option<String> },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_options_may_follow_the_subcommand() {
        let cli = Cli::parse_from([
            "class-slice",
            "check",
            "com.a.*",
            "--must-not-use",
            "com.b.*",
            "--must-not-use",
            "com.c..*",
            "--root",
            "/r1",
            "-f",
            "text",
        ]);
        assert_eq!(cli.roots, vec![PathBuf::from("/r1")]);
        assert_eq!(cli.format, OutputFormat::Text);
        match cli.command {
            Commands::Check {
                pattern,
                must_not_use,
            } => {
                assert_eq!(pattern, "com.a.*");
                assert_eq!(must_not_use, vec!["com.b.*", "com.c..*"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn check_requires_a_rule() {
        assert!(Cli::try_parse_from(["class-slice", "check", "com.a.*"]).is_err());
    }
}

// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// pipexec: run a shell command with the given stdin and capture its stdout.
///
/// The command is run as `<shell> -c <COMMAND>`. Input and output are pumped
/// concurrently, so commands that produce output before (or without) consuming
/// all of their input never deadlock.
///
/// Examples:
///   pipexec -i data.bin -- sort -u
///   echo hello | pipexec 'tr a-z A-Z'
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read the child's stdin from FILE instead of our own stdin.
    #[arg(short, long, value_name = "FILE", conflicts_with = "no_input")]
    pub input: Option<PathBuf>,

    /// Give the child an empty stdin.
    #[arg(long)]
    pub no_input: bool,

    /// Shell binary used to run the command (overrides config and $SHELL).
    #[arg(long, value_name = "PATH")]
    pub shell: Option<String>,

    /// Config file to load instead of ~/.config/pipexec/config.toml.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report engine failures as an absent result (exit 1) instead of an error message.
    #[arg(long)]
    pub sentinel: bool,

    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long)]
    pub verbose: bool,

    /// The command to run. Several words are shell-quoted and joined.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// The single string handed to `<shell> -c`.
    ///
    /// One word is passed through untouched so `pipexec 'a | b'` keeps its pipe;
    /// several words are quoted individually so `pipexec -- printf '%s\n' "a b"`
    /// keeps its arguments intact.
    pub fn command_line(&self) -> Result<String, shlex::QuoteError> {
        match self.command.as_slice() {
            [single] => Ok(single.clone()),
            words => shlex::try_join(words.iter().map(String::as_str)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_word_is_passed_verbatim() {
        let cli = Cli::try_parse_from(["pipexec", "cat | wc -l"]).unwrap();
        assert_eq!(cli.command_line().unwrap(), "cat | wc -l");
    }

    #[test]
    fn test_multiple_words_are_quoted() {
        let cli = Cli::try_parse_from(["pipexec", "--", "echo", "a b", "$HOME"]).unwrap();
        let line = cli.command_line().unwrap();
        assert_eq!(
            shlex::split(&line).unwrap(),
            vec!["echo".to_string(), "a b".to_string(), "$HOME".to_string()]
        );
    }

    #[test]
    fn test_input_conflicts_with_no_input() {
        let result = Cli::try_parse_from(["pipexec", "-i", "x", "--no-input", "cat"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["pipexec"]).is_err());
    }
}

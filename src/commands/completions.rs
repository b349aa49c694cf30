//! Completions command implementation
//!
//! Prints a `clap_complete` script for the chosen shell:
//!
//! ```bash
//! patchpin completions bash > ~/.local/share/bash-completion/completions/patchpin
//! patchpin completions zsh > ~/.zfunc/_patchpin
//! ```

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use std::io::{self, Write};

use crate::cli::Cli;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Execute the `completions` command.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    write_completions(args.shell, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_bash_completions_cover_subcommands() {
        let bash = script(Shell::Bash);
        assert!(bash.contains("patchpin"));
        for sub in ["generate", "commits", "validate", "completions"] {
            assert!(bash.contains(sub), "missing {}", sub);
        }
    }

    #[test]
    fn test_fish_completions_mention_dry_run() {
        assert!(script(Shell::Fish).contains("dry-run"));
    }
}

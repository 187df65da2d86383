//! Pre-flight confirmation for pushes with many files.

use std::fmt;
use std::io::{self, BufRead, Write};

use crate::error::AssetError;

/// Pushes with more files than this need explicit confirmation.
pub const MAX_FILES_WITHOUT_CONFIRMATION: usize = 50;

/// Warning shown before a large push.
pub fn too_many_files_message(n_files: usize) -> String {
    format!(
        "It looks like you are attempting to push an asset with more than 50 files in it ({}).\n\
         This can lead to poor performance when retrieving the asset, and should be avoided.\n\
         You should consider archiving and compressing it.",
        n_files
    )
}

/// Prompt used together with [`too_many_files_message`].
pub const PROCEED_PROMPT: &str = "Proceed anyways ?";

/// Answers yes/no questions on behalf of the user.
pub trait Confirm: Send + Sync + fmt::Debug {
    fn confirm(&self, message: &str, prompt: &str) -> bool;
}

/// Never confirms. Used when no terminal is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive;

impl Confirm for NonInteractive {
    fn confirm(&self, message: &str, _prompt: &str) -> bool {
        tracing::warn!("{}", message);
        false
    }
}

/// Always confirms (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, message: &str, _prompt: &str) -> bool {
        tracing::warn!("{}", message);
        true
    }
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, message: &str, prompt: &str) -> bool {
        let mut stderr = io::stderr();
        let _ = writeln!(stderr, "{}", message);
        let _ = write!(stderr, "{} [y/N] ", prompt);
        let _ = stderr.flush();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Require confirmation when `n_files` exceeds the limit.
pub fn check_file_count(n_files: usize, confirm: &dyn Confirm) -> Result<(), AssetError> {
    if n_files <= MAX_FILES_WITHOUT_CONFIRMATION {
        return Ok(());
    }
    let message = too_many_files_message(n_files);
    if confirm.confirm(&message, PROCEED_PROMPT) {
        Ok(())
    } else {
        Err(AssetError::Aborted(format!(
            "push of {} files was not confirmed",
            n_files
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_verbatim() {
        assert_eq!(
            too_many_files_message(51),
            "It looks like you are attempting to push an asset with more than 50 files in it (51).\n\
             This can lead to poor performance when retrieving the asset, and should be avoided.\n\
             You should consider archiving and compressing it."
        );
    }

    #[test]
    fn test_limit_is_exclusive() {
        assert!(check_file_count(50, &NonInteractive).is_ok());
        let err = check_file_count(51, &NonInteractive).unwrap_err();
        assert!(matches!(err, AssetError::Aborted(_)));
        assert!(check_file_count(51, &AssumeYes).is_ok());
    }
}

//! Blocking confirmation prompt in front of destructive actions.
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

#[async_trait]
pub trait Confirm: Send + Sync {
    /// `true` when the user accepted, `false` when dismissed.
    async fn confirm(&self, title: &str, message: &str) -> bool;
}

/// Fixed answer, for `--yes` and tests.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, _title: &str, _message: &str) -> bool {
        self.0
    }
}

/// Asks on the terminal; anything but `y`/`yes` dismisses.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, title: &str, message: &str) -> bool {
        let mut stdout = tokio::io::stdout();
        let prompt = format!("{title}: {message} [y/N] ");
        if let Err(err) = stdout.write_all(prompt.as_bytes()).await {
            warn!(?err, "cannot write confirmation prompt");
            return false;
        }
        let _ = stdout.flush().await;

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(err) => {
                warn!(?err, "cannot read confirmation answer");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[tokio::test]
    async fn auto_confirm() {
        assert!(AutoConfirm(true).confirm("Confirmation", "?").await);
        assert!(!AutoConfirm(false).confirm("Confirmation", "?").await);
    }
}

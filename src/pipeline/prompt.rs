use async_trait::async_trait;
use console::style;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Asks the operator whether an existing output file may be replaced
///
/// Waiting for the answer must not block the runtime, so an interrupt can
/// still cancel the job while the question is open.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OverwritePrompt: Send + Sync {
    async fn confirm_overwrite(&self, path: &Path) -> bool;
}

/// Interactive prompt on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

#[async_trait]
impl OverwritePrompt for ConsolePrompt {
    async fn confirm_overwrite(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        println!("{}", style(format!("File '{}' already exists.", name)).yellow());
        print!("Overwrite? (y/n): ");
        if let Err(e) = std::io::stdout().flush() {
            tracing::debug!("Could not flush prompt: {}", e);
        }

        read_answer(BufReader::new(tokio::io::stdin())).await
    }
}

/// Read one line and tell whether it agrees
pub async fn read_answer<R>(mut reader: R) -> bool
where
    R: AsyncBufRead + Unpin,
{
    let mut answer = String::new();
    match reader.read_line(&mut answer).await {
        Ok(_) => is_yes(&answer),
        Err(e) => {
            tracing::warn!("Could not read answer: {}", e);
            false
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

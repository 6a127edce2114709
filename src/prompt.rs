use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use std::thread;
use tokio::sync::oneshot;

/// Source of the values a person has to type during login
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn email(&self) -> Result<String>;
    async fn password(&self) -> Result<String>;
    async fn mfa_code(&self, description: Option<&str>) -> Result<String>;
}

/// Prompts on the controlling terminal
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn email(&self) -> Result<String> {
        blocking(|| {
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt("Enter your email address")
                .validate_with(|input: &String| {
                    if input.contains('@') {
                        Ok(())
                    } else {
                        Err("Please enter an email address")
                    }
                })
                .interact_text()
                .context("Failed to read email address")
        })
        .await
    }

    async fn password(&self) -> Result<String> {
        blocking(|| {
            Password::with_theme(&ColorfulTheme::default())
                .with_prompt("Enter your password")
                .interact()
                .context("Failed to read password")
        })
        .await
    }

    async fn mfa_code(&self, description: Option<&str>) -> Result<String> {
        if let Some(description) = description {
            println!("{description}");
        }

        blocking(|| {
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt("Enter the code from your authenticator app")
                .validate_with(|input: &String| {
                    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
                        Ok(())
                    } else {
                        Err("The code is numeric")
                    }
                })
                .interact_text()
                .context("Failed to read MFA code")
        })
        .await
    }
}

/// Run a terminal prompt on a detached thread, so a prompt abandoned by a timeout
/// never holds up runtime shutdown
async fn blocking<F>(f: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name("prompt".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        })
        .context("Failed to start prompt thread")?;

    rx.await.context("Prompt thread ended without an answer")?
}

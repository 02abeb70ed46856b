use std::sync::Arc;

use anyhow::Result;
use bridge::EventChannel;
use client_core::{SubmitError, TwoFactorPrompt};
use shared::protocol::BUILD_OUTPUT_CHANNEL;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    task::JoinHandle,
};
use tracing::warn;

/// Echoes backend status lines to stdout.
pub async fn spawn_build_output(events: Arc<dyn EventChannel>) -> Result<JoinHandle<()>> {
    let mut lines = events.subscribe(BUILD_OUTPUT_CHANNEL).await?;
    Ok(tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            match line.as_str() {
                Some(text) => println!("> {text}"),
                None => println!("> {line}"),
            }
        }
    }))
}

/// Reads a verification code from stdin each time the prompt opens.
pub fn spawn_code_reader(prompt: Arc<TwoFactorPrompt>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdin = BufReader::new(io::stdin()).lines();
        loop {
            prompt.opened().await;
            if ask().await.is_err() {
                break;
            }
            let code = match stdin.next_line().await {
                Ok(Some(code)) => code,
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "failed to read verification code");
                    break;
                }
            };
            match prompt.submit(code.trim()).await {
                Ok(()) => {}
                Err(error @ SubmitError::InvalidLength { .. }) => eprintln!("{error}"),
                Err(error) => warn!(%error, "verification code not sent"),
            }
        }
    })
}

async fn ask() -> io::Result<()> {
    let mut stderr = io::stderr();
    stderr
        .write_all(b"Enter the 6-digit verification code: ")
        .await?;
    stderr.flush().await
}

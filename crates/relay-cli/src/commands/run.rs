use anyhow::Result;
use relay_config::RelayConfig;
use relay_runtime::{Orchestrator, Preferences, ResponseStream, StreamEvent};
use std::io::Write;

pub async fn execute(
    config: RelayConfig,
    prompt: &str,
    files: &[String],
    backend: Option<String>,
    model: Option<String>,
    broadcast: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::new(config);

    let stream = if broadcast {
        orchestrator.execute_broadcast(prompt, files).await?
    } else {
        orchestrator
            .execute(prompt, files, Preferences { backend, model })
            .await?
    };

    print_stream(stream, broadcast).await
}

async fn print_stream(mut stream: ResponseStream, label_chunks: bool) -> Result<()> {
    let mut stdout = std::io::stdout();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Chunk { backend, text } => {
                if label_chunks {
                    write!(stdout, "[{backend}] {text}")?;
                } else {
                    write!(stdout, "{text}")?;
                }
                stdout.flush()?;
            }
            StreamEvent::BackendDone { backend } => {
                if label_chunks {
                    writeln!(stdout, "[{backend}] done")?;
                }
            }
            StreamEvent::BackendFailed { backend, error } => {
                eprintln!("[{backend}] failed: {error}");
            }
        }
    }

    writeln!(stdout)?;
    Ok(())
}

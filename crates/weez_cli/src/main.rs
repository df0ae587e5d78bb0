mod cli;
mod logging;

use crate::cli::{Args, Command};
use crate::logging::setup_logging;
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use weez_api::chat::process_chunk_stream;
use weez_api::poller::ProgressCallback;
use weez_api::status::progress_line;
use weez_api::streaming::PlaybackChunkStream;
use weez_api::{
    ChatStreamRequest, ClientConfig, ErrorKind, JobProgressPoller, JobsClient, PollError,
    PollOptions, ProcessingJob, StreamOptions, StreamSummary, StreamingCallback, StreamingChunk,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    setup_logging(args.verbose);

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        override_base_url(&mut config, base_url);
    }
    debug!("Using configuration: {config:?}");

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match args.command {
        Command::Chat {
            query,
            user,
            space,
            conversation,
            once,
            stop_on_error,
        } => {
            let mut request = ChatStreamRequest::new(user, space, query);
            if let Some(conversation_id) = conversation {
                request = request.with_conversation(conversation_id);
            }
            run_chat(&config, &request, once, stop_on_error, &cancel).await
        }
        Command::Poll {
            job_id,
            interval_ms,
            timeout_ms,
            strict,
        } => {
            let options = poll_options(&config, interval_ms, timeout_ms, strict);
            follow_job(&config.jobs_client()?, job_id, options, &cancel).await
        }
        Command::Trigger {
            path,
            body,
            follow,
            interval_ms,
            timeout_ms,
            strict,
        } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body must be valid JSON")?;
            let jobs = config.jobs_client()?;
            let job_id = jobs.trigger(&path, &body).await?;
            println!("{job_id}");
            if follow {
                let options = poll_options(&config, interval_ms, timeout_ms, strict);
                follow_job(&jobs, job_id, options, &cancel).await?;
            }
            Ok(())
        }
        Command::Health => {
            let health = config.chat_client().health().await?;
            println!("{} {}", health.status, health.service);
            Ok(())
        }
        Command::Replay { file, chunk_size } => {
            let transcript = std::fs::read(&file)
                .with_context(|| format!("Failed to read transcript: {}", file.display()))?;
            let mut chunks = PlaybackChunkStream::from_transcript(&transcript, chunk_size);
            let summary = process_chunk_stream(
                &mut chunks,
                &print_callback(),
                &config.stream_options(),
                &cancel,
            )
            .await?;
            report_summary(&summary);
            Ok(())
        }
    }
}

/// `--base-url` points both the chat and the job endpoints at one server
fn override_base_url(config: &mut ClientConfig, base_url: String) {
    config.jobs_base_url = Some(base_url.clone());
    config.api_base_url = base_url;
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            cancel.cancel();
        }
    });
}

async fn run_chat(
    config: &ClientConfig,
    request: &ChatStreamRequest,
    once: bool,
    stop_on_error: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut options: StreamOptions = config.stream_options();
    options.stop_on_error |= stop_on_error;
    let client = config.chat_client().with_options(options);

    if once {
        let response = client.send_once(request).await?;
        println!("{}", response.assistant);
        if let Some(conversation_id) = response.conversation_id {
            eprintln!("conversation: {conversation_id}");
        }
        return Ok(());
    }

    // Transport failures were already printed by the callback
    let summary = client.stream(request, &print_callback(), cancel).await?;
    report_summary(&summary);
    Ok(())
}

/// Tokens go to stdout as they arrive; everything else goes to stderr
fn print_callback() -> StreamingCallback {
    Box::new(|chunk: &StreamingChunk| {
        match chunk {
            StreamingChunk::Token { content } => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(content.as_bytes())?;
                stdout.flush()?;
            }
            StreamingChunk::Error {
                kind: ErrorKind::Protocol,
                message,
            } => eprintln!("\n[server error] {message}"),
            StreamingChunk::Error {
                kind: ErrorKind::Transport,
                message,
            } => eprintln!("\n[connection error] {message}"),
            StreamingChunk::Done { .. } => println!(),
        }
        Ok(())
    })
}

fn report_summary(summary: &StreamSummary) {
    if let Some(conversation_id) = &summary.conversation_id {
        eprintln!("conversation: {conversation_id}");
    }
    info!(
        tokens = summary.tokens,
        errors = summary.errors,
        end = ?summary.end,
        "Stream finished"
    );
}

fn poll_options(
    config: &ClientConfig,
    interval_ms: Option<u64>,
    timeout_ms: Option<u64>,
    strict: bool,
) -> PollOptions {
    let mut options = if strict {
        PollOptions::strict()
    } else {
        config.poll_options()
    };
    options.interval = Duration::from_millis(interval_ms.unwrap_or(config.poll_interval_ms));
    if let Some(timeout_ms) = timeout_ms.or(config.poll_timeout_ms) {
        options.timeout = Some(Duration::from_millis(timeout_ms));
    }
    options
}

async fn follow_job(
    jobs: &JobsClient,
    job_id: String,
    options: PollOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let jobs = Arc::new(jobs.clone());
    let poller = JobProgressPoller::new(jobs).with_options(options);
    let on_progress: ProgressCallback = Box::new(|job: &ProcessingJob| {
        println!("{}", progress_line(job));
    });

    match poller.run(&job_id, &on_progress, cancel).await {
        Ok(job) => {
            if let Some(error) = job.error {
                eprintln!("{}: {error}", job.status);
            }
            Ok(())
        }
        Err(PollError::Stopped) => {
            eprintln!("Stopped following job {job_id}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

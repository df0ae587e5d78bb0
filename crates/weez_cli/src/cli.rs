use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask a question and stream the answer to stdout
    Chat {
        query: String,

        #[arg(long, default_value = "cli")]
        user: String,

        #[arg(long)]
        space: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Use the buffered endpoint instead of streaming
        #[arg(long)]
        once: bool,

        /// Stop reading after the first server error message
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Follow the progress of a background job until it finishes
    Poll {
        job_id: String,

        #[arg(long)]
        interval_ms: Option<u64>,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Fail on failed/cancelled jobs and time out after 30 minutes unless --timeout-ms is given
        #[arg(long)]
        strict: bool,
    },

    /// Start a background job and print its id
    Trigger {
        /// Endpoint path, e.g. /metadata/ingest
        path: String,

        /// JSON request body
        #[arg(long, default_value = "{}")]
        body: String,

        /// Keep polling the started job until it finishes
        #[arg(long)]
        follow: bool,

        /// Poll interval while following
        #[arg(long, requires = "follow")]
        interval_ms: Option<u64>,

        /// Give up following after this many milliseconds
        #[arg(long, requires = "follow")]
        timeout_ms: Option<u64>,

        /// Follow with failure on failed/cancelled jobs and a 30 minute limit
        #[arg(long, requires = "follow")]
        strict: bool,
    },

    /// Check that the chat service is up
    Health,

    /// Decode a captured event-stream transcript offline
    Replay {
        file: PathBuf,

        /// Feed the decoder this many bytes at a time (0 = whole file)
        #[arg(long, default_value_t = 0)]
        chunk_size: usize,
    },
}

/// Command line client for the Weez chat and job services
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a weez.json configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override both the chat and the jobs base URL from the configuration
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn parse() -> Self {
        <Args as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_chat_args_parsing() {
        let args = Args::try_parse_from(["weez", "chat", "hello", "--space", "s-1"])
            .expect("Failed to parse chat args");

        assert_eq!(args.verbose, 0);
        assert!(args.config.is_none());
        match args.command {
            Command::Chat {
                query,
                user,
                space,
                conversation,
                once,
                stop_on_error,
            } => {
                assert_eq!(query, "hello");
                assert_eq!(user, "cli");
                assert_eq!(space, "s-1");
                assert!(conversation.is_none());
                assert!(!once);
                assert!(!stop_on_error);
            }
            other => panic!("Expected chat command, got {other:?}"),
        }
    }

    #[test]
    fn test_verbose_flag_counting() {
        let args = Args::try_parse_from(["weez", "-vv", "health"]).expect("Failed to parse args");
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["weez", "health", "-v"]).expect("Failed to parse args");
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_poll_args() {
        let args = Args::try_parse_from([
            "weez",
            "--base-url",
            "http://jobs.local",
            "poll",
            "job-1",
            "--strict",
            "--timeout-ms",
            "5000",
        ])
        .expect("Failed to parse poll args");

        assert_eq!(args.base_url.as_deref(), Some("http://jobs.local"));
        match args.command {
            Command::Poll {
                job_id,
                interval_ms,
                timeout_ms,
                strict,
            } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(interval_ms, None);
                assert_eq!(timeout_ms, Some(5000));
                assert!(strict);
            }
            other => panic!("Expected poll command, got {other:?}"),
        }
    }

    #[test]
    fn test_trigger_follow_takes_poll_flags() {
        let args = Args::try_parse_from([
            "weez",
            "trigger",
            "/metadata/ingest",
            "--follow",
            "--strict",
            "--interval-ms",
            "1000",
        ])
        .expect("Failed to parse trigger args");

        match args.command {
            Command::Trigger {
                path,
                body,
                follow,
                interval_ms,
                timeout_ms,
                strict,
            } => {
                assert_eq!(path, "/metadata/ingest");
                assert_eq!(body, "{}");
                assert!(follow);
                assert_eq!(interval_ms, Some(1000));
                assert_eq!(timeout_ms, None);
                assert!(strict);
            }
            other => panic!("Expected trigger command, got {other:?}"),
        }

        assert!(Args::try_parse_from(["weez", "trigger", "/x", "--strict"]).is_err());
    }

    #[test]
    fn test_replay_requires_file() {
        assert!(Args::try_parse_from(["weez", "replay"]).is_err());
        let args = Args::try_parse_from(["weez", "replay", "capture.sse", "--chunk-size", "7"])
            .expect("Failed to parse replay args");
        match args.command {
            Command::Replay { file, chunk_size } => {
                assert_eq!(file, PathBuf::from("capture.sse"));
                assert_eq!(chunk_size, 7);
            }
            other => panic!("Expected replay command, got {other:?}"),
        }
    }
}

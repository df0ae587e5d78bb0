use std::io;

/// Log to stderr so streamed answers on stdout stay clean
pub fn setup_logging(verbose_level: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let filter_str = match verbose_level {
            0 => "warn,weez_api=info,weez=info",
            1 => "info,weez_api=debug,weez=debug",
            _ => "debug,weez_api=trace,weez=trace",
        };
        tracing_subscriber::EnvFilter::new(filter_str)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(|| Box::new(io::stderr()) as Box<dyn io::Write + Send>)
        .init();
}

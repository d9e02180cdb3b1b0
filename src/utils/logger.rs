use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter(verbose: bool, level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { level };
        EnvFilter::new(format!("epi_analytics={level},epi={level},warn"))
    })
}

pub fn init_cli_logger(verbose: bool, level: &str) {
    tracing_subscriber::registry()
        .with(default_filter(verbose, level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

/// Structured output for log shippers; selected with `logging.format = "json"`.
pub fn init_json_logger(verbose: bool, level: &str) {
    tracing_subscriber::registry()
        .with(default_filter(verbose, level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .json(),
        )
        .init();
}

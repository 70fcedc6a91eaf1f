use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber for a binary.
///
/// Verbosity comes from `RUST_LOG` and falls back to `info`. `format` is the
/// configured `log_format`; `"json"` switches to one JSON object per event.
pub fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        // A subscriber is already installed (tests, embedding); keep it.
        eprintln!("Tracing subscriber not installed: {}", e);
    }
}

//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,session=debug,pipeline=debug,vibebench=debug,tower_http=info").
//! - LOG_FORMAT selects "pretty" (default), "compact", or "json" structured logs
//!   (one object per line, with the current span list for request correlation).
//!
//! Tower HTTP TraceLayer adds per-request spans on top of this.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,session=debug,pipeline=debug,vibebench=debug,tower_http=info,axum=info";

pub fn init_tracing() {
  let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_file(true)
    .with_line_number(true);

  // JSON vs pretty are different subscriber types, so init inside each arm.
  match std::env::var("LOG_FORMAT").as_deref() {
    Ok("json") => builder.json().with_current_span(true).with_span_list(true).init(),
    Ok("compact") => builder.compact().init(),
    _ => builder.init(),
  }
}

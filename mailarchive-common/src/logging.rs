use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg)*)
    }};
}

/// Intake of data from the outside world (submissions, syslog lines)
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::incoming!(level = TRACE, $($msg)*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg)*)
    };

    ($($msg:tt)*) => {
        $crate::internal!(level = TRACE, $($msg)*)
    };
}

/// Environment variable holding the wanted log level
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Prefix shared by the targets of every crate in the archive
const ARCHIVE_TARGET: &str = "mailarchive";

/// Parse a level such as `debug` or `WARN`. An unset or unknown value gives
/// `default`, with the rejected value handed back so it can be reported once
/// logging is up.
fn parse_level(value: Option<&str>, default: LevelFilter) -> (LevelFilter, Option<String>) {
    match value.map(str::trim) {
        None | Some("") => (default, None),
        Some(value) => LevelFilter::from_str(value)
            .map_or_else(|_| (default, Some(value.to_owned())), |level| (level, None)),
    }
}

fn is_archive_target(target: &str) -> bool {
    target
        .strip_prefix(ARCHIVE_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(['_', ':']))
}

/// Install the global subscriber.
///
/// The level comes from `LOG_LEVEL`, falling back to TRACE for debug builds
/// and INFO otherwise. Only events from the archive's own crates are shown.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let configured = std::env::var(LOG_LEVEL_ENV).ok();
    let (level, rejected) = parse_level(configured.as_deref(), default);

    let output = tracing_subscriber::fmt::layer()
        .compact()
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .with_filter(level)
        .with_filter(FilterFn::new(|metadata| {
            is_archive_target(metadata.target())
        }));

    tracing_subscriber::Registry::default().with(output).init();

    if let Some(rejected) = rejected {
        tracing::warn!("Unknown {LOG_LEVEL_ENV} value {rejected:?}, using {default}");
    }
}

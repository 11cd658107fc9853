use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt};
use std::sync::OnceLock;

static LOG_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Install the global subscriber once. `RUST_LOG` overrides the `info`
/// default. Output goes to stderr so stdout stays free for reports.
pub fn setup_logging(format: LogFormat) {
    LOG_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let (json_layer, fmt_layer) = match format {
            LogFormat::Json => (
                Some(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                ),
                None,
            ),
            LogFormat::Pretty => (
                None,
                Some(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                ),
            ),
        };

        // a subscriber installed by the host wins
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .with(fmt_layer)
            .try_init();
    });
}

#[macro_export]
macro_rules! log_stage {
    ($level:ident, $stage:expr, $($arg:tt)*) => {
        tracing::$level!(
            target: "stage",
            stage = %$stage,
            $($arg)*
        );
    };
}

#[macro_export]
macro_rules! log_turn {
    ($level:ident, $session:expr, $($arg:tt)*) => {
        tracing::$level!(
            target: "turn",
            session = %$session,
            $($arg)*
        );
    };
}

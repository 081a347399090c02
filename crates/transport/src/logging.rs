//! Log output for the `transport` binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How chatty the server is, picked with `-q` / `-v` on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Trace,
}

impl Verbosity {
    /// Filter directives: our own events at the chosen level, the HTTP and
    /// mail stacks one step quieter.
    pub fn directives(self) -> String {
        let (ours, deps) = match self {
            Self::Quiet => ("error", "error"),
            Self::Normal => ("info", "warn"),
            Self::Verbose => ("debug", "info"),
            Self::Trace => ("trace", "debug"),
        };
        format!("{deps},transport={ours},tower_http={deps},axum={deps},lettre={deps}")
    }
}

/// Installs the global subscriber. `RUST_LOG`, when set, replaces the
/// directives picked by `verbosity`.
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directives()));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true));

    // Tests call this more than once.
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives() {
        assert_eq!(
            Verbosity::Normal.directives(),
            "warn,transport=info,tower_http=warn,axum=warn,lettre=warn"
        );
        assert!(Verbosity::Trace.directives().contains("transport=trace"));
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Normal,
            Verbosity::Verbose,
            Verbosity::Trace,
        ] {
            assert!(EnvFilter::try_new(verbosity.directives()).is_ok());
        }
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(Verbosity::Quiet);
        init_logging(Verbosity::Verbose);
    }
}

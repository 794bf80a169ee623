use snafu::{Location, Snafu};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum LogError {
    #[snafu(display("Failed to create log file {path}"))]
    LogFile {
        path: String,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Failed to build trace exporter"))]
    Exporter {
        source: opentelemetry_otlp::ExporterBuildError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Logging is already initialized"))]
    AlreadyInitialized {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        location: Location,
    },
}

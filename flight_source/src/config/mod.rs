pub mod settings;
pub mod source_options;

use snafu::{Location, Snafu};

use crate::location::LocationError;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("Malformed default location: {source}"))]
    MalformedLocation {
        source: LocationError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Invalid value '{value}' for parameter {parameter}: {explanation}"))]
    InvalidParameterValue {
        parameter: String,
        value: String,
        explanation: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Parameter {parameter} requires {required} to be set"))]
    IncompleteParameters {
        parameter: String,
        required: String,
        #[snafu(implicit)]
        location: Location,
    },
}

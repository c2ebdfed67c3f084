//! Fatal error type shared by the whole engine
//!
//! Recoverable problems never reach this type: they are corrected in place and
//! reported through [`crate::diagnostics`]. Everything here aborts the current
//! operation (an instrument's construction, a dispatch call, or the run).

use std::fmt;

/// A fatal engine error
#[derive(Debug)]
pub enum EngineError {
    /// A required function table was never made
    MissingTable { who: String, slot: u32 },
    /// Slot 0 (or a slot beyond the table limit) was addressed
    InvalidSlot(u32),
    /// A gen routine rejected its arguments
    Gen { kind: String, message: String },
    /// Instrument asked for a channel it does not have
    InvalidChannel {
        who: String,
        channel: usize,
        available: usize,
    },
    /// Instrument parameter that cannot be corrected
    Parameter { who: String, message: String },
    /// Too few parameters for an instrument
    MissingParameters {
        who: String,
        given: usize,
        required: usize,
    },
    /// Bad bus number or malformed bus_config string
    BusConfig(String),
    /// Aux bus routing forms a loop
    BusCycle(Vec<usize>),
    /// Filter with zero or negative bandwidth
    Bandwidth { who: String, bandwidth: f32 },
    /// Null list passed across the dispatch boundary
    NullList { func: String, arg: usize },
    /// Empty list passed across the dispatch boundary
    EmptyList { func: String, arg: usize },
    /// List inside a list passed across the dispatch boundary
    NestedList { func: String },
    /// List holding something other than floats in a non-final position
    MixedList { func: String, arg: usize },
    /// Argument with no usable type
    InvalidArgument { func: String, arg: usize },
    /// Argument of the wrong type for the called function
    ArgumentType {
        func: String,
        arg: usize,
        expected: &'static str,
    },
    /// Operator with no binary-field meaning (e.g. unary negation)
    InvalidOperator(String),
    /// Function name not registered
    UnknownFunction(String),
    /// Invalid engine configuration
    Config(String),
    /// Score file problem
    Score(String),
    /// Underlying I/O failure
    Io(std::io::Error),
    /// WAV read/write failure
    Wav(hound::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::MissingTable { who, slot } => {
                write!(f, "{who}: you haven't made function table {slot}")
            }
            EngineError::InvalidSlot(slot) => write!(f, "invalid function table slot {slot}"),
            EngineError::Gen { kind, message } => write!(f, "gen {kind}: {message}"),
            EngineError::InvalidChannel {
                who,
                channel,
                available,
            } => write!(
                f,
                "{who}: you asked for channel {channel} of a {available}-channel input"
            ),
            EngineError::Parameter { who, message } => write!(f, "{who}: {message}"),
            EngineError::MissingParameters {
                who,
                given,
                required,
            } => write!(
                f,
                "{who}: needs at least {required} parameters, got {given}"
            ),
            EngineError::BusConfig(message) => write!(f, "bus config error: {message}"),
            EngineError::BusCycle(buses) => {
                write!(f, "bus config error: aux buses form a loop ({buses:?})")
            }
            EngineError::Bandwidth { who, bandwidth } => {
                write!(f, "{who}: bandwidth must be greater than 0 (got {bandwidth})")
            }
            EngineError::NullList { func, arg } => {
                write!(f, "can't pass a null list (arg {arg}) to function {func}()")
            }
            EngineError::EmptyList { func, arg } => {
                write!(f, "can't pass an empty list (arg {arg}) to function {func}()")
            }
            EngineError::NestedList { func } => {
                write!(f, "no nested lists can be passed to function {func}()")
            }
            EngineError::MixedList { func, arg } => {
                write!(f, "can't pass a mixed-type list (arg {arg}) to function {func}()")
            }
            EngineError::InvalidArgument { func, arg } => {
                write!(f, "{func}(): arg {arg}: invalid argument type")
            }
            EngineError::ArgumentType {
                func,
                arg,
                expected,
            } => write!(f, "{func}(): arg {arg} must be a {expected}"),
            EngineError::InvalidOperator(op) => {
                write!(f, "invalid binary handle operator '{op}'")
            }
            EngineError::UnknownFunction(name) => write!(f, "function {name}() not found"),
            EngineError::Config(message) => write!(f, "configuration error: {message}"),
            EngineError::Score(message) => write!(f, "score error: {message}"),
            EngineError::Io(e) => write!(f, "I/O error: {e}"),
            EngineError::Wav(e) => write!(f, "WAV error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            EngineError::Wav(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}

impl From<hound::Error> for EngineError {
    fn from(e: hound::Error) -> Self {
        EngineError::Wav(e)
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Score(e.to_string())
    }
}

/// Errors raised while building or normalizing grammars.
///
/// Rejected input is not an error, see [`crate::ParseResult::Rejected`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid range: first byte {first:#04x} is above last byte {last:#04x}")]
    InvalidRange { first: u8, last: u8 },

    #[error("invalid bounds: upper bound {upper} is below lower bound {lower}")]
    InvalidBounds { lower: u32, upper: u32 },

    #[error("called rule '{rule}' is not defined in grammar {grammar}")]
    UnresolvedRule { rule: String, grammar: String },

    #[error("rule '{0}' is defined more than once")]
    DuplicateRule(String),

    #[error("rule '{0}' has no production")]
    EmptyRule(String),

    #[error("repetition of an empty element requires at least {lower} repetitions")]
    InvalidRepetition { lower: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

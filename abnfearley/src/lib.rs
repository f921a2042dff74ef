//! ABNF grammars, their normalization and an Earley recognizer producing a
//! shared parse forest over byte input.

mod error;
pub use crate::error::{Error, Result};

mod element;
pub use crate::element::{Element, LiteralRange, LiteralString, Repetition};

mod grammar;
pub use crate::grammar::{Grammar, GrammarBuilder, Rule};

mod normalize;
pub use crate::normalize::{is_grammar_normalized, is_normalized, normalize, normalize_grammar};

mod items;
mod recognizer;
pub use crate::recognizer::{
    recognize, Limit, Limits, ParseResult, RejectReason, Rejection, Recognizer};

mod forest;
pub use crate::forest::{Derivation, ForestNode, Label, NodeIndex, ParseForest, Tree};

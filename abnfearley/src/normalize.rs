use crate::element::{Element, Repetition};
use crate::error::{Error, Result};
use crate::grammar::Grammar;

/// Outcome of normalizing an element.
#[derive(Debug)]
enum Normal {
    Element(Element),
    /// Produces the empty sequence only
    Epsilon,
    /// Produces nothing at all
    Void,
}

/// Rewrite `element` into its canonical minimal equivalent.
///
/// Returns `None` when the element only produces the empty sequence. An
/// element without any derivation normalizes to the empty `Alternation`.
pub fn normalize(element: &Element) -> Result<Option<Element>> {
    Ok(match reduce(element)? {
        Normal::Element(element) => Some(element),
        Normal::Epsilon => None,
        Normal::Void => Some(Element::Alternation(Vec::new())),
    })
}

/// Normalize every rule of the grammar and of its imports. A rule that only
/// produces the empty sequence becomes the empty `Concatenation`.
pub fn normalize_grammar(grammar: &Grammar) -> Result<Grammar> {
    let imports = grammar.imports().iter()
        .map(normalize_grammar)
        .collect::<Result<Vec<_>>>()?;
    let mut rules = Vec::with_capacity(grammar.len());
    for rule in grammar.rules() {
        let element = match reduce(rule.element())? {
            Normal::Element(element) => element,
            Normal::Epsilon => Element::Concatenation(Vec::new()),
            Normal::Void => return Err(Error::EmptyRule(rule.name().to_string())),
        };
        rules.push((rule.name(), element));
    }
    tracing::debug!(grammar = grammar.name(), "normalized grammar");
    Grammar::new(grammar.name(), rules, imports)
}

/// Check if `normalize` would leave `element` unchanged.
pub fn is_normalized(element: &Element) -> bool {
    match element {
        Element::Alternation(alternatives) => alternatives.is_empty() || (
            alternatives.len() > 1 && alternatives.iter()
                .all(|a| is_live(a) && !matches!(a, Element::Alternation(_)))),
        Element::Concatenation(elements) => elements.len() > 1 && elements.iter()
            .all(|e| is_live(e) && !matches!(e, Element::Concatenation(_))),
        Element::Repetition(rep) => {
            let trivial = matches!((rep.lower(), rep.upper()), (0, Some(0)) | (1, Some(1)));
            let mergeable = match rep.element() {
                Element::Repetition(nested) => merged_bounds(
                    rep.lower(), rep.upper(), nested.lower(), nested.upper()).is_some(),
                _ => false,
            };
            !trivial && !mergeable && is_live(rep.element())
        }
        Element::LiteralString(_) | Element::LiteralRange(_) | Element::RuleCall(_) => true,
    }
}

pub fn is_grammar_normalized(grammar: &Grammar) -> bool {
    grammar.rules().iter().all(|rule| match rule.element() {
        Element::Concatenation(elements) if elements.is_empty() => true,
        Element::Alternation(alternatives) if alternatives.is_empty() => false,
        element => is_normalized(element),
    }) && grammar.imports().iter().all(is_grammar_normalized)
}

// Normalized and able to produce something
fn is_live(element: &Element) -> bool {
    is_normalized(element) && !matches!(element, Element::Alternation(a) if a.is_empty())
}

fn reduce(element: &Element) -> Result<Normal> {
    match element {
        Element::Alternation(alternatives) => reduce_alternation(alternatives),
        Element::Concatenation(elements) => reduce_concatenation(elements),
        Element::Repetition(rep) => {
            let inner = reduce(rep.element())?;
            reduce_repetition(inner, rep.lower(), rep.upper())
        }
        Element::LiteralString(_) | Element::LiteralRange(_) | Element::RuleCall(_) =>
            Ok(Normal::Element(element.clone())),
    }
}

fn reduce_alternation(alternatives: &[Element]) -> Result<Normal> {
    let mut live = Vec::with_capacity(alternatives.len());
    let mut nullable = false;
    for alternative in alternatives {
        match reduce(alternative)? {
            Normal::Element(Element::Alternation(nested)) => live.extend(nested),
            Normal::Element(element) => live.push(element),
            Normal::Epsilon => nullable = true,
            Normal::Void => (),
        }
    }
    let element = match live.len() {
        0 if nullable => return Ok(Normal::Epsilon),
        0 => return Ok(Normal::Void),
        1 => live.swap_remove(0),
        _ => Element::Alternation(live),
    };
    // An empty alternative makes the rest optional
    if nullable {
        reduce_repetition(Normal::Element(element), 0, Some(1))
    } else {
        Ok(Normal::Element(element))
    }
}

fn reduce_concatenation(elements: &[Element]) -> Result<Normal> {
    let mut live = Vec::with_capacity(elements.len());
    let mut void = false;
    for element in elements {
        match reduce(element)? {
            Normal::Element(Element::Concatenation(nested)) => live.extend(nested),
            Normal::Element(element) => live.push(element),
            Normal::Epsilon => (),
            Normal::Void => void = true,
        }
    }
    Ok(match live.len() {
        _ if void => Normal::Void,
        0 => Normal::Epsilon,
        1 => Normal::Element(live.swap_remove(0)),
        _ => Normal::Element(Element::Concatenation(live)),
    })
}

// `inner` is already normalized
fn reduce_repetition(inner: Normal, lower: u32, upper: Option<u32>) -> Result<Normal> {
    let element = match inner {
        Normal::Element(element) => element,
        Normal::Epsilon if lower == 0 => return Ok(Normal::Epsilon),
        Normal::Epsilon => return Err(Error::InvalidRepetition { lower }),
        Normal::Void if lower == 0 => return Ok(Normal::Epsilon),
        Normal::Void => return Ok(Normal::Void),
    };
    match (lower, upper) {
        (0, Some(0)) => return Ok(Normal::Epsilon),
        (1, Some(1)) => return Ok(Normal::Element(element)),
        _ => (),
    }
    if let Element::Repetition(nested) = &element {
        if let Some((merged_lower, merged_upper)) =
                merged_bounds(lower, upper, nested.lower(), nested.upper()) {
            tracing::trace!(%element, lower, ?upper, merged_lower, ?merged_upper,
                            "merging nested repetition");
            let inner = Normal::Element(nested.element().clone());
            return reduce_repetition(inner, merged_lower, merged_upper);
        }
    }
    Ok(Normal::Element(Element::Repetition(Repetition::new(element, lower, upper)?)))
}

/// Bounds of a single repetition admitting exactly the repeat counts of
/// `lower*upper(inner_lower*inner_upper x)`, if there is one.
///
/// The nested form admits the union of `[k*inner_lower, k*inner_upper]` for
/// every outer count `k`. The union is an interval iff consecutive intervals
/// touch, and the first gap (smallest `k`) is the widest.
fn merged_bounds(
    lower: u32,
    upper: Option<u32>,
    inner_lower: u32,
    inner_upper: Option<u32>,
) -> Option<(u32, Option<u32>)> {
    let contiguous = upper == Some(lower) || match inner_upper {
        None => lower > 0 || inner_lower <= 1,
        Some(inner_upper) => lower.checked_mul(inner_upper - inner_lower)
            .and_then(|reach| reach.checked_add(1))
            .is_some_and(|reach| inner_lower <= reach),
    };
    if !contiguous {
        return None;
    }
    let merged_upper = match (upper, inner_upper) {
        (Some(upper), Some(inner_upper)) => Some(upper.checked_mul(inner_upper)?),
        _ => None,
    };
    Some((lower.checked_mul(inner_lower)?, merged_upper))
}

///////////////////////////////////////////////////////////////////////////////

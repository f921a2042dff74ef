use crate::error::{Error, Result};
use crate::grammar::{Grammar, Rule};
use std::fmt;

/// One ABNF production. Values are immutable and compare structurally.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Element {
    /// Exactly one of the alternatives
    Alternation(Vec<Element>),
    /// All elements in order
    Concatenation(Vec<Element>),
    Repetition(Repetition),
    LiteralString(LiteralString),
    LiteralRange(LiteralRange),
    /// Production deferred to the named rule
    RuleCall(String),
}

/// `element` repeated between `lower` and `upper` times (`upper: None` is
/// unbounded). `upper >= lower` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Repetition {
    element: Box<Element>,
    lower: u32,
    upper: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LiteralString {
    bytes: Vec<u8>,
    case_sensitive: bool,
}

/// A single byte within `first..=last`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LiteralRange {
    first: u8,
    last: u8,
}

impl Repetition {
    pub fn new(element: Element, lower: u32, upper: Option<u32>) -> Result<Self> {
        match upper {
            Some(upper) if upper < lower => Err(Error::InvalidBounds { lower, upper }),
            _ => Ok(Repetition { element: Box::new(element), lower, upper }),
        }
    }

    pub fn element(&self) -> &Element { &self.element }
    pub fn lower(&self) -> u32 { self.lower }
    pub fn upper(&self) -> Option<u32> { self.upper }

    /// `count` repetitions are enough to produce this repetition.
    pub fn is_satisfied_by(&self, count: u32) -> bool {
        count >= self.lower && self.upper.is_none_or(|upper| count <= upper)
    }

    /// One more repetition may follow `count` completed ones.
    pub fn allows_another(&self, count: u32) -> bool {
        self.upper.is_none_or(|upper| count < upper)
    }
}

impl LiteralString {
    pub fn new(bytes: impl Into<Vec<u8>>, case_sensitive: bool) -> Self {
        LiteralString { bytes: bytes.into(), case_sensitive }
    }

    pub fn bytes(&self) -> &[u8] { &self.bytes }
    pub fn case_sensitive(&self) -> bool { self.case_sensitive }
    pub fn len(&self) -> usize { self.bytes.len() }
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// Check `byte` against the byte at `offset` of the literal.
    pub fn matches_at(&self, offset: usize, byte: u8) -> bool {
        match self.bytes.get(offset) {
            Some(&expected) if self.case_sensitive => expected == byte,
            Some(expected) => expected.eq_ignore_ascii_case(&byte),
            None => false,
        }
    }
}

impl LiteralRange {
    pub fn new(first: u8, last: u8) -> Result<Self> {
        if first > last {
            return Err(Error::InvalidRange { first, last });
        }
        Ok(LiteralRange { first, last })
    }

    pub fn first(&self) -> u8 { self.first }
    pub fn last(&self) -> u8 { self.last }

    pub fn contains(&self, byte: u8) -> bool {
        (self.first..=self.last).contains(&byte)
    }
}

impl Element {
    pub fn alternation(alternatives: impl IntoIterator<Item = Element>) -> Self {
        Element::Alternation(alternatives.into_iter().collect())
    }

    pub fn concatenation(elements: impl IntoIterator<Item = Element>) -> Self {
        Element::Concatenation(elements.into_iter().collect())
    }

    pub fn repetition(element: Element, lower: u32, upper: Option<u32>) -> Result<Self> {
        Ok(Element::Repetition(Repetition::new(element, lower, upper)?))
    }

    /// `[element]`, ie: `0*1element`
    pub fn optional(element: Element) -> Self {
        Element::Repetition(Repetition { element: Box::new(element), lower: 0, upper: Some(1) })
    }

    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Element::LiteralString(LiteralString::new(bytes, true))
    }

    pub fn string_nocase(bytes: impl Into<Vec<u8>>) -> Self {
        Element::LiteralString(LiteralString::new(bytes, false))
    }

    pub fn range(first: u8, last: u8) -> Result<Self> {
        Ok(Element::LiteralRange(LiteralRange::new(first, last)?))
    }

    pub fn byte(byte: u8) -> Self {
        Element::LiteralRange(LiteralRange { first: byte, last: byte })
    }

    pub fn call(name: impl Into<String>) -> Self {
        Element::RuleCall(name.into())
    }

    /// Check if the element can produce the empty byte sequence.
    /// Rule calls are followed through `grammar`, and inside a called rule
    /// through the grammar defining it. Unresolved calls are not nullable.
    pub fn is_nullable(&self, grammar: &Grammar) -> bool {
        self.nullable_on_path(grammar, &mut Vec::new())
    }

    // A rule already being expanded on this path can't contribute a shorter
    // empty derivation, so it counts as not nullable here. Rules are told
    // apart by identity since imports may reuse a name.
    fn nullable_on_path<'a>(&'a self, grammar: &'a Grammar, path: &mut Vec<&'a Rule>) -> bool {
        match self {
            Element::Alternation(alternatives) =>
                alternatives.iter().any(|a| a.nullable_on_path(grammar, path)),
            Element::Concatenation(elements) =>
                elements.iter().all(|e| e.nullable_on_path(grammar, path)),
            Element::Repetition(rep) =>
                rep.lower == 0 || rep.element.nullable_on_path(grammar, path),
            Element::LiteralString(string) => string.is_empty(),
            Element::LiteralRange(_) => false,
            Element::RuleCall(name) => {
                let Ok((owner, rule)) = grammar.resolve(name) else { return false };
                if path.iter().any(|&on_path| std::ptr::eq(on_path, rule)) {
                    return false;
                }
                path.push(rule);
                let nullable = rule.element().nullable_on_path(owner, path);
                path.pop();
                nullable
            }
        }
    }

    /// Visit every rule name called from this element, in order.
    pub fn visit_calls<'a, F: FnMut(&'a str)>(&'a self, visit: &mut F) {
        match self {
            Element::Alternation(children) | Element::Concatenation(children) => {
                for child in children {
                    child.visit_calls(visit);
                }
            }
            Element::Repetition(rep) => rep.element.visit_calls(visit),
            Element::RuleCall(name) => visit(name.as_str()),
            Element::LiteralString(_) | Element::LiteralRange(_) => (),
        }
    }

    fn write_abnf(&self, f: &mut fmt::Formatter, needs_parens: bool) -> fmt::Result {
        match self {
            Element::Alternation(children) => write_list(f, children, " / ", needs_parens),
            Element::Concatenation(children) => write_list(f, children, " ", needs_parens),
            Element::Repetition(rep) => match (rep.lower, rep.upper) {
                (0, Some(0)) => write!(f, "()"),
                (1, Some(1)) => rep.element.write_abnf(f, needs_parens),
                (lower, Some(upper)) if lower == upper => {
                    write!(f, "{}", lower)?;
                    rep.element.write_abnf(f, true)
                }
                (0, None) => {
                    write!(f, "*")?;
                    rep.element.write_abnf(f, true)
                }
                (lower, None) => {
                    write!(f, "{}*", lower)?;
                    rep.element.write_abnf(f, true)
                }
                (0, Some(1)) => {
                    write!(f, "[")?;
                    rep.element.write_abnf(f, false)?;
                    write!(f, "]")
                }
                (lower, Some(upper)) => {
                    write!(f, "{}*{}", lower, upper)?;
                    rep.element.write_abnf(f, true)
                }
            },
            Element::LiteralString(string) => write_string(f, string, needs_parens),
            Element::LiteralRange(range) =>
                write!(f, "%x{:02X}-{:02X}", range.first, range.last),
            Element::RuleCall(name) => write!(f, "{}", name),
        }
    }
}

fn write_list(
    f: &mut fmt::Formatter,
    children: &[Element],
    separator: &str,
    needs_parens: bool,
) -> fmt::Result {
    match children {
        [] => write!(f, "()"),
        [single] => single.write_abnf(f, needs_parens),
        _ => {
            if needs_parens { write!(f, "(")?; }
            for (idx, child) in children.iter().enumerate() {
                if idx > 0 { write!(f, "{}", separator)?; }
                child.write_abnf(f, true)?;
            }
            if needs_parens { write!(f, ")")?; }
            Ok(())
        }
    }
}

// Printable bytes go into quoted char-vals, everything else (and the quote
// itself) into dotted %x sequences.
fn write_string(f: &mut fmt::Formatter, string: &LiteralString, needs_parens: bool) -> fmt::Result {
    if string.is_empty() {
        return write!(f, "\"\"");
    }
    let printable = |b: u8| (0x20..=0x7e).contains(&b) && b != b'"';
    let mut parts = Vec::new();
    for chunk in string.bytes.chunk_by(|a, b| printable(*a) == printable(*b)) {
        if printable(chunk[0]) {
            let prefix = if string.case_sensitive { "%s" } else { "" };
            let text: String = chunk.iter().map(|&b| b as char).collect();
            parts.push(format!("{}\"{}\"", prefix, text));
        } else {
            let hex: Vec<_> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
            parts.push(format!("%x{}", hex.join(".")));
        }
    }
    if needs_parens && parts.len() != 1 {
        write!(f, "({})", parts.join(" "))
    } else {
        write!(f, "{}", parts.join(" "))
    }
}

/// ABNF text of the element
impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_abnf(f, false)
    }
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{Element, Error, LiteralString};
    use crate::grammar::GrammarBuilder;
    use std::collections::HashSet;

    #[test]
    fn element_structural_eq_hash() {
        let a = Element::concatenation([Element::string("a"), Element::call("b")]);
        let b = Element::concatenation([Element::string("a"), Element::call("b")]);
        assert_eq!(a, b);
        assert_ne!(a, Element::concatenation([Element::string_nocase("a"), Element::call("b")]));
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn invalid_bounds() {
        assert_eq!(
            Element::repetition(Element::string("x"), 3, Some(2)).unwrap_err(),
            Error::InvalidBounds { lower: 3, upper: 2 });
        assert!(Element::repetition(Element::string("x"), 2, Some(2)).is_ok());
        assert!(Element::repetition(Element::string("x"), 7, None).is_ok());
    }

    #[test]
    fn invalid_range() {
        assert_eq!(Element::range(b'z', b'a').unwrap_err(),
                   Error::InvalidRange { first: b'z', last: b'a' });
        assert!(Element::range(b'a', b'a').is_ok());
    }

    #[test]
    fn string_matching() {
        let s = LiteralString::new("AbC", false);
        assert!(s.matches_at(0, b'a') && s.matches_at(1, b'B') && s.matches_at(2, b'c'));
        assert!(!s.matches_at(3, b'c'));
        let s = LiteralString::new("AbC", true);
        assert!(s.matches_at(0, b'A'));
        assert!(!s.matches_at(0, b'a'));
    }

    #[test]
    fn nullable() {
        // a = *"x" / b ; b = "y" b ; c = a "z"
        let g = GrammarBuilder::new("n")
            .rule("a", Element::alternation([
                Element::repetition(Element::string("x"), 0, None).unwrap(),
                Element::call("b")]))
            .rule("b", Element::concatenation([Element::string("y"), Element::call("b")]))
            .rule("c", Element::concatenation([Element::call("a"), Element::string("z")]))
            .rule("d", Element::concatenation([Element::call("d"), Element::call("a")]))
            .rule("e", Element::concatenation([Element::call("a"), Element::string("")]))
            .into_grammar()
            .unwrap();
        assert!(Element::call("a").is_nullable(&g));
        assert!(!Element::call("b").is_nullable(&g));
        assert!(!Element::call("c").is_nullable(&g));
        assert!(!Element::call("d").is_nullable(&g));
        assert!(Element::call("e").is_nullable(&g));
        assert!(!Element::byte(b'x').is_nullable(&g));
        assert!(Element::concatenation([]).is_nullable(&g));
        assert!(!Element::alternation([]).is_nullable(&g));
    }

    #[test]
    fn nullable_in_defining_grammar() {
        // opt = sep sep in lib with sep = ",", the importer defines an empty sep
        let lib = GrammarBuilder::new("lib")
            .rule("opt", Element::concatenation([Element::call("sep"), Element::call("sep")]))
            .rule("sep", Element::string(","))
            .into_grammar()
            .unwrap();
        let g = GrammarBuilder::new("g")
            .rule("sep", Element::string(""))
            .rule("top", Element::call("opt"))
            .import(lib.clone())
            .into_grammar()
            .unwrap();
        assert!(Element::call("sep").is_nullable(&g));
        assert!(!Element::call("sep").is_nullable(&lib));
        assert!(!Element::call("top").is_nullable(&g));
        assert!(!Element::call("opt").is_nullable(&g));
    }

    #[test]
    fn abnf_display() {
        let e = Element::alternation([
            Element::concatenation([Element::string("a"), Element::call("b")]),
            Element::optional(Element::call("c")),
            Element::repetition(Element::range(b'0', b'9').unwrap(), 1, None).unwrap(),
            Element::repetition(Element::call("d"), 2, Some(2)).unwrap(),
            Element::repetition(Element::call("e"), 0, None).unwrap(),
            Element::repetition(Element::call("f"), 1, Some(3)).unwrap(),
        ]);
        assert_eq!(e.to_string(), r#"(%s"a" b) / [c] / 1*%x30-39 / 2d / *e / 1*3f"#);
        assert_eq!(Element::string_nocase("GET").to_string(), r#""GET""#);
        assert_eq!(Element::string(b"a\r\nb".to_vec()).to_string(), r#"%s"a" %x0D.0A %s"b""#);
        assert_eq!(
            Element::repetition(Element::string(b"a\"".to_vec()), 0, None).unwrap().to_string(),
            r#"*(%s"a" %x22)"#);
        assert_eq!(Element::concatenation([]).to_string(), "()");
    }
}

use abnfearley::{normalize_grammar, Element, GrammarBuilder, ParseResult, Recognizer, Limits};

fn main() -> Result<(), abnfearley::Error> {
    tracing_subscriber::fmt::init();

    // Grammar: balanced parenthesis with optional digits inside
    // group  = "(" *item ")"
    // item   = group / 1*DIGIT
    // DIGIT  = %x30-39
    let grammar = GrammarBuilder::new("balanced")
        .rule("group", Element::concatenation([
            Element::string("("),
            Element::repetition(Element::call("item"), 0, None)?,
            Element::string(")")]))
        .rule("item", Element::alternation([
            Element::call("group"),
            Element::repetition(Element::call("DIGIT"), 1, None)?]))
        .rule("DIGIT", Element::range(b'0', b'9')?)
        .into_grammar()?;
    let grammar = normalize_grammar(&grammar)?;
    println!("{}\n", grammar);

    let inputs: Vec<String> = match std::env::args().skip(1).collect::<Vec<_>>() {
        args if args.is_empty() => vec!["(1(23)())".to_string(), "((4)".to_string()],
        args => args,
    };

    let recognizer = Recognizer::new(&grammar)
        .with_limits(Limits::default().max_input_len(4096));
    for input in inputs {
        match recognizer.recognize("group", input.as_bytes())? {
            ParseResult::Accepted { forest, .. } => {
                println!("{:?} accepted, {} forest nodes", input, forest.len());
                if let Some(tree) = forest.pick_one(forest.root()) {
                    println!("{}", tree);
                }
            },
            ParseResult::Rejected(rejection) => println!("{:?} {}", input, rejection),
        }
    }
    Ok(())
}

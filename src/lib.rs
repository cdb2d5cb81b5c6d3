// ABOUTME: Library module exposing the Slate pipeline for embedding and tests

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod token;
pub mod value;

/// Built-in source evaluated before every user program. Defines the
/// `String` class with its `class.concat`/`class.join` helpers.
pub const PRELUDE: &str = include_str!("prelude.slate");

/// Lexes and parses a source string into top-level statements. Any parse
/// error makes the whole program unrunnable, so all collected errors come
/// back instead of a partial tree.
pub fn parse_source(source: &str) -> Result<Vec<ast::Node>, Vec<error::ParseError>> {
    parser::parse(lexer::Lexer::new(source).lex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_parses_cleanly() {
        let nodes = parse_source(PRELUDE).expect("prelude must parse");
        assert_eq!(nodes.len(), 1);
        assert!(matches!(
            nodes[0],
            ast::Node::ClassDeclaration { ref name, .. } if name == "String"
        ));
    }

    #[test]
    fn test_prelude_evaluates() {
        let interpreter = eval::Interpreter::with_output(Box::new(std::io::sink()));
        let nodes = parse_source(PRELUDE).unwrap();
        interpreter.run(&nodes).expect("prelude must evaluate");
        assert!(interpreter.globals().lookup("String").is_some());
    }
}

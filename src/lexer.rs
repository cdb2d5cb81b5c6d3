// ABOUTME: Line-oriented, indentation-tracking tokenizer for Slate source

use crate::token::{Literal, Token, TokenKind};

/// Tokenizes one source string. Processing is line by line: every token
/// carries the leading-whitespace count of its line, each non-blank line is
/// closed by a synthetic `EndStatement`, and the stream always ends with
/// `Eof`. The lexer itself never fails; malformed input becomes `Error`
/// tokens for the parser to report.
pub struct Lexer<'a> {
    source: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            tokens: Vec::new(),
        }
    }

    pub fn lex(mut self) -> Vec<Token> {
        let source = self.source;
        for line in source.split('\n') {
            self.lex_line(line);
        }
        self.tokens.push(Token::new(TokenKind::Eof, 0, ""));
        self.tokens
    }

    fn lex_line(&mut self, line: &str) {
        let chars: Vec<char> = line.chars().collect();
        let indent = chars.iter().take_while(|c| c.is_whitespace()).count();
        if indent == chars.len() {
            // Blank lines produce no tokens and no statement terminator.
            return;
        }

        let mut pos = indent;
        while pos < chars.len() {
            if chars[pos].is_whitespace() {
                pos += 1;
                continue;
            }
            pos = self.lex_token(&chars, pos, indent);
        }
        self.tokens
            .push(Token::new(TokenKind::EndStatement, indent, ""));
    }

    fn lex_token(&mut self, chars: &[char], start: usize, indent: usize) -> usize {
        match chars[start] {
            c if c.is_ascii_alphabetic() => self.lex_word(chars, start, indent),
            c if c.is_ascii_digit() => self.lex_number(chars, start, indent),
            '"' => self.lex_string(chars, start, indent),
            '\'' => self.lex_char(chars, start, indent),
            _ => self.lex_operator(chars, start, indent),
        }
    }

    /// Identifiers are `letter (letter | digit)*`; the keyword table decides
    /// what the word actually is.
    fn lex_word(&mut self, chars: &[char], start: usize, indent: usize) -> usize {
        let mut end = start;
        while end < chars.len() && chars[end].is_ascii_alphanumeric() {
            end += 1;
        }
        let word: String = chars[start..end].iter().collect();

        let token = match word.as_str() {
            "nil" => Token::with_literal(TokenKind::NilLiteral, indent, word, Literal::Nil),
            "true" => {
                Token::with_literal(TokenKind::BoolLiteral, indent, word, Literal::Bool(true))
            }
            "false" => {
                Token::with_literal(TokenKind::BoolLiteral, indent, word, Literal::Bool(false))
            }
            "or" => Token::new(TokenKind::Or, indent, word),
            "and" => Token::new(TokenKind::And, indent, word),
            "var" => Token::new(TokenKind::Var, indent, word),
            "const" => Token::new(TokenKind::Const, indent, word),
            "fn" => Token::new(TokenKind::Fn, indent, word),
            "class" => Token::new(TokenKind::Class, indent, word),
            "super" => Token::new(TokenKind::Super, indent, word),
            "if" => Token::new(TokenKind::If, indent, word),
            "elif" => Token::new(TokenKind::Elif, indent, word),
            "else" => Token::new(TokenKind::Else, indent, word),
            "while" => Token::new(TokenKind::While, indent, word),
            "for" => Token::new(TokenKind::For, indent, word),
            "in" => Token::new(TokenKind::In, indent, word),
            "break" => Token::new(TokenKind::Break, indent, word),
            "continue" => Token::new(TokenKind::Continue, indent, word),
            "return" => Token::new(TokenKind::Return, indent, word),
            "print" => Token::new(TokenKind::Print, indent, word),
            _ => Token::new(TokenKind::Identifier, indent, word),
        };
        self.tokens.push(token);
        end
    }

    /// Digits, optionally a dot and more digits. The dot is only consumed
    /// when a digit follows it, so `1..3` leaves the range operator intact.
    fn lex_number(&mut self, chars: &[char], start: usize, indent: usize) -> usize {
        let mut end = start;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
        if end + 1 < chars.len() && chars[end] == '.' && chars[end + 1].is_ascii_digit() {
            end += 1;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
        }
        let text: String = chars[start..end].iter().collect();
        let token = match text.parse::<f32>() {
            Ok(number) => Token::with_literal(
                TokenKind::NumberLiteral,
                indent,
                text,
                Literal::Number(number),
            ),
            Err(_) => Token::new(TokenKind::Error, indent, text),
        };
        self.tokens.push(token);
        end
    }

    /// Everything up to the next `"` with no escape processing. A string
    /// that runs off the end of the line is an error token.
    fn lex_string(&mut self, chars: &[char], start: usize, indent: usize) -> usize {
        let mut end = start + 1;
        while end < chars.len() && chars[end] != '"' {
            end += 1;
        }
        if end == chars.len() {
            let text: String = chars[start..].iter().collect();
            self.tokens.push(Token::new(TokenKind::Error, indent, text));
            return end;
        }
        let text: String = chars[start + 1..end].iter().collect();
        self.tokens.push(Token::with_literal(
            TokenKind::StringLiteral,
            indent,
            format!("\"{}\"", text),
            Literal::Str(text),
        ));
        end + 1
    }

    /// Exactly one character between single quotes.
    fn lex_char(&mut self, chars: &[char], start: usize, indent: usize) -> usize {
        if start + 2 < chars.len() && chars[start + 1] != '\'' && chars[start + 2] == '\'' {
            let c = chars[start + 1];
            self.tokens.push(Token::with_literal(
                TokenKind::CharLiteral,
                indent,
                format!("'{}'", c),
                Literal::Char(c),
            ));
            return start + 3;
        }

        // Malformed: carry everything up to the next quote, or the rest of
        // the line when it never closes.
        let end = chars[start + 1..]
            .iter()
            .position(|c| *c == '\'')
            .map(|offset| start + 1 + offset + 1)
            .unwrap_or(chars.len());
        let text: String = chars[start..end].iter().collect();
        self.tokens.push(Token::new(TokenKind::Error, indent, text));
        end
    }

    /// Greedy on multi-character operators: `..=` before `..` before `.`,
    /// and likewise for the comparison pairs.
    fn lex_operator(&mut self, chars: &[char], start: usize, indent: usize) -> usize {
        let at = |offset: usize| chars.get(start + offset).copied();

        let (kind, len) = match chars[start] {
            '.' if at(1) == Some('.') && at(2) == Some('=') => (TokenKind::DotDotEqual, 3),
            '.' if at(1) == Some('.') => (TokenKind::DotDot, 2),
            '.' => (TokenKind::Dot, 1),
            '=' if at(1) == Some('=') => (TokenKind::EqualEqual, 2),
            '=' => (TokenKind::Equal, 1),
            '!' if at(1) == Some('=') => (TokenKind::BangEqual, 2),
            '!' => (TokenKind::Bang, 1),
            '<' if at(1) == Some('=') => (TokenKind::LessEqual, 2),
            '<' => (TokenKind::Less, 1),
            '>' if at(1) == Some('=') => (TokenKind::GreaterEqual, 2),
            '>' => (TokenKind::Greater, 1),
            '+' => (TokenKind::Plus, 1),
            '-' => (TokenKind::Minus, 1),
            '*' => (TokenKind::Star, 1),
            '/' => (TokenKind::Slash, 1),
            ',' => (TokenKind::Comma, 1),
            '(' => (TokenKind::LeftParen, 1),
            ')' => (TokenKind::RightParen, 1),
            '[' => (TokenKind::LeftBracket, 1),
            ']' => (TokenKind::RightBracket, 1),
            '|' => (TokenKind::Pipe, 1),
            _ => (TokenKind::Error, 1),
        };
        let text: String = chars[start..start + len].iter().collect();
        self.tokens.push(Token::new(kind, indent, text));
        start + len
    }
}

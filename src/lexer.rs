use std::{
    iter::Peekable,
    num::{ParseFloatError, ParseIntError},
};

use crate::token::{Span, Spanned, Token, TokenKind, KEYWORDS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Lexes the provided string, producing the tokens into the provided buffer.
///
/// The buffer always ends with an [`TokenKind::Eof`] token on success.
pub fn lex(src: &str, tokens: &mut Vec<Token>) -> Result<()> {
    assert!(tokens.is_empty(), "must pass clean tokens buffer");
    let mut lexer = Lexer::new(src);
    loop {
        let token = lexer.next_token()?;
        tokens.push(token);
        if token.is_eof() {
            return Ok(());
        }
    }
}

/// A convenience function that allocates a new buffer per lexed input and
/// returns it.
pub fn lex_in_new(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(src, &mut tokens)?;
    Ok(tokens)
}

/// The Clite lexer.
///
/// Whitespace and comments never reach the caller.
pub struct Lexer<'src> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    current_lo: usize,
    finished: bool,
}

impl<'src> Lexer<'src> {
    /// Constructs a new lexer with the default state.
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            current_lo: 0,
            finished: false,
        }
    }

    /// Scans the next token.
    ///
    /// Once [`TokenKind::Eof`] was produced, every further call fails.
    pub fn next_token(&mut self) -> Result<Token> {
        if self.finished {
            let end = Span::new_of_length(self.src.len(), 0);
            return Err(end.wrap(Error::ReadPastEof));
        }
        let kind = self.scan_token_kind()?;
        if kind == TokenKind::Eof {
            self.finished = true;
        }
        Ok(Token::new(kind, self.span()))
    }

    /// Tries to scan the current character, skipping trivia.
    fn scan_token_kind(&mut self) -> Result<TokenKind> {
        use TokenKind::*;
        loop {
            let kind = match self.mark_advance() {
                // A NUL before the end of input is an unexpected character.
                '\0' if self.current_lo == self.src.len() => Eof,
                '+' => Plus,
                '-' => Minus,
                '*' => Star,
                '/' => match self.peek() {
                    '/' => {
                        self.inline_comment();
                        continue;
                    }
                    _ => Slash,
                },
                '(' => LParen,
                ')' => RParen,
                '{' => LBrace,
                '}' => RBrace,
                ';' => Semicolon,
                ',' => Comma,
                '=' => self.one_or_two('=', Assign, EqEq),
                '<' => self.one_or_two('=', Less, LessEq),
                '>' => self.one_or_two('=', Greater, GreaterEq),
                '!' => self.one_or_two('=', Not, NotEq),
                '&' => self.pair('&', And)?,
                '|' => self.pair('|', Or)?,
                '\'' => self.char_literal()?,
                c if c.is_ascii_alphabetic() => self.identifier_or_keyword(),
                c if c.is_ascii_digit() => self.number(),
                c if c.is_ascii_whitespace() => continue,
                c => return Err(self.span().wrap(Error::UnexpectedChar(c))),
            };
            return Ok(kind);
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        while self.peek().is_ascii_alphanumeric() {
            self.advance();
        }
        // The keyword table is case sensitive: `Int` or `WHILE` are plain
        // identifiers.
        KEYWORDS
            .get(self.substr())
            .copied()
            .unwrap_or(TokenKind::Identifier)
    }

    fn number(&mut self) -> TokenKind {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() != '.' {
            return TokenKind::IntLiteral;
        }
        self.advance();
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        TokenKind::FloatLiteral
    }

    fn char_literal(&mut self) -> Result<TokenKind> {
        match self.advance() {
            '\0' | '\n' => return Err(self.span().wrap(Error::UnclosedChar)),
            '\'' => return Err(self.span().wrap(Error::EmptyChar)),
            _ => (),
        }
        if self.peek() != '\'' {
            return Err(self.span().wrap(Error::UnclosedChar));
        }
        self.advance();
        Ok(TokenKind::CharLiteral)
    }

    fn inline_comment(&mut self) {
        assert_eq!(self.advance(), '/');
        while self.iter.peek().is_some_and(|&c| c != '\n') {
            self.advance();
        }
    }

    /// Produces `two` if the next character is `second`, `one` otherwise.
    fn one_or_two(&mut self, second: char, one: TokenKind, two: TokenKind) -> TokenKind {
        if self.peek() == second {
            self.advance_with(two)
        } else {
            one
        }
    }

    /// Operators that only exist doubled, such as `&&`.
    fn pair(&mut self, second: char, kind: TokenKind) -> Result<TokenKind> {
        if self.peek() == second {
            Ok(self.advance_with(kind))
        } else {
            let expected = if second == '&' { "&&" } else { "||" };
            Err(self.span().wrap(Error::IncompleteOperator(expected)))
        }
    }
}

impl Lexer<'_> {
    /// Starts a new token "mark" and advances the iterator.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next char and advances the iterator.
    fn advance(&mut self) -> char {
        self.iter
            .next()
            .inspect(|c| self.cursor += c.len_utf8())
            .unwrap_or('\0')
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next char without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    /// Returns the current span.
    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Returns the substring of the current marked bounds.
    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("incomplete operator, expected {0}")]
    IncompleteOperator(&'static str),
    #[error("unclosed character literal")]
    UnclosedChar,
    #[error("empty character literal")]
    EmptyChar,
    #[error("attempt to read past end of file")]
    ReadPastEof,
}

pub mod extract {
    use super::*;

    pub fn int(token: Token, src: &str) -> Result<i32, ParseIntError> {
        debug_assert_eq!(token.kind, TokenKind::IntLiteral);
        token.span().substr(src).parse()
    }

    pub fn float(token: Token, src: &str) -> Result<f32, ParseFloatError> {
        debug_assert_eq!(token.kind, TokenKind::FloatLiteral);
        token.span().substr(src).parse()
    }

    pub fn char(token: Token, src: &str) -> char {
        debug_assert_eq!(token.kind, TokenKind::CharLiteral);
        // The lexer guarantees exactly one character between the quotes.
        token.span().substr(src).chars().nth(1).unwrap_or('\0')
    }

    pub fn ident(token: Token, src: &str) -> &str {
        debug_assert_eq!(token.kind, TokenKind::Identifier);
        token.span().substr(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sample_programs_lex() {
        for input in [
            include_str!("../programs/fibonacci.clite"),
            include_str!("../programs/gcd.clite"),
            include_str!("../programs/coercions.clite"),
        ] {
            let tokens = lex_in_new(input).expect("sample must lex");
            assert!(tokens.last().is_some_and(Token::is_eof));
        }
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/" => [
                (Plus, 0..1),
                (Minus, 1..2),
                (Star, 2..3),
                (Slash, 3..4),
                (Eof, 4..4),
            ],
            "int/Int/INT/boolean/bool" => [
                (Int, 0..3),
                (Slash, 3..4),
                (Identifier, 4..7),
                (Slash, 7..8),
                (Identifier, 8..11),
                (Slash, 11..12),
                (Bool, 12..19),
                (Slash, 19..20),
                (Bool, 20..24),
                (Eof, 24..24),
            ],
            "if else while return void" => [
                (If, 0..2),
                (Else, 3..7),
                (While, 8..13),
                (Return, 14..20),
                (Void, 21..25),
                (Eof, 25..25),
            ],
            "1 12 3.5 4. 0.25" => [
                (IntLiteral, 0..1),
                (IntLiteral, 2..4),
                (FloatLiteral, 5..8),
                (FloatLiteral, 9..11),
                (FloatLiteral, 12..16),
                (Eof, 16..16),
            ],
            "a a1 x2y True" => [
                (Identifier, 0..1),
                (Identifier, 2..4),
                (Identifier, 5..8),
                (Identifier, 9..13),
                (Eof, 13..13),
            ],
            "'a' 'Z'" => [
                (CharLiteral, 0..3),
                (CharLiteral, 4..7),
                (Eof, 7..7),
            ],
            "= == < <= > >= ! != && ||" => [
                (Assign, 0..1),
                (EqEq, 2..4),
                (Less, 5..6),
                (LessEq, 7..9),
                (Greater, 10..11),
                (GreaterEq, 12..14),
                (Not, 15..16),
                (NotEq, 17..19),
                (And, 20..22),
                (Or, 23..25),
                (Eof, 25..25),
            ],
            "<=<!==" => [
                (LessEq, 0..2),
                (Less, 2..3),
                (NotEq, 3..5),
                (Assign, 5..6),
                (Eof, 6..6),
            ],
            "x // comment\ny" => [
                (Identifier, 0..1),
                (Identifier, 13..14),
                (Eof, 14..14),
            ],
            "// only a comment" => [(Eof, 17..17)],
            "{ ( ) } ; ," => [
                (LBrace, 0..1),
                (LParen, 2..3),
                (RParen, 4..5),
                (RBrace, 6..7),
                (Semicolon, 8..9),
                (Comma, 10..11),
                (Eof, 11..11),
            ],
        });

        for (input, tokens) in cases {
            let lexed = lex_in_new(input).expect("must lex");
            assert_eq!(lexed, tokens.as_slice(), "input: {input:?}");
        }
    }

    #[test]
    fn test_errors() {
        let cases: &[(&str, &str)] = &[
            ("x $", "2..3: unexpected character '$'"),
            ("a & b", "2..3: incomplete operator, expected &&"),
            ("a | b", "2..3: incomplete operator, expected ||"),
            ("'ab'", "0..2: unclosed character literal"),
            ("'a", "0..2: unclosed character literal"),
            ("''", "0..2: empty character literal"),
            ("x_y", "1..2: unexpected character '_'"),
            ("x\0y", "1..2: unexpected character '\\0'"),
            ("int main() { }\0 int", "14..15: unexpected character '\\0'"),
        ];
        for (input, expected) in cases {
            let error = lex_in_new(input).expect_err("must fail");
            assert_eq!(format!("{error:#}"), *expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_read_past_eof() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Identifier);
        assert!(lexer.next_token().unwrap().is_eof());
        let error = lexer.next_token().unwrap_err();
        assert_eq!(error.inner, Error::ReadPastEof);
    }

    #[test]
    fn test_extract() {
        let src = "42 2.5 'q' name";
        let tokens = lex_in_new(src).unwrap();
        assert_eq!(extract::int(tokens[0], src), Ok(42));
        assert_eq!(extract::float(tokens[1], src), Ok(2.5));
        assert_eq!(extract::char(tokens[2], src), 'q');
        assert_eq!(extract::ident(tokens[3], src), "name");
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![
                    $(Token::new($kind, Span::new_of_bounds($range.start..$range.end))),*
                ],
            )),*]
        }};
    }
    use cases;
}

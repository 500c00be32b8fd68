use crate::error::{ExprError, Result};
use crate::types::TokenKind;

/// Two-character delimiters, matched before any one-character delimiter.
pub const DELIMITERS_2: [&str; 7] = [".*", "./", ".^", "==", "!=", "<=", ">="];

/// One-character delimiters. Newline is handled separately because it is only a token
/// outside of brackets.
pub const DELIMITERS_1: &str = ",()[]{};+-*/%^'!<>=:?.";

/// A token produced by the lexer.
///
/// For `String` tokens `text` holds the unescaped content without the quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// 0-based character offset of the first character of the token.
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    /// True if this is the delimiter `text`.
    pub fn is_delimiter(&self, text: &str) -> bool {
        self.kind == TokenKind::Delimiter && self.text == text
    }

    /// True if this is the symbol `name` (used for keywords).
    pub fn is_symbol(&self, name: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == name
    }

    /// Text used when the token is reported in an error.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::EndOfInput => "end of input".to_string(),
            TokenKind::Delimiter if self.text == "\n" => "\\n".to_string(),
            TokenKind::String => format!("\"{}\"", self.text),
            _ => self.text.clone(),
        }
    }
}

/// The lexer struct, which produces tokens from an input string one at a time.
#[derive(Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    /// Byte offset into `input`.
    pos: usize,
    /// Character offset matching `pos`.
    char_pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            char_pos: 0,
        }
    }

    /// Peek at the current character.
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Peek `n` characters ahead of the current one.
    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    /// Advance the position by one character.
    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            self.char_pos += 1;
        }
    }

    /// Character offset of the cursor.
    pub fn position(&self) -> usize {
        self.char_pos
    }

    /// Get the original input string
    pub fn get_original_input(&self) -> &'a str {
        self.input
    }

    /// Skip whitespace and comments. Newlines are skipped only when `skip_newlines` is set,
    /// which the parser does while it is inside brackets.
    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => self.advance(),
                '\n' if skip_newlines => self.advance(),
                '#' => {
                    while let Some(nc) = self.peek() {
                        if nc == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Get the next token from the input.
    pub fn next_token(&mut self, skip_newlines: bool) -> Result<Token> {
        self.skip_whitespace(skip_newlines);
        let start = self.char_pos;
        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::EndOfInput, "", start));
        };

        if c == '\n' {
            self.advance();
            return Ok(Token::new(TokenKind::Delimiter, "\n", start));
        }

        if c == '"' {
            return self.lex_string();
        }

        if c.is_ascii_digit() || (c == '.' && self.peek_nth(1).is_some_and(|d| d.is_ascii_digit())) {
            return Ok(self.lex_number());
        }

        if c.is_alphabetic() || c == '_' {
            let begin = self.pos;
            while let Some(nc) = self.peek() {
                if nc.is_alphanumeric() || nc == '_' {
                    self.advance();
                } else {
                    break;
                }
            }
            return Ok(Token::new(TokenKind::Symbol, &self.input[begin..self.pos], start));
        }

        let rest = &self.input[self.pos..];
        if let Some(op) = DELIMITERS_2.iter().find(|op| rest.starts_with(**op)) {
            self.advance();
            self.advance();
            return Ok(Token::new(TokenKind::Delimiter, *op, start));
        }
        if DELIMITERS_1.contains(c) {
            self.advance();
            return Ok(Token::new(TokenKind::Delimiter, c.to_string(), start));
        }

        Err(ExprError::syntax(
            format!("Syntax error in part \"{}\"", c),
            c.to_string(),
            start,
        ))
    }

    fn lex_number(&mut self) -> Token {
        let start = self.char_pos;
        let begin = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        // A dot directly followed by *, / or ^ belongs to an element-wise operator.
        if self.peek() == Some('.') && !matches!(self.peek_nth(1), Some('*' | '/' | '^')) {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_follows = match self.peek_nth(1) {
                Some(d) if d.is_ascii_digit() => true,
                Some('+' | '-') => self.peek_nth(2).is_some_and(|d| d.is_ascii_digit()),
                _ => false,
            };
            if exponent_follows {
                self.advance();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.advance();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }
        Token::new(TokenKind::Number, &self.input[begin..self.pos], start)
    }

    fn lex_string(&mut self) -> Result<Token> {
        let start = self.char_pos;
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ExprError::syntax("End of string \" missing", "\"", start));
            };
            self.advance();
            match c {
                '"' => break,
                '\\' => {
                    let escape_pos = self.char_pos;
                    let Some(e) = self.peek() else {
                        return Err(ExprError::syntax("End of string \" missing", "\"", start));
                    };
                    self.advance();
                    let unescaped = match e {
                        '"' => '"',
                        '\\' => '\\',
                        '/' => '/',
                        'b' => '\u{8}',
                        'f' => '\u{c}',
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        'u' => self.lex_unicode_escape(escape_pos)?,
                        other => {
                            return Err(ExprError::syntax(
                                format!("Invalid escape sequence \\{}", other),
                                format!("\\{}", other),
                                escape_pos - 1,
                            ));
                        }
                    };
                    text.push(unescaped);
                }
                other => text.push(other),
            }
        }
        Ok(Token::new(TokenKind::String, text, start))
    }

    fn lex_unicode_escape(&mut self, escape_pos: usize) -> Result<char> {
        let begin = self.pos;
        for _ in 0..4 {
            if !self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                return Err(ExprError::syntax(
                    "Invalid unicode escape, four hex digits expected",
                    "\\u",
                    escape_pos - 1,
                ));
            }
            self.advance();
        }
        let code = u32::from_str_radix(&self.input[begin..self.pos], 16)
            .map_err(|e| ExprError::syntax(e.to_string(), "\\u", escape_pos - 1))?;
        char::from_u32(code)
            .ok_or_else(|| ExprError::syntax("Invalid unicode code point", "\\u", escape_pos - 1))
    }
}

/// Tokenizes a whole source string, including the trailing `EndOfInput` token.
///
/// Newlines are reported as delimiters everywhere, since no bracket nesting is tracked.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token(false)?;
        let done = tok.kind == TokenKind::EndOfInput;
        tokens.push(tok);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_texts(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_lexer_tokenization_all_types() {
        let tokens = kinds_and_texts("1 + foo_bar * (2.5e-1) , \"hi\"");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.0).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Number,
                TokenKind::Delimiter,
                TokenKind::Symbol,
                TokenKind::Delimiter,
                TokenKind::Delimiter,
                TokenKind::Number,
                TokenKind::Delimiter,
                TokenKind::Delimiter,
                TokenKind::String,
                TokenKind::EndOfInput,
            ]
        );
        assert_eq!(tokens[5].1, "2.5e-1");
        assert_eq!(tokens[8].1, "hi");
    }

    #[test]
    fn test_two_character_delimiters_win() {
        let texts: Vec<String> = kinds_and_texts("a<=b>=c==d!=e.*f./g.^h<i")
            .into_iter()
            .filter(|t| t.0 == TokenKind::Delimiter)
            .map(|t| t.1)
            .collect();
        assert_eq!(texts, vec!["<=", ">=", "==", "!=", ".*", "./", ".^", "<"]);
    }

    #[test]
    fn test_number_followed_by_elementwise_operator() {
        let tokens = kinds_and_texts("2.*3");
        assert_eq!(tokens[0], (TokenKind::Number, "2".to_string()));
        assert_eq!(tokens[1], (TokenKind::Delimiter, ".*".to_string()));
        assert_eq!(tokens[2], (TokenKind::Number, "3".to_string()));
    }

    #[test]
    fn test_lexer_decimal_with_leading_dot() {
        let tokens = kinds_and_texts(".5 .9e2 3.");
        assert_eq!(tokens[0], (TokenKind::Number, ".5".to_string()));
        assert_eq!(tokens[1], (TokenKind::Number, ".9e2".to_string()));
        assert_eq!(tokens[2], (TokenKind::Number, "3.".to_string()));
    }

    #[test]
    fn test_exponent_without_digits_is_not_consumed() {
        let tokens = kinds_and_texts("2e");
        assert_eq!(tokens[0], (TokenKind::Number, "2".to_string()));
        assert_eq!(tokens[1], (TokenKind::Symbol, "e".to_string()));
    }

    #[test]
    fn test_comments_are_discarded() {
        let tokens = kinds_and_texts("a # the answer\nb");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Symbol, "a".to_string()),
                (TokenKind::Delimiter, "\n".to_string()),
                (TokenKind::Symbol, "b".to_string()),
                (TokenKind::EndOfInput, String::new()),
            ]
        );
    }

    #[test]
    fn test_newlines_skipped_on_request() {
        let mut lexer = Lexer::new("\n\n x");
        let tok = lexer.next_token(true).unwrap();
        assert_eq!(tok.kind, TokenKind::Symbol);
        assert_eq!(tok.position, 3);
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#""a\"b\\c\nA""#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, "a\"b\\c\nA");
    }

    #[test]
    fn test_unterminated_string_fails() {
        let err = tokenize("\"abc").unwrap_err();
        match err {
            ExprError::Syntax { position, .. } => assert_eq!(position, 1),
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_character_reports_one_based_offset() {
        let err = tokenize("1 $ 2").unwrap_err();
        match err {
            ExprError::Syntax { token, position, .. } => {
                assert_eq!(token, "$");
                assert_eq!(position, 3);
            }
            other => panic!("Expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_positions_count_characters_not_bytes() {
        let tokens = tokenize("\"é\" + x").unwrap();
        assert_eq!(tokens[1].position, 4);
        assert_eq!(tokens[2].position, 6);
    }
}

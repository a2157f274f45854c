//! Hand-written tokenizer for rowql query text.
//!
//! [`tokenize`] scans the source once, left to right, producing a
//! `Vec<Token>`. Words are scanned by a single routine and then reclassified
//! through the tables in [`token`]: clause keywords (including multi-word
//! forms such as `ORDER BY`, matched greedily), word operators, reserved
//! words, `NULL`, and function names (identifiers followed by `(`).

pub mod token;

pub use token::{JoinKind, SetOperationKind, Token, TokenKind};

use alloc::string::String;
use alloc::vec::Vec;
use rowql_core::LexError;
use token::{classify_word, is_function_reserved, starts_multi_word, MULTI_WORD_KEYWORDS, SYMBOL_OPERATORS};
use tracing::debug;

/// Tokenizes query text.
///
/// Identical input always yields identical tokens; the only state is the
/// positional placeholder counter, which starts at zero on every call.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

#[inline]
fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[inline]
fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Splits an identifier token into its dot-separated parts.
///
/// Backtick-quoted parts are unquoted, so `` `a.b`.c `` yields `["a.b", "c"]`.
pub fn identifier_parts(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '`' if quoted && chars.peek() == Some(&'`') => {
                chars.next();
                current.push('`');
            }
            '`' => quoted = !quoted,
            '.' if !quoted => parts.push(core::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    parts
}

/// The query tokenizer.
pub struct Lexer<'a> {
    source: &'a str,
    input: &'a [u8],
    pos: usize,
    /// Next ordinal for bare `?` placeholders.
    placeholder_counter: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            input: source.as_bytes(),
            pos: 0,
            placeholder_counter: 0,
            tokens: Vec::new(),
        }
    }

    /// Consumes the lexer and returns every token in source order.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        loop {
            self.skip_whitespace_and_comments()?;
            if self.pos >= self.input.len() {
                break;
            }
            let token = self.next_token()?;
            self.tokens.push(token);
        }
        debug!(target: "rowql::lexer", tokens = self.tokens.len(), "tokenized query");
        Ok(self.tokens)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    #[inline]
    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Returns the char at the cursor and moves past it.
    fn advance_char(&mut self) -> Option<char> {
        let c = self.source[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                (Some(b'-'), Some(b'-')) | (Some(b'#'), _) => {
                    while let Some(c) = self.advance() {
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.pos;
                    match self.source[self.pos + 2..].find("*/") {
                        Some(end) => self.pos += 2 + end + 2,
                        None => return Err(LexError::unterminated_comment(start)),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Returns the position of the next significant byte at or after `pos`.
    ///
    /// Used for lookahead only, so an unterminated comment is reported later
    /// by the main scan instead of here.
    fn skip_trivia_from(&self, mut pos: usize) -> usize {
        let bytes = self.input;
        loop {
            match (bytes.get(pos), bytes.get(pos + 1)) {
                (Some(c), _) if c.is_ascii_whitespace() => pos += 1,
                (Some(b'-'), Some(b'-')) | (Some(b'#'), _) => {
                    while pos < bytes.len() && bytes[pos] != b'\n' {
                        pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => match self.source[pos + 2..].find("*/") {
                    Some(end) => pos += 2 + end + 2,
                    None => return bytes.len(),
                },
                _ => return pos,
            }
        }
    }

    fn followed_by_paren(&self) -> bool {
        let next = self.skip_trivia_from(self.pos);
        self.input.get(next) == Some(&b'(')
    }

    /// True when a `+`/`-` here would be a sign rather than an operator.
    fn in_operand_position(&self) -> bool {
        self.tokens.last().map_or(true, |t| !t.ends_operand())
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let c = match self.peek() {
            Some(c) => c,
            None => return Err(LexError::invalid_character(start, '\0')),
        };

        match c {
            b'\'' | b'"' => self.read_string_literal(c),
            b'`' => self.read_word(),
            b'0'..=b'9' => self.read_number(),
            b'.' if self.peek_at(1).map_or(false, |d| d.is_ascii_digit()) => self.read_number(),
            b'+' | b'-' if self.in_operand_position() && self.starts_unsigned_number(1) => {
                self.read_number()
            }
            c if is_ident_start(c) => self.read_word(),
            b':' if self.peek_at(1).map_or(false, is_ident_start) => Ok(self.read_named_parameter()),
            b'?' => {
                self.pos += 1;
                let mut token = Token::new(TokenKind::Parameter, "?", "?", start);
                token.parameter_offset = Some(self.placeholder_counter);
                self.placeholder_counter += 1;
                Ok(token)
            }
            b'(' | b')' => {
                self.pos += 1;
                let text = &self.source[start..self.pos];
                Ok(Token::new(TokenKind::Paren, text, text, start))
            }
            b',' | b';' => {
                self.pos += 1;
                let text = &self.source[start..self.pos];
                Ok(Token::new(TokenKind::Separator, text, text, start))
            }
            _ => self.read_operator(),
        }
    }

    fn starts_unsigned_number(&self, offset: usize) -> bool {
        match self.peek_at(offset) {
            Some(d) if d.is_ascii_digit() => true,
            Some(b'.') => self.peek_at(offset + 1).map_or(false, |d| d.is_ascii_digit()),
            _ => false,
        }
    }

    fn read_string_literal(&mut self, quote: u8) -> Result<Token, LexError> {
        let start = self.pos;
        self.advance();
        let mut value = String::new();

        loop {
            match self.peek() {
                None => return Err(LexError::unterminated_string(start)),
                Some(c) if c == quote => {
                    if self.peek_at(1) == Some(quote) {
                        value.push(quote as char);
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        break;
                    }
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = match self.advance_char() {
                        Some(c) => c,
                        None => return Err(LexError::unterminated_string(start)),
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        // LIKE wildcards keep their escape so patterns stay literal.
                        '%' | '_' => {
                            value.push('\\');
                            value.push(escaped);
                        }
                        other => value.push(other),
                    }
                }
                Some(_) => {
                    if let Some(c) = self.advance_char() {
                        value.push(c);
                    }
                }
            }
        }

        let raw = &self.source[start..self.pos];
        Ok(Token::new(TokenKind::StringConstant, value, raw, start))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        if matches!(self.peek(), Some(b'+') | Some(b'-')) {
            self.advance();
        }

        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some(b'.') {
            self.advance();
            let frac_start = self.pos;
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
            if self.pos == frac_start {
                return Err(self.invalid_number(start));
            }
        }

        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if !self.peek().map_or(false, |c| c.is_ascii_digit()) {
                return Err(self.invalid_number(start));
            }
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if self.peek().map_or(false, |c| is_ident_continue(c) || c == b'.') {
            return Err(self.invalid_number(start));
        }

        let text = &self.source[start..self.pos];
        Ok(Token::new(TokenKind::NumericConstant, text, text, start))
    }

    /// Builds an invalid number error spanning the malformed literal.
    fn invalid_number(&mut self, start: usize) -> LexError {
        while self.peek().map_or(false, |c| is_ident_continue(c) || c == b'.') {
            self.advance();
        }
        LexError::invalid_number(start, &self.source[start..self.pos])
    }

    fn read_quoted_identifier(&mut self) -> Result<String, LexError> {
        let start = self.pos;
        self.advance();
        let mut name = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::unterminated_string(start)),
                Some(b'`') if self.peek_at(1) == Some(b'`') => {
                    name.push('`');
                    self.pos += 2;
                }
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(name);
                }
                Some(_) => {
                    if let Some(c) = self.advance_char() {
                        name.push(c);
                    }
                }
            }
        }
    }

    fn read_bare_word(&mut self) -> &'a str {
        let source = self.source;
        let start = self.pos;
        while self.peek().map_or(false, is_ident_continue) {
            self.pos += 1;
        }
        &source[start..self.pos]
    }

    /// Reads an identifier, keyword or dotted identifier chain.
    fn read_word(&mut self) -> Result<Token, LexError> {
        let source = self.source;
        let start = self.pos;
        let quoted = self.peek() == Some(b'`');
        let first = if quoted {
            self.read_quoted_identifier()?
        } else {
            String::from(self.read_bare_word())
        };

        // `t.col`, `db.t.col`, `t.*`
        let mut value = first;
        let mut chained = false;
        while self.peek() == Some(b'.') {
            match self.peek_at(1) {
                Some(b'*') => {
                    self.pos += 2;
                    value.push_str(".*");
                    chained = true;
                    break;
                }
                Some(b'`') => {
                    self.pos += 1;
                    let part = self.read_quoted_identifier()?;
                    value.push('.');
                    value.push_str(&part);
                    chained = true;
                }
                Some(c) if is_ident_start(c) => {
                    self.pos += 1;
                    let part = self.read_bare_word();
                    value.push('.');
                    value.push_str(part);
                    chained = true;
                }
                _ => break,
            }
        }

        let raw = &source[start..self.pos];
        if quoted || chained {
            return Ok(Token::new(TokenKind::Identifier, value, raw, start));
        }

        if starts_multi_word(raw) {
            if let Some(token) = self.try_multi_word(start, raw) {
                return Ok(token);
            }
        }

        match classify_word(raw) {
            Some((TokenKind::ReservedWord, _)) if is_function_reserved(raw) && self.followed_by_paren() => {
                Ok(Token::new(TokenKind::FunctionName, raw, raw, start))
            }
            Some((kind, normalized)) => Ok(Token::new(kind, normalized, raw, start)),
            None if self.followed_by_paren() => Ok(Token::new(TokenKind::FunctionName, raw, raw, start)),
            None => Ok(Token::new(TokenKind::Identifier, raw, raw, start)),
        }
    }

    /// Greedily matches a multi-word keyword whose first word was just read.
    fn try_multi_word(&mut self, start: usize, first: &str) -> Option<Token> {
        'sequences: for seq in MULTI_WORD_KEYWORDS {
            if !seq[0].eq_ignore_ascii_case(first) {
                continue;
            }
            let mut pos = self.pos;
            for word in &seq[1..] {
                pos = self.skip_trivia_from(pos);
                let word_start = pos;
                while self.input.get(pos).map_or(false, |c| is_ident_continue(*c)) {
                    pos += 1;
                }
                if !self.source[word_start..pos].eq_ignore_ascii_case(word) {
                    continue 'sequences;
                }
            }
            self.pos = pos;
            let value = seq.join(" ");
            return Some(Token::new(TokenKind::ClauseKeyword, value, &self.source[start..pos], start));
        }
        None
    }

    fn read_named_parameter(&mut self) -> Token {
        let start = self.pos;
        self.pos += 1;
        let name = self.read_bare_word();
        let raw = &self.source[start..self.pos];
        let mut token = Token::new(TokenKind::Parameter, raw, raw, start);
        token.parameter_name = Some(String::from(name));
        token
    }

    fn read_operator(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let rest = &self.input[start..];
        for op in SYMBOL_OPERATORS {
            if rest.starts_with(op.as_bytes()) {
                self.pos += op.len();
                return Ok(Token::new(TokenKind::Operator, *op, *op, start));
            }
        }
        let ch = self.source[start..].chars().next().unwrap_or('\0');
        Err(LexError::invalid_character(start, ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use rowql_core::LexErrorKind;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn values(source: &str) -> Vec<String> {
        tokenize(source).unwrap().into_iter().map(|t| t.value).collect()
    }

    #[test]
    fn test_select_with_named_parameter() {
        use TokenKind::*;
        let tokens = tokenize("SELECT a, b FROM t WHERE a = :x").unwrap();
        let got: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            got,
            vec![
                ClauseKeyword, Identifier, Separator, Identifier, ClauseKeyword, Identifier,
                ClauseKeyword, Identifier, Operator, Parameter
            ]
        );
        let param = tokens.last().unwrap();
        assert_eq!(param.parameter_name.as_deref(), Some("x"));
        assert_eq!(param.parameter_offset, None);
        assert_eq!(param.start_offset, 29);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(values("select FrOm where"), vec!["SELECT", "FROM", "WHERE"]);
    }

    #[test]
    fn test_multi_word_keywords() {
        let tokens = tokenize("ORDER  BY x GROUP /* c */ by y LEFT OUTER JOIN u").unwrap();
        assert_eq!(tokens[0].value, "ORDER BY");
        assert_eq!(tokens[0].raw, "ORDER  BY");
        assert_eq!(tokens[2].value, "GROUP BY");
        assert_eq!(tokens[2].raw, "GROUP /* c */ by");
        assert_eq!(tokens[4].value, "LEFT OUTER JOIN");
        assert_eq!(tokens[4].kind, TokenKind::ClauseKeyword);
    }

    #[test]
    fn test_multi_word_falls_back() {
        let tokens = tokenize("UNION SELECT").unwrap();
        assert_eq!(tokens[0].value, "UNION");
        let tokens = tokenize("LEFT(name, 2)").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FunctionName);
        let tokens = tokenize("NATURAL LEFT").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::ReservedWord);
    }

    #[test]
    fn test_function_names() {
        let tokens = tokenize("COUNT (*) upper(name) count").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FunctionName);
        assert_eq!(tokens[4].kind, TokenKind::FunctionName);
        assert_eq!(tokens[4].value, "upper");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Identifier);
    }

    #[test]
    fn test_word_operators_and_reserved() {
        use TokenKind::*;
        assert_eq!(
            kinds("a IS NOT NULL AND b LIKE 'x' AS c"),
            vec![Identifier, Operator, Operator, NullConstant, Operator, Identifier, Operator, StringConstant, ReservedWord, Identifier]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            values("a<=>b<=c>=d<>e!=f||g<h"),
            vec!["a", "<=>", "b", "<=", "c", ">=", "d", "<>", "e", "!=", "f", "||", "g", "<", "h"]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"'it''s' "say \"hi\"" 'a\nb' '50\%'"#).unwrap();
        assert_eq!(tokens[0].value, "it's");
        assert_eq!(tokens[0].raw, "'it''s'");
        assert_eq!(tokens[1].value, "say \"hi\"");
        assert_eq!(tokens[2].value, "a\nb");
        assert_eq!(tokens[3].value, "50\\%");
    }

    #[test]
    fn test_unicode_string() {
        let tokens = tokenize("'héllo' x").unwrap();
        assert_eq!(tokens[0].value, "héllo");
        assert_eq!(tokens[1].start_offset, 9);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let err = tokenize("SELECT 'abc").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(values("1 2.5 .5 1e3 2.5E-2"), vec!["1", "2.5", ".5", "1e3", "2.5E-2"]);
    }

    #[test]
    fn test_signed_numbers_only_in_operand_position() {
        assert_eq!(values("a = -1"), vec!["a", "=", "-1"]);
        assert_eq!(values("a -1"), vec!["a", "-", "1"]);
        assert_eq!(values("(1)-2"), vec!["(", "1", ")", "-", "2"]);
        assert_eq!(values("SELECT +.5"), vec!["SELECT", "+.5"]);
    }

    #[test]
    fn test_invalid_numbers() {
        for bad in ["1.", "1e", "1e+", "12abc", "1.2.3"] {
            let err = tokenize(bad).unwrap_err();
            assert_eq!(err.kind, LexErrorKind::InvalidNumber, "{}", bad);
            assert_eq!(err.offset, 0);
        }
    }

    #[test]
    fn test_dotted_identifiers() {
        let tokens = tokenize("t1.id, t.*, `odd name`.`x``y`").unwrap();
        assert_eq!(tokens[0].value, "t1.id");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].value, "t.*");
        assert_eq!(tokens[4].value, "odd name.x`y");
        assert_eq!(identifier_parts(&tokens[4].raw), vec!["odd name", "x`y"]);
    }

    #[test]
    fn test_positional_parameters_counter_resets() {
        let tokens = tokenize("? + ? + :n").unwrap();
        assert_eq!(tokens[0].parameter_offset, Some(0));
        assert_eq!(tokens[2].parameter_offset, Some(1));
        assert_eq!(tokens[4].parameter_offset, None);
        let again = tokenize("?").unwrap();
        assert_eq!(again[0].parameter_offset, Some(0));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("SELECT -- note\n a # more\n /* block */ FROM t").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[1].value, "a");
        assert_eq!(tokens[2].start_offset, 38);
    }

    #[test]
    fn test_unterminated_comment() {
        let err = tokenize("SELECT /* never closed").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedComment);
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("SELECT a $ b").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidCharacter);
        assert_eq!(err.offset, 9);
        let err = tokenize("a : b").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::InvalidCharacter);
    }

    #[test]
    fn test_raw_matches_source_span() {
        let source = "SELECT `x`, 'a''b' FROM t LEFT  JOIN u ON t.id=u.id WHERE v >= -2.5";
        for token in tokenize(source).unwrap() {
            assert_eq!(&source[token.start_offset..token.end_offset()], token.raw);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("  -- only a comment").unwrap().is_empty());
    }
}

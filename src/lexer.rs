use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceSpan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Let,
    Const,
    Function,
    Async,
    Await,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    In,
    Break,
    Continue,
    True,
    False,
    Null,
    New,
    Throw,
    Try,
    Catch,
    Finally,
    Typeof,
    Import,
    Export,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Template,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Question,
    QuestionQuestion,
    FatArrow,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Star,
    StarStar,
    Slash,
    Percent,
    Bang,
    BangEqual,
    BangEqualEqual,
    EqualEqual,
    EqualEqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    DoubleAmpersand,
    DoublePipe,
    Unknown,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text for most tokens; the decoded value for string literals and
    /// the raw body (between backticks) for templates.
    pub lexeme: String,
    pub span: SourceSpan,
    /// A line terminator sits between this token and the previous one.
    pub line_break_before: bool,
}

impl Token {
    pub fn is_identifier(&self, name: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == name
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    current: usize,
    peeked: Option<(usize, char)>,
    offset: usize,
    saw_line_break: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_offset(source, 0)
    }

    /// Lexes `source` as if it started at byte `offset` of an enclosing buffer.
    pub fn with_offset(source: &'a str, offset: usize) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            current: 0,
            peeked: None,
            offset,
            saw_line_break: false,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = if let Some((idx, ch)) = self.peeked.take() {
            Some((idx, ch))
        } else {
            self.chars.next()
        };
        if let Some((idx, ch)) = next {
            self.current = idx + ch.len_utf8();
            Some((idx, ch))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    fn peek_second(&mut self) -> Option<char> {
        self.peek()?;
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if let Some((idx, ch)) = self.peek() {
            if ch == expected {
                self.peeked = None;
                self.current = idx + ch.len_utf8();
                true
            } else {
                false
            }
        } else {
            false
        }
    }

    fn span(&self, start: usize, end: usize) -> SourceSpan {
        SourceSpan {
            start: start + self.offset,
            end: end + self.offset,
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        loop {
            let mut progressed = false;

            while let Some((_, ch)) = self.peek() {
                if ch.is_whitespace() || ch == '\u{feff}' {
                    if ch == '\n' {
                        self.saw_line_break = true;
                    }
                    self.bump();
                    progressed = true;
                } else {
                    break;
                }
            }

            if let Some((_, '/')) = self.peek() {
                match self.peek_second() {
                    Some('/') => {
                        self.bump();
                        self.bump();
                        while let Some((_, ch)) = self.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.bump();
                        }
                        progressed = true;
                    }
                    Some('*') => {
                        let start = self.current;
                        self.bump();
                        self.bump();
                        let mut closed = false;
                        while let Some((_, ch)) = self.bump() {
                            if ch == '\n' {
                                self.saw_line_break = true;
                            } else if ch == '*' && self.match_next('/') {
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(
                                Diagnostic::new(DiagnosticKind::Lexer, "Unterminated comment")
                                    .with_span(self.span(start, self.current)),
                            );
                        }
                        progressed = true;
                    }
                    _ => {}
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Token {
        while let Some((_, ch)) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.current;
        let lexeme = self.source[start..end].to_string();
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        self.token(kind, lexeme, start, end)
    }

    fn number_literal(&mut self, start: usize, mut seen_dot: bool) -> Token {
        if !seen_dot && &self.source[start..self.current] == "0" {
            if let Some((_, 'x' | 'X')) = self.peek() {
                self.bump();
                while let Some((_, ch)) = self.peek() {
                    if ch.is_ascii_hexdigit() || ch == '_' {
                        self.bump();
                    } else {
                        break;
                    }
                }
                let end = self.current;
                return self.token(
                    TokenKind::Number,
                    self.source[start..end].to_string(),
                    start,
                    end,
                );
            }
        }
        let mut seen_exponent = false;
        while let Some((_, ch)) = self.peek() {
            match ch {
                '0'..='9' | '_' => {
                    self.bump();
                }
                '.' if !seen_dot && !seen_exponent => {
                    seen_dot = true;
                    self.bump();
                }
                'e' | 'E' if !seen_exponent => {
                    seen_exponent = true;
                    self.bump();
                    if let Some((_, '+' | '-')) = self.peek() {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        let end = self.current;
        self.token(
            TokenKind::Number,
            self.source[start..end].to_string(),
            start,
            end,
        )
    }

    fn escape(&mut self, value: &mut String) -> bool {
        let Some((_, esc)) = self.bump() else {
            return false;
        };
        match esc {
            'n' => value.push('\n'),
            'r' => value.push('\r'),
            't' => value.push('\t'),
            'b' => value.push('\u{8}'),
            'f' => value.push('\u{c}'),
            'v' => value.push('\u{b}'),
            '0' => value.push('\0'),
            '\n' => {}
            'u' => {
                let digits = self.take_hex(4);
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(ch) => value.push(ch),
                    None => value.push_str(&digits),
                }
            }
            'x' => {
                let digits = self.take_hex(2);
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(ch) => value.push(ch),
                    None => value.push_str(&digits),
                }
            }
            other => value.push(other),
        }
        true
    }

    fn take_hex(&mut self, count: usize) -> String {
        let mut digits = String::new();
        for _ in 0..count {
            match self.peek() {
                Some((_, ch)) if ch.is_ascii_hexdigit() => {
                    digits.push(ch);
                    self.bump();
                }
                _ => break,
            }
        }
        digits
    }

    fn string_literal(&mut self, start: usize, quote: char) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        while let Some((_, ch)) = self.bump() {
            match ch {
                c if c == quote => {
                    let end = self.current;
                    return Ok(self.token(TokenKind::String, value, start, end));
                }
                '\\' => {
                    if !self.escape(&mut value) {
                        break;
                    }
                }
                '\n' => break,
                _ => value.push(ch),
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::Lexer, "unterminated string literal")
                .with_span(self.span(start, self.current)),
        )
    }

    fn template_literal(&mut self, start: usize) -> Result<Token, Diagnostic> {
        let body_start = self.current;
        let mut depth = 0usize;
        while let Some((idx, ch)) = self.bump() {
            match ch {
                '\\' => {
                    self.bump();
                }
                '$' if depth == 0 && self.match_next('{') => depth = 1,
                '{' if depth > 0 => depth += 1,
                '}' if depth > 0 => depth -= 1,
                '`' if depth == 0 => {
                    let body = self.source[body_start..idx].to_string();
                    let end = self.current;
                    return Ok(self.token(TokenKind::Template, body, start, end));
                }
                '\n' => self.saw_line_break = true,
                _ => {}
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::Lexer, "unterminated template literal")
                .with_span(self.span(start, self.current)),
        )
    }

    fn token(&mut self, kind: TokenKind, lexeme: String, start: usize, end: usize) -> Token {
        Token {
            kind,
            lexeme,
            span: self.span(start, end),
            line_break_before: false,
        }
    }

    fn simple_token(&mut self, start: usize, kind: TokenKind) -> Token {
        let end = self.current;
        let lexeme = self.source[start..end].to_string();
        self.token(kind, lexeme, start, end)
    }

    /// Picks `long` when the next char is `next`, otherwise `short`.
    fn either(&mut self, start: usize, next: char, long: TokenKind, short: TokenKind) -> Token {
        if self.match_next(next) {
            self.simple_token(start, long)
        } else {
            self.simple_token(start, short)
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let line_break_before = std::mem::take(&mut self.saw_line_break);
            let (start, ch) = match self.bump() {
                Some(pair) => pair,
                None => {
                    let end = self.current;
                    let mut eof = self.token(TokenKind::Eof, String::new(), end, end);
                    eof.line_break_before = line_break_before;
                    tokens.push(eof);
                    break;
                }
            };

            let mut token = match ch {
                c if c.is_alphabetic() || c == '_' || c == '$' => self.identifier_or_keyword(start),
                '0'..='9' => self.number_literal(start, false),
                '"' | '\'' => self.string_literal(start, ch)?,
                '`' => self.template_literal(start)?,
                '(' => self.simple_token(start, TokenKind::LParen),
                ')' => self.simple_token(start, TokenKind::RParen),
                '{' => self.simple_token(start, TokenKind::LBrace),
                '}' => self.simple_token(start, TokenKind::RBrace),
                '[' => self.simple_token(start, TokenKind::LBracket),
                ']' => self.simple_token(start, TokenKind::RBracket),
                ',' => self.simple_token(start, TokenKind::Comma),
                '.' => match self.peek() {
                    Some((_, '0'..='9')) => self.number_literal(start, true),
                    _ => self.simple_token(start, TokenKind::Dot),
                },
                ';' => self.simple_token(start, TokenKind::Semicolon),
                ':' => self.simple_token(start, TokenKind::Colon),
                '?' => self.either(
                    start,
                    '?',
                    TokenKind::QuestionQuestion,
                    TokenKind::Question,
                ),
                '+' => {
                    if self.match_next('+') {
                        self.simple_token(start, TokenKind::PlusPlus)
                    } else {
                        self.either(start, '=', TokenKind::PlusAssign, TokenKind::Plus)
                    }
                }
                '-' => {
                    if self.match_next('-') {
                        self.simple_token(start, TokenKind::MinusMinus)
                    } else {
                        self.either(start, '=', TokenKind::MinusAssign, TokenKind::Minus)
                    }
                }
                '*' => {
                    if self.match_next('*') {
                        self.simple_token(start, TokenKind::StarStar)
                    } else {
                        self.either(start, '=', TokenKind::StarAssign, TokenKind::Star)
                    }
                }
                '/' => self.either(start, '=', TokenKind::SlashAssign, TokenKind::Slash),
                '%' => self.either(start, '=', TokenKind::PercentAssign, TokenKind::Percent),
                '=' => {
                    if self.match_next('>') {
                        self.simple_token(start, TokenKind::FatArrow)
                    } else if self.match_next('=') {
                        self.either(
                            start,
                            '=',
                            TokenKind::EqualEqualEqual,
                            TokenKind::EqualEqual,
                        )
                    } else {
                        self.simple_token(start, TokenKind::Assign)
                    }
                }
                '!' => {
                    if self.match_next('=') {
                        self.either(start, '=', TokenKind::BangEqualEqual, TokenKind::BangEqual)
                    } else {
                        self.simple_token(start, TokenKind::Bang)
                    }
                }
                '&' => self.either(start, '&', TokenKind::DoubleAmpersand, TokenKind::Unknown),
                '|' => self.either(start, '|', TokenKind::DoublePipe, TokenKind::Unknown),
                '<' => self.either(start, '=', TokenKind::LessEqual, TokenKind::Less),
                '>' => self.either(start, '=', TokenKind::GreaterEqual, TokenKind::Greater),
                _ => self.simple_token(start, TokenKind::Unknown),
            };
            token.line_break_before = line_break_before;
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    use self::Keyword as Kw;
    let keyword = match ident {
        "var" => Kw::Var,
        "let" => Kw::Let,
        "const" => Kw::Const,
        "function" => Kw::Function,
        "async" => Kw::Async,
        "await" => Kw::Await,
        "return" => Kw::Return,
        "if" => Kw::If,
        "else" => Kw::Else,
        "while" => Kw::While,
        "do" => Kw::Do,
        "for" => Kw::For,
        "in" => Kw::In,
        "break" => Kw::Break,
        "continue" => Kw::Continue,
        "true" => Kw::True,
        "false" => Kw::False,
        "null" => Kw::Null,
        "new" => Kw::New,
        "throw" => Kw::Throw,
        "try" => Kw::Try,
        "catch" => Kw::Catch,
        "finally" => Kw::Finally,
        "typeof" => Kw::Typeof,
        "import" => Kw::Import,
        "export" => Kw::Export,
        "default" => Kw::Default,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}

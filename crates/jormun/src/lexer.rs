//! Tokenizer for the JavaScript front-end.
//!
//! Produces a token stream with one-token lookahead and line tracking.
//! The previous token's type is remembered both for regex/division
//! disambiguation (`/` after a name, number, or closing bracket is
//! division; otherwise it starts a regexp literal) and for automatic
//! semicolon insertion, which the parser drives off the `newline_before`
//! flag carried by every token.
//!
//! Identifiers are interned once: each spelling gets a stable [`AtomId`]
//! whose DJB hash is the unique id used as the scope-tree key, so later
//! passes compare identifiers by integer.

use crate::{
    error::{JsError, JsResult},
    intern::{AtomId, Interner},
};

/// Token types.
///
/// The same enum doubles as the AST node kind, the way the grammar tables
/// are written: lexical tokens first, then the synthetic kinds the parser
/// produces (`Statement`, `ForIn`, …) which never come out of the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
pub enum TokenType {
    End,
    Name,
    Number,
    #[strum(serialize = "string")]
    StringLiteral,
    #[strum(serialize = "regexp")]
    RegExpLiteral,

    #[strum(serialize = "{")]
    OpenBrace,
    #[strum(serialize = "}")]
    CloseBrace,
    #[strum(serialize = "(")]
    OpenParenthesis,
    #[strum(serialize = ")")]
    CloseParenthesis,
    #[strum(serialize = "[")]
    OpenBracket,
    #[strum(serialize = "]")]
    CloseBracket,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = "...")]
    Ellipsis,
    #[strum(serialize = ";")]
    Semicolon,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "?")]
    Conditional,
    #[strum(serialize = "=>")]
    Arrow,

    #[strum(serialize = "=")]
    Assignment,
    #[strum(serialize = "+")]
    Addition,
    #[strum(serialize = "-")]
    Subtraction,
    #[strum(serialize = "*")]
    Multiplication,
    #[strum(serialize = "**")]
    Exponentiation,
    #[strum(serialize = "/")]
    Division,
    #[strum(serialize = "%")]
    Remainder,
    #[strum(serialize = "++")]
    Increment,
    #[strum(serialize = "--")]
    Decrement,
    #[strum(serialize = "+=")]
    AdditionAssignment,
    #[strum(serialize = "-=")]
    SubtractionAssignment,
    #[strum(serialize = "*=")]
    MultiplicationAssignment,
    #[strum(serialize = "**=")]
    ExponentiationAssignment,
    #[strum(serialize = "/=")]
    DivisionAssignment,
    #[strum(serialize = "%=")]
    RemainderAssignment,

    #[strum(serialize = "&")]
    BitwiseAnd,
    #[strum(serialize = "^")]
    BitwiseXor,
    #[strum(serialize = "|")]
    BitwiseOr,
    #[strum(serialize = "~")]
    BitwiseNot,
    #[strum(serialize = "&=")]
    BitwiseAndAssignment,
    #[strum(serialize = "^=")]
    BitwiseXorAssignment,
    #[strum(serialize = "|=")]
    BitwiseOrAssignment,
    #[strum(serialize = "<<")]
    LeftShift,
    #[strum(serialize = ">>")]
    RightShift,
    #[strum(serialize = ">>>")]
    UnsignedRightShift,
    #[strum(serialize = "<<=")]
    LeftShiftAssignment,
    #[strum(serialize = ">>=")]
    RightShiftAssignment,
    #[strum(serialize = ">>>=")]
    UnsignedRightShiftAssignment,

    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
    #[strum(serialize = "!")]
    LogicalNot,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "===")]
    StrictEqual,
    #[strum(serialize = "!==")]
    StrictNotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[strum(serialize = ">=")]
    GreaterOrEqual,

    // Keywords.
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "case")]
    Case,
    #[strum(serialize = "catch")]
    Catch,
    #[strum(serialize = "continue")]
    Continue,
    #[strum(serialize = "default")]
    Default,
    #[strum(serialize = "delete")]
    Delete,
    #[strum(serialize = "do")]
    Do,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "export")]
    Export,
    #[strum(serialize = "finally")]
    Finally,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "function")]
    Function,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "instanceof")]
    InstanceOf,
    #[strum(serialize = "new")]
    New,
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "this")]
    This,
    #[strum(serialize = "throw")]
    Throw,
    #[strum(serialize = "true")]
    True,
    #[strum(serialize = "false")]
    False,
    #[strum(serialize = "try")]
    Try,
    #[strum(serialize = "typeof")]
    Typeof,
    #[strum(serialize = "var")]
    Var,
    #[strum(serialize = "void")]
    Void,
    #[strum(serialize = "while")]
    While,

    // Synthetic kinds produced by the parser, never by the lexer.
    Statement,
    Block,
    VarDeclaration,
    ObjectLiteral,
    PropertyEntry,
    ArrayLiteral,
    FunctionDeclaration,
    FunctionExpression,
    ArrowFunction,
    Call,
    MemberDot,
    MemberBracket,
    ForIn,
    Label,
    UnaryPlus,
    UnaryNegation,
    PostIncrement,
    PostDecrement,
    ExportDefault,
    Empty,
}

impl TokenType {
    /// Name used in error messages and trace output.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        self.into()
    }

    /// Whether a `/` immediately after this token is the division operator
    /// rather than the start of a regexp literal.
    fn allows_division_after(self) -> bool {
        matches!(
            self,
            Self::Name
                | Self::Number
                | Self::StringLiteral
                | Self::RegExpLiteral
                | Self::CloseParenthesis
                | Self::CloseBracket
                | Self::CloseBrace
                | Self::This
                | Self::True
                | Self::False
                | Self::Null
                | Self::Increment
                | Self::Decrement
        )
    }

    /// Whether this token can end an expression statement that ASI closes.
    pub(crate) fn is_assignment_operator(self) -> bool {
        matches!(
            self,
            Self::Assignment
                | Self::AdditionAssignment
                | Self::SubtractionAssignment
                | Self::MultiplicationAssignment
                | Self::ExponentiationAssignment
                | Self::DivisionAssignment
                | Self::RemainderAssignment
                | Self::BitwiseAndAssignment
                | Self::BitwiseXorAssignment
                | Self::BitwiseOrAssignment
                | Self::LeftShiftAssignment
                | Self::RightShiftAssignment
                | Self::UnsignedRightShiftAssignment
        )
    }
}

/// One token of the stream.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub ty: TokenType,
    /// One-based source line the token starts on.
    pub line: u32,
    /// True when at least one line terminator separated this token from
    /// the previous one; drives automatic semicolon insertion.
    pub newline_before: bool,
    /// Byte range of the token text in the source.
    pub start: u32,
    pub end: u32,
    /// Decoded numeric value for `Number` tokens.
    pub number: f64,
    /// Interned identifier for `Name` tokens.
    pub atom: Option<AtomId>,
    /// Decoded text for string literals; regexp literals store
    /// `(pattern, flags)` joined by `/` in raw form instead.
    pub string: Option<Box<str>>,
}

impl Token {
    fn punctuation(ty: TokenType, line: u32, newline_before: bool, start: usize, end: usize) -> Self {
        Self {
            ty,
            line,
            newline_before,
            start: start as u32,
            end: end as u32,
            number: 0.0,
            atom: None,
            string: None,
        }
    }

    /// The raw source text of the token.
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start as usize..self.end as usize]
    }
}

/// Keyword table; anything else that scans as an identifier is a `Name`.
fn keyword(text: &str) -> Option<TokenType> {
    Some(match text {
        "break" => TokenType::Break,
        "case" => TokenType::Case,
        "catch" => TokenType::Catch,
        "continue" => TokenType::Continue,
        "default" => TokenType::Default,
        "delete" => TokenType::Delete,
        "do" => TokenType::Do,
        "else" => TokenType::Else,
        "export" => TokenType::Export,
        "false" => TokenType::False,
        "finally" => TokenType::Finally,
        "for" => TokenType::For,
        "function" => TokenType::Function,
        "if" => TokenType::If,
        "import" => TokenType::Import,
        "in" => TokenType::In,
        "instanceof" => TokenType::InstanceOf,
        "new" => TokenType::New,
        "null" => TokenType::Null,
        "return" => TokenType::Return,
        "switch" => TokenType::Switch,
        "this" => TokenType::This,
        "throw" => TokenType::Throw,
        "true" => TokenType::True,
        "try" => TokenType::Try,
        "typeof" => TokenType::Typeof,
        "var" => TokenType::Var,
        "void" => TokenType::Void,
        "while" => TokenType::While,
        _ => return None,
    })
}

/// The tokenizer.
pub(crate) struct Lexer<'s, 'i> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
    line: u32,
    file_name: &'s str,
    /// Type of the last token handed out; decides `/` disambiguation.
    prev_type: TokenType,
    /// One-token lookahead buffer.
    lookahead: Option<Token>,
    interner: &'i mut Interner,
    /// Pending newline flag for the token being scanned.
    saw_newline: bool,
}

impl<'s, 'i> Lexer<'s, 'i> {
    pub fn new(src: &'s str, file_name: &'s str, start_line: u32, interner: &'i mut Interner) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: start_line,
            file_name,
            prev_type: TokenType::End,
            lookahead: None,
            interner,
            saw_newline: false,
        }
    }

    pub fn file_name(&self) -> &'s str {
        self.file_name
    }

    pub fn src(&self) -> &'s str {
        self.src
    }

    pub fn interner(&mut self) -> &mut Interner {
        self.interner
    }

    /// Current line, for error reporting.
    pub fn line(&self) -> u32 {
        self.lookahead.as_ref().map_or(self.line, |t| t.line)
    }

    fn syntax_error(&self, message: impl Into<String>) -> JsError {
        JsError::syntax(message, self.file_name, self.line)
    }

    /// Peeks at the next token without consuming it.
    pub fn peek(&mut self) -> JsResult<&Token> {
        if self.lookahead.is_none() {
            let token = self.scan()?;
            self.lookahead = Some(token);
        }
        Ok(self.lookahead.as_ref().expect("lookahead was just filled"))
    }

    pub fn peek_type(&mut self) -> JsResult<TokenType> {
        Ok(self.peek()?.ty)
    }

    /// Consumes and returns the next token.
    pub fn next(&mut self) -> JsResult<Token> {
        let token = match self.lookahead.take() {
            Some(token) => token,
            None => self.scan()?,
        };
        self.prev_type = token.ty;
        Ok(token)
    }

    /// The standard "unexpected token" error for `token`.
    pub fn unexpected(&self, token: &Token) -> JsError {
        if token.ty == TokenType::End {
            JsError::syntax("Unexpected end of input", self.file_name, token.line)
        } else {
            JsError::syntax(
                format!("Unexpected token \"{}\"", token.text(self.src)),
                self.file_name,
                token.line,
            )
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn byte(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    /// Skips whitespace and comments, recording line terminators.
    fn skip_trivia(&mut self) -> JsResult<()> {
        loop {
            match self.byte(0) {
                b'\n' => {
                    self.line += 1;
                    self.saw_newline = true;
                    self.pos += 1;
                }
                b'\r' | b' ' | b'\t' | 0x0b | 0x0c => {
                    self.pos += 1;
                }
                b'/' if self.byte(1) == b'/' => {
                    while !self.at_end() && self.byte(0) != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.byte(1) == b'*' => {
                    self.pos += 2;
                    loop {
                        if self.at_end() {
                            return Err(self.syntax_error("Unterminated comment"));
                        }
                        if self.byte(0) == b'*' && self.byte(1) == b'/' {
                            self.pos += 2;
                            break;
                        }
                        if self.byte(0) == b'\n' {
                            self.line += 1;
                            self.saw_newline = true;
                        }
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Scans one token.
    fn scan(&mut self) -> JsResult<Token> {
        self.saw_newline = false;
        self.skip_trivia()?;
        let newline = self.saw_newline;
        let start = self.pos;
        let line = self.line;

        if self.at_end() {
            return Ok(Token::punctuation(TokenType::End, line, newline, start, start));
        }

        let byte = self.byte(0);
        match byte {
            b'0'..=b'9' => self.scan_number(start, line, newline),
            b'.' if self.byte(1).is_ascii_digit() => self.scan_number(start, line, newline),
            b'"' | b'\'' => self.scan_string(start, line, newline),
            b'/' => {
                if self.prev_type.allows_division_after() {
                    self.scan_operator(start, line, newline)
                } else {
                    self.scan_regexp(start, line, newline)
                }
            }
            b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'$' => Ok(self.scan_name(start, line, newline)),
            _ if byte >= 0x80 => Err(self.syntax_error(format!(
                "Unexpected token \"{}\"",
                self.src[start..].chars().next().map(String::from).unwrap_or_default()
            ))),
            _ => self.scan_operator(start, line, newline),
        }
    }

    fn scan_name(&mut self, start: usize, line: u32, newline: bool) -> Token {
        while matches!(self.byte(0), b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'$') {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        if let Some(ty) = keyword(text) {
            return Token::punctuation(ty, line, newline, start, self.pos);
        }
        let atom = self.interner.intern(text);
        Token {
            ty: TokenType::Name,
            line,
            newline_before: newline,
            start: start as u32,
            end: self.pos as u32,
            number: 0.0,
            atom: Some(atom),
            string: None,
        }
    }

    fn scan_number(&mut self, start: usize, line: u32, newline: bool) -> JsResult<Token> {
        let number = if self.byte(0) == b'0' && matches!(self.byte(1), b'x' | b'X') {
            self.pos += 2;
            self.scan_radix_digits(16)?
        } else if self.byte(0) == b'0' && matches!(self.byte(1), b'o' | b'O') {
            self.pos += 2;
            self.scan_radix_digits(8)?
        } else if self.byte(0) == b'0' && matches!(self.byte(1), b'b' | b'B') {
            self.pos += 2;
            self.scan_radix_digits(2)?
        } else {
            while self.byte(0).is_ascii_digit() {
                self.pos += 1;
            }
            if self.byte(0) == b'.' {
                self.pos += 1;
                while self.byte(0).is_ascii_digit() {
                    self.pos += 1;
                }
            }
            if matches!(self.byte(0), b'e' | b'E') {
                self.pos += 1;
                if matches!(self.byte(0), b'+' | b'-') {
                    self.pos += 1;
                }
                if !self.byte(0).is_ascii_digit() {
                    return Err(self.syntax_error("Invalid exponent"));
                }
                while self.byte(0).is_ascii_digit() {
                    self.pos += 1;
                }
            }
            self.src[start..self.pos]
                .parse::<f64>()
                .map_err(|_| self.syntax_error("Invalid number"))?
        };

        // A number may not run straight into an identifier: `3in` is bad.
        if matches!(self.byte(0), b'A'..=b'Z' | b'a'..=b'z' | b'_' | b'$') {
            return Err(self.syntax_error("Invalid number"));
        }

        Ok(Token {
            ty: TokenType::Number,
            line,
            newline_before: newline,
            start: start as u32,
            end: self.pos as u32,
            number,
            atom: None,
            string: None,
        })
    }

    fn scan_radix_digits(&mut self, radix: u32) -> JsResult<f64> {
        let digits_start = self.pos;
        let mut value = 0.0f64;
        while let Some(digit) = char::from(self.byte(0)).to_digit(radix) {
            value = value * f64::from(radix) + f64::from(digit);
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(self.syntax_error("Invalid number"));
        }
        Ok(value)
    }

    fn scan_string(&mut self, start: usize, line: u32, newline: bool) -> JsResult<Token> {
        let quote = self.byte(0);
        self.pos += 1;
        let mut decoded = String::new();
        loop {
            if self.at_end() || self.byte(0) == b'\n' {
                return Err(self.syntax_error("Unterminated string"));
            }
            let byte = self.byte(0);
            if byte == quote {
                self.pos += 1;
                break;
            }
            if byte == b'\\' {
                self.pos += 1;
                self.scan_escape(&mut decoded)?;
                continue;
            }
            // Copy one whole character.
            let ch = self.src[self.pos..].chars().next().ok_or_else(|| self.syntax_error("Unterminated string"))?;
            decoded.push(ch);
            self.pos += ch.len_utf8();
        }
        Ok(Token {
            ty: TokenType::StringLiteral,
            line,
            newline_before: newline,
            start: start as u32,
            end: self.pos as u32,
            number: 0.0,
            atom: None,
            string: Some(decoded.into_boxed_str()),
        })
    }

    fn scan_escape(&mut self, out: &mut String) -> JsResult<()> {
        let byte = self.byte(0);
        self.pos += 1;
        match byte {
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'v' => out.push('\u{b}'),
            b'0' => out.push('\0'),
            b'\\' => out.push('\\'),
            b'\'' => out.push('\''),
            b'"' => out.push('"'),
            b'\n' => {
                // Line continuation.
                self.line += 1;
            }
            b'x' => {
                let value = self.scan_hex_digits(2, 2)?;
                out.push(char::from(value as u8));
            }
            b'u' => {
                let code = if self.byte(0) == b'{' {
                    self.pos += 1;
                    let value = self.scan_hex_digits(1, 6)?;
                    if self.byte(0) != b'}' {
                        return Err(self.syntax_error("Invalid Unicode code point"));
                    }
                    self.pos += 1;
                    value
                } else {
                    let unit = self.scan_hex_digits(4, 4)?;
                    // Fold a surrogate pair spelled as two \uXXXX escapes.
                    if (0xd800..0xdc00).contains(&unit) && self.byte(0) == b'\\' && self.byte(1) == b'u' {
                        let rewind = self.pos;
                        self.pos += 2;
                        let low = self.scan_hex_digits(4, 4)?;
                        if (0xdc00..0xe000).contains(&low) {
                            0x10000 + ((unit - 0xd800) << 10) + (low - 0xdc00)
                        } else {
                            self.pos = rewind;
                            unit
                        }
                    } else {
                        unit
                    }
                };
                match char::from_u32(code) {
                    Some(ch) => out.push(ch),
                    // Lone surrogates become the replacement character.
                    None if (0xd800..0xe000).contains(&code) => out.push('\u{fffd}'),
                    None => return Err(self.syntax_error("Invalid Unicode code point")),
                }
            }
            _ => {
                return Err(self.syntax_error("Invalid escape sequence"));
            }
        }
        Ok(())
    }

    fn scan_hex_digits(&mut self, min: usize, max: usize) -> JsResult<u32> {
        let mut value = 0u32;
        let mut count = 0;
        while count < max {
            let Some(digit) = char::from(self.byte(0)).to_digit(16) else {
                break;
            };
            value = value * 16 + digit;
            self.pos += 1;
            count += 1;
        }
        if count < min {
            return Err(self.syntax_error("Invalid escape sequence"));
        }
        Ok(value)
    }

    fn scan_regexp(&mut self, start: usize, line: u32, newline: bool) -> JsResult<Token> {
        self.pos += 1; // opening '/'
        let mut in_class = false;
        loop {
            if self.at_end() || self.byte(0) == b'\n' {
                return Err(self.syntax_error("Unterminated RegExp"));
            }
            match self.byte(0) {
                b'\\' => {
                    self.pos += 2;
                    continue;
                }
                b'[' => in_class = true,
                b']' => in_class = false,
                b'/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            self.pos += 1;
        }
        // Flags.
        while matches!(self.byte(0), b'A'..=b'Z' | b'a'..=b'z') {
            self.pos += 1;
        }
        Ok(Token {
            ty: TokenType::RegExpLiteral,
            line,
            newline_before: newline,
            start: start as u32,
            end: self.pos as u32,
            number: 0.0,
            atom: None,
            string: Some(self.src[start..self.pos].into()),
        })
    }

    fn scan_operator(&mut self, start: usize, line: u32, newline: bool) -> JsResult<Token> {
        // Longest-match over the operator table.
        let rest = &self.bytes[self.pos..];
        let table: &[(&[u8], TokenType)] = &[
            (b">>>=", TokenType::UnsignedRightShiftAssignment),
            (b"===", TokenType::StrictEqual),
            (b"!==", TokenType::StrictNotEqual),
            (b"**=", TokenType::ExponentiationAssignment),
            (b"<<=", TokenType::LeftShiftAssignment),
            (b">>=", TokenType::RightShiftAssignment),
            (b">>>", TokenType::UnsignedRightShift),
            (b"...", TokenType::Ellipsis),
            (b"=>", TokenType::Arrow),
            (b"==", TokenType::Equal),
            (b"!=", TokenType::NotEqual),
            (b"<=", TokenType::LessOrEqual),
            (b">=", TokenType::GreaterOrEqual),
            (b"&&", TokenType::LogicalAnd),
            (b"||", TokenType::LogicalOr),
            (b"++", TokenType::Increment),
            (b"--", TokenType::Decrement),
            (b"+=", TokenType::AdditionAssignment),
            (b"-=", TokenType::SubtractionAssignment),
            (b"*=", TokenType::MultiplicationAssignment),
            (b"/=", TokenType::DivisionAssignment),
            (b"%=", TokenType::RemainderAssignment),
            (b"&=", TokenType::BitwiseAndAssignment),
            (b"^=", TokenType::BitwiseXorAssignment),
            (b"|=", TokenType::BitwiseOrAssignment),
            (b"<<", TokenType::LeftShift),
            (b">>", TokenType::RightShift),
            (b"**", TokenType::Exponentiation),
            (b"{", TokenType::OpenBrace),
            (b"}", TokenType::CloseBrace),
            (b"(", TokenType::OpenParenthesis),
            (b")", TokenType::CloseParenthesis),
            (b"[", TokenType::OpenBracket),
            (b"]", TokenType::CloseBracket),
            (b",", TokenType::Comma),
            (b".", TokenType::Dot),
            (b";", TokenType::Semicolon),
            (b":", TokenType::Colon),
            (b"?", TokenType::Conditional),
            (b"=", TokenType::Assignment),
            (b"+", TokenType::Addition),
            (b"-", TokenType::Subtraction),
            (b"*", TokenType::Multiplication),
            (b"/", TokenType::Division),
            (b"%", TokenType::Remainder),
            (b"&", TokenType::BitwiseAnd),
            (b"^", TokenType::BitwiseXor),
            (b"|", TokenType::BitwiseOr),
            (b"~", TokenType::BitwiseNot),
            (b"!", TokenType::LogicalNot),
            (b"<", TokenType::Less),
            (b">", TokenType::Greater),
        ];
        for (text, ty) in table {
            if rest.starts_with(text) {
                self.pos += text.len();
                return Ok(Token::punctuation(*ty, line, newline, start, self.pos));
            }
        }
        Err(self.syntax_error(format!("Unexpected token \"{}\"", char::from(self.byte(0)))))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tokenize(src: &str) -> Vec<TokenType> {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(src, "test.js", 1, &mut interner);
        let mut out = Vec::new();
        loop {
            let token = lexer.next().unwrap();
            if token.ty == TokenType::End {
                break;
            }
            out.push(token.ty);
        }
        out
    }

    #[test]
    fn punctuation_longest_match() {
        assert_eq!(
            tokenize("a >>>= b >>> c >> d"),
            vec![
                TokenType::Name,
                TokenType::UnsignedRightShiftAssignment,
                TokenType::Name,
                TokenType::UnsignedRightShift,
                TokenType::Name,
                TokenType::RightShift,
                TokenType::Name,
            ]
        );
        assert_eq!(
            tokenize("x === y !== z"),
            vec![
                TokenType::Name,
                TokenType::StrictEqual,
                TokenType::Name,
                TokenType::StrictNotEqual,
                TokenType::Name,
            ]
        );
    }

    #[test]
    fn keywords_and_names() {
        assert_eq!(
            tokenize("var x = null"),
            vec![TokenType::Var, TokenType::Name, TokenType::Assignment, TokenType::Null]
        );
    }

    #[test]
    fn numbers_in_every_base() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("1 2.5 .5 1e3 1.5e-2 0x1f 0b101 0o17", "t.js", 1, &mut interner);
        let mut values = Vec::new();
        loop {
            let token = lexer.next().unwrap();
            if token.ty == TokenType::End {
                break;
            }
            assert_eq!(token.ty, TokenType::Number);
            values.push(token.number);
        }
        assert_eq!(values, vec![1.0, 2.5, 0.5, 1000.0, 0.015, 31.0, 5.0, 15.0]);
    }

    #[test]
    fn malformed_numbers_fail() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("0x", "t.js", 1, &mut interner);
        assert!(lexer.next().is_err());

        let mut interner = Interner::new();
        let mut lexer = Lexer::new("3in", "t.js", 1, &mut interner);
        assert!(lexer.next().is_err());
    }

    #[test]
    fn string_escapes_decode() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(r#""a\n\t\x41B\u{1F600}b""#, "t.js", 1, &mut interner);
        let token = lexer.next().unwrap();
        assert_eq!(token.ty, TokenType::StringLiteral);
        assert_eq!(token.string.as_deref(), Some("a\n\tAB\u{1f600}b"));
    }

    #[test]
    fn surrogate_pair_escapes_fold() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(r#""😀""#, "t.js", 1, &mut interner);
        let token = lexer.next().unwrap();
        assert_eq!(token.string.as_deref(), Some("\u{1f600}"));

        // A lone surrogate becomes U+FFFD.
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(r#""\uD83Dx""#, "t.js", 1, &mut interner);
        let token = lexer.next().unwrap();
        assert_eq!(token.string.as_deref(), Some("\u{fffd}x"));
    }

    #[test]
    fn unterminated_string_fails() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("\"abc", "t.js", 1, &mut interner);
        let err = lexer.next().unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: Unterminated string (t.js:1)");
    }

    #[test]
    fn division_vs_regexp_by_previous_token() {
        assert_eq!(
            tokenize("a / b"),
            vec![TokenType::Name, TokenType::Division, TokenType::Name]
        );
        assert_eq!(
            tokenize("(1) / 2"),
            vec![
                TokenType::OpenParenthesis,
                TokenType::Number,
                TokenType::CloseParenthesis,
                TokenType::Division,
                TokenType::Number,
            ]
        );
        assert_eq!(tokenize("x = /ab[/]c/g"), vec![
            TokenType::Name,
            TokenType::Assignment,
            TokenType::RegExpLiteral,
        ]);
    }

    #[test]
    fn newline_tracking_feeds_asi() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("a\nb", "t.js", 1, &mut interner);
        let a = lexer.next().unwrap();
        assert!(!a.newline_before);
        assert_eq!(a.line, 1);
        let b = lexer.next().unwrap();
        assert!(b.newline_before);
        assert_eq!(b.line, 2);
    }

    #[test]
    fn comments_are_trivia() {
        assert_eq!(
            tokenize("a // line\n/* block\nspanning */ b"),
            vec![TokenType::Name, TokenType::Name]
        );
    }

    #[test]
    fn identifiers_intern_to_stable_atoms() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("count count other", "t.js", 1, &mut interner);
        let first = lexer.next().unwrap().atom.unwrap();
        let second = lexer.next().unwrap().atom.unwrap();
        let third = lexer.next().unwrap().atom.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, third);
    }
}

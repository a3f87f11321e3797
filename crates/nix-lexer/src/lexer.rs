//! Mode-tracking tokenizer for the Nix expression language.
//!
//! Strings and indented strings contain nested token streams through `${`
//! interpolation, so the tokenizer keeps a mode stack: `${` and `{` push,
//! `}` pops, and the string modes resume where they left off. Unknown bytes
//! produce [`TokenKind::Error`] tokens but never stop the stream, and
//! tokenizing always terminates: every call to [`Tokenizer::next_token`]
//! consumes at least one byte until the final `Eof`.

use crate::position::{Position, Range};
use crate::token::{Token, TokenKind, TokenValue};

/// Lexer mode. `Default` lexes expressions; the string modes lex fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Default,
    Str,
    IndStr,
}

/// A restartable tokenizer over a source string.
pub struct Tokenizer<'a> {
    src: &'a str,
    index: usize,
    pos: Position,
    modes: Vec<Mode>,
}

/// Tokenize a whole source string, ending with a single `Eof` token.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

impl<'a> Tokenizer<'a> {
    /// Create a tokenizer positioned at the start of `source`.
    pub fn new(source: &'a str) -> Self {
        Tokenizer { src: source, index: 0, pos: Position::default(), modes: vec![Mode::Default] }
    }

    /// Produce the next token. Returns `Eof` forever once exhausted.
    pub fn next_token(&mut self) -> Token {
        match self.modes.last().copied().unwrap_or(Mode::Default) {
            Mode::Default => self.lex_default(),
            Mode::Str => self.lex_str_fragment(),
            Mode::IndStr => self.lex_ind_str_fragment(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.index..]
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.as_bytes().get(self.index).copied()
    }

    /// Advance over `n` bytes, which must lie on a char boundary.
    fn advance(&mut self, n: usize) {
        let taken = &self.src[self.index..self.index + n];
        for ch in taken.chars() {
            if ch == '\n' {
                self.pos.line += 1;
                self.pos.col = 0;
            } else {
                self.pos.col += ch.len_utf8() as u32;
            }
        }
        self.index += n;
    }

    fn token_from(&mut self, start: Position, kind: TokenKind, value: TokenValue) -> Token {
        Token { kind, value, range: Range::new(start, self.pos) }
    }

    // ===== Default mode =====

    fn lex_default(&mut self) -> Token {
        self.skip_trivia();
        let start = self.pos;

        if self.index >= self.src.len() {
            return self.token_from(start, TokenKind::Eof, TokenValue::None);
        }

        // Multi-character operators, longest first.
        const OPERATORS: &[(&str, TokenKind)] = &[
            ("...", TokenKind::Ellipsis),
            ("==", TokenKind::Eq),
            ("!=", TokenKind::Neq),
            ("<=", TokenKind::Leq),
            (">=", TokenKind::Geq),
            ("&&", TokenKind::And),
            ("||", TokenKind::Or),
            ("->", TokenKind::Impl),
            ("//", TokenKind::Update),
            ("++", TokenKind::Concat),
        ];
        for (text, kind) in OPERATORS {
            if self.rest().starts_with(text) {
                self.advance(text.len());
                return self.token_from(start, *kind, TokenValue::None);
            }
        }

        if self.rest().starts_with("${") {
            self.advance(2);
            self.modes.push(Mode::Default);
            return self.token_from(start, TokenKind::DollarCurly, TokenValue::None);
        }

        if self.rest().starts_with("''") {
            self.advance(2);
            self.modes.push(Mode::IndStr);
            return self.token_from(start, TokenKind::IndStrOpen, TokenValue::None);
        }

        let byte = match self.peek_byte() {
            Some(b) => b,
            None => return self.token_from(start, TokenKind::Eof, TokenValue::None),
        };

        match byte {
            b'"' => {
                self.advance(1);
                self.modes.push(Mode::Str);
                return self.token_from(start, TokenKind::DQuote, TokenValue::None);
            }
            b'{' => {
                self.advance(1);
                self.modes.push(Mode::Default);
                return self.token_from(start, TokenKind::LBrace, TokenValue::None);
            }
            b'}' => {
                self.advance(1);
                if self.modes.len() > 1 {
                    self.modes.pop();
                }
                return self.token_from(start, TokenKind::RBrace, TokenValue::None);
            }
            b'~' => {
                if let Some(len) = scan_home_path(self.rest()) {
                    let text = self.rest()[..len].to_string();
                    self.advance(len);
                    return self.token_from(start, TokenKind::HomePath, TokenValue::Path(text));
                }
                self.advance(1);
                return self.token_from(start, TokenKind::Error, TokenValue::None);
            }
            b'<' => {
                if let Some(len) = scan_search_path(self.rest()) {
                    let text = self.rest()[..len].to_string();
                    self.advance(len);
                    return self.token_from(start, TokenKind::SearchPath, TokenValue::Path(text));
                }
                self.advance(1);
                return self.token_from(start, TokenKind::Lt, TokenValue::None);
            }
            _ => {}
        }

        if let Some(token) = self.lex_word(start) {
            return token;
        }

        let kind = match byte {
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b';' => Some(TokenKind::Semicolon),
            b':' => Some(TokenKind::Colon),
            b',' => Some(TokenKind::Comma),
            b'.' => Some(TokenKind::Dot),
            b'=' => Some(TokenKind::Assign),
            b'@' => Some(TokenKind::At),
            b'?' => Some(TokenKind::Question),
            b'!' => Some(TokenKind::Not),
            b'>' => Some(TokenKind::Gt),
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Star),
            b'/' => Some(TokenKind::Slash),
            _ => None,
        };
        if let Some(kind) = kind {
            self.advance(1);
            return self.token_from(start, kind, TokenValue::None);
        }

        // No rule matched: consume one char so the stream makes progress.
        let ch_len = self.rest().chars().next().map_or(1, |c| c.len_utf8());
        self.advance(ch_len);
        self.token_from(start, TokenKind::Error, TokenValue::None)
    }

    /// Identifier, keyword, number, path, or URI: the candidates overlap, so
    /// scan all of them and let the longest match win, ties resolved in the
    /// strict lexer's rule order.
    fn lex_word(&mut self, start: Position) -> Option<Token> {
        let rest = self.rest();

        let id_len = scan_identifier(rest);
        let int_len = scan_int(rest);
        let float_len = scan_float(rest);
        let path_len = scan_path(rest);
        let uri_len = scan_uri(rest);

        // Rule order: ID, INT, FLOAT, PATH, URI.
        let candidates = [
            (id_len, 0u8),
            (int_len, 1),
            (float_len, 2),
            (path_len, 3),
            (uri_len, 4),
        ];
        let (len, rule) = candidates
            .iter()
            .filter_map(|&(len, rule)| len.map(|l| (l, rule)))
            .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))?;

        let text = &rest[..len];
        let token = match rule {
            0 => {
                let kind = keyword_kind(text).unwrap_or(TokenKind::Id);
                let value = if kind == TokenKind::Id {
                    TokenValue::Str { text: text.to_string(), has_indentation: false }
                } else {
                    TokenValue::None
                };
                (kind, value)
            }
            1 => match text.parse::<i64>() {
                Ok(n) => (TokenKind::Int, TokenValue::Int(n)),
                Err(_) => (TokenKind::Error, TokenValue::None),
            },
            2 => match text.parse::<f64>() {
                Ok(f) => (TokenKind::Float, TokenValue::Float(f)),
                Err(_) => (TokenKind::Error, TokenValue::None),
            },
            3 => (TokenKind::Path, TokenValue::Path(text.to_string())),
            _ => (TokenKind::Uri, TokenValue::Path(text.to_string())),
        };
        self.advance(len);
        Some(self.token_from(start, token.0, token.1))
    }

    // ===== String modes =====

    fn lex_str_fragment(&mut self) -> Token {
        let start = self.pos;

        if self.index >= self.src.len() {
            // Unterminated string.
            self.modes.pop();
            return self.token_from(start, TokenKind::Eof, TokenValue::None);
        }
        if self.peek_byte() == Some(b'"') {
            self.advance(1);
            self.modes.pop();
            return self.token_from(start, TokenKind::DQuote, TokenValue::None);
        }
        if self.rest().starts_with("${") {
            self.advance(2);
            self.modes.push(Mode::Default);
            return self.token_from(start, TokenKind::DollarCurly, TokenValue::None);
        }

        let mut text = String::new();
        while self.index < self.src.len() {
            if self.peek_byte() == Some(b'"') || self.rest().starts_with("${") {
                break;
            }
            let ch = match self.rest().chars().next() {
                Some(c) => c,
                None => break,
            };
            if ch == '\\' {
                self.advance(1);
                match self.rest().chars().next() {
                    Some(esc) => {
                        text.push(unescape(esc));
                        self.advance(esc.len_utf8());
                    }
                    None => break,
                }
            } else {
                text.push(ch);
                self.advance(ch.len_utf8());
            }
        }
        self.token_from(start, TokenKind::Str, TokenValue::Str { text, has_indentation: false })
    }

    fn lex_ind_str_fragment(&mut self) -> Token {
        let start = self.pos;

        if self.index >= self.src.len() {
            self.modes.pop();
            return self.token_from(start, TokenKind::Eof, TokenValue::None);
        }
        if self.rest().starts_with("''") && !is_ind_str_escape(self.rest()) {
            self.advance(2);
            self.modes.pop();
            return self.token_from(start, TokenKind::IndStrClose, TokenValue::None);
        }
        if self.rest().starts_with("${") {
            self.advance(2);
            self.modes.push(Mode::Default);
            return self.token_from(start, TokenKind::DollarCurly, TokenValue::None);
        }

        let mut text = String::new();
        while self.index < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("${") {
                break;
            }
            if rest.starts_with("''") {
                if rest.starts_with("'''") {
                    text.push_str("''");
                    self.advance(3);
                    continue;
                }
                if rest.starts_with("''$") {
                    // `''${` and `''$` both yield a literal dollar.
                    text.push('$');
                    self.advance(3);
                    if self.peek_byte() == Some(b'{') {
                        text.push('{');
                        self.advance(1);
                    }
                    continue;
                }
                if rest.starts_with("''\\") {
                    self.advance(3);
                    if let Some(esc) = self.rest().chars().next() {
                        text.push(unescape(esc));
                        self.advance(esc.len_utf8());
                    }
                    continue;
                }
                break;
            }
            let ch = match rest.chars().next() {
                Some(c) => c,
                None => break,
            };
            text.push(ch);
            self.advance(ch.len_utf8());
        }
        self.token_from(start, TokenKind::IndStr, TokenValue::Str { text, has_indentation: true })
    }

    // ===== Trivia =====

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_byte() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => self.advance(1),
                Some(b'#') => {
                    let len = memchr::memchr(b'\n', self.rest().as_bytes())
                        .unwrap_or(self.rest().len());
                    self.advance(len);
                }
                Some(b'/') if self.rest().starts_with("/*") => {
                    match memchr::memmem::find(self.rest().as_bytes(), b"*/") {
                        Some(end) => self.advance(end + 2),
                        None => self.advance(self.rest().len()),
                    }
                }
                _ => return,
            }
        }
    }
}

fn unescape(ch: char) -> char {
    match ch {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        other => other,
    }
}

/// `'''`, `''$`, and `''\` are escapes, not terminators.
fn is_ind_str_escape(rest: &str) -> bool {
    rest.starts_with("'''") || rest.starts_with("''$") || rest.starts_with("''\\")
}

fn keyword_kind(text: &str) -> Option<TokenKind> {
    Some(match text {
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "assert" => TokenKind::Assert,
        "with" => TokenKind::With,
        "let" => TokenKind::Let,
        "in" => TokenKind::In,
        "rec" => TokenKind::Rec,
        "inherit" => TokenKind::Inherit,
        "or" => TokenKind::OrKw,
        _ => return None,
    })
}

fn is_id_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_id_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'\'' || b == b'-'
}

fn is_path_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'+')
}

fn scan_identifier(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if !bytes.first().copied().map(is_id_start).unwrap_or(false) {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && is_id_char(bytes[i]) {
        i += 1;
    }
    Some(i)
}

fn scan_int(s: &str) -> Option<usize> {
    let len = s.bytes().take_while(|b| b.is_ascii_digit()).count();
    (len > 0).then_some(len)
}

/// `(([1-9][0-9]*\.[0-9]*)|(0?\.[0-9]+))([Ee][+-]?[0-9]+)?`
fn scan_float(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i > 1 && bytes[0] == b'0' {
        return None;
    }
    if bytes.get(i) != Some(&b'.') {
        return None;
    }
    i += 1;
    let frac_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if frac_start == i && (frac_start == 1 || bytes[0] == b'0') {
        // `.` or `0.` with no fraction digits
        return None;
    }
    if matches!(bytes.get(i), Some(b'e') | Some(b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+') | Some(b'-')) {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Some(i)
}

/// `[a-zA-Z0-9._+-]*(/[a-zA-Z0-9._+-]+)+/?`
fn scan_path(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && is_path_char(bytes[i]) {
        i += 1;
    }
    let mut segments = 0;
    loop {
        if bytes.get(i) != Some(&b'/') {
            break;
        }
        let mut j = i + 1;
        while j < bytes.len() && is_path_char(bytes[j]) {
            j += 1;
        }
        if j == i + 1 {
            break;
        }
        segments += 1;
        i = j;
    }
    if segments == 0 {
        return None;
    }
    if bytes.get(i) == Some(&b'/') {
        i += 1;
    }
    Some(i)
}

/// `~(/[a-zA-Z0-9._+-]+)+/?`
fn scan_home_path(s: &str) -> Option<usize> {
    if !s.starts_with('~') {
        return None;
    }
    scan_path(&s[1..]).map(|len| len + 1).filter(|_| s[1..].starts_with('/'))
}

/// `<[a-zA-Z0-9._+-]+(/[a-zA-Z0-9._+-]+)*>`
fn scan_search_path(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }
    let mut i = 1;
    let name_start = i;
    while i < bytes.len() && (is_path_char(bytes[i]) || bytes[i] == b'/') {
        i += 1;
    }
    if i == name_start || bytes.get(i) != Some(&b'>') {
        return None;
    }
    Some(i + 1)
}

/// `[a-zA-Z][a-zA-Z0-9+.-]*:[a-zA-Z0-9%/?:@&=+$,_.!~*'-]+`
fn scan_uri(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if !bytes.first().copied().map(|b| b.is_ascii_alphabetic()).unwrap_or(false) {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'+' | b'.' | b'-')) {
        i += 1;
    }
    if bytes.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    let body_start = i;
    while i < bytes.len()
        && (bytes[i].is_ascii_alphanumeric()
            || matches!(
                bytes[i],
                b'%' | b'/' | b'?' | b':' | b'@' | b'&' | b'=' | b'+' | b'$' | b',' | b'-'
                    | b'_' | b'.' | b'!' | b'~' | b'*' | b'\''
            ))
    {
        i += 1;
    }
    (i > body_start).then_some(i)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("if x == y then rec-val else _f'oo"),
            vec![
                TokenKind::If,
                TokenKind::Id,
                TokenKind::Eq,
                TokenKind::Id,
                TokenKind::Then,
                TokenKind::Id,
                TokenKind::Else,
                TokenKind::Id,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numbers() {
        let tokens = tokenize("42 3.25 .5");
        assert_eq!(tokens[0].value, TokenValue::Int(42));
        assert_eq!(tokens[1].value, TokenValue::Float(3.25));
        assert_eq!(tokens[2].value, TokenValue::Float(0.5));
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("a // b ++ c -> d"),
            vec![
                TokenKind::Id,
                TokenKind::Update,
                TokenKind::Id,
                TokenKind::Concat,
                TokenKind::Id,
                TokenKind::Impl,
                TokenKind::Id,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn plain_string_with_interpolation() {
        assert_eq!(
            kinds(r#""pre ${x} post""#),
            vec![
                TokenKind::DQuote,
                TokenKind::Str,
                TokenKind::DollarCurly,
                TokenKind::Id,
                TokenKind::RBrace,
                TokenKind::Str,
                TokenKind::DQuote,
                TokenKind::Eof,
            ]
        );
        let tokens = tokenize(r#""a\nb""#);
        assert_eq!(
            tokens[1].value,
            TokenValue::Str { text: "a\nb".to_string(), has_indentation: false }
        );
    }

    #[test]
    fn nested_braces_inside_interpolation() {
        assert_eq!(
            kinds(r#""${ { a = 1; }.a }""#),
            vec![
                TokenKind::DQuote,
                TokenKind::DollarCurly,
                TokenKind::LBrace,
                TokenKind::Id,
                TokenKind::Assign,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Dot,
                TokenKind::Id,
                TokenKind::RBrace,
                TokenKind::DQuote,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indented_string() {
        let tokens = tokenize("''\n  foo\n  ''$ {\n''");
        assert_eq!(tokens[0].kind, TokenKind::IndStrOpen);
        assert_eq!(tokens[1].kind, TokenKind::IndStr);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn paths_and_uris() {
        let tokens = tokenize("./foo/bar.nix /abs/path ~/home/x <nixpkgs> https://example.org/x");
        assert_eq!(tokens[0].kind, TokenKind::Path);
        assert_eq!(tokens[1].kind, TokenKind::Path);
        assert_eq!(tokens[2].kind, TokenKind::HomePath);
        assert_eq!(tokens[3].kind, TokenKind::SearchPath);
        assert_eq!(tokens[4].kind, TokenKind::Uri);
    }

    #[test]
    fn comments_are_skipped_but_count_toward_ranges() {
        let tokens = tokenize("a # trailing\n/* block */ b");
        assert_eq!(tokens[0].kind, TokenKind::Id);
        assert_eq!(tokens[1].kind, TokenKind::Id);
        assert_eq!(tokens[1].range.start, Position::new(1, 12));
    }

    #[test]
    fn unknown_bytes_become_error_tokens() {
        let tokens = tokenize("a § b");
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert_eq!(tokens[2].kind, TokenKind::Id);
    }

    #[test]
    fn ranges_are_byte_accurate() {
        let tokens = tokenize("ab cd");
        assert_eq!(tokens[0].range, Range::new(Position::new(0, 0), Position::new(0, 2)));
        assert_eq!(tokens[1].range, Range::new(Position::new(0, 3), Position::new(0, 5)));
    }

    #[test]
    fn unterminated_string_reaches_eof() {
        let tokens = tokenize("\"abc");
        assert_eq!(tokens[0].kind, TokenKind::DQuote);
        assert_eq!(tokens[1].kind, TokenKind::Str);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Tokenizing arbitrary input terminates and ends with Eof.
            #[test]
            fn tokenize_is_total(source in ".*") {
                let tokens = tokenize(&source);
                prop_assert!(!tokens.is_empty());
                prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
            }

            // Token ranges never move backwards.
            #[test]
            fn ranges_are_monotonic(source in ".*") {
                let tokens = tokenize(&source);
                for pair in tokens.windows(2) {
                    prop_assert!(pair[0].range.start <= pair[1].range.start);
                }
            }
        }
    }
}

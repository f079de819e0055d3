//! Indentation-sensitive lexer (§4.1).
//!
//! The lexer never fails: unrecognized bytes become `Illegal` tokens that
//! the parser rejects. Indentation is tracked as mutable state on the
//! lexer (a stack of column widths, initially `[0]`), and queued `Dedent`
//! tokens are drained one per call to [`Lexer::next_token`] so the token
//! stream stays single-producer.

use crate::token::{keyword, Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indent_stack: Vec<usize>,
    pending_dedents: usize,
    at_line_start: bool,
    exhausted: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            indent_stack: vec![0],
            pending_dedents: 0,
            at_line_start: true,
            exhausted: false,
        }
    }

    /// Tokenizes the whole source eagerly. Convenient for the parser, which
    /// consumes the stream with lookahead.
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn col(&self) -> usize {
        self.pos
    }

    /// Measures indentation width of the line starting at `pos`, counting
    /// tabs as 4 columns (§4.1). Returns `None` if the line is blank or
    /// comment-only (such lines emit no layout tokens).
    fn measure_indent(&self) -> (usize, usize) {
        let mut width = 0;
        let mut idx = self.pos;
        while let Some(c) = self.chars.get(idx) {
            match c {
                ' ' => {
                    width += 1;
                    idx += 1;
                }
                '\t' => {
                    width += 4;
                    idx += 1;
                }
                _ => break,
            }
        }
        (width, idx)
    }

    fn is_blank_or_comment(&self, content_idx: usize) -> bool {
        match self.chars.get(content_idx) {
            None => true,
            Some('\n') => true,
            Some('#') => true,
            _ => false,
        }
    }

    fn skip_line_remainder(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Handles the layout protocol at the start of a physical line,
    /// advancing past any skippable blank/comment-only lines first.
    /// Returns `Some(token)` if an `Indent`/`Dedent` must be emitted before
    /// scanning content tokens.
    fn handle_line_start(&mut self) -> Option<Token> {
        loop {
            let (width, content_idx) = self.measure_indent();
            if self.is_blank_or_comment(content_idx) {
                self.pos = content_idx;
                if self.peek() == Some('#') {
                    self.skip_line_remainder();
                }
                if self.peek() == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                    continue;
                }
                // Blank-to-EOF: nothing left to scan.
                self.at_line_start = false;
                return None;
            }

            self.pos = content_idx;
            let top = *self.indent_stack.last().unwrap();
            self.at_line_start = false;
            if width > top {
                self.indent_stack.push(width);
                return Some(Token::new(TokenKind::Indent, self.line, self.col()));
            } else if width < top {
                let mut pops = 0;
                while *self.indent_stack.last().unwrap() > width {
                    self.indent_stack.pop();
                    pops += 1;
                }
                self.pending_dedents = pops - 1;
                return Some(Token::new(TokenKind::Dedent, self.line, self.col()));
            } else {
                return None;
            }
        }
    }

    fn read_while<F: Fn(char) -> bool>(&mut self, pred: F) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if pred(c) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.chars[start..self.pos].iter().collect()
    }

    pub fn next_token(&mut self) -> Token {
        if self.exhausted {
            return Token::new(TokenKind::Eof, self.line, self.col());
        }
        if self.pending_dedents > 0 {
            self.pending_dedents -= 1;
            return Token::new(TokenKind::Dedent, self.line, self.col());
        }

        if self.at_line_start {
            if let Some(tok) = self.handle_line_start() {
                return tok;
            }
        }

        // Intra-line whitespace (not counted toward indentation).
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }

        let line = self.line;
        let col = self.col();

        let c = match self.peek() {
            None => {
                if self.indent_stack.len() > 1 {
                    let mut pops = 0;
                    while self.indent_stack.len() > 1 {
                        self.indent_stack.pop();
                        pops += 1;
                    }
                    self.pending_dedents = pops - 1;
                    return Token::new(TokenKind::Dedent, line, col);
                }
                self.exhausted = true;
                return Token::new(TokenKind::Eof, line, col);
            }
            Some(c) => c,
        };

        match c {
            '\n' => {
                self.pos += 1;
                self.line += 1;
                self.at_line_start = true;
                Token::new(TokenKind::Newline, line, col)
            }
            '#' => {
                self.skip_line_remainder();
                self.next_token()
            }
            '"' => {
                self.pos += 1;
                let s = self.read_while(|c| c != '"');
                if self.peek() == Some('"') {
                    self.pos += 1;
                }
                Token::new(TokenKind::String(s), line, col)
            }
            ':' => {
                self.pos += 1;
                Token::new(TokenKind::Colon, line, col)
            }
            ',' => {
                self.pos += 1;
                Token::new(TokenKind::Comma, line, col)
            }
            '=' => {
                self.pos += 1;
                Token::new(TokenKind::Equals, line, col)
            }
            '(' => {
                self.pos += 1;
                Token::new(TokenKind::LParen, line, col)
            }
            ')' => {
                self.pos += 1;
                Token::new(TokenKind::RParen, line, col)
            }
            '$' => {
                self.pos += 1;
                Token::new(TokenKind::Dollar, line, col)
            }
            '-' if self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                self.pos += 1;
                let digits = self.read_while(|c| c.is_ascii_digit());
                let n: i64 = format!("-{digits}").parse().unwrap_or(0);
                Token::new(TokenKind::Number(n), line, col)
            }
            c if c.is_ascii_digit() => {
                let digits = self.read_while(|c| c.is_ascii_digit());
                let n: i64 = digits.parse().unwrap_or(0);
                Token::new(TokenKind::Number(n), line, col)
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_while(|c| c.is_alphanumeric() || c == '_' || c == '-');
                match keyword(&ident) {
                    Some(kw) => Token::new(kw, line, col),
                    None => Token::new(TokenKind::Ident(ident), line, col),
                }
            }
            other => {
                self.pos += 1;
                Token::new(TokenKind::Illegal(other.to_string()), line, col)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_var_decl() {
        let ks = kinds("var NAME = \"flux\"\n");
        assert_eq!(
            ks,
            vec![
                Var,
                Ident("NAME".into()),
                Equals,
                String("flux".into()),
                Newline,
                Eof
            ]
        );
    }

    #[test]
    fn indentation_roundtrip() {
        let src = "task build:\n    run:\n        echo hi\n";
        let ks = kinds(src);
        assert_eq!(
            ks,
            vec![
                Task,
                Ident("build".into()),
                Colon,
                Newline,
                Indent,
                Run,
                Colon,
                Newline,
                Indent,
                Ident("echo".into()),
                Ident("hi".into()),
                Newline,
                Dedent,
                Dedent,
                Eof,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_transparent() {
        let src = "task a:\n\n    # a comment\n    run:\n        echo hi\n";
        let ks = kinds(src);
        assert_eq!(
            ks,
            vec![
                Task,
                Ident("a".into()),
                Colon,
                Newline,
                Indent,
                Run,
                Colon,
                Newline,
                Indent,
                Ident("echo".into()),
                Ident("hi".into()),
                Newline,
                Dedent,
                Dedent,
                Eof,
            ]
        );
    }

    #[test]
    fn dedent_to_multiple_levels_at_eof() {
        let src = "task a:\n    deps:\n        b\n";
        let ks = kinds(src);
        // two DEDENTs queued at EOF: one from `deps:` block, one from the task body
        let dedent_count = ks.iter().filter(|k| **k == Dedent).count();
        assert_eq!(dedent_count, 2);
    }

    #[test]
    fn illegal_byte() {
        let ks = kinds("var X = @\n");
        assert!(matches!(ks[3], Illegal(_)));
    }

    #[test]
    fn negative_number() {
        let ks = kinds("retries: -1\n");
        assert_eq!(ks[0], Retries);
        assert_eq!(ks[2], Number(-1));
    }
}

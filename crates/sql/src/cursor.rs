use sqlparser::tokenizer::{Token, Word};

pub(crate) fn is_trivia(t: &Token) -> bool {
    matches!(t, Token::Whitespace(_) | Token::EOF)
}

pub(crate) fn is_keyword(t: &Token, kw: &str) -> bool {
    matches!(t, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(kw))
}

/// Forward-only view over a token slice that skips whitespace and comments.
pub(crate) struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn skip_trivia(&mut self) {
        while self.pos < self.tokens.len() && is_trivia(&self.tokens[self.pos]) {
            self.pos += 1;
        }
    }

    pub(crate) fn peek(&mut self) -> Option<&'a Token> {
        self.skip_trivia();
        self.tokens.get(self.pos)
    }

    pub(crate) fn next(&mut self) -> Option<&'a Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    pub(crate) fn eat_keyword(&mut self, kw: &str) -> bool {
        match self.peek() {
            Some(t) if is_keyword(t, kw) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(t) if t == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn word(&mut self) -> Option<&'a Word> {
        match self.peek() {
            Some(Token::Word(w)) => {
                self.pos += 1;
                Some(w)
            }
            _ => None,
        }
    }

    /// Index of the next significant token in the underlying slice.
    pub(crate) fn position(&mut self) -> usize {
        self.skip_trivia();
        self.pos
    }

    pub(crate) fn rest(&self) -> &'a [Token] {
        &self.tokens[self.pos.min(self.tokens.len())..]
    }

    pub(crate) fn is_exhausted(&mut self) -> bool {
        self.peek().is_none()
    }
}

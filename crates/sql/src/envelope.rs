use rill_common::{Result, RillError};
use sqlparser::tokenizer::Token;

use crate::cursor::Cursor;

/// Kind of relation created by a `CREATE ... AS SELECT` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Stream,
    Table,
}

/// The statement shape wrapped around the query body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// A plain query.
    Query,
    /// `CREATE STREAM|TABLE name [WITH (k = v, ...)] AS <query>`.
    CreateAsSelect {
        kind: SinkKind,
        name: String,
        properties: Vec<(String, String)>,
    },
    /// `INSERT INTO name <query>`.
    InsertInto { target: String },
}

/// Split the envelope off a statement's tokens, returning the query body.
///
/// Statements that are not recognised as an envelope are returned whole so the
/// grammar can report on them.
pub(crate) fn split_envelope(tokens: &[Token]) -> Result<(Envelope, &[Token])> {
    let mut c = Cursor::new(tokens);

    if c.eat_keyword("CREATE") {
        let kind = if c.eat_keyword("STREAM") {
            SinkKind::Stream
        } else if c.eat_keyword("TABLE") {
            SinkKind::Table
        } else {
            return Ok((Envelope::Query, tokens));
        };
        let Some(name) = c.word() else {
            return Ok((Envelope::Query, tokens));
        };
        let name = name.value.clone();
        let properties = if c.eat_keyword("WITH") {
            parse_properties(&mut c)?
        } else {
            vec![]
        };
        if !c.eat_keyword("AS") {
            // CREATE TABLE t (a INT) and friends: leave to the grammar.
            if kind == SinkKind::Table {
                return Ok((Envelope::Query, tokens));
            }
            return Err(RillError::Parse(format!(
                "expected AS after CREATE STREAM {name}"
            )));
        }
        return Ok((
            Envelope::CreateAsSelect {
                kind,
                name,
                properties,
            },
            c.rest(),
        ));
    }

    if c.eat_keyword("INSERT") {
        if !c.eat_keyword("INTO") {
            return Err(RillError::Parse("expected INTO after INSERT".to_string()));
        }
        let target = c
            .word()
            .ok_or_else(|| RillError::Parse("expected target name after INSERT INTO".to_string()))?
            .value
            .clone();
        return Ok((Envelope::InsertInto { target }, c.rest()));
    }

    Ok((Envelope::Query, tokens))
}

fn parse_properties(c: &mut Cursor<'_>) -> Result<Vec<(String, String)>> {
    if !c.eat(&Token::LParen) {
        return Err(RillError::Parse("expected '(' after WITH".to_string()));
    }
    let mut props = vec![];
    loop {
        let key = c
            .word()
            .ok_or_else(|| RillError::Parse("expected property name in WITH (...)".to_string()))?
            .value
            .clone();
        if !c.eat(&Token::Eq) {
            return Err(RillError::Parse(format!("expected '=' after property {key}")));
        }
        let value = match c.next() {
            Some(Token::SingleQuotedString(s)) => s.clone(),
            Some(Token::Number(n, _)) => n.clone(),
            Some(Token::Word(w)) => w.value.clone(),
            other => {
                return Err(RillError::Parse(format!(
                    "unsupported value for property {key}: {other:?}"
                )))
            }
        };
        props.push((key, value));
        if c.eat(&Token::Comma) {
            continue;
        }
        if c.eat(&Token::RParen) {
            return Ok(props);
        }
        return Err(RillError::Parse(
            "expected ',' or ')' in WITH (...)".to_string(),
        ));
    }
}

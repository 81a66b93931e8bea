//! Parser boundary for rill.
//!
//! SQL text is tokenized with `sqlparser`, split into statements, and each
//! statement is peeled into three parts before the query body is handed to the
//! `sqlparser` grammar:
//! - the statement envelope (`CREATE STREAM|TABLE ... AS`, `INSERT INTO ...`)
//! - an optional streaming `WINDOW TUMBLING|HOPPING|SESSION (...)` clause
//! - the plain `SELECT` query

mod cursor;
mod envelope;
mod window;

use rill_common::{NodeLocation, Result, RillError};
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, TokenWithLocation, Tokenizer};
use tracing::debug;

pub use envelope::{Envelope, SinkKind};
pub use window::WindowSpec;

/// One statement of a SQL script, split into envelope, window and query body.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    /// Statement text as written (without the terminating `;`).
    pub text: String,
    pub envelope: Envelope,
    pub window: Option<WindowSpec>,
    pub query: Box<Query>,
    /// Words of the query body in source order, window clause excluded.
    pub identifiers: Vec<Identifier>,
}

/// A word of the query body and where it starts in the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    /// Spelling as written, without quotes.
    pub value: String,
    pub location: NodeLocation,
}

/// Parse a SQL script into its statements, in source order.
///
/// `max_depth` bounds the grammar's recursion; exceeding it is reported as
/// [`RillError::ExpressionTooDeep`].
pub fn parse_sql(sql: &str, max_depth: usize) -> Result<Vec<ParsedStatement>> {
    let dialect = GenericDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize_with_location()
        .map_err(|e| RillError::Parse(e.to_string()))?;

    let mut out = vec![];
    for chunk in tokens.split(|t| t.token == Token::SemiColon) {
        if chunk.iter().all(|t| cursor::is_trivia(&t.token)) {
            continue;
        }
        out.push(parse_statement(&dialect, chunk, max_depth)?);
    }
    if out.is_empty() {
        return Err(RillError::Parse("no SQL statement found".to_string()));
    }
    debug!(statements = out.len(), "parsed sql script");
    Ok(out)
}

fn parse_statement(
    dialect: &GenericDialect,
    located: &[TokenWithLocation],
    max_depth: usize,
) -> Result<ParsedStatement> {
    let tokens: Vec<Token> = located.iter().map(|t| t.token.clone()).collect();
    let text = render(&tokens).trim().to_string();
    let (envelope, body) = envelope::split_envelope(&tokens)?;
    let body_start = tokens.len() - body.len();
    let (window, body) = window::extract_window(body)?;
    let body_sql = render(&body);

    let window_span = window.as_ref().map(|w| w.span.clone()).unwrap_or_default();
    let identifiers = located[body_start..]
        .iter()
        .enumerate()
        .filter(|(i, _)| !window_span.contains(i))
        .filter_map(|(_, t)| match &t.token {
            Token::Word(w) => Some(Identifier {
                value: w.value.clone(),
                location: NodeLocation::new(t.location.line as u32, t.location.column as u32),
            }),
            _ => None,
        })
        .collect();

    let mut statements = Parser::new(dialect)
        .with_recursion_limit(max_depth)
        .try_with_sql(&body_sql)
        .and_then(|mut p| p.parse_statements())
        .map_err(|e| parser_error(e, max_depth))?;
    if statements.len() != 1 {
        return Err(RillError::Parse(format!(
            "expected exactly one query in statement, found {}",
            statements.len()
        )));
    }
    let query = match statements.pop() {
        Some(Statement::Query(q)) => q,
        Some(other) => {
            return Err(RillError::Unsupported(format!(
                "only SELECT, CREATE STREAM/TABLE AS SELECT and INSERT INTO ... SELECT are supported: {other}"
            )))
        }
        None => return Err(RillError::Parse("empty statement".to_string())),
    };

    Ok(ParsedStatement {
        text,
        envelope,
        window: window.map(|w| w.spec),
        query,
        identifiers,
    })
}

fn parser_error(e: ParserError, max_depth: usize) -> RillError {
    match e {
        ParserError::RecursionLimitExceeded => RillError::ExpressionTooDeep { limit: max_depth },
        other => RillError::Parse(other.to_string()),
    }
}

fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter(|t| !matches!(t, Token::EOF))
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn splits_script_into_statements() {
        let stmts = parse_sql("SELECT a FROM s1; SELECT b FROM s2;", 64).expect("parse");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "SELECT a FROM s1");
        assert_eq!(stmts[1].text, "SELECT b FROM s2");
        assert_eq!(stmts[0].envelope, Envelope::Query);
    }

    #[test]
    fn create_stream_envelope_is_split_off() {
        let stmts = parse_sql(
            "CREATE STREAM big_orders WITH (kafka_topic='big', partitions=4) AS SELECT id FROM orders",
            64,
        )
        .expect("parse");
        match &stmts[0].envelope {
            Envelope::CreateAsSelect {
                kind,
                name,
                properties,
            } => {
                assert_eq!(*kind, SinkKind::Stream);
                assert_eq!(name, "big_orders");
                assert_eq!(
                    properties,
                    &vec![
                        ("kafka_topic".to_string(), "big".to_string()),
                        ("partitions".to_string(), "4".to_string())
                    ]
                );
            }
            other => panic!("unexpected envelope {other:?}"),
        }
        assert_eq!(stmts[0].query.to_string(), "SELECT id FROM orders");
    }

    #[test]
    fn insert_into_envelope_is_split_off() {
        let stmts = parse_sql("INSERT INTO sink SELECT id FROM orders", 64).expect("parse");
        assert_eq!(
            stmts[0].envelope,
            Envelope::InsertInto {
                target: "sink".to_string()
            }
        );
    }

    #[test]
    fn window_clause_is_extracted() {
        let stmts = parse_sql(
            "SELECT id, COUNT(*) FROM orders WINDOW TUMBLING (SIZE 30 SECONDS) GROUP BY id",
            64,
        )
        .expect("parse");
        assert_eq!(
            stmts[0].window,
            Some(WindowSpec::Tumbling {
                size: Duration::from_secs(30)
            })
        );
        assert_eq!(
            stmts[0].query.to_string(),
            "SELECT id, COUNT(*) FROM orders GROUP BY id"
        );
    }

    #[test]
    fn ddl_without_select_is_unsupported() {
        let err = parse_sql("CREATE TABLE t (a INT)", 64).expect_err("must fail");
        assert!(matches!(err, RillError::Unsupported(_)), "{err}");
    }

    #[test]
    fn recursion_limit_maps_to_expression_too_deep() {
        let nested = format!("SELECT {}1{} FROM s", "(".repeat(40), ")".repeat(40));
        let err = parse_sql(&nested, 8).expect_err("must fail");
        assert!(matches!(err, RillError::ExpressionTooDeep { limit: 8 }), "{err}");
    }

    #[test]
    fn empty_script_is_rejected() {
        let err = parse_sql("  ;  ", 64).expect_err("must fail");
        assert!(matches!(err, RillError::Parse(_)), "{err}");
    }

    #[test]
    fn identifiers_are_located_in_the_script() {
        let stmts = parse_sql(
            "SELECT a FROM s1;\nCREATE STREAM out AS SELECT 'b' AS x, \"b\" FROM s2 \
             WINDOW TUMBLING (SIZE 5 SECONDS)",
            64,
        )
        .expect("parse");
        let words = |i: usize| -> Vec<(String, u32, u32)> {
            stmts[i]
                .identifiers
                .iter()
                .map(|id| (id.value.clone(), id.location.line, id.location.column))
                .collect()
        };
        assert_eq!(
            words(0),
            vec![
                ("SELECT".to_string(), 1, 1),
                ("a".to_string(), 1, 8),
                ("FROM".to_string(), 1, 10),
                ("s1".to_string(), 1, 15),
            ]
        );
        let second = words(1);
        assert_eq!(second[0], ("SELECT".to_string(), 2, 22));
        assert_eq!(second[3], ("b".to_string(), 2, 39));
        assert!(!second.iter().any(|(w, ..)| w == "SIZE" || w == "out"), "{second:?}");
    }
}

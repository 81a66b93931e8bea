use std::ops::Range;
use std::time::Duration;

use rill_common::{Result, RillError};
use sqlparser::tokenizer::Token;

use crate::cursor::{is_keyword, Cursor};

/// Streaming window clause attached to an aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    /// `WINDOW TUMBLING (SIZE <n> <unit>)`
    Tumbling { size: Duration },
    /// `WINDOW HOPPING (SIZE <n> <unit>, ADVANCE BY <n> <unit>)`
    Hopping { size: Duration, advance: Duration },
    /// `WINDOW SESSION (<n> <unit>)`
    Session { gap: Duration },
}

/// A window clause taken out of a statement body.
#[derive(Debug)]
pub(crate) struct ExtractedWindow {
    pub(crate) spec: WindowSpec,
    /// Token indices the clause occupied in the body it was taken from.
    pub(crate) span: Range<usize>,
}

/// Remove a streaming window clause from the tokens, if present.
///
/// Only `WINDOW` followed by `TUMBLING`, `HOPPING` or `SESSION` is taken; a
/// standard named-window clause is left for the grammar.
pub(crate) fn extract_window(tokens: &[Token]) -> Result<(Option<ExtractedWindow>, Vec<Token>)> {
    let Some(start) = find_window_start(tokens) else {
        return Ok((None, tokens.to_vec()));
    };

    let mut c = Cursor::new(&tokens[start + 1..]);
    let spec = if c.eat_keyword("TUMBLING") {
        expect(&mut c, &Token::LParen)?;
        expect_keyword(&mut c, "SIZE")?;
        let size = duration(&mut c)?;
        WindowSpec::Tumbling { size }
    } else if c.eat_keyword("HOPPING") {
        expect(&mut c, &Token::LParen)?;
        expect_keyword(&mut c, "SIZE")?;
        let size = duration(&mut c)?;
        expect(&mut c, &Token::Comma)?;
        expect_keyword(&mut c, "ADVANCE")?;
        expect_keyword(&mut c, "BY")?;
        let advance = duration(&mut c)?;
        if advance > size {
            return Err(RillError::Parse(
                "HOPPING window ADVANCE BY must not exceed SIZE".to_string(),
            ));
        }
        WindowSpec::Hopping { size, advance }
    } else if c.eat_keyword("SESSION") {
        expect(&mut c, &Token::LParen)?;
        let gap = duration(&mut c)?;
        WindowSpec::Session { gap }
    } else {
        return Ok((None, tokens.to_vec()));
    };
    expect(&mut c, &Token::RParen)?;

    let end = tokens.len() - c.rest().len();
    let mut remaining = tokens[..start].to_vec();
    remaining.extend_from_slice(c.rest());
    if find_window_start(&remaining).is_some() {
        return Err(RillError::Parse(
            "only one WINDOW clause is allowed".to_string(),
        ));
    }
    let window = ExtractedWindow {
        spec,
        span: start..end,
    };
    Ok((Some(window), remaining))
}

fn find_window_start(tokens: &[Token]) -> Option<usize> {
    let mut c = Cursor::new(tokens);
    loop {
        let pos = c.position();
        let tok = c.next()?;
        if is_keyword(tok, "WINDOW") {
            if let Some(next) = c.peek() {
                if ["TUMBLING", "HOPPING", "SESSION"]
                    .iter()
                    .any(|kw| is_keyword(next, kw))
                {
                    return Some(pos);
                }
            }
        }
    }
}

fn expect(c: &mut Cursor<'_>, t: &Token) -> Result<()> {
    if c.eat(t) {
        Ok(())
    } else {
        Err(RillError::Parse(format!(
            "expected '{t}' in WINDOW clause, found {:?}",
            c.peek()
        )))
    }
}

fn expect_keyword(c: &mut Cursor<'_>, kw: &str) -> Result<()> {
    if c.eat_keyword(kw) {
        Ok(())
    } else {
        Err(RillError::Parse(format!(
            "expected {kw} in WINDOW clause, found {:?}",
            c.peek()
        )))
    }
}

fn duration(c: &mut Cursor<'_>) -> Result<Duration> {
    let amount: u64 = match c.next() {
        Some(Token::Number(n, _)) => n
            .parse()
            .map_err(|_| RillError::Parse(format!("bad window duration: {n}")))?,
        other => {
            return Err(RillError::Parse(format!(
                "expected window duration, found {other:?}"
            )))
        }
    };
    let unit = c
        .word()
        .ok_or_else(|| RillError::Parse("expected time unit in WINDOW clause".to_string()))?
        .value
        .to_ascii_uppercase();
    let secs = |per_unit: u64| {
        amount
            .checked_mul(per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| RillError::Parse("window duration out of range".to_string()))
    };
    let d = match unit.trim_end_matches('S') {
        "MILLISECOND" => Duration::from_millis(amount),
        "SECOND" => Duration::from_secs(amount),
        "MINUTE" => secs(60)?,
        "HOUR" => secs(60 * 60)?,
        "DAY" => secs(24 * 60 * 60)?,
        _ => return Err(RillError::Parse(format!("unknown time unit: {unit}"))),
    };
    if d.is_zero() {
        return Err(RillError::Parse("window duration must be > 0".to_string()));
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use sqlparser::dialect::GenericDialect;
    use sqlparser::tokenizer::Tokenizer;

    use super::*;

    fn tokens(sql: &str) -> Vec<Token> {
        Tokenizer::new(&GenericDialect {}, sql)
            .tokenize()
            .expect("tokenize")
    }

    #[test]
    fn hopping_window_parses_size_and_advance() {
        let (spec, _) = extract_window(&tokens(
            "SELECT 1 FROM s WINDOW HOPPING (SIZE 1 MINUTE, ADVANCE BY 10 SECONDS)",
        ))
        .expect("window");
        assert_eq!(
            spec.map(|w| w.spec),
            Some(WindowSpec::Hopping {
                size: Duration::from_secs(60),
                advance: Duration::from_secs(10)
            })
        );
    }

    #[test]
    fn session_window_parses_gap() {
        let (spec, _) =
            extract_window(&tokens("SELECT 1 FROM s WINDOW SESSION (500 MILLISECONDS)"))
                .expect("window");
        assert_eq!(
            spec.map(|w| w.spec),
            Some(WindowSpec::Session {
                gap: Duration::from_millis(500)
            })
        );
    }

    #[test]
    fn advance_larger_than_size_is_rejected() {
        let err = extract_window(&tokens(
            "SELECT 1 FROM s WINDOW HOPPING (SIZE 1 SECOND, ADVANCE BY 2 SECONDS)",
        ))
        .expect_err("must fail");
        assert!(err.to_string().contains("ADVANCE BY"), "{err}");
    }

    #[test]
    fn named_window_clause_is_left_alone() {
        let toks = tokens("SELECT 1 FROM s WINDOW w AS (PARTITION BY a)");
        let (spec, rest) = extract_window(&toks).expect("window");
        assert!(spec.is_none());
        assert_eq!(rest.len(), toks.len());
    }

    #[test]
    fn clause_span_covers_window_tokens_only() {
        let toks = tokens("SELECT 1 FROM s WINDOW TUMBLING (SIZE 5 SECONDS) GROUP BY a");
        let (spec, rest) = extract_window(&toks).expect("window");
        let span = spec.expect("tumbling").span;
        assert!(is_keyword(&toks[span.start], "WINDOW"));
        assert_eq!(toks[span.end - 1], Token::RParen);
        assert_eq!(rest.len(), toks.len() - span.len());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        for unit in ["MINUTES", "HOURS", "DAYS"] {
            let err = extract_window(&tokens(&format!(
                "SELECT 1 FROM s WINDOW TUMBLING (SIZE 18446744073709551615 {unit})"
            )))
            .expect_err("must fail");
            assert!(err.to_string().contains("out of range"), "{unit}: {err}");
        }
        let (spec, _) = extract_window(&tokens(
            "SELECT 1 FROM s WINDOW TUMBLING (SIZE 18446744073709551615 SECONDS)",
        ))
        .expect("seconds fit");
        assert_eq!(
            spec.map(|w| w.spec),
            Some(WindowSpec::Tumbling {
                size: Duration::from_secs(u64::MAX)
            })
        );
    }

    #[test]
    fn zero_length_windows_are_rejected() {
        for sql in [
            "SELECT 1 FROM s WINDOW TUMBLING (SIZE 0 SECONDS)",
            "SELECT 1 FROM s WINDOW HOPPING (SIZE 10 SECONDS, ADVANCE BY 0 SECONDS)",
            "SELECT 1 FROM s WINDOW SESSION (0 MILLISECONDS)",
        ] {
            let err = extract_window(&tokens(sql)).expect_err("must fail");
            assert!(err.to_string().contains("must be > 0"), "{sql}: {err}");
        }
    }
}

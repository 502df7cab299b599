//! Recursive-descent parsing of the query grammar, via `nom` combinators.
//!
//! `ws()`-wrapped tags, `alt`/`many0`/`delimited` combinators, and a
//! fold-left over the `many0` tail build the binary-operator chain. `&&`
//! and `||` fold at one precedence level, left-associative — there is no
//! AND-binds-tighter-than-OR rule here.

use nom::{
    branch::alt,
    bytes::complete::{tag as t, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{opt, recognize},
    multi::many0,
    sequence::{delimited, pair},
    IResult, Parser,
};

use super::ast::{Comparison, Expr, Op, Value};

/// Parses a full expression string, erroring on any unconsumed trailing text.
pub fn parse(input: &str) -> Result<Expr, String> {
    let (rest, expr) = expr_parser(input).map_err(|e| format!("query parse error: {e}"))?;
    if !rest.trim().is_empty() {
        return Err(format!("unexpected trailing input: {rest:?}"));
    }
    Ok(expr)
}

fn ws<'a, F: 'a>(inner: F) -> impl Parser<&'a str, Output = F::Output, Error = F::Error>
where
    F: Parser<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn expr_parser(input: &str) -> IResult<&str, Expr> {
    let (input, init) = term(input)?;
    let (input, rest) = many0(pair(ws(alt((t("&&"), t("||")))), term)).parse(input)?;
    let expr = rest.into_iter().fold(init, |acc, (op, rhs)| {
        if op == "&&" {
            Expr::And(Box::new(acc), Box::new(rhs))
        } else {
            Expr::Or(Box::new(acc), Box::new(rhs))
        }
    });
    Ok((input, expr))
}

fn term(input: &str) -> IResult<&str, Expr> {
    alt((paren_expr, comparison)).parse(input)
}

fn paren_expr(input: &str) -> IResult<&str, Expr> {
    delimited(ws(char('(')), expr_parser, ws(char(')'))).parse(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, (path, op, value)) = (ws(tag_ref), ws(op_parser), ws(value_parser)).parse(input)?;
    Ok((input, Expr::Comparison(Comparison { path, op, value })))
}

fn tag_ref(input: &str) -> IResult<&str, Vec<String>> {
    let (input, _) = t("tag.").parse(input)?;
    let (input, path) =
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.').parse(input)?;
    Ok((input, path.split('.').map(str::to_string).collect()))
}

fn op_parser(input: &str) -> IResult<&str, Op> {
    alt((
        t("==").map(|_| Op::Eq),
        t("!=").map(|_| Op::Ne),
        t(">=").map(|_| Op::Ge),
        t("<=").map(|_| Op::Le),
        t(">").map(|_| Op::Gt),
        t("<").map(|_| Op::Lt),
    ))
    .parse(input)
}

fn value_parser(input: &str) -> IResult<&str, Value> {
    alt((quoted_string, bool_literal, float_literal, int_literal)).parse(input)
}

fn quoted_string(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('"').parse(input)?;
    let (input, s) = take_while(|c| c != '"').parse(input)?;
    let (input, _) = char('"').parse(input)?;
    Ok((input, Value::Str(s.to_string())))
}

fn bool_literal(input: &str) -> IResult<&str, Value> {
    alt((
        t("true").map(|_| Value::Bool(true)),
        t("false").map(|_| Value::Bool(false)),
    ))
    .parse(input)
}

fn float_literal(input: &str) -> IResult<&str, Value> {
    let (input, text) =
        recognize((opt(char('-')), digit1, char('.'), digit1)).parse(input)?;
    match text.parse::<f64>() {
        Ok(v) => Ok((input, Value::Float(v))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn int_literal(input: &str) -> IResult<&str, Value> {
    let (input, text) = recognize((opt(char('-')), digit1)).parse(input)?;
    match text.parse::<i64>() {
        Ok(v) => Ok((input, Value::Int(v))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let expr = parse(r#"tag.favorite == true"#).unwrap();
        assert_eq!(
            expr,
            Expr::Comparison(Comparison {
                path: vec!["favorite".to_string()],
                op: Op::Eq,
                value: Value::Bool(true),
            })
        );
    }

    #[test]
    fn same_precedence_left_associative() {
        let expr = parse(r#"tag.a == 1 && tag.b == 2 || tag.c == 3"#).unwrap();
        // ((a==1 && b==2) || c==3), left fold at one precedence level.
        match expr {
            Expr::Or(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::And(_, _)));
                assert!(matches!(*rhs, Expr::Comparison(_)));
            }
            other => panic!("expected Or at top level, got {other:?}"),
        }
    }

    #[test]
    fn parentheses_override_left_to_right_fold() {
        let expr = parse(r#"tag.a == 1 && (tag.b == 2 || tag.c == 3)"#).unwrap();
        match expr {
            Expr::And(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Comparison(_)));
                assert!(matches!(*rhs, Expr::Or(_, _)));
            }
            other => panic!("expected And at top level, got {other:?}"),
        }
    }

    #[test]
    fn dotted_tag_path_and_quoted_string_value() {
        let expr = parse(r#"tag.event.birthday == "Alice""#).unwrap();
        assert_eq!(
            expr,
            Expr::Comparison(Comparison {
                path: vec!["event".to_string(), "birthday".to_string()],
                op: Op::Eq,
                value: Value::Str("Alice".to_string()),
            })
        );
    }

    #[test]
    fn trailing_garbage_is_a_parse_error() {
        assert!(parse(r#"tag.a == 1 garbage"#).is_err());
    }
}

//! Path-expression parser using nom.
//!
//! Turns expression text into an [`Expression`] tree. Parsing never touches
//! the join graph: paths stay unresolved until rendering.
//!
//! # Grammar
//!
//! ```text
//! expression := term (op term)*            op: || + - * /
//! term       := '(' expression ')' | function | literal | ':' name | path
//! literal    := number | 'quoted' | TRUE | FALSE | NULL
//! function   := NAME '(' [arg (',' arg)*] ')'   arg: '*' | [DISTINCT] expression
//! path       := segment ('.' segment)*
//! segment    := NAME ['[' expression ']']
//! ```
//!
//! `d.contacts[:age].localized[d.age]` parses into one path whose second and
//! third elements are array accesses; each access indexes the path prefix
//! ending at it.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, multispace1},
    combinator::{cut, map, not, opt, peek, recognize},
    error::{VerboseError, VerboseErrorKind, context},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::ast::*;
use crate::error::{CriteriaError, CriteriaResult};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Parse a complete expression.
pub fn parse(input: &str) -> CriteriaResult<Expression> {
    let offset = input.len() - input.trim_start().len();
    let input = input.trim();
    if input.is_empty() {
        return Err(CriteriaError::syntax(offset, "empty expression"));
    }

    match parse_expression(input) {
        Ok(("", expr)) => Ok(expr),
        Ok((remaining, _)) => Err(trailing_error(input, remaining, offset)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(convert_error(input, e, offset)),
        Err(nom::Err::Incomplete(_)) => Err(CriteriaError::syntax(
            offset + input.len(),
            "incomplete expression",
        )),
    }
}

/// Parse a relationship path used by explicit joins (`d.owner`, `owner.partnerDocument`).
pub fn parse_join_path(input: &str) -> CriteriaResult<Vec<String>> {
    match parse(input)? {
        Expression::Path(path) if !path.has_array_access() => Ok(path
            .elements
            .iter()
            .map(|e| e.property().to_string())
            .collect()),
        _ => Err(CriteriaError::illegal_argument(format!(
            "'{}' is not a relationship path",
            input
        ))),
    }
}

fn trailing_error(input: &str, remaining: &str, offset: usize) -> CriteriaError {
    let position = offset + input.len() - remaining.len();
    let message = match remaining.chars().next() {
        Some(']') => "unbalanced ']'".to_string(),
        Some(')') => "unbalanced ')'".to_string(),
        Some('.') => "empty path segment".to_string(),
        _ => format!("unexpected input '{}'", remaining),
    };
    CriteriaError::syntax(position, message)
}

fn convert_error(input: &str, e: VerboseError<&str>, offset: usize) -> CriteriaError {
    let context = e.errors.iter().find_map(|(at, kind)| match kind {
        VerboseErrorKind::Context(ctx) => Some((*at, *ctx)),
        _ => None,
    });
    match context {
        Some((at, ctx)) => {
            let position = offset + input.len() - at.len();
            if at.is_empty() {
                CriteriaError::syntax(position, format!("expected {} before end of input", ctx))
            } else {
                CriteriaError::syntax(position, format!("expected {}", ctx))
            }
        }
        None => {
            let at = e.errors.first().map(|(at, _)| *at).unwrap_or(input);
            CriteriaError::syntax(offset + input.len() - at.len(), "malformed expression")
        }
    }
}

/// Parse an expression: terms joined by binary operators.
fn parse_expression(input: &str) -> PResult<'_, Expression> {
    let (input, first) = parse_term(input)?;
    let (input, rest) = many0(pair(
        delimited(multispace0, parse_operator, multispace0),
        cut(context("operand after operator", parse_term)),
    ))(input)?;

    if rest.is_empty() {
        return Ok((input, first));
    }

    let mut parts = vec![first];
    for (op, term) in rest {
        parts.push(Expression::literal(format!(" {} ", op)));
        parts.push(term);
    }
    Ok((input, Expression::Composite(parts)))
}

fn parse_operator(input: &str) -> PResult<'_, &str> {
    alt((tag("||"), tag("+"), tag("-"), tag("*"), tag("/")))(input)
}

fn parse_term(input: &str) -> PResult<'_, Expression> {
    alt((
        parse_grouped,
        parse_function,
        parse_literal,
        parse_parameter,
        parse_path,
    ))(input)
}

/// Parse `( expression )`.
fn parse_grouped(input: &str) -> PResult<'_, Expression> {
    let (input, _) = char('(')(input)?;
    let (input, inner) = cut(delimited(
        multispace0,
        parse_expression,
        pair(multispace0, context("closing ')'", char(')'))),
    ))(input)?;
    Ok((
        input,
        Expression::Composite(vec![
            Expression::literal("("),
            inner,
            Expression::literal(")"),
        ]),
    ))
}

/// Parse an identifier (alias, attribute or function name).
fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

/// Parse `NAME(arg, ...)`.
fn parse_function(input: &str) -> PResult<'_, Expression> {
    let (input, name) = terminated(identifier, preceded(multispace0, char('(')))(input)?;
    let (input, args) = cut(delimited(
        multispace0,
        separated_list0(delimited(multispace0, char(','), multispace0), parse_argument),
        pair(multispace0, context("closing ')'", char(')'))),
    ))(input)?;
    Ok((input, Expression::function(name, args)))
}

fn parse_argument(input: &str) -> PResult<'_, Expression> {
    alt((
        map(char('*'), |_| Expression::literal("*")),
        map(
            preceded(pair(tag_no_case("DISTINCT"), multispace1), parse_expression),
            |expr| Expression::Composite(vec![Expression::literal("DISTINCT "), expr]),
        ),
        parse_expression,
    ))(input)
}

fn parse_literal(input: &str) -> PResult<'_, Expression> {
    alt((parse_number, parse_quoted_string, parse_keyword_literal))(input)
}

/// Parse `TRUE`, `FALSE` or `NULL` (any case) when not followed by more of a name.
fn parse_keyword_literal(input: &str) -> PResult<'_, Expression> {
    map(
        terminated(
            alt((tag_no_case("TRUE"), tag_no_case("FALSE"), tag_no_case("NULL"))),
            not(peek(alt((alphanumeric1, tag("_"), tag("."), tag("["))))),
        ),
        |text: &str| Expression::literal(text.to_ascii_uppercase()),
    )(input)
}

/// Parse a number (integer or decimal).
fn parse_number(input: &str) -> PResult<'_, Expression> {
    map(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        |text: &str| Expression::literal(text),
    )(input)
}

/// Parse a quoted string, `''` escapes a quote.
fn parse_quoted_string(input: &str) -> PResult<'_, Expression> {
    map(
        recognize(preceded(
            char('\''),
            cut(terminated(
                many0(alt((tag("''"), is_not("'")))),
                context("closing quote", char('\'')),
            )),
        )),
        |text: &str| Expression::literal(text),
    )(input)
}

/// Parse `:name`.
fn parse_parameter(input: &str) -> PResult<'_, Expression> {
    map(
        preceded(char(':'), cut(context("parameter name", identifier))),
        |name: &str| Expression::named_parameter(name),
    )(input)
}

fn parse_path(input: &str) -> PResult<'_, Expression> {
    let (input, first) = parse_segment(input)?;
    let (input, rest) = many0(preceded(
        char('.'),
        cut(context("path segment", parse_segment)),
    ))(input)?;

    let mut elements = vec![first];
    elements.extend(rest);
    Ok((input, Expression::Path(PathExpression::new(elements))))
}

/// Parse `name` or `name[index]`.
fn parse_segment(input: &str) -> PResult<'_, PathElement> {
    let (input, name) = identifier(input)?;
    let (input, index) = opt(preceded(
        char('['),
        cut(delimited(
            multispace0,
            context("index expression", parse_expression),
            pair(multispace0, context("closing ']'", char(']'))),
        )),
    ))(input)?;

    let element = match index {
        Some(index) => {
            if input.starts_with('[') {
                return Err(nom::Err::Failure(VerboseError {
                    errors: vec![(input, VerboseErrorKind::Context("'.' between consecutive indexes"))],
                }));
            }
            PathElement::ArrayAccess {
                property: name.to_string(),
                index: Box::new(index),
            }
        }
        None => PathElement::Property(name.to_string()),
    };
    Ok((input, element))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(name: &str) -> PathElement {
        PathElement::Property(name.to_string())
    }

    fn path(names: &[&str]) -> Expression {
        Expression::Path(PathExpression::new(names.iter().map(|n| prop(n)).collect()))
    }

    #[test]
    fn test_simple_path() {
        assert_eq!(parse("d.owner.name").unwrap(), path(&["d", "owner", "name"]));
        assert_eq!(parse("  age ").unwrap(), path(&["age"]));
    }

    #[test]
    fn test_array_access_with_path_index() {
        let expr = parse("d.contacts[d.age]").unwrap();
        assert_eq!(
            expr,
            Expression::Path(PathExpression::new(vec![
                prop("d"),
                PathElement::ArrayAccess {
                    property: "contacts".into(),
                    index: Box::new(path(&["d", "age"])),
                },
            ]))
        );
    }

    #[test]
    fn test_chained_array_access() {
        let expr = parse("d.contacts[:age].localized[d.age]").unwrap();
        let Expression::Path(p) = expr else {
            panic!("expected path");
        };
        assert_eq!(p.elements.len(), 3);
        assert_eq!(
            p.elements[1],
            PathElement::ArrayAccess {
                property: "contacts".into(),
                index: Box::new(Expression::named_parameter("age")),
            }
        );
        assert_eq!(p.elements[2].property(), "localized");
        assert!(p.has_array_access());
    }

    #[test]
    fn test_literal_index() {
        let expr = parse("contacts[1]").unwrap();
        assert_eq!(expr.to_string(), "contacts[1]");
    }

    #[test]
    fn test_function_call() {
        let expr = parse("COALESCE(d.owner.localized[1], 'no item')").unwrap();
        let Expression::Function(func) = expr else {
            panic!("expected function");
        };
        assert_eq!(func.name, "COALESCE");
        assert_eq!(func.args.len(), 2);
        assert_eq!(func.args[1], Expression::literal("'no item'"));
    }

    #[test]
    fn test_count_star_and_distinct() {
        assert_eq!(parse("COUNT(*)").unwrap().to_string(), "COUNT(*)");
        assert_eq!(parse("COUNT(DISTINCT d.id)").unwrap().to_string(), "COUNT(DISTINCT d.id)");
    }

    #[test]
    fn test_composite() {
        let expr = parse("d.age + 1").unwrap();
        assert_eq!(
            expr,
            Expression::Composite(vec![
                path(&["d", "age"]),
                Expression::literal(" + "),
                Expression::literal("1"),
            ])
        );
    }

    #[test]
    fn test_keyword_literals() {
        assert_eq!(parse("TRUE").unwrap(), Expression::literal("TRUE"));
        assert_eq!(parse("false").unwrap(), Expression::literal("FALSE"));
        assert_eq!(parse(" Null ").unwrap(), Expression::literal("NULL"));
        assert_eq!(parse("nullable").unwrap(), path(&["nullable"]));
        assert_eq!(parse("true.flag").unwrap(), path(&["true", "flag"]));
        assert_eq!(
            parse("COALESCE(d.flag, FALSE)").unwrap().to_string(),
            "COALESCE(d.flag, FALSE)"
        );
    }

    #[test]
    fn test_quoted_string_escape() {
        assert_eq!(parse("'it''s'").unwrap(), Expression::literal("'it''s'"));
    }

    #[test]
    fn test_unbalanced_bracket() {
        let err = parse("d.contacts[1").unwrap_err();
        assert!(matches!(err, CriteriaError::Syntax { .. }));
        assert!(err.to_string().contains("closing ']'"), "{}", err);

        let err = parse("d.contacts]").unwrap_err();
        assert!(err.to_string().contains("unbalanced ']'"), "{}", err);
    }

    #[test]
    fn test_empty_segment() {
        let err = parse("d..name").unwrap_err();
        assert!(matches!(err, CriteriaError::Syntax { position: 2, .. }), "{:?}", err);
        assert!(parse("d.").is_err());
    }

    #[test]
    fn test_dangling_operator() {
        let err = parse("d.age +").unwrap_err();
        assert!(err.to_string().contains("operand after operator"), "{}", err);
    }

    #[test]
    fn test_empty_index_and_empty_input() {
        assert!(matches!(parse("d.contacts[]"), Err(CriteriaError::Syntax { .. })));
        assert!(matches!(parse("   "), Err(CriteriaError::Syntax { .. })));
        assert!(matches!(parse("UPPER(d.name"), Err(CriteriaError::Syntax { .. })));
    }

    #[test]
    fn test_consecutive_indexes_rejected() {
        assert!(matches!(parse("d.matrix[1][2]"), Err(CriteriaError::Syntax { .. })));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(parse_join_path("d.owner").unwrap(), vec!["d", "owner"]);
        assert!(matches!(
            parse_join_path("d.contacts[1]"),
            Err(CriteriaError::IllegalArgument(_))
        ));
        assert!(matches!(
            parse_join_path("UPPER(d.name)"),
            Err(CriteriaError::IllegalArgument(_))
        ));
    }
}

//! Attribute filters.
//!
//! [`SimpleQueryCompiler`] understands conjunctions of comparisons:
//!
//! ```text
//! name = 'Main Street' AND lanes >= 2 AND "speed limit" IS NOT NULL
//! ```

use std::cmp::Ordering;
use std::fmt::Debug;

use chrono::{NaiveDate, NaiveDateTime};

use crate::errors::{GdalError, Result};
use crate::vector::{Defn, Feature, FieldValue};

/// A compiled attribute filter.
pub trait AttributeQuery: Debug {
    fn evaluate(&self, feature: &Feature) -> bool;
}

/// Compiles filter expressions against a layer definition.
pub trait QueryCompiler: Debug {
    fn compile(&self, expression: &str, defn: &Defn) -> Result<Box<dyn AttributeQuery>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleQueryCompiler;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
enum Clause {
    Compare {
        field: usize,
        op: Op,
        literal: Literal,
    },
    IsNull {
        field: usize,
        negated: bool,
    },
}

#[derive(Debug)]
struct Conjunction {
    clauses: Vec<Clause>,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    QuotedIdent(String),
    Text(String),
    Number(f64),
    Op(Op),
}

fn bad(expression: &str, reason: &str) -> GdalError {
    GdalError::BadArgument(format!("Cannot compile '{expression}': {reason}"))
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(bad(expression, "unterminated quote")),
                        Some(&q) if q == quote && chars.get(i + 1) == Some(&quote) => {
                            text.push(quote);
                            i += 2;
                        }
                        Some(&q) if q == quote => {
                            i += 1;
                            break;
                        }
                        Some(&other) => {
                            text.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push(if quote == '\'' {
                    Token::Text(text)
                } else {
                    Token::QuotedIdent(text)
                });
            }
            '=' => {
                tokens.push(Token::Op(Op::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(Op::Ne));
                i += 2;
            }
            '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('<', Some('=')) => (Op::Le, 2),
                    ('<', Some('>')) => (Op::Ne, 2),
                    ('<', _) => (Op::Lt, 1),
                    (_, Some('=')) => (Op::Ge, 2),
                    _ => (Op::Gt, 1),
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '-')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| bad(expression, &format!("invalid number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(bad(expression, &format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn is_keyword(token: Option<&Token>, keyword: &str) -> bool {
    matches!(token, Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
}

impl QueryCompiler for SimpleQueryCompiler {
    fn compile(&self, expression: &str, defn: &Defn) -> Result<Box<dyn AttributeQuery>> {
        let tokens = tokenize(expression)?;
        let mut pos = 0;
        let mut clauses = Vec::new();
        loop {
            let field_name = match tokens.get(pos) {
                Some(Token::Ident(name)) | Some(Token::QuotedIdent(name)) => name,
                _ => return Err(bad(expression, "expected a field name")),
            };
            let field = defn
                .field_index(field_name)
                .ok_or_else(|| bad(expression, &format!("unknown field '{field_name}'")))?;
            pos += 1;

            if is_keyword(tokens.get(pos), "IS") {
                pos += 1;
                let negated = is_keyword(tokens.get(pos), "NOT");
                if negated {
                    pos += 1;
                }
                if !is_keyword(tokens.get(pos), "NULL") {
                    return Err(bad(expression, "expected NULL"));
                }
                pos += 1;
                clauses.push(Clause::IsNull { field, negated });
            } else {
                let Some(Token::Op(op)) = tokens.get(pos) else {
                    return Err(bad(expression, "expected a comparison operator"));
                };
                let literal = match tokens.get(pos + 1) {
                    Some(Token::Number(n)) => Literal::Number(*n),
                    Some(Token::Text(t)) => Literal::Text(t.clone()),
                    _ => return Err(bad(expression, "expected a literal")),
                };
                pos += 2;
                clauses.push(Clause::Compare {
                    field,
                    op: *op,
                    literal,
                });
            }

            match tokens.get(pos) {
                None => break,
                t if is_keyword(t, "AND") => pos += 1,
                _ => return Err(bad(expression, "expected AND")),
            }
        }
        Ok(Box::new(Conjunction { clauses }))
    }
}

/// Parses `YYYY/MM/DD[ HH:MM:SS]`, also accepting `-` as date separator.
fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let (date, time) = match text.trim().split_once([' ', 'T']) {
        Some((date, time)) => (date, Some(time)),
        None => (text.trim(), None),
    };
    let mut ymd = date.split(['/', '-']).map(|p| p.parse::<u32>().ok());
    let (y, m, d) = (ymd.next()??, ymd.next()??, ymd.next()??);
    let date = NaiveDate::from_ymd_opt(i32::try_from(y).ok()?, m, d)?;
    let mut hms = time.unwrap_or("0:0:0").split(':').map(|p| p.parse::<u32>().ok());
    let (h, mi) = (hms.next()??, hms.next()??);
    let sec = hms.next().flatten().unwrap_or(0);
    date.and_hms_opt(h, mi, sec)
}

fn compare(value: &FieldValue, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (FieldValue::IntegerValue(v), Literal::Number(n)) => (*v as f64).partial_cmp(n),
        (FieldValue::Integer64Value(v), Literal::Number(n)) => (*v as f64).partial_cmp(n),
        (FieldValue::RealValue(v), Literal::Number(n)) => v.partial_cmp(n),
        (FieldValue::StringValue(v), Literal::Text(t)) => Some(v.as_str().cmp(t.as_str())),
        (FieldValue::StringValue(v), Literal::Number(n)) => {
            v.trim().parse::<f64>().ok()?.partial_cmp(n)
        }
        (FieldValue::DateValue(d), Literal::Text(t)) => {
            d.partial_cmp(&parse_datetime(t)?.date())
        }
        (FieldValue::DateTimeValue(d), Literal::Text(t)) => {
            d.naive_local().partial_cmp(&parse_datetime(t)?)
        }
        _ => None,
    }
}

impl AttributeQuery for Conjunction {
    fn evaluate(&self, feature: &Feature) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::IsNull { field, negated } => feature.is_field_set(*field) == *negated,
            Clause::Compare { field, op, literal } => {
                let Ok(Some(value)) = feature.field_by_index(*field) else {
                    return false;
                };
                let Some(ordering) = compare(value, literal) else {
                    return false;
                };
                match op {
                    Op::Eq => ordering == Ordering::Equal,
                    Op::Ne => ordering != Ordering::Equal,
                    Op::Lt => ordering == Ordering::Less,
                    Op::Le => ordering != Ordering::Greater,
                    Op::Gt => ordering == Ordering::Greater,
                    Op::Ge => ordering != Ordering::Less,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vector::{FieldDefn, OGRFieldType, OGRwkbGeometryType};

    fn feature(name: Option<&str>, lanes: i32) -> Feature {
        let mut defn = Defn::with_geometry("roads", OGRwkbGeometryType::wkbLineString);
        defn.add_field_defn(FieldDefn::new("name", OGRFieldType::OFTString));
        defn.add_field_defn(FieldDefn::new("lanes", OGRFieldType::OFTInteger));
        defn.add_field_defn(FieldDefn::new("speed limit", OGRFieldType::OFTReal));
        let mut feature = Feature::new(Arc::new(defn));
        if let Some(name) = name {
            feature.set_field_string("name", name).unwrap();
        }
        feature.set_field_integer("lanes", lanes).unwrap();
        feature
    }

    fn matches(expression: &str, feature: &Feature) -> bool {
        SimpleQueryCompiler
            .compile(expression, feature.defn())
            .unwrap()
            .evaluate(feature)
    }

    #[test]
    fn test_comparisons() {
        let f = feature(Some("O'Connell Street"), 4);
        assert!(matches("name = 'O''Connell Street'", &f));
        assert!(matches("lanes >= 4 AND lanes < 5", &f));
        assert!(matches("lanes <> 3", &f));
        assert!(matches("LANES != 3", &f));
        assert!(!matches("lanes > 4", &f));
        assert!(matches("\"speed limit\" IS NULL", &f));
        assert!(matches("name is not null and lanes = 4", &f));
    }

    #[test]
    fn test_dates() {
        let date = FieldValue::DateValue(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(
            compare(&date, &Literal::Text("2024/03/01".into())),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare(&date, &Literal::Text("2023-12-31".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(compare(&date, &Literal::Text("soon".into())), None);
    }

    #[test]
    fn test_null_never_compares() {
        let f = feature(None, 1);
        assert!(!matches("name = 'x'", &f));
        assert!(!matches("name <> 'x'", &f));
        assert!(matches("name IS NULL", &f));
    }

    #[test]
    fn test_compile_errors() {
        let defn = feature(None, 1).defn().clone();
        for bad in [
            "missing = 1",
            "name =",
            "name 'x'",
            "name = 'x' OR lanes = 1",
            "name = 'unterminated",
            "lanes IS 3",
            "",
        ] {
            assert!(SimpleQueryCompiler.compile(bad, &defn).is_err(), "{bad}");
        }
    }
}

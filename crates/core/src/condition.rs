// Boolean filter expressions over CRM records
//
// Examples:
//   DATE_CREATE >= "2025-11-03 00:00:00" and DATE_CREATE < "2025-11-10 00:00:00"
//   CLOSED == "N" and (OPPORTUNITY > 1000 or STAGE_ID in ["WON", "PREPAY"])

use crate::record::{display_value, value_number, Record};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing a condition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("{message} at position {position}")]
    Syntax { position: usize, message: String },
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        };
        f.write_str(symbol)
    }
}

/// Either a record field reference or a literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Literal(Value),
}

impl Operand {
    fn resolve<'a>(&'a self, record: &'a Record) -> &'a Value {
        match self {
            Self::Field(name) => record.get(name).unwrap_or(&Value::Null),
            Self::Literal(value) => value,
        }
    }
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Or(Vec<Condition>),
    And(Vec<Condition>),
    Not(Box<Condition>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        operand: Operand,
        list: Vec<Operand>,
        negated: bool,
    },
    Truthy(Operand),
}

impl Condition {
    /// Parse a textual condition
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            input_len: input.len(),
        };
        let condition = parser.parse_or()?;

        if let Some((token, position)) = parser.tokens.get(parser.pos) {
            return Err(ConditionError::Syntax {
                position: *position,
                message: format!("unexpected {}", token.describe()),
            });
        }

        Ok(condition)
    }

    /// Conjunction of `FIELD == value` for every entry of a JSON object
    pub fn from_equalities(map: &Map<String, Value>) -> Self {
        Self::And(
            map.iter()
                .map(|(field, value)| Self::Compare {
                    left: Operand::Field(field.clone()),
                    op: CompareOp::Eq,
                    right: Operand::Literal(value.clone()),
                })
                .collect(),
        )
    }

    /// Evaluate the condition against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Or(items) => items.iter().any(|c| c.matches(record)),
            Self::And(items) => items.iter().all(|c| c.matches(record)),
            Self::Not(inner) => !inner.matches(record),
            Self::Compare { left, op, right } => {
                compare(left.resolve(record), *op, right.resolve(record))
            }
            Self::In {
                operand,
                list,
                negated,
            } => {
                let value = operand.resolve(record);
                let found = list.iter().any(|item| values_equal(value, item.resolve(record)));
                found != *negated
            }
            Self::Truthy(operand) => is_truthy(operand.resolve(record)),
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        _ => match order(left, right) {
            Some(ordering) => match op {
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            },
            None => false,
        },
    }
}

/// Numeric view of a pair, used when at least one side is a real number
/// and the other coerces to one.
fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    if !left.is_number() && !right.is_number() {
        return None;
    }
    Some((value_number(left)?, value_number(right)?))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return left.is_null() && right.is_null();
    }
    if let Some((a, b)) = numeric_pair(left, right) {
        return a == b;
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => display_value(left) == display_value(right),
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    if let Some((a, b)) = numeric_pair(left, right) {
        return a.partial_cmp(&b);
    }
    Some(display_value(left).cmp(&display_value(right)))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// Tokenizer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Op(CompareOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{}'", name),
            Self::Literal(value) => format!("literal {}", value),
            Self::Op(op) => format!("operator '{}'", op),
            Self::And => "'and'".to_string(),
            Self::Or => "'or'".to_string(),
            Self::Not => "'not'".to_string(),
            Self::In => "'in'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::Comma => "','".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ConditionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, ch) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match ch {
            c if c.is_whitespace() => {
                i += 1;
            }
            '(' | ')' | '[' | ']' | ',' => {
                let token = match ch {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Comma,
                };
                tokens.push((token, position));
                i += 1;
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let (token, width) = match (ch, next) {
                    ('=', Some('=')) => (Token::Op(CompareOp::Eq), 2),
                    ('=', _) => (Token::Op(CompareOp::Eq), 1),
                    ('!', Some('=')) => (Token::Op(CompareOp::Ne), 2),
                    ('!', _) => (Token::Not, 1),
                    ('<', Some('=')) => (Token::Op(CompareOp::Le), 2),
                    ('<', Some('>')) => (Token::Op(CompareOp::Ne), 2),
                    ('<', _) => (Token::Op(CompareOp::Lt), 1),
                    ('>', Some('=')) => (Token::Op(CompareOp::Ge), 2),
                    ('>', _) => (Token::Op(CompareOp::Gt), 1),
                    ('&', Some('&')) => (Token::And, 2),
                    ('|', Some('|')) => (Token::Or, 2),
                    _ => return Err(ConditionError::UnexpectedChar { ch, position }),
                };
                tokens.push((token, position));
                i += width;
            }
            '"' | '\'' => {
                let quote = ch;
                let mut text = String::new();
                let mut j = i + 1;
                let mut closed = false;

                while j < chars.len() {
                    let (_, c) = chars[j];
                    if c == '\\' {
                        if let Some((_, escaped)) = chars.get(j + 1) {
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            j += 2;
                            continue;
                        }
                    }
                    if c == quote {
                        closed = true;
                        break;
                    }
                    text.push(c);
                    j += 1;
                }

                if !closed {
                    return Err(ConditionError::UnterminatedString(position));
                }
                tokens.push((Token::Literal(Value::String(text)), position));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                let raw = &input[position..end];
                let value = parse_number(raw).ok_or_else(|| ConditionError::Syntax {
                    position,
                    message: format!("invalid number '{}'", raw),
                })?;
                tokens.push((Token::Literal(value), position));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < chars.len()
                    && (chars[j].1.is_alphanumeric() || chars[j].1 == '_' || chars[j].1 == '.')
                {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                let word = &input[position..end];
                let token = match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "none" | "null" => Token::Literal(Value::Null),
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((token, position));
                i = j;
            }
            _ => return Err(ConditionError::UnexpectedChar { ch, position }),
        }
    }

    Ok(tokens)
}

fn parse_number(raw: &str) -> Option<Value> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    let n = raw.parse::<f64>().ok()?;
    serde_json::Number::from_f64(n).map(Value::Number)
}

// Recursive descent parser

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    input_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, p)| *p)
            .unwrap_or(self.input_len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn syntax_error(&self, message: impl Into<String>) -> ConditionError {
        ConditionError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => {
                let message = format!("expected {}, found {}", expected.describe(), token.describe());
                Err(self.syntax_error(message))
            }
            None => Err(self.syntax_error(format!("expected {}", expected.describe()))),
        }
    }

    fn parse_or(&mut self) -> Result<Condition, ConditionError> {
        let mut items = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Condition, ConditionError> {
        let mut items = vec![self.parse_not()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            items.push(self.parse_not()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Condition::And(items)
        })
    }

    fn parse_not(&mut self) -> Result<Condition, ConditionError> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Condition::Not(Box::new(self.parse_not()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Condition, ConditionError> {
        let left = self.parse_operand()?;

        match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.pos += 1;
                let right = self.parse_operand()?;
                Ok(Condition::Compare { left, op, right })
            }
            Some(Token::In) => {
                self.pos += 1;
                let list = self.parse_list()?;
                Ok(Condition::In {
                    operand: left,
                    list,
                    negated: false,
                })
            }
            Some(Token::Not) if self.tokens.get(self.pos + 1).map(|(t, _)| t) == Some(&Token::In) => {
                self.pos += 2;
                let list = self.parse_list()?;
                Ok(Condition::In {
                    operand: left,
                    list,
                    negated: true,
                })
            }
            _ => Ok(Condition::Truthy(left)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ConditionError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Operand::Field(name)),
            Some(Token::Literal(value)) => Ok(Operand::Literal(value)),
            Some(other) => Err(ConditionError::Syntax {
                position,
                message: format!("expected field or value, found {}", other.describe()),
            }),
            None => Err(ConditionError::Syntax {
                position,
                message: "unexpected end of condition".to_string(),
            }),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Operand>, ConditionError> {
        self.expect(Token::LBracket)?;
        let mut items = Vec::new();

        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(items);
        }

        loop {
            items.push(self.parse_operand()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => {
                    self.pos -= 1;
                    return Err(self.syntax_error("expected ',' or ']' in list"));
                }
            }
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_date_range_condition() {
        let condition = Condition::parse(
            r#"DATE_CREATE >= "2025-11-03 00:00:00" and DATE_CREATE < "2025-11-10 00:00:00""#,
        )
        .unwrap();

        assert!(condition.matches(&record(json!({"DATE_CREATE": "2025-11-05 12:00:00"}))));
        assert!(!condition.matches(&record(json!({"DATE_CREATE": "2025-11-10 00:00:00"}))));
        assert!(!condition.matches(&record(json!({"TITLE": "no date"}))));
    }

    #[test]
    fn test_numeric_comparison_with_string_field() {
        let condition = Condition::parse("OPPORTUNITY > 1000").unwrap();

        assert!(condition.matches(&record(json!({"OPPORTUNITY": "1500.00"}))));
        assert!(!condition.matches(&record(json!({"OPPORTUNITY": "900.00"}))));
        // "900" > "1000" as strings, but the literal is numeric
        assert!(!condition.matches(&record(json!({"OPPORTUNITY": "900"}))));
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let deal = record(json!({"CLOSED": "N", "STAGE_ID": "NEW", "OPPORTUNITY": 10}));

        let without = Condition::parse(r#"CLOSED == "Y" and STAGE_ID == "NEW" or OPPORTUNITY == 10"#).unwrap();
        assert!(without.matches(&deal));

        let with = Condition::parse(r#"CLOSED == "Y" and (STAGE_ID == "NEW" or OPPORTUNITY == 10)"#).unwrap();
        assert!(!with.matches(&deal));
    }

    #[test]
    fn test_in_and_not_in() {
        let deal = record(json!({"STAGE_ID": "WON"}));

        assert!(Condition::parse(r#"STAGE_ID in ["WON", 'LOSE']"#).unwrap().matches(&deal));
        assert!(!Condition::parse(r#"STAGE_ID not in ["WON"]"#).unwrap().matches(&deal));
        assert!(Condition::parse("STAGE_ID not in []").unwrap().matches(&deal));
    }

    #[test]
    fn test_null_handling() {
        let deal = record(json!({"COMMENTS": null, "TITLE": "x"}));

        assert!(Condition::parse("COMMENTS == None").unwrap().matches(&deal));
        assert!(Condition::parse("MISSING == null").unwrap().matches(&deal));
        assert!(Condition::parse("TITLE != null").unwrap().matches(&deal));
        assert!(!Condition::parse("MISSING > 0").unwrap().matches(&deal));
        assert!(!Condition::parse("MISSING < 0").unwrap().matches(&deal));
    }

    #[test]
    fn test_not_and_truthiness() {
        let deal = record(json!({"IS_NEW": true, "COMMENTS": ""}));

        assert!(Condition::parse("IS_NEW").unwrap().matches(&deal));
        assert!(Condition::parse("not COMMENTS").unwrap().matches(&deal));
        assert!(Condition::parse("!COMMENTS && IS_NEW").unwrap().matches(&deal));
    }

    #[test]
    fn test_single_equals_alias() {
        let condition = Condition::parse("CLOSED = 'N'").unwrap();
        assert!(condition.matches(&record(json!({"CLOSED": "N"}))));
    }

    #[test]
    fn test_from_equalities() {
        let map = json!({"OPPORTUNITY": "123.00", "CLOSED": "N"});
        let condition = Condition::from_equalities(map.as_object().unwrap());

        assert!(condition.matches(&record(json!({"OPPORTUNITY": "123.00", "CLOSED": "N"}))));
        assert!(!condition.matches(&record(json!({"OPPORTUNITY": "123.00", "CLOSED": "Y"}))));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Condition::parse("   "), Err(ConditionError::Empty));
        assert_eq!(
            Condition::parse("TITLE == \"open"),
            Err(ConditionError::UnterminatedString(9))
        );
        assert!(matches!(
            Condition::parse("TITLE == "),
            Err(ConditionError::Syntax { position: 9, .. })
        ));
        assert!(matches!(
            Condition::parse("(A == 1"),
            Err(ConditionError::Syntax { .. })
        ));
        assert!(matches!(
            Condition::parse("A == 1 B"),
            Err(ConditionError::Syntax { position: 7, .. })
        ));
        assert!(matches!(
            Condition::parse("A # 1"),
            Err(ConditionError::UnexpectedChar { ch: '#', position: 2 })
        ));
    }
}

//! Text filters typed by a user, e.g. `paris OR (new york AND NOT airport)`.
//!
//! Consecutive words form one phrase, matched as a case-insensitive
//! substring of the filtered field. `AND`, `OR` and `NOT` are operators in
//! any letter case, so `paris or lyon` is two alternatives. `AND` binds
//! tighter than `OR`; a group or `NOT` directly after an operand is an
//! implicit `AND`. Groups and `NOT` nest at most [`MAX_NESTING`] levels.

use crate::db::{Column, Predicate};
use crate::error::FilterSyntaxError;

const DISALLOWED: &[char] = &[';', '\'', '"', '`', '%'];

/// Deepest combined nesting of groups and `NOT` a filter may use.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Phrase(String),
}

fn tokenize(text: &str) -> Result<Vec<Token>, FilterSyntaxError> {
    if let Some(c) = text.chars().find(|c| DISALLOWED.contains(c)) {
        return Err(FilterSyntaxError::DisallowedCharacter(c));
    }

    let mut tokens = Vec::new();
    let mut phrase: Vec<&str> = Vec::new();
    let mut depth = 0i32;

    let spaced = text.replace('(', " ( ").replace(')', " ) ");
    for word in spaced.split_whitespace() {
        let token = match word.to_ascii_uppercase().as_str() {
            "(" => {
                depth += 1;
                Token::Open
            }
            ")" => {
                depth -= 1;
                if depth < 0 {
                    return Err(FilterSyntaxError::Unbalanced);
                }
                Token::Close
            }
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            _ => {
                phrase.push(word);
                continue;
            }
        };
        if !phrase.is_empty() {
            tokens.push(Token::Phrase(phrase.join(" ")));
            phrase.clear();
        }
        tokens.push(token);
    }
    if !phrase.is_empty() {
        tokens.push(Token::Phrase(phrase.join(" ")));
    }

    if depth != 0 {
        return Err(FilterSyntaxError::Unbalanced);
    }
    Ok(tokens)
}

struct Parser {
    column: Column,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> Result<Predicate, FilterSyntaxError> {
        let mut parts = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.bump();
            parts.push(self.operand("OR", Self::and_expr)?);
        }
        Ok(collapse(parts, Predicate::Or))
    }

    fn and_expr(&mut self) -> Result<Predicate, FilterSyntaxError> {
        let mut parts = vec![self.unary()?];
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.bump();
                    parts.push(self.operand("AND", Self::unary)?);
                }
                Some(Token::Open) | Some(Token::Not) | Some(Token::Phrase(_)) => {
                    parts.push(self.unary()?);
                }
                _ => break,
            }
        }
        Ok(collapse(parts, Predicate::And))
    }

    fn unary(&mut self) -> Result<Predicate, FilterSyntaxError> {
        match self.bump() {
            Some(Token::Not) => {
                self.descend()?;
                let inner = self.operand("NOT", Self::unary)?;
                self.depth -= 1;
                Ok(Predicate::Not(Box::new(inner)))
            }
            Some(Token::Open) => {
                if self.peek() == Some(&Token::Close) {
                    return Err(FilterSyntaxError::EmptyGroup);
                }
                self.descend()?;
                let inner = self.or_expr()?;
                self.depth -= 1;
                match self.bump() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(FilterSyntaxError::Unbalanced),
                }
            }
            Some(Token::Phrase(text)) => Ok(Predicate::like(self.column, text)),
            Some(Token::And) => Err(FilterSyntaxError::DanglingOperator("AND".to_string())),
            Some(Token::Or) => Err(FilterSyntaxError::DanglingOperator("OR".to_string())),
            Some(Token::Close) => Err(FilterSyntaxError::UnexpectedToken(")".to_string())),
            None => Err(FilterSyntaxError::EmptyGroup),
        }
    }

    fn descend(&mut self) -> Result<(), FilterSyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(FilterSyntaxError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        Ok(())
    }

    /// Parse the right-hand side of `op`, reporting a missing one as dangling.
    fn operand(
        &mut self,
        op: &str,
        parse: fn(&mut Self) -> Result<Predicate, FilterSyntaxError>,
    ) -> Result<Predicate, FilterSyntaxError> {
        match self.peek() {
            None | Some(Token::Close) | Some(Token::And) | Some(Token::Or) => {
                Err(FilterSyntaxError::DanglingOperator(op.to_string()))
            }
            _ => parse(self),
        }
    }
}

fn collapse(mut parts: Vec<Predicate>, join: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        join(parts)
    }
}

/// Parse `text` into a predicate over `column`. Blank text means no filter.
pub fn parse_filter(column: Column, text: &str) -> Result<Option<Predicate>, FilterSyntaxError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser {
        column,
        tokens,
        pos: 0,
        depth: 0,
    };
    let predicate = parser.or_expr()?;
    match parser.peek() {
        None => Ok(Some(predicate)),
        Some(Token::Close) => Err(FilterSyntaxError::Unbalanced),
        Some(token) => Err(FilterSyntaxError::UnexpectedToken(format!("{:?}", token))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(text: &str) -> Predicate {
        Predicate::like(Column::Location, text)
    }

    fn parse(text: &str) -> Result<Option<Predicate>, FilterSyntaxError> {
        parse_filter(Column::Location, text)
    }

    #[test]
    fn test_words_form_one_phrase() {
        assert_eq!(parse("New  York").unwrap(), Some(loc("New York")));
        assert_eq!(
            parse("Trinidad Tobago").unwrap(),
            Some(loc("Trinidad Tobago"))
        );
    }

    #[test]
    fn test_operators_ignore_case() {
        assert_eq!(
            parse("paris or lyon").unwrap(),
            Some(Predicate::Or(vec![loc("paris"), loc("lyon")]))
        );
        assert_eq!(
            parse("rome And not Vatican").unwrap(),
            Some(Predicate::And(vec![
                loc("rome"),
                Predicate::Not(Box::new(loc("Vatican"))),
            ]))
        );
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let groups = format!("{}a{}", "(".repeat(20_000), ")".repeat(20_000));
        assert_eq!(parse(&groups), Err(FilterSyntaxError::TooDeep(MAX_NESTING)));

        let negations = format!("{}a", "NOT ".repeat(20_000));
        assert_eq!(parse(&negations), Err(FilterSyntaxError::TooDeep(MAX_NESTING)));

        let mixed = format!("{}a{}", "NOT (".repeat(10_000), ")".repeat(10_000));
        assert_eq!(parse(&mixed), Err(FilterSyntaxError::TooDeep(MAX_NESTING)));
    }

    #[test]
    fn test_nesting_at_limit_parses() {
        let text = format!("{}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(parse(&text).unwrap(), Some(loc("a")));
    }

    #[test]
    fn test_blank_is_no_filter() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_precedence_and_grouping() {
        assert_eq!(
            parse("paris OR lyon AND NOT airport").unwrap(),
            Some(Predicate::Or(vec![
                loc("paris"),
                Predicate::And(vec![loc("lyon"), Predicate::Not(Box::new(loc("airport")))]),
            ]))
        );
        assert_eq!(
            parse("(paris OR lyon) AND france").unwrap(),
            Some(Predicate::And(vec![
                Predicate::Or(vec![loc("paris"), loc("lyon")]),
                loc("france"),
            ]))
        );
    }

    #[test]
    fn test_implicit_and_before_group() {
        assert_eq!(
            parse("italy (rome OR milan)").unwrap(),
            Some(Predicate::And(vec![
                loc("italy"),
                Predicate::Or(vec![loc("rome"), loc("milan")]),
            ]))
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(parse("(("), Err(FilterSyntaxError::Unbalanced));
        assert_eq!(parse("a)"), Err(FilterSyntaxError::Unbalanced));
        assert_eq!(parse(")a("), Err(FilterSyntaxError::Unbalanced));
        assert_eq!(parse("()"), Err(FilterSyntaxError::EmptyGroup));
        assert_eq!(
            parse("paris OR"),
            Err(FilterSyntaxError::DanglingOperator("OR".to_string()))
        );
        assert_eq!(
            parse("AND paris"),
            Err(FilterSyntaxError::DanglingOperator("AND".to_string()))
        );
        assert_eq!(
            parse("NOT"),
            Err(FilterSyntaxError::DanglingOperator("NOT".to_string()))
        );
        assert_eq!(
            parse("x'; DROP TABLE images"),
            Err(FilterSyntaxError::DisallowedCharacter('\''))
        );
    }
}

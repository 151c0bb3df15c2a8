//! Sigma condition expression compiler and evaluator.
//!
//! Grammar: selection identifiers combined with `and`, `or`, `not` and
//! parentheses, plus the quantifiers `1 of <target>` and `all of <target>`
//! where the target is `them` or a `prefix*` glob over selection names.
//! Precedence is standard Sigma: NOT > AND > OR.
//!
//! Conditions are compiled once per rule into RPN (shunting-yard) and
//! evaluated per record over the named selection results.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("condition references unknown selection: {0}")]
    UnknownSelection(String),

    #[error("quantifier target matches no selection: {0}")]
    EmptyQuantifier(String),

    #[error("unbalanced parentheses in condition")]
    UnbalancedParens,

    #[error("malformed condition near: {0}")]
    Malformed(String),
}

/// One RPN token. Quantifiers are expanded to their member selection lists
/// at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CondToken {
    Sel(String),
    /// `1 of ...`: OR over the member results.
    AnyOf(Vec<String>),
    /// `all of ...`: AND over the member results.
    EachOf(Vec<String>),
    Not,
    And,
    Or,
}

/// A condition compiled to RPN, ready for per-record evaluation.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    rpn: Vec<CondToken>,
}

impl CompiledCondition {
    /// Compile a condition string against the set of selection names it may
    /// reference.
    pub fn compile(
        condition: &str,
        selection_names: &BTreeSet<String>,
    ) -> Result<Self, ConditionError> {
        let tokens = tokenize(condition, selection_names)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let rpn = to_rpn(tokens)?;
        validate_arity(&rpn)?;
        Ok(Self { rpn })
    }

    /// Evaluate against named selection results. Selections absent from the
    /// map count as not matched.
    #[must_use]
    pub fn evaluate(&self, results: &BTreeMap<String, bool>) -> bool {
        let lookup = |name: &str| results.get(name).copied().unwrap_or(false);

        let mut stack: Vec<bool> = Vec::with_capacity(4);
        for token in &self.rpn {
            match token {
                CondToken::Sel(name) => stack.push(lookup(name)),
                CondToken::AnyOf(members) => {
                    stack.push(members.iter().any(|name| lookup(name)));
                }
                CondToken::EachOf(members) => {
                    stack.push(members.iter().all(|name| lookup(name)));
                }
                CondToken::Not => {
                    let Some(a) = stack.pop() else { return false };
                    stack.push(!a);
                }
                CondToken::And => {
                    let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                        return false;
                    };
                    stack.push(a && b);
                }
                CondToken::Or => {
                    let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                        return false;
                    };
                    stack.push(a || b);
                }
            }
        }
        stack.len() == 1 && stack[0]
    }
}

/// Lexer token, before precedence handling.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    Operand(CondToken),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(
    condition: &str,
    selection_names: &BTreeSet<String>,
) -> Result<Vec<Lexeme>, ConditionError> {
    // Separate parentheses, then split on whitespace.
    let spaced = condition.replace('(', " ( ").replace(')', " ) ");
    let words: Vec<&str> = spaced.split_whitespace().collect();

    let mut out = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        let lower = word.to_ascii_lowercase();
        match lower.as_str() {
            "(" => out.push(Lexeme::LParen),
            ")" => out.push(Lexeme::RParen),
            "and" => out.push(Lexeme::And),
            "or" => out.push(Lexeme::Or),
            "not" => out.push(Lexeme::Not),
            "1" | "all" => {
                // Quantifier: `1 of <target>` / `all of <target>`.
                if words.get(i + 1).map(|w| w.to_ascii_lowercase()) != Some("of".to_owned()) {
                    return Err(ConditionError::Malformed(word.to_owned()));
                }
                let Some(target) = words.get(i + 2) else {
                    return Err(ConditionError::Malformed(format!("{word} of")));
                };
                let members = resolve_quantifier_target(target, selection_names)?;
                out.push(Lexeme::Operand(if lower == "1" {
                    CondToken::AnyOf(members)
                } else {
                    CondToken::EachOf(members)
                }));
                i += 2;
            }
            _ => {
                if !selection_names.contains(word) {
                    return Err(ConditionError::UnknownSelection(word.to_owned()));
                }
                out.push(Lexeme::Operand(CondToken::Sel(word.to_owned())));
            }
        }
        i += 1;
    }
    Ok(out)
}

fn resolve_quantifier_target(
    target: &str,
    selection_names: &BTreeSet<String>,
) -> Result<Vec<String>, ConditionError> {
    let members: Vec<String> = if target.eq_ignore_ascii_case("them") {
        selection_names.iter().cloned().collect()
    } else if let Some(prefix) = target.strip_suffix('*') {
        selection_names
            .iter()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect()
    } else if selection_names.contains(target) {
        vec![target.to_owned()]
    } else {
        return Err(ConditionError::UnknownSelection(target.to_owned()));
    };

    if members.is_empty() {
        return Err(ConditionError::EmptyQuantifier(target.to_owned()));
    }
    Ok(members)
}

/// Operator precedence: NOT binds tightest, then AND, then OR.
fn precedence(lexeme: &Lexeme) -> u8 {
    match lexeme {
        Lexeme::Not => 3,
        Lexeme::And => 2,
        Lexeme::Or => 1,
        _ => 0,
    }
}

/// Shunting-yard conversion to RPN. `not` is unary and right-associative,
/// so equal-precedence `not`s are not popped.
fn to_rpn(lexemes: Vec<Lexeme>) -> Result<Vec<CondToken>, ConditionError> {
    let mut out: Vec<CondToken> = Vec::with_capacity(lexemes.len());
    let mut ops: Vec<Lexeme> = Vec::new();

    for lexeme in lexemes {
        match lexeme {
            Lexeme::Operand(token) => out.push(token),
            Lexeme::Not => ops.push(Lexeme::Not),
            Lexeme::And | Lexeme::Or => {
                while let Some(top) = ops.last() {
                    if matches!(top, Lexeme::LParen) || precedence(top) < precedence(&lexeme) {
                        break;
                    }
                    out.push(pop_operator(&mut ops));
                }
                ops.push(lexeme);
            }
            Lexeme::LParen => ops.push(Lexeme::LParen),
            Lexeme::RParen => loop {
                match ops.pop() {
                    Some(Lexeme::LParen) => break,
                    Some(op) => out.push(operator_token(op)?),
                    None => return Err(ConditionError::UnbalancedParens),
                }
            },
        }
    }

    while let Some(op) = ops.pop() {
        if matches!(op, Lexeme::LParen) {
            return Err(ConditionError::UnbalancedParens);
        }
        out.push(operator_token(op)?);
    }

    Ok(out)
}

fn pop_operator(ops: &mut Vec<Lexeme>) -> CondToken {
    match ops.pop() {
        Some(Lexeme::Not) => CondToken::Not,
        Some(Lexeme::And) => CondToken::And,
        Some(Lexeme::Or) => CondToken::Or,
        _ => unreachable!("only operators are pushed onto the operator stack"),
    }
}

fn operator_token(lexeme: Lexeme) -> Result<CondToken, ConditionError> {
    match lexeme {
        Lexeme::Not => Ok(CondToken::Not),
        Lexeme::And => Ok(CondToken::And),
        Lexeme::Or => Ok(CondToken::Or),
        other => Err(ConditionError::Malformed(format!("{other:?}"))),
    }
}

/// Reject conditions whose RPN would underflow or leave extra operands, so
/// evaluation never has to guess.
fn validate_arity(rpn: &[CondToken]) -> Result<(), ConditionError> {
    let mut depth: isize = 0;
    for token in rpn {
        match token {
            CondToken::Sel(_) | CondToken::AnyOf(_) | CondToken::EachOf(_) => depth += 1,
            CondToken::Not => {
                if depth < 1 {
                    return Err(ConditionError::Malformed("not".to_owned()));
                }
            }
            CondToken::And | CondToken::Or => {
                depth -= 1;
                if depth < 1 {
                    return Err(ConditionError::Malformed("and/or".to_owned()));
                }
            }
        }
    }
    if depth == 1 {
        Ok(())
    } else {
        Err(ConditionError::Malformed("dangling operand".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    fn results(pairs: &[(&str, bool)]) -> BTreeMap<String, bool> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
    }

    #[test]
    fn single_selection() {
        let c = CompiledCondition::compile("selection", &names(&["selection"])).unwrap();
        assert!(c.evaluate(&results(&[("selection", true)])));
        assert!(!c.evaluate(&results(&[("selection", false)])));
    }

    #[test]
    fn and_or_precedence() {
        // a or b and c  ==  a or (b and c)
        let c = CompiledCondition::compile("a or b and c", &names(&["a", "b", "c"])).unwrap();
        assert!(c.evaluate(&results(&[("a", true), ("b", false), ("c", false)])));
        assert!(c.evaluate(&results(&[("a", false), ("b", true), ("c", true)])));
        assert!(!c.evaluate(&results(&[("a", false), ("b", true), ("c", false)])));
    }

    #[test]
    fn not_binds_tighter_than_and() {
        // not a and b  ==  (not a) and b
        let c = CompiledCondition::compile("not a and b", &names(&["a", "b"])).unwrap();
        assert!(c.evaluate(&results(&[("a", false), ("b", true)])));
        assert!(!c.evaluate(&results(&[("a", true), ("b", true)])));
        assert!(!c.evaluate(&results(&[("a", false), ("b", false)])));
    }

    #[test]
    fn parentheses_override_precedence() {
        let c = CompiledCondition::compile("(a or b) and c", &names(&["a", "b", "c"])).unwrap();
        assert!(c.evaluate(&results(&[("a", true), ("b", false), ("c", true)])));
        assert!(!c.evaluate(&results(&[("a", true), ("b", false), ("c", false)])));
    }

    #[test]
    fn double_negation() {
        let c = CompiledCondition::compile("not not a", &names(&["a"])).unwrap();
        assert!(c.evaluate(&results(&[("a", true)])));
        assert!(!c.evaluate(&results(&[("a", false)])));
    }

    #[test]
    fn not_with_parens() {
        let c =
            CompiledCondition::compile("not (filter or noise)", &names(&["filter", "noise"]))
                .unwrap();
        assert!(c.evaluate(&results(&[("filter", false), ("noise", false)])));
        assert!(!c.evaluate(&results(&[("filter", true), ("noise", false)])));
    }

    #[test]
    fn one_of_prefix_glob() {
        let c = CompiledCondition::compile(
            "1 of selection_*",
            &names(&["selection_a", "selection_b", "filter"]),
        )
        .unwrap();
        assert!(c.evaluate(&results(&[("selection_a", false), ("selection_b", true)])));
        assert!(!c.evaluate(&results(&[("selection_a", false), ("selection_b", false)])));
    }

    #[test]
    fn all_of_them() {
        let c = CompiledCondition::compile("all of them", &names(&["a", "b"])).unwrap();
        assert!(c.evaluate(&results(&[("a", true), ("b", true)])));
        assert!(!c.evaluate(&results(&[("a", true), ("b", false)])));
    }

    #[test]
    fn quantifier_combined_with_filter() {
        let c = CompiledCondition::compile(
            "1 of selection_* and not filter",
            &names(&["selection_a", "selection_b", "filter"]),
        )
        .unwrap();
        assert!(c.evaluate(&results(&[
            ("selection_a", true),
            ("selection_b", false),
            ("filter", false)
        ])));
        assert!(!c.evaluate(&results(&[
            ("selection_a", true),
            ("selection_b", false),
            ("filter", true)
        ])));
    }

    #[test]
    fn unknown_selection_is_a_compile_error() {
        let err = CompiledCondition::compile("ghost", &names(&["selection"])).unwrap_err();
        assert_eq!(err, ConditionError::UnknownSelection("ghost".to_owned()));
    }

    #[test]
    fn empty_quantifier_target_is_a_compile_error() {
        let err = CompiledCondition::compile("1 of nothing_*", &names(&["selection"])).unwrap_err();
        assert_eq!(err, ConditionError::EmptyQuantifier("nothing_*".to_owned()));
    }

    #[test]
    fn unbalanced_parens_are_a_compile_error() {
        assert_eq!(
            CompiledCondition::compile("(a or b", &names(&["a", "b"])).unwrap_err(),
            ConditionError::UnbalancedParens
        );
        assert_eq!(
            CompiledCondition::compile("a or b)", &names(&["a", "b"])).unwrap_err(),
            ConditionError::UnbalancedParens
        );
    }

    #[test]
    fn dangling_operator_is_a_compile_error() {
        assert!(CompiledCondition::compile("a and", &names(&["a"])).is_err());
        assert!(CompiledCondition::compile("and a", &names(&["a"])).is_err());
        assert!(CompiledCondition::compile("not", &names(&["a"])).is_err());
    }

    #[test]
    fn empty_condition_is_a_compile_error() {
        assert_eq!(
            CompiledCondition::compile("   ", &names(&["a"])).unwrap_err(),
            ConditionError::Empty
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let c = CompiledCondition::compile("a AND NOT b", &names(&["a", "b"])).unwrap();
        assert!(c.evaluate(&results(&[("a", true), ("b", false)])));
    }
}

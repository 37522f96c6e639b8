//! Skip conditions: `build == succeeded && !lint`, `deploy != failed || notify`.
//!
//! `&&` binds tighter than `||`; there are no parentheses. A bare step id
//! means "that step succeeded".

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::StepStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StepCondition {
    StatusIs { step: String, status: StepStatus },
    StatusIsNot { step: String, status: StepStatus },
    Not(Box<StepCondition>),
    All(Vec<StepCondition>),
    Any(Vec<StepCondition>),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConditionParseError {
    #[error("empty condition")]
    Empty,
    #[error("invalid step id '{0}' in condition")]
    InvalidStepId(String),
    #[error("unknown status '{0}' in condition (expected succeeded, failed or skipped)")]
    UnknownStatus(String),
}

impl StepCondition {
    pub fn succeeded(step: impl Into<String>) -> Self {
        Self::StatusIs {
            step: step.into(),
            status: StepStatus::Succeeded,
        }
    }

    pub fn failed(step: impl Into<String>) -> Self {
        Self::StatusIs {
            step: step.into(),
            status: StepStatus::Failed,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ConditionParseError> {
        if input.trim().is_empty() {
            return Err(ConditionParseError::Empty);
        }

        let mut any = Vec::new();
        for disjunct in input.split("||") {
            let mut all = Vec::new();
            for term in disjunct.split("&&") {
                all.push(parse_term(term)?);
            }
            any.push(collapse(all, Self::All));
        }
        Ok(collapse(any, Self::Any))
    }

    /// Evaluate against the statuses of steps that have already settled.
    /// Steps missing from `completed` match no status.
    pub fn evaluate(&self, completed: &HashMap<String, StepStatus>) -> bool {
        match self {
            Self::StatusIs { step, status } => completed.get(step) == Some(status),
            Self::StatusIsNot { step, status } => completed.get(step) != Some(status),
            Self::Not(inner) => !inner.evaluate(completed),
            Self::All(items) => items.iter().all(|c| c.evaluate(completed)),
            Self::Any(items) => items.iter().any(|c| c.evaluate(completed)),
        }
    }

    /// Step ids referenced anywhere in the condition.
    pub fn referenced_steps(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_steps(&mut out);
        out
    }

    fn collect_steps<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::StatusIs { step, .. } | Self::StatusIsNot { step, .. } => out.push(step),
            Self::Not(inner) => inner.collect_steps(out),
            Self::All(items) | Self::Any(items) => {
                for c in items {
                    c.collect_steps(out);
                }
            }
        }
    }
}

fn collapse(mut items: Vec<StepCondition>, wrap: fn(Vec<StepCondition>) -> StepCondition) -> StepCondition {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

fn parse_term(raw: &str) -> Result<StepCondition, ConditionParseError> {
    let term = raw.trim();
    if term.is_empty() {
        return Err(ConditionParseError::Empty);
    }

    if let Some(rest) = term.strip_prefix('!') {
        if !rest.trim_start().starts_with('=') {
            return Ok(StepCondition::Not(Box::new(parse_term(rest)?)));
        }
    }

    if let Some((lhs, rhs)) = term.split_once("!=") {
        return Ok(StepCondition::StatusIsNot {
            step: parse_step_id(lhs)?,
            status: parse_status(rhs)?,
        });
    }
    if let Some((lhs, rhs)) = term.split_once("==") {
        return Ok(StepCondition::StatusIs {
            step: parse_step_id(lhs)?,
            status: parse_status(rhs)?,
        });
    }

    Ok(StepCondition::succeeded(parse_step_id(term)?))
}

fn parse_step_id(raw: &str) -> Result<String, ConditionParseError> {
    let id = raw.trim();
    if id.is_empty() || id.chars().any(|c| c.is_whitespace() || c == '=' || c == '!') {
        return Err(ConditionParseError::InvalidStepId(id.to_string()));
    }
    Ok(id.to_string())
}

fn parse_status(raw: &str) -> Result<StepStatus, ConditionParseError> {
    match StepStatus::parse(raw) {
        Some(s) if s.is_terminal() => Ok(s),
        _ => Err(ConditionParseError::UnknownStatus(raw.trim().to_string())),
    }
}

impl StepCondition {
    /// Single comparison, possibly negated: what one `&&` operand can hold.
    fn is_term(&self) -> bool {
        match self {
            Self::StatusIs { .. } | Self::StatusIsNot { .. } => true,
            Self::Not(inner) => inner.is_term(),
            Self::All(_) | Self::Any(_) => false,
        }
    }

    fn negated(&self) -> StepCondition {
        match self {
            Self::Not(inner) => (**inner).clone(),
            Self::All(items) => Self::Any(items.iter().map(Self::negated).collect()),
            Self::Any(items) => Self::All(items.iter().map(Self::negated).collect()),
            term => Self::Not(Box::new(term.clone())),
        }
    }

    /// Equivalent disjunction of conjunctions of terms, the only shape the
    /// parenthesis-free syntax can express.
    fn disjuncts(&self) -> Vec<Vec<StepCondition>> {
        match self {
            Self::Not(inner) if !inner.is_term() => inner.negated().disjuncts(),
            Self::Any(items) => items.iter().flat_map(Self::disjuncts).collect(),
            Self::All(items) => items.iter().fold(vec![Vec::new()], |acc, item| {
                let rhs = item.disjuncts();
                acc.iter()
                    .flat_map(|lhs| {
                        rhs.iter().map(move |r| {
                            let mut conj = lhs.clone();
                            conj.extend(r.iter().cloned());
                            conj
                        })
                    })
                    .collect()
            }),
            term => vec![vec![term.clone()]],
        }
    }
}

/// Renders text that parses back to an equivalent condition. Trees built by
/// [`StepCondition::parse`] render unchanged; other nestings are flattened.
impl fmt::Display for StepCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusIs { step, status } => write!(f, "{step} == {status}"),
            Self::StatusIsNot { step, status } => write!(f, "{step} != {status}"),
            Self::Not(inner) if inner.is_term() => write!(f, "!{inner}"),
            compound => {
                for (i, conj) in compound.disjuncts().iter().enumerate() {
                    if i > 0 {
                        f.write_str(" || ")?;
                    }
                    for (j, term) in conj.iter().enumerate() {
                        if j > 0 {
                            f.write_str(" && ")?;
                        }
                        write!(f, "{term}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for StepCondition {
    type Error = ConditionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StepCondition> for String {
    fn from(value: StepCondition) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn statuses(pairs: &[(&str, StepStatus)]) -> HashMap<String, StepStatus> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn parses_precedence() {
        let c = StepCondition::parse("a == failed || b && !c").unwrap();
        assert_eq!(
            c,
            StepCondition::Any(vec![
                StepCondition::failed("a"),
                StepCondition::All(vec![
                    StepCondition::succeeded("b"),
                    StepCondition::Not(Box::new(StepCondition::succeeded("c"))),
                ]),
            ])
        );
    }

    #[test]
    fn evaluates_against_completed_map() {
        let done = statuses(&[("a", StepStatus::Failed), ("b", StepStatus::Succeeded)]);
        assert!(StepCondition::parse("a == failed").unwrap().evaluate(&done));
        assert!(!StepCondition::parse("a").unwrap().evaluate(&done));
        assert!(StepCondition::parse("a != succeeded && b").unwrap().evaluate(&done));
        assert!(StepCondition::parse("a || b").unwrap().evaluate(&done));
    }

    #[test]
    fn missing_step_matches_no_status() {
        let done = HashMap::new();
        assert!(!StepCondition::parse("x == skipped").unwrap().evaluate(&done));
        assert!(StepCondition::parse("x != failed").unwrap().evaluate(&done));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(StepCondition::parse("  "), Err(ConditionParseError::Empty));
        assert_eq!(
            StepCondition::parse("a == running"),
            Err(ConditionParseError::UnknownStatus("running".into()))
        );
        assert!(StepCondition::parse("a b == failed").is_err());
        assert!(StepCondition::parse("a &&").is_err());
    }

    #[test]
    fn display_reparses_to_same_condition() {
        let c = StepCondition::parse("a==failed||b&&!c").unwrap();
        assert_eq!(StepCondition::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn nested_conditions_render_to_equivalent_text() {
        use StepStatus::{Failed, Skipped, Succeeded};

        let built = [
            // !(a && b)
            StepCondition::Not(Box::new(StepCondition::All(vec![
                StepCondition::succeeded("a"),
                StepCondition::succeeded("b"),
            ]))),
            // !(a || b == failed)
            StepCondition::Not(Box::new(StepCondition::Any(vec![
                StepCondition::succeeded("a"),
                StepCondition::failed("b"),
            ]))),
            // (a || b) && !c
            StepCondition::All(vec![
                StepCondition::Any(vec![
                    StepCondition::succeeded("a"),
                    StepCondition::succeeded("b"),
                ]),
                StepCondition::Not(Box::new(StepCondition::succeeded("c"))),
            ]),
        ];
        let maps = [
            statuses(&[]),
            statuses(&[("a", Succeeded)]),
            statuses(&[("a", Succeeded), ("b", Succeeded)]),
            statuses(&[("a", Failed), ("b", Failed), ("c", Skipped)]),
            statuses(&[("b", Succeeded), ("c", Succeeded)]),
            statuses(&[("a", Skipped), ("b", Succeeded)]),
        ];

        for condition in &built {
            let text = condition.to_string();
            let reparsed = StepCondition::parse(&text).unwrap();
            for done in &maps {
                assert_eq!(
                    reparsed.evaluate(done),
                    condition.evaluate(done),
                    "'{text}' against {done:?}"
                );
            }
        }
        assert_eq!(
            built[0].to_string(),
            "!a == succeeded || !b == succeeded"
        );
        assert_eq!(
            built[2].to_string(),
            "a == succeeded && !c == succeeded || b == succeeded && !c == succeeded"
        );
    }

    #[test]
    fn nested_condition_survives_serde() {
        let c = StepCondition::Not(Box::new(StepCondition::All(vec![
            StepCondition::succeeded("a"),
            StepCondition::failed("b"),
        ])));
        let json = serde_json::to_string(&c).unwrap();
        let back: StepCondition = serde_json::from_str(&json).unwrap();
        let done = statuses(&[("a", StepStatus::Succeeded), ("b", StepStatus::Failed)]);
        assert_eq!(back.evaluate(&done), c.evaluate(&done));
        assert!(!back.evaluate(&done));
    }

    #[test]
    fn lists_referenced_steps() {
        let c = StepCondition::parse("a || b != skipped && !c").unwrap();
        assert_eq!(c.referenced_steps(), vec!["a", "b", "c"]);
    }
}

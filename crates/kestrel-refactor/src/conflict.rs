use std::fmt;

use thiserror::Error;

/// A reason why an extraction cannot be generated automatically.
///
/// The `Display` text is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("Cannot extract: the selection is not a complete expression or sequence of statements")]
    InvalidSelection,
    #[error("Cannot extract to a {target}: select an expression")]
    ExpressionRequired { target: &'static str },
    #[error("Cannot extract: several variables are modified and used after the selection: {}", .names.join(", "))]
    MultipleOutputs { names: Vec<String> },
    #[error("Cannot extract: '{name}' is modified and used after the selection, and the selection also jumps out of it")]
    OutputAndJumps { name: String },
    #[error("Cannot extract: exits of the selection carry different types: {}", .types.join(", "))]
    IncompatibleExitTypes { types: Vec<String> },
    #[error("Cannot extract: the type of the value returned by the selection is unknown")]
    UnknownExitType,
    #[error("Cannot extract: the jump target '@{label}' cannot be resolved")]
    UnresolvedJumpTarget { label: String },
    #[error("Cannot extract: '{name}' is declared in the selection and used after it")]
    DeclarationUsedAfter { name: String },
    #[error("Cannot extract: local declaration '{name}' is used both inside and outside of the selection")]
    LocalDeclarationUsedOutside { name: String },
    #[error("Cannot extract: cannot resolve '{name}', which is assigned in the selection")]
    UnresolvedWrite { name: String },
    #[error("Cannot extract: cannot infer the type of '{name}'")]
    UnknownParameterType { name: String },
    #[error("Cannot extract: cannot infer the type of the selected expression")]
    UnknownExpressionType,
    #[error("Cannot extract: no free name is left for '{base}'")]
    NameExhausted { base: String },
    #[error("Cannot extract: '{name}' is not a valid identifier")]
    InvalidName { name: String },
    #[error("Cannot introduce a property: the expression uses local variables: {}", .names.join(", "))]
    PropertyCapturesLocals { names: Vec<String> },
    #[error("Cannot introduce a parameter: the expression uses local variables: {}", .names.join(", "))]
    ParameterCapturesLocals { names: Vec<String> },
    #[error("Cannot introduce a parameter: the enclosing declaration has no parameter list")]
    MissingParameterList,
    #[error("Cannot extract: {0}")]
    Edit(String),
}

/// Every conflict of one request, in detection order, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new(conflicts: impl IntoIterator<Item = Conflict>) -> Self {
        let mut report = Self::default();
        for conflict in conflicts {
            report.push(conflict);
        }
        report
    }

    pub fn push(&mut self, conflict: Conflict) {
        let message = conflict.to_string();
        if self.conflicts.iter().all(|seen| seen.to_string() != message) {
            self.conflicts.push(conflict);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Human-readable messages, one per conflict.
    pub fn messages(&self) -> Vec<String> {
        self.conflicts.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, conflict) in self.conflicts.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{conflict}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConflictReport {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_keeps_order_and_drops_duplicates() {
        let report = ConflictReport::new([
            Conflict::UnknownParameterType { name: "a".into() },
            Conflict::InvalidSelection,
            Conflict::UnknownParameterType { name: "a".into() },
        ]);
        assert_eq!(
            report.messages(),
            vec![
                "Cannot extract: cannot infer the type of 'a'".to_string(),
                "Cannot extract: the selection is not a complete expression or sequence of statements"
                    .to_string(),
            ]
        );
    }
}

// Readiness Classifier - pure classification of service output lines

use crate::domain::ClassificationRules;
use crate::port::OutputLine;

/// Outcome of classifying one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Warning marker: worth showing, not a failure
    Informational,
    /// Port already taken by someone else
    BindConflict,
    /// Explicit error marker
    GenericError,
    /// Nothing of interest (or undecodable)
    Noise,
}

impl Classification {
    /// Startup-failure signal
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Classification::BindConflict | Classification::GenericError
        )
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Informational => write!(f, "INFORMATIONAL"),
            Classification::BindConflict => write!(f, "BIND_CONFLICT"),
            Classification::GenericError => write!(f, "GENERIC_ERROR"),
            Classification::Noise => write!(f, "NOISE"),
        }
    }
}

/// Classify a captured line; undecodable bytes are Noise
pub fn classify(line: &OutputLine, rules: &ClassificationRules) -> Classification {
    match line.as_text() {
        Some(text) => classify_text(text, rules),
        None => Classification::Noise,
    }
}

/// Classify text against the rule set
///
/// Precedence: bind conflict > error > warning > nothing.
pub fn classify_text(text: &str, rules: &ClassificationRules) -> Classification {
    let hit = |needles: &[String]| {
        needles
            .iter()
            .any(|needle| !needle.is_empty() && text.contains(needle.as_str()))
    };

    if hit(&rules.bind_conflict) {
        Classification::BindConflict
    } else if hit(&rules.error) {
        Classification::GenericError
    } else if hit(&rules.warn) {
        Classification::Informational
    } else {
        Classification::Noise
    }
}

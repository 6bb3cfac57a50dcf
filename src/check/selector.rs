// Unit selection by name patterns, unit types and scope

use crate::error::{CheckError, Result};
use crate::systemd::{UnitRecord, UnitType};
use regex::Regex;
use std::collections::BTreeSet;

/// A unit name rule: an exact name or a regular expression.
///
/// Regular expressions are anchored at the start of the unit name only, so
/// `user@\d+` matches `user@1000.service`.
#[derive(Debug, Clone)]
pub enum NamePattern {
    Literal(String),
    Regex(Regex),
}

impl NamePattern {
    pub fn literal(name: impl Into<String>) -> Self {
        NamePattern::Literal(name.into())
    }

    /// Compile a pattern; an invalid expression is a configuration error
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
            tracing::debug!("Invalid regular expression '{}': {}", pattern, e);
            CheckError::InvalidRegex {
                pattern: pattern.to_string(),
            }
        })?;
        Ok(NamePattern::Regex(regex))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Literal(literal) => literal == name,
            NamePattern::Regex(regex) => regex.is_match(name),
        }
    }
}

/// Which units take part in the check
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub include: Vec<NamePattern>,
    pub exclude: Vec<NamePattern>,
    pub include_types: BTreeSet<UnitType>,
    pub exclude_types: BTreeSet<UnitType>,
    pub include_user_units: bool,
}

impl SelectionCriteria {
    pub fn has_include_rules(&self) -> bool {
        !self.include.is_empty() || !self.include_types.is_empty()
    }

    pub fn is_included(&self, unit: &UnitRecord) -> bool {
        self.include.iter().any(|p| p.matches(&unit.name)) || self.include_types.contains(&unit.unit_type)
    }

    pub fn is_excluded(&self, unit: &UnitRecord) -> bool {
        self.excludes_name(&unit.name) || self.exclude_types.contains(&unit.unit_type)
    }

    /// Exclusion by name alone, used for timers as well
    pub fn excludes_name(&self, name: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(name))
    }

    /// Unit names that were included literally
    pub fn literal_includes(&self) -> impl Iterator<Item = &str> {
        self.include.iter().filter_map(|p| match p {
            NamePattern::Literal(name) => Some(name.as_str()),
            NamePattern::Regex(_) => None,
        })
    }
}

/// Apply include rules, then exclude rules, then the user scope filter.
///
/// Exclusion always wins over inclusion. The result keeps input order and
/// selecting again with the same criteria returns the same units.
pub fn select(units: &[UnitRecord], criteria: &SelectionCriteria) -> Vec<UnitRecord> {
    let selected: Vec<UnitRecord> = units
        .iter()
        .filter(|unit| !criteria.has_include_rules() || criteria.is_included(unit))
        .filter(|unit| !criteria.is_excluded(unit))
        .filter(|unit| criteria.include_user_units || !unit.is_user_unit())
        .cloned()
        .collect();
    tracing::debug!("Selected {} of {} units", selected.len(), units.len());
    selected
}

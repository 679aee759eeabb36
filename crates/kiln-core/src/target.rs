//! Build target identities.
//!
//! A target has three identity levels, each a refinement of the previous:
//!
//! - [`UnflavoredBuildTarget`] — the rule as declared in a build file. This is
//!   the unit of invalidation: every flavored or configured variant of a rule
//!   dies when its build file changes.
//! - [`UnconfiguredBuildTarget`] — unflavored identity plus a flavor set.
//! - [`BuildTarget`] — unconfigured identity plus a configuration reference.
//!
//! Labels render as `cell//package:name#flavor,...`; the root cell renders
//! with an empty cell component (`//package:name`).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

use crate::path::ForwardRelPathBuf;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("invalid target name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("invalid flavor `{flavor}`: {reason}")]
    InvalidFlavor { flavor: String, reason: &'static str },
    #[error("invalid target label `{label}`: {reason}")]
    InvalidLabel { label: String, reason: &'static str },
    #[error("raw target node in package `{package}` has no string `name` attribute")]
    MissingNameAttr { package: String },
}

/// The canonical name of a cell. The root cell is the empty name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellName(SmolStr);

impl CellName {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn root() -> Self {
        Self(SmolStr::default())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellName").field(&self.0.as_str()).finish()
    }
}

impl fmt::Display for CellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty");
    }
    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, ':' | '/' | '#') || c.is_whitespace())
    {
        return match bad {
            ':' => Err("contains `:`"),
            '/' => Err("contains `/`"),
            '#' => Err("contains `#`"),
            _ => Err("contains whitespace"),
        };
    }
    Ok(())
}

/// A validated short target name (the part after `:` in a label).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetName(SmolStr);

impl TargetName {
    pub fn new(name: impl Into<SmolStr>) -> Result<Self, TargetParseError> {
        let name = name.into();
        validate_name(&name).map_err(|reason| TargetParseError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TargetName {
    type Error = TargetParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TargetName> for String {
    fn from(value: TargetName) -> Self {
        value.0.to_string()
    }
}

impl fmt::Debug for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TargetName").field(&self.0.as_str()).finish()
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An orthogonal decoration on a target (e.g. `headers`, `shared`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Flavor(SmolStr);

impl Flavor {
    pub fn new(flavor: impl Into<SmolStr>) -> Result<Self, TargetParseError> {
        let flavor = flavor.into();
        if flavor.is_empty() || flavor.contains([',', '#', ':', '/']) {
            return Err(TargetParseError::InvalidFlavor {
                flavor: flavor.to_string(),
                reason: "must be non-empty and free of `,#:/`",
            });
        }
        Ok(Self(flavor))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Flavor {
    type Error = TargetParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Flavor> for String {
    fn from(value: Flavor) -> Self {
        value.0.to_string()
    }
}

impl fmt::Debug for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Flavor").field(&self.0.as_str()).finish()
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sorted flavor set, so every flavored label has one canonical rendering.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlavorSet(BTreeSet<Flavor>);

impl FlavorSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flavor> {
        self.0.iter()
    }
}

impl FromIterator<Flavor> for FlavorSet {
    fn from_iter<I: IntoIterator<Item = Flavor>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for FlavorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

/// A reference to a target configuration (platform), interned by the daemon.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigurationRef(SmolStr);

impl ConfigurationRef {
    pub fn new(label: impl Into<SmolStr>) -> Self {
        Self(label.into())
    }

    /// The placeholder configuration used before configuration resolution.
    pub fn unbound() -> Self {
        Self(SmolStr::new_static("<unbound>"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConfigurationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigurationRef")
            .field(&self.0.as_str())
            .finish()
    }
}

impl fmt::Display for ConfigurationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule as declared in a build file, without flavor or configuration
/// decoration. The unit of invalidation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnflavoredBuildTarget {
    cell: CellName,
    package: ForwardRelPathBuf,
    name: TargetName,
}

impl UnflavoredBuildTarget {
    pub fn new(cell: CellName, package: ForwardRelPathBuf, name: TargetName) -> Self {
        Self {
            cell,
            package,
            name,
        }
    }

    pub fn cell(&self) -> &CellName {
        &self.cell
    }

    pub fn package(&self) -> &ForwardRelPathBuf {
        &self.package
    }

    pub fn name(&self) -> &TargetName {
        &self.name
    }

    pub fn with_flavors(self, flavors: FlavorSet) -> UnconfiguredBuildTarget {
        UnconfiguredBuildTarget {
            unflavored: self,
            flavors,
        }
    }
}

impl fmt::Display for UnflavoredBuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}:{}", self.cell, self.package, self.name)
    }
}

impl fmt::Debug for UnflavoredBuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnflavoredBuildTarget({self})")
    }
}

/// An unflavored target plus a (possibly empty) flavor set.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnconfiguredBuildTarget {
    unflavored: UnflavoredBuildTarget,
    flavors: FlavorSet,
}

impl UnconfiguredBuildTarget {
    pub fn new(unflavored: UnflavoredBuildTarget, flavors: FlavorSet) -> Self {
        Self {
            unflavored,
            flavors,
        }
    }

    /// Parses a label of the form `cell//package:name#flavor,...`.
    pub fn parse(label: &str) -> Result<Self, TargetParseError> {
        let invalid = |reason| TargetParseError::InvalidLabel {
            label: label.to_string(),
            reason,
        };

        let (cell, rest) = label.split_once("//").ok_or(invalid("missing `//`"))?;
        let (package, name_part) = rest.split_once(':').ok_or(invalid("missing `:`"))?;
        let (name, flavors) = match name_part.split_once('#') {
            Some((name, flavors)) => (name, Some(flavors)),
            None => (name_part, None),
        };

        let package = ForwardRelPathBuf::new(package)
            .map_err(|_| invalid("package is not a forward relative path"))?;
        let name = TargetName::new(name)?;
        let flavors = match flavors {
            Some(flavors) => flavors
                .split(',')
                .map(Flavor::new)
                .collect::<Result<FlavorSet, _>>()?,
            None => FlavorSet::empty(),
        };

        Ok(UnflavoredBuildTarget::new(CellName::new(cell), package, name).with_flavors(flavors))
    }

    pub fn unflavored(&self) -> &UnflavoredBuildTarget {
        &self.unflavored
    }

    pub fn flavors(&self) -> &FlavorSet {
        &self.flavors
    }

    pub fn configure(self, configuration: ConfigurationRef) -> BuildTarget {
        BuildTarget {
            unconfigured: self,
            configuration,
        }
    }
}

impl fmt::Display for UnconfiguredBuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.unflavored.fmt(f)?;
        for (i, flavor) in self.flavors.iter().enumerate() {
            f.write_str(if i == 0 { "#" } else { "," })?;
            flavor.fmt(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for UnconfiguredBuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnconfiguredBuildTarget({self})")
    }
}

/// A fully configured build target.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildTarget {
    unconfigured: UnconfiguredBuildTarget,
    configuration: ConfigurationRef,
}

impl BuildTarget {
    pub fn new(unconfigured: UnconfiguredBuildTarget, configuration: ConfigurationRef) -> Self {
        Self {
            unconfigured,
            configuration,
        }
    }

    pub fn unconfigured(&self) -> &UnconfiguredBuildTarget {
        &self.unconfigured
    }

    pub fn unflavored(&self) -> &UnflavoredBuildTarget {
        self.unconfigured.unflavored()
    }

    pub fn configuration(&self) -> &ConfigurationRef {
        &self.configuration
    }
}

impl fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.unconfigured, self.configuration)
    }
}

impl fmt::Debug for BuildTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildTarget({self})")
    }
}

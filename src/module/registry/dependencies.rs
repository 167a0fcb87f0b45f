//! Unit prerequisites and dependency walks
//!
//! Handles the prerequisite kinds a unit can declare and the transitive
//! closure of a set of units over the registration records.

use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

use crate::module::registry::UnitRecord;

/// Reserved prerequisite name for the loader self-reference
pub const REQUIRE_SENTINEL: &str = "require";
/// Reserved prerequisite name for a fresh exports container
pub const EXPORTS_SENTINEL: &str = "exports";

/// A declared prerequisite
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prerequisite {
    /// Another unit, by name
    Named(String),
    /// The resolving loader itself
    SelfReference,
    /// A fresh, empty exports container
    ExportsContainer,
}

impl Prerequisite {
    /// A named prerequisite, never interpreted as a sentinel
    pub fn named(name: impl Into<String>) -> Self {
        Prerequisite::Named(name.into())
    }

    /// Unit name for `Named`, `None` for sentinels
    pub fn name(&self) -> Option<&str> {
        match self {
            Prerequisite::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Textual form, with sentinels rendered as their reserved names
    pub fn as_str(&self) -> &str {
        match self {
            Prerequisite::Named(name) => name,
            Prerequisite::SelfReference => REQUIRE_SENTINEL,
            Prerequisite::ExportsContainer => EXPORTS_SENTINEL,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Prerequisite::Named(_))
    }
}

impl From<&str> for Prerequisite {
    fn from(name: &str) -> Self {
        match name {
            REQUIRE_SENTINEL => Prerequisite::SelfReference,
            EXPORTS_SENTINEL => Prerequisite::ExportsContainer,
            other => Prerequisite::Named(other.to_string()),
        }
    }
}

impl From<String> for Prerequisite {
    fn from(name: String) -> Self {
        match name.as_str() {
            REQUIRE_SENTINEL => Prerequisite::SelfReference,
            EXPORTS_SENTINEL => Prerequisite::ExportsContainer,
            _ => Prerequisite::Named(name),
        }
    }
}

impl From<&String> for Prerequisite {
    fn from(name: &String) -> Self {
        Prerequisite::from(name.as_str())
    }
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency walker over registration records
pub struct UnitDependencies;

impl UnitDependencies {
    /// Transitive closure of `roots` over the records' named prerequisites
    ///
    /// Returns the roots first, then every reachable prerequisite in
    /// breadth-first discovery order, each name once. Names without a record
    /// are listed but not expanded.
    pub fn closure<'a, I>(roots: I, records: &IndexMap<String, UnitRecord>) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for root in roots {
            if seen.insert(root.to_string()) {
                queue.push_back(root.to_string());
            }
        }

        while let Some(name) = queue.pop_front() {
            let Some(record) = records.get(&name) else {
                debug!("No registration record for {}, not expanding", name);
                continue;
            };
            for dep in record.prerequisites.iter().flatten().filter_map(Prerequisite::name) {
                if seen.insert(dep.to_string()) {
                    queue.push_back(dep.to_string());
                }
            }
        }

        seen.into_iter().collect()
    }
}

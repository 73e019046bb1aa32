//! The frozen category table consulted by the triage engine.
//!
//! Each category is parsed independently. A malformed list disables only its
//! own category: the table keeps it empty, records a [`ConfigDiagnostic`], and
//! the remaining categories still activate.

use nmi_common::ReasonCode;
use serde::Serialize;
use tracing::{error, info};

use crate::category::{Category, CategorySet, DEFAULT_CAPACITY};
use crate::params::TriageParams;
use crate::range_list::{parse_range_list, RangeListError};

/// A category whose list was rejected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDiagnostic {
    pub category: Category,
    pub input: String,
    pub message: String,
    #[serde(skip)]
    pub error: RangeListError,
}

/// Four reason-code sets, indexed by [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryTable {
    sets: [CategorySet; 4],
}

impl CategoryTable {
    /// Table with every category empty; matches nothing.
    pub fn empty() -> Self {
        Self {
            sets: [CategorySet::empty(); 4],
        }
    }

    /// Parse every supplied list with the given per-category capacity.
    pub fn build(params: &TriageParams, capacity: usize) -> (Self, Vec<ConfigDiagnostic>) {
        let mut sets = [CategorySet::with_capacity(capacity); 4];
        let mut diagnostics = Vec::new();

        for category in Category::ALL {
            let Some(input) = params.get(category) else {
                continue;
            };
            info!(param = category.param_name(), list = input, "reason-code list supplied");

            match parse_range_list(input, capacity) {
                Ok(set) => sets[category.index()] = set,
                Err(err) => {
                    error!(
                        param = category.param_name(),
                        input,
                        error = %err,
                        "invalid input, category left empty"
                    );
                    diagnostics.push(ConfigDiagnostic {
                        category,
                        input: input.to_string(),
                        message: err.to_string(),
                        error: err,
                    });
                }
            }
        }

        (Self { sets }, diagnostics)
    }

    /// [`build`](Self::build) with the historical capacity.
    pub fn from_params(params: &TriageParams) -> (Self, Vec<ConfigDiagnostic>) {
        Self::build(params, DEFAULT_CAPACITY)
    }

    #[inline]
    pub fn contains(&self, category: Category, code: ReasonCode) -> bool {
        self.sets[category.index()].contains(code)
    }

    pub fn set(&self, category: Category) -> &CategorySet {
        &self.sets[category.index()]
    }

    /// Categories `code` belongs to, in priority order.
    pub fn memberships(&self, code: ReasonCode) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(move |category| self.contains(*category, code))
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(CategorySet::is_empty)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for CategoryTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(Category::ALL.len()))?;
        for category in Category::ALL {
            map.serialize_entry(&category, self.set(category))?;
        }
        map.end()
    }
}

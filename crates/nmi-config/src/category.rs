//! Triage categories and their bounded reason-code sets.

use nmi_common::ReasonCode;
use serde::{Serialize, Serializer};
use std::fmt;

/// Number of distinct reason codes (the whole `u8` domain).
pub const DOMAIN_SIZE: usize = 256;

/// Historical per-category capacity: 256 slots minus one reserved slot.
pub const DEFAULT_CAPACITY: usize = DOMAIN_SIZE - 1;

/// Response category, listed in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Swallow silently; other handlers still see the event.
    Ignore,
    /// Capture diagnostics, then keep evaluating.
    Debug,
    /// Consume the event so no other handler sees it.
    Drop,
    /// Halt the system to force a crash dump.
    Panic,
}

impl Category {
    /// All categories in evaluation priority order.
    pub const ALL: [Category; 4] = [
        Category::Ignore,
        Category::Debug,
        Category::Drop,
        Category::Panic,
    ];

    /// Name of the matching module parameter (`events_panic`, ...).
    pub fn param_name(self) -> &'static str {
        match self {
            Category::Ignore => "events_ignore",
            Category::Debug => "events_debug",
            Category::Drop => "events_drop",
            Category::Panic => "events_panic",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Ignore => write!(f, "ignore"),
            Category::Debug => write!(f, "debug"),
            Category::Drop => write!(f, "drop"),
            Category::Panic => write!(f, "panic"),
        }
    }
}

/// Fixed-size set of reason codes with an explicit element count.
///
/// Stored as a 256-bit bitmap so membership is a single load and the value
/// is `Copy`; lookups never allocate or lock. Code 0 is a member only when it
/// was inserted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CategorySet {
    bits: [u64; 4],
    len: u16,
    capacity: u16,
}

/// Returned by [`CategorySet::insert`] when the set is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityExceeded {
    pub capacity: usize,
}

impl CategorySet {
    /// Empty set holding at most `capacity` codes (clamped to the domain size).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bits: [0; 4],
            len: 0,
            capacity: capacity.min(DOMAIN_SIZE) as u16,
        }
    }

    pub fn empty() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Insert a code. Returns `Ok(true)` if it was newly added, `Ok(false)`
    /// if it was already present.
    pub fn insert(&mut self, code: ReasonCode) -> Result<bool, CapacityExceeded> {
        if self.contains(code) {
            return Ok(false);
        }
        if self.len >= self.capacity {
            return Err(CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        let (word, bit) = slot(code);
        self.bits[word] |= bit;
        self.len += 1;
        Ok(true)
    }

    #[inline]
    pub fn contains(&self, code: ReasonCode) -> bool {
        let (word, bit) = slot(code);
        self.bits[word] & bit != 0
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ReasonCode> + '_ {
        (0..=u8::MAX)
            .map(ReasonCode)
            .filter(move |code| self.contains(*code))
    }

    /// Compact rendering in the same grammar the parser accepts, e.g.
    /// `0-2,5-13,255`.
    pub fn to_range_list(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut run: Option<(u8, u8)> = None;
        for code in self.iter() {
            run = match run {
                Some((start, end)) if end.checked_add(1) == Some(code.0) => Some((start, code.0)),
                Some(done) => {
                    parts.push(render_run(done));
                    Some((code.0, code.0))
                }
                None => Some((code.0, code.0)),
            };
        }
        if let Some(done) = run {
            parts.push(render_run(done));
        }
        parts.join(",")
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategorySet")
            .field("codes", &self.to_range_list())
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Serialize for CategorySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|code| code.0))
    }
}

#[inline]
fn slot(code: ReasonCode) -> (usize, u64) {
    ((code.0 >> 6) as usize, 1u64 << (code.0 & 63))
}

fn render_run((start, end): (u8, u8)) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

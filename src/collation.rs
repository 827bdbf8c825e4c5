//! Culturally ordered string comparison.
//!
//! Wraps the Unicode Collation Algorithm with the CLDR root order: base
//! letters first, then accents, then case with lowercase first. So `"Ödön"`
//! sorts among the O names ahead of `"Oszkár"`, and `"Łukasz"` among the L
//! names, where a code-point comparison would put both after `"Zoltán"`.

use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering;
use std::sync::LazyLock;

static SHARED: LazyLock<Collator> = LazyLock::new(Collator::new);

/// Collation service injected into the listings.
pub struct Collator {
    inner: Mutex<feruca::Collator>,
}

/// Exclusive handle for a run of comparisons, such as one sort.
pub struct Collation<'a> {
    inner: MutexGuard<'a, feruca::Collator>,
}

impl Collation<'_> {
    /// Compare two strings.
    pub fn compare(&mut self, a: &str, b: &str) -> Ordering {
        self.inner.collate(a, b)
    }

    /// Compare field by field; the first difference decides.
    pub fn compare_fields(&mut self, a: &[&str], b: &[&str]) -> Ordering {
        for (x, y) in a.iter().zip(b) {
            let ord = self.compare(x, y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }

    /// Compare optional values; missing ones sort last.
    pub fn compare_optional(&mut self, a: Option<&str>, b: Option<&str>) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => self.compare(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl Collator {
    /// Create a collator. Prefer [`Collator::shared`].
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(feruca::Collator::default()),
        }
    }

    /// Process-wide instance.
    pub fn shared() -> &'static Collator {
        &SHARED
    }

    /// Take the collator for a run of comparisons.
    pub fn collation(&self) -> Collation<'_> {
        Collation {
            inner: self.inner.lock(),
        }
    }

    /// Compare two strings.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.collation().compare(a, b)
    }

    /// Stable sort of `items` with a collating comparison.
    pub fn sort_by<T, F>(&self, items: &mut [T], mut cmp: F)
    where
        F: FnMut(&mut Collation<'_>, &T, &T) -> Ordering,
    {
        let mut collation = self.collation();
        items.sort_by(|a, b| cmp(&mut collation, a, b));
    }
}

impl Default for Collator {
    fn default() -> Self {
        Self::new()
    }
}

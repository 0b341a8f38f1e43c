//! Page-window computation shared by every paginated query
//!
//! Window rule for a sequence of length `L`, page `p`, size `c`:
//! - `s = p * c`; if `0 <= s < L` the window starts at `s`
//!   - `s + c <= L`: window `[s, s + c)`, `next = p + 1`
//!   - otherwise: short final page `[s, L)`, `next = -1`
//! - any other `s` (including negative input): empty window, `next = -1`
//! - `before = p - 1` always
//!
//! Note that a final page filling exactly up to `L` still reports
//! `next = p + 1`; the following page is then empty with `next = -1`.

use serde::{Deserialize, Serialize};

/// Sentinel for "no such page"
pub const NO_PAGE: i64 = -1;

/// Window used when a caller passes a negative page or count
pub const DEFAULT_PAGE: i64 = 0;
pub const DEFAULT_COUNT: i64 = 10;

/// Paginated response shape
///
/// Serializes as `{result, total_number, before, current, next}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub result: T,
    pub total_number: usize,
    pub before: i64,
    pub current: i64,
    pub next: i64,
}

impl<T> PageResult<T> {
    pub fn new(result: T, total_number: usize, page: i64, next: i64) -> Self {
        Self {
            result,
            total_number,
            before: page - 1,
            current: page,
            next,
        }
    }
}

/// A borrowed page window over one sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a, T> {
    pub items: &'a [T],
    pub next: i64,
    /// True when `page * count` fell inside the sequence
    pub in_range: bool,
}

impl<'a, T> Window<'a, T> {
    fn empty() -> Self {
        Self {
            items: &[],
            next: NO_PAGE,
            in_range: false,
        }
    }
}

/// Compute the window for `page`/`count` over `items`
pub fn window<T>(items: &[T], page: i64, count: i64) -> Window<'_, T> {
    if page < 0 || count < 0 {
        return Window::empty();
    }

    let len = items.len();
    let start = match page.checked_mul(count).and_then(|s| usize::try_from(s).ok()) {
        Some(start) if start < len => start,
        _ => return Window::empty(),
    };

    // count is non-negative here, so the conversion only fails past usize::MAX
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    match start.checked_add(count) {
        Some(end) if end <= len => Window {
            items: &items[start..end],
            next: page + 1,
            in_range: true,
        },
        _ => Window {
            items: &items[start..],
            next: NO_PAGE,
            in_range: true,
        },
    }
}

/// The `next` value [`window`] would report for a sequence of length `len`
///
/// For callers that only know the total, such as store-side pagination.
pub fn next_page(len: usize, page: i64, count: i64) -> i64 {
    if page < 0 || count < 0 {
        return NO_PAGE;
    }
    let start = page.checked_mul(count).and_then(|s| usize::try_from(s).ok());
    let end = start.and_then(|s| usize::try_from(count).ok().and_then(|c| s.checked_add(c)));
    match (start, end) {
        (Some(start), Some(end)) if start < len && end <= len => page + 1,
        _ => NO_PAGE,
    }
}

/// Paginate a single sequence; `total_number` is the full sequence length
pub fn paginate<T: Clone>(items: &[T], page: i64, count: i64) -> PageResult<Vec<T>> {
    let w = window(items, page, count);
    PageResult::new(w.items.to_vec(), items.len(), page, w.next)
}

/// Replace negative input with the default window
///
/// Returns the effective `(page, count)` and whether normalization happened.
pub fn normalize(page: i64, count: i64) -> (i64, i64, bool) {
    if page < 0 || count < 0 {
        (DEFAULT_PAGE, DEFAULT_COUNT, true)
    } else {
        (page, count, false)
    }
}

/// Accumulates several independently paginated sequences into one response
///
/// `total_number` is the longest in-range sequence (not the sum) and `next`
/// advances if any sequence has a further page.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MultiWindow {
    page: i64,
    count: i64,
    normalized: bool,
    total: usize,
    has_next: bool,
}

impl MultiWindow {
    pub(crate) fn new(page: i64, count: i64) -> Self {
        let (page, count, normalized) = normalize(page, count);
        Self {
            page,
            count,
            normalized,
            total: 0,
            has_next: false,
        }
    }

    /// Slice one sequence and fold its window into the response counters
    pub(crate) fn slice<T: Clone>(&mut self, items: &[T]) -> Vec<T> {
        let w = window(items, self.page, self.count);
        if w.in_range {
            // A normalized query reports the size of what it returned
            let size = if self.normalized { w.items.len() } else { items.len() };
            self.total = self.total.max(size);
        }
        if w.next != NO_PAGE {
            self.has_next = true;
        }
        w.items.to_vec()
    }

    pub(crate) fn finish<T>(self, result: T) -> PageResult<T> {
        let next = if self.has_next { self.page + 1 } else { NO_PAGE };
        PageResult::new(result, self.total, self.page, next)
    }
}

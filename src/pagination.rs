//! Page requests and page-sliced results.

use crate::sql::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 1000;

/// Page number (1-based) and page size for a paginated fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Page size clamped to 1..=MAX_PAGE_SIZE, page number to at least 1.
    pub fn new(page: u64, page_size: u64) -> Self {
        PageRequest {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Resolve the page actually served for `total_items`: pages past the end clamp to the last page.
    pub fn resolve(self, total_items: u64) -> PageRequest {
        let req = PageRequest::new(self.page, self.page_size);
        let last = page_count(total_items, req.page_size).max(1);
        PageRequest {
            page: req.page.min(last),
            page_size: req.page_size,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1) * self.page_size
    }
}

fn page_count(total_items: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(page_size)
}

/// One page of rows plus enough metadata to navigate the rest. Read-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Row>,
    pub total_items: u64,
    pub page: u64,
    pub page_size: u64,
}

impl Page {
    pub fn new(items: Vec<Row>, total_items: u64, page: u64, page_size: u64) -> Self {
        Page {
            items,
            total_items,
            page,
            page_size,
        }
    }

    pub fn page_count(&self) -> u64 {
        page_count(self.total_items, self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "page": self.page,
            "page_size": self.page_size,
            "page_count": self.page_count(),
            "total_items": self.total_items,
            "items": self.items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_clamps_bounds() {
        let r = PageRequest::new(0, 0);
        assert_eq!(r, PageRequest { page: 1, page_size: 1 });
        assert_eq!(PageRequest::new(2, 5000).page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn resolve_clamps_to_last_page() {
        let r = PageRequest::new(9, 20).resolve(45);
        assert_eq!(r.page, 3);
        assert_eq!(r.offset(), 40);
        assert_eq!(PageRequest::new(4, 20).resolve(0).page, 1);
    }

    #[test]
    fn page_navigation() {
        let p = Page::new(Vec::new(), 45, 2, 20);
        assert_eq!(p.page_count(), 3);
        assert!(p.has_next());
        assert!(p.has_previous());
        let last = Page::new(Vec::new(), 45, 3, 20);
        assert!(!last.has_next());
    }
}

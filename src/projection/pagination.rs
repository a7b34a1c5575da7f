//! Pagination
//!
//! `page`/`per_page` window selection with metadata exposed through response
//! headers, never the body. Out-of-range pages are an empty array with 200,
//! not an error.

use crate::config::PaginationConfig;
use crate::error::DispatchError;

/// Validated pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub per_page: u32,
}

impl Page {
    /// Parse raw query params against the configured bounds.
    pub fn from_params(
        page: Option<&str>,
        per_page: Option<&str>,
        config: &PaginationConfig,
    ) -> Result<Self, DispatchError> {
        let number = match page {
            None => 1,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    DispatchError::BadRequest(format!("page does not have a valid value: {raw}"))
                })?,
        };

        let per_page = match per_page {
            None => config.default_per_page,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| {
                    DispatchError::BadRequest(format!(
                        "per_page does not have a valid value: {raw}"
                    ))
                })?
                .min(config.max_per_page),
        };

        Ok(Self { number, per_page })
    }

    /// Slice the window out of a fully-sorted collection and compute the
    /// envelope metadata.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> (&'a [T], PaginationMeta) {
        let total = items.len() as u64;
        let per_page = self.per_page as u64;
        let total_pages = total.div_ceil(per_page).max(1);

        let start = (self.number as u64 - 1).saturating_mul(per_page);
        let window = if start >= total {
            // Out-of-range page: empty, not an error.
            &items[0..0]
        } else {
            let end = (start + per_page).min(total) as usize;
            &items[start as usize..end]
        };

        let meta = PaginationMeta {
            total,
            total_pages,
            page: self.number,
            per_page: self.per_page,
            next_page: if (self.number as u64) < total_pages {
                Some(self.number + 1)
            } else {
                None
            },
            prev_page: if self.number > 1 {
                Some(self.number - 1)
            } else {
                None
            },
        };

        (window, meta)
    }
}

/// Pagination envelope, rendered into `X-*` response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationMeta {
    pub total: u64,
    pub total_pages: u64,
    pub page: u32,
    pub per_page: u32,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl PaginationMeta {
    /// Header pairs in the conventional `X-Total` family.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-Total".to_string(), self.total.to_string()),
            ("X-Total-Pages".to_string(), self.total_pages.to_string()),
            ("X-Page".to_string(), self.page.to_string()),
            ("X-Per-Page".to_string(), self.per_page.to_string()),
        ];
        headers.push((
            "X-Next-Page".to_string(),
            self.next_page.map(|p| p.to_string()).unwrap_or_default(),
        ));
        headers.push((
            "X-Prev-Page".to_string(),
            self.prev_page.map(|p| p.to_string()).unwrap_or_default(),
        ));
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PaginationConfig {
        PaginationConfig {
            default_per_page: 20,
            max_per_page: 100,
        }
    }

    #[test]
    fn test_defaults() {
        let page = Page::from_params(None, None, &config()).unwrap();
        assert_eq!(page.number, 1);
        assert_eq!(page.per_page, 20);
    }

    #[test]
    fn test_per_page_capped_at_max() {
        let page = Page::from_params(None, Some("500"), &config()).unwrap();
        assert_eq!(page.per_page, 100);
    }

    #[test]
    fn test_invalid_params_are_bad_request() {
        assert!(Page::from_params(Some("0"), None, &config()).is_err());
        assert!(Page::from_params(Some("abc"), None, &config()).is_err());
        assert!(Page::from_params(None, Some("-1"), &config()).is_err());
    }

    #[test]
    fn test_second_page_of_three_items() {
        let items = vec![1, 2, 3];
        let page = Page {
            number: 2,
            per_page: 1,
        };
        let (window, meta) = page.slice(&items);
        assert_eq!(window, &[2]);
        assert_eq!(meta.total, 3);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(meta.next_page, Some(3));
        assert_eq!(meta.prev_page, Some(1));
    }

    #[test]
    fn test_out_of_range_page_is_empty() {
        let items = vec![1, 2, 3];
        let page = Page {
            number: 4,
            per_page: 1,
        };
        let (window, meta) = page.slice(&items);
        assert!(window.is_empty());
        assert_eq!(meta.total, 3);
        assert_eq!(meta.next_page, None);
    }

    #[test]
    fn test_empty_collection() {
        let items: Vec<u32> = vec![];
        let page = Page {
            number: 1,
            per_page: 20,
        };
        let (window, meta) = page.slice(&items);
        assert!(window.is_empty());
        assert_eq!(meta.total_pages, 1);
        assert_eq!(meta.next_page, None);
        assert_eq!(meta.prev_page, None);
    }

    #[test]
    fn test_headers() {
        let meta = PaginationMeta {
            total: 3,
            total_pages: 3,
            page: 2,
            per_page: 1,
            next_page: Some(3),
            prev_page: Some(1),
        };
        let headers = meta.headers();
        assert!(headers.contains(&("X-Total".to_string(), "3".to_string())));
        assert!(headers.contains(&("X-Page".to_string(), "2".to_string())));
        assert!(headers.contains(&("X-Next-Page".to_string(), "3".to_string())));
    }
}

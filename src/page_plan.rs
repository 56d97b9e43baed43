use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePlan {
    pub page_count: u32,
    pub batches: Vec<PageRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start_page: u32, // 1-based inclusive
    pub end_page: u32,   // 1-based inclusive
}

impl PageRange {
    pub fn len(&self) -> u32 {
        self.end_page + 1 - self.start_page
    }

    pub fn is_empty(&self) -> bool {
        self.end_page < self.start_page
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start_page..=self.end_page
    }
}

impl PagePlan {
    /// Splits `1..=page_count` into contiguous batches of `per_batch` pages.
    /// A tail shorter than `min_per_batch` joins the batch before it.
    pub fn from_page_count(page_count: u32, per_batch: u32, min_per_batch: u32) -> PagePlan {
        let per_batch = per_batch.max(1);
        let minp = min_per_batch.max(1).min(per_batch);

        let mut batches = Vec::new();
        let mut p = 1u32;

        while p <= page_count {
            let mut end = (p + per_batch - 1).min(page_count);

            let remaining = page_count.saturating_sub(end);
            if remaining > 0 && remaining < minp {
                end = page_count;
            }

            batches.push(PageRange {
                start_page: p,
                end_page: end,
            });
            p = end + 1;
        }

        PagePlan {
            page_count,
            batches,
        }
    }
}

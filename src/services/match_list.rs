use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{Fixture, MatchSummary};

pub const PAGE_SIZE: usize = 10;
pub const PAGER_BLOCK: usize = 10;
/// Matches that kicked off up to this long ago are still listed.
pub const KICKOFF_GRACE_HOURS: i64 = 2;

/// Calendar dates (UTC) whose fixtures make up the match list: today and tomorrow.
pub fn listing_dates(now: DateTime<Utc>) -> [String; 2] {
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    [today.format("%Y-%m-%d").to_string(), tomorrow.format("%Y-%m-%d").to_string()]
}

/// Upcoming or in-play fixtures that kicked off no earlier than the grace
/// window. Fixtures without a kickoff time are dropped. Provider order is kept.
pub fn playable_matches(fixtures: &[Fixture], now: DateTime<Utc>) -> Vec<MatchSummary> {
    let cutoff = now - Duration::hours(KICKOFF_GRACE_HOURS);
    fixtures
        .iter()
        .filter(|f| f.status().is_listable())
        .filter(|f| f.kickoff().is_some_and(|k| k >= cutoff))
        .map(MatchSummary::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pager {
    pub start: usize,
    pub end: usize,
    pub has_prev: bool,
    pub has_next: bool,
    /// Page to jump to from the "previous block" button.
    pub prev_page: Option<usize>,
    pub next_page: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchPage {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
    pub items: Vec<MatchSummary>,
    pub pager: Pager,
}

/// Paging state of the match list. Pages are 1-based; the pager shows page
/// numbers in blocks of `block_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchListView {
    pub page: usize,
    pub per_page: usize,
    pub block_size: usize,
}

impl Default for MatchListView {
    fn default() -> Self {
        Self { page: 1, per_page: PAGE_SIZE, block_size: PAGER_BLOCK }
    }
}

impl MatchListView {
    pub fn new(page: usize) -> Self {
        Self { page: page.max(1), ..Self::default() }
    }

    pub fn pager(&self, total_pages: usize) -> Pager {
        let block = (self.page - 1) / self.block_size;
        let start = block * self.block_size + 1;
        let end = start.saturating_add(self.block_size - 1).min(total_pages);
        let has_prev = block > 0;
        let has_next = end < total_pages;

        Pager {
            start,
            end,
            has_prev,
            has_next,
            prev_page: has_prev.then(|| start - 1),
            next_page: has_next.then(|| end + 1),
        }
    }

    /// Slice out the current page. A page past the end yields no items.
    pub fn paginate(&self, matches: Vec<MatchSummary>) -> MatchPage {
        let total = matches.len();
        let total_pages = total.div_ceil(self.per_page);
        let items = matches
            .into_iter()
            .skip((self.page - 1).saturating_mul(self.per_page))
            .take(self.per_page)
            .collect();

        MatchPage {
            page: self.page,
            per_page: self.per_page,
            total,
            total_pages,
            items,
            pager: self.pager(total_pages),
        }
    }
}

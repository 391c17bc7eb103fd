//! Page-number pagination helpers.

use std::str::FromStr;

use thiserror::Error;

/// Number of posts shown per list page.
pub const POSTS_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("page `{0}` is not a positive integer or `last`")]
    InvalidSelector(String),
    #[error("page {requested} is out of range (1..={num_pages})")]
    OutOfRange { requested: u32, num_pages: u32 },
}

/// Page selector as accepted in a `page` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    Number(u32),
    Last,
}

impl FromStr for PageSelector {
    type Err = PaginationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed == "last" {
            return Ok(Self::Last);
        }
        match trimmed.parse::<u32>() {
            Ok(number) if number > 0 => Ok(Self::Number(number)),
            _ => Err(PaginationError::InvalidSelector(value.to_string())),
        }
    }
}

/// Window into an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn first(per_page: u32) -> Self {
        Self {
            number: 1,
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number.saturating_sub(1)) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }

    /// Resolve a selector against a known total. An empty result still has one page.
    pub fn resolve(
        selector: Option<PageSelector>,
        total: u64,
        per_page: u32,
    ) -> Result<Self, PaginationError> {
        let per_page = per_page.max(1);
        let num_pages = num_pages(total, per_page);
        let number = match selector {
            None => 1,
            Some(PageSelector::Last) => num_pages,
            Some(PageSelector::Number(requested)) => requested,
        };
        if number == 0 || number > num_pages {
            return Err(PaginationError::OutOfRange {
                requested: number,
                num_pages,
            });
        }
        Ok(Self { number, per_page })
    }
}

fn num_pages(total: u64, per_page: u32) -> u32 {
    let pages = total.div_ceil(u64::from(per_page)).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            items,
            number: request.number,
            per_page: request.per_page,
            total,
        }
    }

    pub fn num_pages(&self) -> u32 {
        num_pages(self.total, self.per_page.max(1))
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages() > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

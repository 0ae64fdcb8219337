//! Shared pagination cursor
//!
//! One offset for the whole engine. Only the first discovered loop's page
//! size moves it; independent cursors per loop are not supported.

use crate::command::Direction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    offset: usize,
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(offset: usize) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 1-based page number for the given page size
    pub fn current_page(&self, page_size: usize) -> usize {
        self.offset / page_size.max(1) + 1
    }

    /// Move one page; `prev` never goes below zero
    ///
    /// Returns whether the offset changed.
    pub fn advance(&mut self, direction: Direction, page_size: usize) -> bool {
        let before = self.offset;
        match direction {
            Direction::Next => self.offset += page_size,
            Direction::Prev => {
                if self.offset >= page_size {
                    self.offset -= page_size;
                }
            }
        }
        before != self.offset
    }
}

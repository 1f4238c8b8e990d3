use std::ops::Range;

/// How `next_page`/`prev_page` behave at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePolicy {
    /// Whole list visible; the cursor wraps modulo the length.
    Wraparound,
    /// Fixed page size; next/prev stop at the first and last page.
    Clamped,
    /// Fixed page size; next on the last page returns to the first.
    Cyclic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    policy: PagePolicy,
    page_size: usize,
    page: usize,
    cursor: usize,
    len: usize,
}

impl Pager {
    pub fn wraparound() -> Self {
        Self::new(PagePolicy::Wraparound, usize::MAX)
    }

    pub fn paged(page_size: usize) -> Self {
        Self::new(PagePolicy::Clamped, page_size)
    }

    pub fn cyclic(page_size: usize) -> Self {
        Self::new(PagePolicy::Cyclic, page_size)
    }

    fn new(policy: PagePolicy, page_size: usize) -> Self {
        Self {
            policy,
            page_size: page_size.max(1),
            page: 0,
            cursor: 0,
            len: 0,
        }
    }

    pub fn policy(&self) -> PagePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn page(&self) -> usize {
        self.page
    }

    /// Number of pages; an empty dataset still has one (empty) page.
    pub fn page_count(&self) -> usize {
        match self.policy {
            PagePolicy::Wraparound => 1,
            PagePolicy::Clamped | PagePolicy::Cyclic => {
                self.len.div_ceil(self.page_size).max(1)
            }
        }
    }

    pub fn visible_range(&self) -> Range<usize> {
        match self.policy {
            PagePolicy::Wraparound => 0..self.len,
            PagePolicy::Clamped | PagePolicy::Cyclic => {
                let start = self.page.saturating_mul(self.page_size).min(self.len);
                let end = start.saturating_add(self.page_size).min(self.len);
                start..end
            }
        }
    }

    pub fn visible_len(&self) -> usize {
        self.visible_range().len()
    }

    /// Cursor position within the visible slice, if anything is visible.
    pub fn cursor(&self) -> Option<usize> {
        (self.visible_len() > 0).then_some(self.cursor)
    }

    /// Cursor position as an index into the full dataset.
    pub fn selected_index(&self) -> Option<usize> {
        self.cursor()
            .map(|cursor| self.visible_range().start + cursor)
    }

    /// Replaces the dataset length, clamping page and cursor downward.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        self.page = self.page.min(self.page_count() - 1);
        self.clamp_cursor();
    }

    /// Replaces the dataset length and returns to the first row of page 0.
    pub fn reset(&mut self, len: usize) {
        self.len = len;
        self.page = 0;
        self.cursor = 0;
    }

    /// Moves within the visible slice, wrapping at both ends.
    pub fn move_cursor(&mut self, delta: isize) -> bool {
        let visible = self.visible_len();
        if visible == 0 {
            self.cursor = 0;
            return false;
        }
        let next = (self.cursor as isize + delta).rem_euclid(visible as isize) as usize;
        let changed = next != self.cursor;
        self.cursor = next;
        changed
    }

    pub fn next_page(&mut self) -> bool {
        let count = self.page_count();
        let next = match self.policy {
            PagePolicy::Wraparound => return false,
            PagePolicy::Clamped if self.page + 1 >= count => return false,
            PagePolicy::Clamped => self.page + 1,
            PagePolicy::Cyclic if count <= 1 => return false,
            PagePolicy::Cyclic => (self.page + 1) % count,
        };
        self.page = next;
        self.cursor = 0;
        true
    }

    pub fn prev_page(&mut self) -> bool {
        let count = self.page_count();
        let prev = match self.policy {
            PagePolicy::Wraparound => return false,
            PagePolicy::Clamped if self.page == 0 => return false,
            PagePolicy::Clamped => self.page - 1,
            PagePolicy::Cyclic if count <= 1 => return false,
            PagePolicy::Cyclic => (self.page + count - 1) % count,
        };
        self.page = prev;
        self.cursor = 0;
        true
    }

    /// Puts the cursor on `index` of the full dataset, switching page if needed.
    pub fn select_index(&mut self, index: usize) {
        if self.len == 0 {
            self.page = 0;
            self.cursor = 0;
            return;
        }
        let index = index.min(self.len - 1);
        match self.policy {
            PagePolicy::Wraparound => self.cursor = index,
            PagePolicy::Clamped | PagePolicy::Cyclic => {
                self.page = index / self.page_size;
                self.cursor = index % self.page_size;
            }
        }
    }

    pub fn page_label(&self) -> String {
        format!("Page {}/{}", self.page + 1, self.page_count())
    }

    fn clamp_cursor(&mut self) {
        let visible = self.visible_len();
        self.cursor = if visible == 0 {
            0
        } else {
            self.cursor.min(visible - 1)
        };
    }
}

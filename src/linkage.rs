use crate::paging::Pager;
use crate::table::{ColumnSpec, Row};
use tokio::time::Instant;

/// Computes a dependent table's rows for one master entity.
pub type Resolver<S> = fn(&S, &str) -> Vec<Row>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionContext {
    pub master_id: String,
    pub selected_at: Instant,
}

pub struct Dependent<S> {
    title: &'static str,
    columns: &'static [ColumnSpec],
    pager: Pager,
    rows: Vec<Row>,
    resolve: Resolver<S>,
}

impl<S> Dependent<S> {
    pub fn new(
        title: &'static str,
        columns: &'static [ColumnSpec],
        pager: Pager,
        resolve: Resolver<S>,
    ) -> Self {
        Self {
            title,
            columns,
            pager,
            rows: Vec::new(),
            resolve,
        }
    }

    pub fn title(&self) -> &'static str {
        self.title
    }

    pub fn columns(&self) -> &'static [ColumnSpec] {
        self.columns
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn visible_rows(&self) -> &[Row] {
        &self.rows[self.pager.visible_range()]
    }

    pub fn next_page(&mut self) -> bool {
        self.pager.next_page()
    }

    pub fn prev_page(&mut self) -> bool {
        self.pager.prev_page()
    }
}

/// The active master row and every table derived from it.
pub struct Linkage<S> {
    selection: Option<SelectionContext>,
    dependents: Vec<Dependent<S>>,
}

impl<S> Default for Linkage<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Linkage<S> {
    pub fn new() -> Self {
        Self {
            selection: None,
            dependents: Vec::new(),
        }
    }

    pub fn register(mut self, dependent: Dependent<S>) -> Self {
        self.dependents.push(dependent);
        self
    }

    pub fn selection(&self) -> Option<&SelectionContext> {
        self.selection.as_ref()
    }

    pub fn master_id(&self) -> Option<&str> {
        self.selection
            .as_ref()
            .map(|selection| selection.master_id.as_str())
    }

    pub fn dependents(&self) -> &[Dependent<S>] {
        &self.dependents
    }

    pub fn dependent_mut(&mut self, index: usize) -> Option<&mut Dependent<S>> {
        self.dependents.get_mut(index)
    }

    /// Recomputes every dependent from `id` and sends each back to page 0.
    pub fn set_master(&mut self, snapshot: &S, id: &str) {
        self.selection = Some(SelectionContext {
            master_id: id.to_string(),
            selected_at: Instant::now(),
        });
        for dependent in &mut self.dependents {
            dependent.rows = (dependent.resolve)(snapshot, id);
            dependent.pager.reset(dependent.rows.len());
        }
    }

    /// Recomputes rows for the current master after a data refresh; pages
    /// are clamped, not reset.
    pub fn refresh(&mut self, snapshot: &S) {
        let Some(selection) = self.selection.as_ref() else {
            return;
        };
        for dependent in &mut self.dependents {
            dependent.rows = (dependent.resolve)(snapshot, &selection.master_id);
            dependent.pager.set_len(dependent.rows.len());
        }
    }

    pub fn clear(&mut self) {
        self.selection = None;
        for dependent in &mut self.dependents {
            dependent.rows.clear();
            dependent.pager.reset(0);
        }
    }

    /// Follows the master table: a new id calls `set_master`, the same id
    /// calls `refresh`, no id clears.
    pub fn sync(&mut self, snapshot: &S, master_id: Option<&str>) {
        match master_id {
            Some(id) if self.master_id() == Some(id) => self.refresh(snapshot),
            Some(id) => self.set_master(snapshot, id),
            None => self.clear(),
        }
    }
}

/// A master table whose cursor stays on the same entity across refreshes.
#[derive(Debug, Clone)]
pub struct MasterList {
    pager: Pager,
    ids: Vec<String>,
}

impl MasterList {
    pub fn new(pager: Pager) -> Self {
        Self {
            pager,
            ids: Vec::new(),
        }
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.pager
            .selected_index()
            .and_then(|index| self.ids.get(index))
            .map(String::as_str)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.pager.selected_index()
    }

    /// Replaces the ordered ids; the cursor follows the previously selected
    /// id, or keeps its index (clamped) when that id is gone.
    pub fn replace_ids(&mut self, ids: Vec<String>) {
        let previous_id = self.selected_id().map(str::to_string);
        let previous_index = self.pager.selected_index();
        self.ids = ids;
        self.pager.set_len(self.ids.len());

        let pinned = previous_id
            .as_deref()
            .and_then(|id| self.ids.iter().position(|candidate| candidate == id));
        match (pinned, previous_index) {
            (Some(index), _) => self.pager.select_index(index),
            (None, Some(index)) => self.pager.select_index(index),
            (None, None) => {}
        }
    }

    /// Starts over at the first row, e.g. after a filter change.
    pub fn reset_ids(&mut self, ids: Vec<String>) {
        self.ids = ids;
        self.pager.reset(self.ids.len());
    }

    pub fn move_cursor(&mut self, delta: isize) -> bool {
        self.pager.move_cursor(delta)
    }

    pub fn next_page(&mut self) -> bool {
        self.pager.next_page()
    }

    pub fn prev_page(&mut self) -> bool {
        self.pager.prev_page()
    }

    pub fn select_id(&mut self, id: &str) -> bool {
        match self.ids.iter().position(|candidate| candidate == id) {
            Some(index) => {
                self.pager.select_index(index);
                true
            }
            None => false,
        }
    }

    /// Row index within the visible page that carries the cursor.
    pub fn highlight(&self) -> Option<usize> {
        self.pager.cursor()
    }
}

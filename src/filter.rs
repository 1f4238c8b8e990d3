use crate::error::DashError;
use std::fmt::{Debug, Display};
use std::marker::PhantomData;

/// A record that can be narrowed by free text and by category.
pub trait Searchable {
    type Category: Copy + Eq + Debug + Display;

    /// The fixed set of fields free text is matched against.
    fn search_fields(&self) -> Vec<&str>;

    fn in_category(&self, category: Self::Category) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState<C> {
    pub text: String,
    pub category: Option<C>,
}

impl<C> Default for FilterState<C> {
    fn default() -> Self {
        Self {
            text: String::new(),
            category: None,
        }
    }
}

impl<C: Copy + Display> FilterState<C> {
    pub fn with_text(&self, text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            category: self.category,
        }
    }

    pub fn with_category(&self, category: Option<C>) -> Self {
        Self {
            text: self.text.clone(),
            category,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.text.is_empty() || self.category.is_some()
    }

    pub fn describe(&self) -> String {
        match (self.text.is_empty(), self.category) {
            (true, None) => "no filter".to_string(),
            (false, None) => format!("\"{}\"", self.text),
            (true, Some(category)) => format!("category {category}"),
            (false, Some(category)) => format!("\"{}\" in category {category}", self.text),
        }
    }
}

pub fn matches<T: Searchable>(record: &T, state: &FilterState<T::Category>) -> bool {
    if let Some(category) = state.category
        && !record.in_category(category)
    {
        return false;
    }
    let needle = state.text.trim().to_lowercase();
    needle.is_empty()
        || record
            .search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
}

/// Indices of the records passing `state`, in dataset order.
pub fn evaluate<T: Searchable>(data: &[T], state: &FilterState<T::Category>) -> Vec<usize> {
    data.iter()
        .enumerate()
        .filter(|(_, record)| matches(*record, state))
        .map(|(index, _)| index)
        .collect()
}

#[derive(Debug)]
struct Memo<C> {
    state: FilterState<C>,
    version: u64,
    indices: Vec<usize>,
}

/// Committed filter plus a memo keyed by `(filter, dataset version)`.
#[derive(Debug)]
pub struct FilterPipeline<T: Searchable> {
    committed: FilterState<T::Category>,
    memo: Option<Memo<T::Category>>,
    recomputations: usize,
    /// Category a rejected cycle step stopped on; the next step continues from it.
    category_probe: Option<Option<T::Category>>,
    _records: PhantomData<fn(&T)>,
}

impl<T: Searchable> Default for FilterPipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Searchable> FilterPipeline<T> {
    pub fn new() -> Self {
        Self {
            committed: FilterState::default(),
            memo: None,
            recomputations: 0,
            category_probe: None,
            _records: PhantomData,
        }
    }

    pub fn committed(&self) -> &FilterState<T::Category> {
        &self.committed
    }

    pub fn recomputations(&self) -> usize {
        self.recomputations
    }

    /// Indices of `data` passing the committed filter.
    pub fn apply(&mut self, data: &[T], version: u64) -> &[usize] {
        let fresh = self
            .memo
            .as_ref()
            .is_some_and(|memo| memo.version == version && memo.state == self.committed);
        if !fresh {
            self.recomputations += 1;
            self.memo = Some(Memo {
                state: self.committed.clone(),
                version,
                indices: evaluate(data, &self.committed),
            });
        }
        self.memo
            .as_ref()
            .map(|memo| memo.indices.as_slice())
            .unwrap_or_default()
    }

    /// Commits `candidate` unless it would leave the view empty.
    ///
    /// Clearing the filter is always accepted. On rejection the committed
    /// state is untouched.
    pub fn try_commit(
        &mut self,
        candidate: FilterState<T::Category>,
        data: &[T],
        version: u64,
    ) -> Result<usize, DashError> {
        if candidate == self.committed {
            self.category_probe = None;
            return Ok(self.apply(data, version).len());
        }

        let indices = evaluate(data, &candidate);
        if indices.is_empty() && candidate.is_active() {
            return Err(DashError::EmptyResultRejection {
                query: candidate.describe(),
            });
        }

        let count = indices.len();
        self.recomputations += 1;
        self.category_probe = None;
        self.committed = candidate.clone();
        self.memo = Some(Memo {
            state: candidate,
            version,
            indices,
        });
        Ok(count)
    }

    /// Commits the category after the current one (see [`next_category`]).
    ///
    /// A rejected step is remembered, so pressing again moves past an empty
    /// category instead of retrying it.
    pub fn cycle_category(
        &mut self,
        all: &[T::Category],
        data: &[T],
        version: u64,
    ) -> Result<usize, DashError> {
        let from = self.category_probe.unwrap_or(self.committed.category);
        let candidate = self.committed.with_category(next_category(from, all));
        let result = self.try_commit(candidate.clone(), data, version);
        if result.is_err() {
            self.category_probe = Some(candidate.category);
        }
        result
    }
}

/// Steps through `None -> all[0] -> .. -> all[n-1] -> None`.
pub fn next_category<C: Copy + Eq>(current: Option<C>, all: &[C]) -> Option<C> {
    match current {
        None => all.first().copied(),
        Some(current) => all
            .iter()
            .position(|candidate| *candidate == current)
            .and_then(|index| all.get(index + 1).copied()),
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterPipeline, FilterState, Searchable, evaluate, next_category};
    use crate::error::DashError;
    use std::fmt::{Display, Formatter};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Level {
        Info,
        Warning,
    }

    impl Display for Level {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    #[derive(Debug, Clone)]
    struct Entry {
        description: &'static str,
        source: &'static str,
        level: Level,
    }

    impl Searchable for Entry {
        type Category = Level;

        fn search_fields(&self) -> Vec<&str> {
            vec![self.description, self.source]
        }

        fn in_category(&self, category: Level) -> bool {
            self.level == category
        }
    }

    fn entries() -> Vec<Entry> {
        vec![
            Entry {
                description: "disk error",
                source: "storage",
                level: Level::Warning,
            },
            Entry {
                description: "ok",
                source: "host-a",
                level: Level::Info,
            },
            Entry {
                description: "network error",
                source: "host-b",
                level: Level::Info,
            },
        ]
    }

    #[test]
    fn free_text_matches_case_insensitively_in_order() {
        let data = entries();
        let state = FilterState::default().with_text("ERR");
        let matched = evaluate(&data, &state);
        assert_eq!(matched, vec![0, 2]);
        let descriptions = matched
            .iter()
            .map(|index| data[*index].description)
            .collect::<Vec<_>>();
        assert_eq!(descriptions, vec!["disk error", "network error"]);
    }

    #[test]
    fn category_and_text_compose_with_and() {
        let data = entries();
        let state = FilterState {
            text: "err".to_string(),
            category: Some(Level::Info),
        };
        assert_eq!(evaluate(&data, &state), vec![2]);
        let state = FilterState {
            text: String::new(),
            category: Some(Level::Info),
        };
        assert_eq!(evaluate(&data, &state), vec![1, 2]);
    }

    #[test]
    fn applying_same_filter_twice_is_identical_and_memoized() {
        let data = entries();
        let mut pipeline = FilterPipeline::new();
        pipeline
            .try_commit(FilterState::default().with_text("host"), &data, 1)
            .unwrap();
        let first = pipeline.apply(&data, 1).to_vec();
        let computed = pipeline.recomputations();
        let second = pipeline.apply(&data, 1).to_vec();
        assert_eq!(first, second);
        assert_eq!(pipeline.recomputations(), computed);

        let third = pipeline.apply(&data, 2).to_vec();
        assert_eq!(third, first);
        assert_eq!(pipeline.recomputations(), computed + 1);
    }

    #[test]
    fn empty_result_is_rejected_and_state_restored() {
        let data = entries();
        let mut pipeline = FilterPipeline::new();
        pipeline
            .try_commit(FilterState::default().with_text("error"), &data, 1)
            .unwrap();
        let before = pipeline.committed().clone();

        let candidate = before.with_text("kernel panic");
        let rejected = pipeline.try_commit(candidate, &data, 1);
        assert!(matches!(
            rejected,
            Err(DashError::EmptyResultRejection { ref query }) if query == "\"kernel panic\""
        ));
        assert_eq!(pipeline.committed(), &before);
        assert_eq!(pipeline.apply(&data, 1), &[0, 2]);

        let candidate = before
            .with_category(Some(Level::Warning))
            .with_text("network");
        assert!(pipeline.try_commit(candidate, &data, 1).is_err());
        assert_eq!(pipeline.committed(), &before);
    }

    #[test]
    fn clearing_filter_is_accepted_even_on_empty_dataset() {
        let mut pipeline = FilterPipeline::<Entry>::new();
        let data = entries();
        pipeline
            .try_commit(FilterState::default().with_text("ok"), &data, 1)
            .unwrap();
        assert_eq!(
            pipeline.try_commit(FilterState::default(), &[], 2).unwrap(),
            0
        );
        assert!(!pipeline.committed().is_active());
    }

    #[test]
    fn cycling_skips_past_a_rejected_category() {
        let data = vec![entries()[1].clone()];
        let mut pipeline = FilterPipeline::new();
        let all = [Level::Warning, Level::Info];

        assert!(pipeline.cycle_category(&all, &data, 1).is_err());
        assert_eq!(pipeline.committed().category, None);

        assert_eq!(pipeline.cycle_category(&all, &data, 1).unwrap(), 1);
        assert_eq!(pipeline.committed().category, Some(Level::Info));

        assert_eq!(pipeline.cycle_category(&all, &data, 1).unwrap(), 1);
        assert_eq!(pipeline.committed().category, None);
    }

    #[test]
    fn category_cycle_ends_with_none() {
        let all = [Level::Info, Level::Warning];
        assert_eq!(next_category(None, &all), Some(Level::Info));
        assert_eq!(next_category(Some(Level::Info), &all), Some(Level::Warning));
        assert_eq!(next_category(Some(Level::Warning), &all), None);
    }
}

use crate::error::{DashError, SourceError};
use crate::filter::Searchable;
use crate::format::{format_timestamp, opt};
use crate::input::Action;
use crate::model::{Event, Severity};
use crate::modal::Modal;
use crate::paging::Pager;
use crate::refresh::{PollOutcome, PollSession};
use crate::screen::{Busy, Composer, Outcome, Screen, TextPurpose};
use crate::screens::{FilteredList, filter_outcome, filtered_title, stale_status};
use crate::session::Session;
use crate::source::{DataSource, ListFilter, list_typed};
use crate::table::{ColumnSpec, render_table};
use crate::worker::{BusyTask, poll_slot};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Upper bound on events kept for one scope.
pub const HISTORY_LIMIT: usize = 1_000;
const POLL_MAX: u32 = 100;
const PAGE_SIZE: usize = 40;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Time", 19),
    ColumnSpec::new("Severity", 8),
    ColumnSpec::new("Code", 6),
    ColumnSpec::new("Description", 72),
];

/// Which slice of the engine's audit log a screen shows; also the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventScope {
    All,
    Vm { name: String },
    Host { name: String },
    Cluster { id: String, name: String },
    DataCenter { id: String, name: String },
    Network { id: String, name: String },
}

impl EventScope {
    pub fn label(&self) -> String {
        match self {
            Self::All => "all".to_string(),
            Self::Vm { name } => format!("VM {name}"),
            Self::Host { name } => format!("host {name}"),
            Self::Cluster { name, .. } => format!("cluster {name}"),
            Self::DataCenter { name, .. } => format!("data center {name}"),
            Self::Network { name, .. } => format!("network {name}"),
        }
    }

    /// Engine-side search; scopes without one are narrowed by [`admits`](Self::admits).
    pub fn search(&self) -> Option<String> {
        match self {
            Self::Vm { name } => Some(format!("vm.name={name}")),
            Self::Host { name } => Some(format!("host.name={name}")),
            _ => None,
        }
    }

    pub fn filter(&self, max: u32) -> ListFilter {
        ListFilter {
            search: self.search(),
            max: Some(max),
            ..ListFilter::default()
        }
    }

    pub fn admits(&self, event: &Event) -> bool {
        match self {
            Self::All | Self::Vm { .. } | Self::Host { .. } => true,
            Self::Cluster { id, .. } => event.cluster_id.as_deref() == Some(id),
            Self::DataCenter { id, .. } => event.data_center_id.as_deref() == Some(id),
            Self::Network { name, .. } => event
                .description
                .to_lowercase()
                .contains(&name.to_lowercase()),
        }
    }
}

impl Searchable for Event {
    type Category = Severity;

    fn search_fields(&self) -> Vec<&str> {
        vec![self.description.as_str(), self.severity.as_str()]
    }

    fn in_category(&self, category: Severity) -> bool {
        self.severity == category
    }
}

/// Newest first with undated events last, ties broken by id.
pub fn sort_newest_first(events: &mut [Event]) {
    events.sort_by(|left, right| {
        right
            .time
            .cmp(&left.time)
            .then_with(|| right.id.cmp(&left.id))
    });
}

/// Folds `fresh` into `current` by id, keeps newest first and caps the result.
///
/// Returns how many events were not seen before.
pub fn merge_events(current: &mut Vec<Event>, fresh: Vec<Event>) -> usize {
    let known = current
        .iter()
        .map(|event| event.id.clone())
        .collect::<HashSet<_>>();
    let mut added = 0usize;
    for event in fresh {
        if known.contains(&event.id) {
            continue;
        }
        added += 1;
        current.push(event);
    }
    if added > 0 {
        sort_newest_first(current);
        current.truncate(HISTORY_LIMIT);
    }
    added
}

pub async fn fetch_history(
    source: &dyn DataSource,
    scope: &EventScope,
    max: usize,
) -> Result<Vec<Event>, SourceError> {
    let filter = scope.filter(u32::try_from(max).unwrap_or(u32::MAX));
    let mut events = list_typed::<Event>(source, Some(&filter))
        .await?
        .into_iter()
        .filter(|event| scope.admits(event))
        .collect::<Vec<_>>();
    sort_newest_first(&mut events);
    events.truncate(max);
    Ok(events)
}

fn event_id(event: &Event) -> &str {
    &event.id
}

pub fn event_cells(event: &Event) -> Vec<String> {
    vec![
        format_timestamp(event.time),
        event.severity.to_string(),
        opt(event.code),
        event.description.clone(),
    ]
}

pub struct EventsScreen {
    session: Session,
    scope: EventScope,
    events: Vec<Event>,
    table: FilteredList<Event>,
    history: Option<BusyTask<Vec<Event>>>,
    poll: PollSession<Vec<Event>>,
    loaded: bool,
    status: Option<String>,
}

impl EventsScreen {
    pub fn new(session: Session, scope: EventScope) -> Self {
        let mut screen = Self {
            poll: session.events_poll("events"),
            session,
            scope,
            events: Vec::new(),
            table: FilteredList::new(Pager::paged(PAGE_SIZE), event_id),
            history: None,
            loaded: false,
            status: None,
        };
        match screen.session.caches().events.get(&screen.scope) {
            Some(cached) => screen.install(cached.as_ref().clone()),
            None => screen.pull_history(),
        }
        screen
    }

    pub fn scope(&self) -> &EventScope {
        &self.scope
    }

    fn pull_history(&mut self) {
        let source = self.session.source();
        let scope = self.scope.clone();
        info!(scope = %scope.label(), "loading event history");
        self.history = Some(BusyTask::spawn(
            format!("Loading events for {}", self.scope.label()),
            async move { fetch_history(source.as_ref(), &scope, HISTORY_LIMIT).await },
        ));
    }

    fn install(&mut self, events: Vec<Event>) {
        self.events = events;
        self.loaded = true;
        self.table.refresh(&self.events);
    }

    fn store(&self) {
        self.session
            .caches()
            .events
            .put(self.scope.clone(), Arc::new(self.events.clone()));
    }
}

#[async_trait]
impl Screen for EventsScreen {
    fn title(&self) -> String {
        format!("Events ({})", self.scope.label())
    }

    fn help(&self) -> &'static str {
        "Up/Down: move | n/p: page | Tab: search | c: severity | r: reload | Enter: details | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        let visible = self.table.visible(&self.events);
        composer.heading(filtered_title(
            &format!("Events for {}", self.scope.label()),
            self.table.pager().len(),
            self.events.len(),
            self.table.committed(),
            self.table.pager(),
        ));
        composer.table(render_table(
            COLUMNS,
            &visible,
            |event| event_cells(event),
            self.table.highlight(),
        ));
        if !self.loaded && self.history.is_none() {
            composer.text("Event history unavailable; press r to retry.");
        }
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Back => Outcome::Back,
            Action::Open => match self.table.selected(&self.events) {
                Some(event) => Outcome::Modal(Modal::notice(
                    format!("Event {}", event.id),
                    format!(
                        "{}  {}  code {}\n\n{}",
                        format_timestamp(event.time),
                        event.severity,
                        opt(event.code),
                        event.description
                    ),
                )),
                None => Outcome::None,
            },
            Action::Command('c') => {
                filter_outcome(self.table.cycle_category(&Severity::ALL, &self.events), "events")
            }
            Action::Command('r') => {
                if self.history.is_none() {
                    self.session.caches().events.invalidate(&self.scope);
                    self.pull_history();
                }
                Outcome::None
            }
            other => {
                self.table.navigate(other);
                Outcome::None
            }
        }
    }

    async fn tick(&mut self, now: Instant) {
        if let Some(result) = poll_slot(&mut self.history) {
            match result {
                Ok(events) => {
                    self.install(events);
                    self.store();
                    self.status = None;
                    // The full pull is as fresh as a poll would be.
                    self.poll.record_success(now, Vec::new());
                }
                Err(source) => {
                    let error = DashError::TransientFetch {
                        class: "event history",
                        source,
                    };
                    warn!("{error}");
                    self.status = Some(error.to_string());
                }
            }
        }

        if !self.loaded || self.history.is_some() {
            return;
        }
        let source = self.session.source();
        let scope = self.scope.clone();
        let outcome = self
            .poll
            .run(now, || async move {
                fetch_history(source.as_ref(), &scope, POLL_MAX as usize).await
            })
            .await;
        if outcome == PollOutcome::Updated
            && let Some(fresh) = self.poll.snapshot().cloned()
            && merge_events(&mut self.events, fresh) > 0
        {
            self.table.refresh(&self.events);
            self.store();
        }
    }

    fn busy(&self, now: Instant) -> Option<Busy> {
        self.history.as_ref().map(|task| Busy {
            label: task.label().to_string(),
            glyph: task.spinner(now),
        })
    }

    fn search_text(&self) -> Option<String> {
        Some(self.table.committed().text.clone())
    }

    fn commit_text(&mut self, purpose: TextPurpose, text: &str) -> Outcome {
        match purpose {
            TextPurpose::Search => filter_outcome(self.table.search(&self.events, text), "events"),
            TextPurpose::NewUser => Outcome::None,
        }
    }

    fn status(&self) -> Option<String> {
        self.status
            .clone()
            .or_else(|| stale_status(&[self.poll.last_error()]))
    }
}

use crate::filter::Searchable;
use crate::format::{format_gib, opt, yes_no};
use crate::input::Action;
use crate::model::{Disk, DiskStatus};
use crate::paging::Pager;
use crate::refresh::{PollOutcome, PollSession};
use crate::screen::{Command, Composer, Outcome, Screen, TextPurpose};
use crate::screens::storage_domains::{StorageInventory, fetch_storage_inventory};
use crate::screens::{FilteredList, filter_outcome, filtered_title, name_index, stale_status};
use crate::session::Session;
use crate::table::{ColumnSpec, render_table};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::time::Instant;

const PAGE_SIZE: usize = 20;

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Disk", 26),
    ColumnSpec::new("Virtual GiB", 11),
    ColumnSpec::new("Actual GiB", 10),
    ColumnSpec::new("Status", 8),
    ColumnSpec::new("Storage Domain", 18),
    ColumnSpec::new("Sparse", 6),
    ColumnSpec::new("Description", 24),
];

impl Searchable for Disk {
    type Category = DiskStatus;

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.alias.as_str(), self.status.as_str()];
        fields.extend(self.description.as_deref());
        fields
    }

    fn in_category(&self, category: DiskStatus) -> bool {
        self.status == category
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Alias,
    Size,
    Status,
    Domain,
}

impl SortKey {
    pub fn next(self) -> Self {
        match self {
            Self::Alias => Self::Size,
            Self::Size => Self::Status,
            Self::Status => Self::Domain,
            Self::Domain => Self::Alias,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Alias => "alias",
            Self::Size => "size",
            Self::Status => "status",
            Self::Domain => "domain",
        }
    }
}

/// Sorts in place; size is largest first, ties fall back to the alias.
pub fn sort_disks(disks: &mut [Disk], key: SortKey, domains: &HashMap<String, String>) {
    let domain_of = |disk: &Disk| {
        disk.storage_domain_ids
            .first()
            .and_then(|id| domains.get(id))
            .cloned()
            .unwrap_or_default()
    };
    match key {
        SortKey::Alias => disks.sort_by(|left, right| left.alias.cmp(&right.alias)),
        SortKey::Size => disks.sort_by_key(|disk| {
            (Reverse(disk.provisioned_size.unwrap_or(0)), disk.alias.clone())
        }),
        SortKey::Status => {
            disks.sort_by_key(|disk| (disk.status.as_str(), disk.alias.clone()))
        }
        SortKey::Domain => disks.sort_by_key(|disk| (domain_of(disk), disk.alias.clone())),
    }
}

fn disk_id(disk: &Disk) -> &str {
    &disk.id
}

pub struct DisksScreen {
    session: Session,
    poll: PollSession<StorageInventory>,
    disks: Vec<Disk>,
    domains: HashMap<String, String>,
    sort: SortKey,
    table: FilteredList<Disk>,
}

impl DisksScreen {
    pub fn new(session: Session) -> Self {
        Self {
            poll: session.inventory_poll("disks"),
            session,
            disks: Vec::new(),
            domains: HashMap::new(),
            sort: SortKey::Alias,
            table: FilteredList::new(Pager::cyclic(PAGE_SIZE), disk_id),
        }
    }

    fn install(&mut self) {
        let Some(inventory) = self.poll.snapshot() else {
            return;
        };
        self.domains = name_index(&inventory.domains, |domain| {
            (domain.id.as_str(), domain.name.as_str())
        });
        self.disks = inventory.disks.clone();
        sort_disks(&mut self.disks, self.sort, &self.domains);
        self.table.refresh(&self.disks);
    }

    fn cycle_sort(&mut self) -> Outcome {
        self.sort = self.sort.next();
        sort_disks(&mut self.disks, self.sort, &self.domains);
        self.table.refresh(&self.disks);
        Outcome::Status(format!("Sorted by {}", self.sort.label()))
    }
}

#[async_trait]
impl Screen for DisksScreen {
    fn title(&self) -> String {
        "Storage Disks".to_string()
    }

    fn help(&self) -> &'static str {
        "n/p: page | s: sort | c: status | Tab: search | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        if self.poll.snapshot().is_none() {
            composer.heading("- Disks");
            composer.text("Loading disks...");
            return;
        }
        composer.heading(format!(
            "{}  sort: {}",
            filtered_title(
                "- Disks",
                self.table.pager().len(),
                self.disks.len(),
                self.table.committed(),
                self.table.pager(),
            ),
            self.sort.label()
        ));
        let visible = self.table.visible(&self.disks);
        composer.table(render_table(
            COLUMNS,
            &visible,
            |disk| {
                let domains = disk
                    .storage_domain_ids
                    .iter()
                    .filter_map(|id| self.domains.get(id).map(String::as_str))
                    .collect::<Vec<_>>();
                vec![
                    disk.alias.clone(),
                    format_gib(disk.provisioned_size),
                    format_gib(disk.actual_size),
                    disk.status.to_string(),
                    opt((!domains.is_empty()).then(|| domains.join(", "))),
                    yes_no(disk.sparse),
                    opt(disk.description.as_deref()),
                ]
            },
            self.table.highlight(),
        ));
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Back => Outcome::Back,
            Action::Command('s') => self.cycle_sort(),
            Action::Command('c') => {
                filter_outcome(self.table.cycle_category(&DiskStatus::ALL, &self.disks), "disks")
            }
            other => {
                self.table.navigate(other);
                Outcome::None
            }
        }
    }

    async fn tick(&mut self, now: Instant) {
        let handle = self.session.source();
        let source = handle.as_ref();
        let outcome = self
            .poll
            .run(now, || async move { fetch_storage_inventory(source).await })
            .await;
        if outcome == PollOutcome::Updated {
            self.install();
        }
    }

    fn search_text(&self) -> Option<String> {
        Some(self.table.committed().text.clone())
    }

    fn commit_text(&mut self, purpose: TextPurpose, text: &str) -> Outcome {
        match purpose {
            TextPurpose::Search => filter_outcome(self.table.search(&self.disks, text), "disks"),
            TextPurpose::NewUser => Outcome::None,
        }
    }

    fn after_command(&mut self, _command: &Command, _failed: &[String]) {
        self.poll.force_due();
    }

    fn status(&self) -> Option<String> {
        stale_status(&[self.poll.last_error()])
    }
}

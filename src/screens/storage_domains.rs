use crate::error::SourceError;
use crate::format::{format_gib, opt, yes_no};
use crate::input::Action;
use crate::linkage::{Dependent, Linkage};
use crate::model::{Disk, StorageDomain};
use crate::paging::Pager;
use crate::refresh::{PollOutcome, PollSession};
use crate::screen::{Composer, Outcome, Screen};
use crate::screens::data_centers::domain_cells;
use crate::screens::{MasterDetail, stale_status};
use crate::session::Session;
use crate::source::{DataSource, list_typed};
use crate::table::{ColumnSpec, Row, render_table};
use async_trait::async_trait;
use tokio::time::Instant;

const DOMAIN_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Storage Domain", 20),
    ColumnSpec::new("Type", 8),
    ColumnSpec::new("Status", 10),
    ColumnSpec::new("Free GiB", 9),
    ColumnSpec::new("Used GiB", 9),
    ColumnSpec::new("Total GiB", 9),
    ColumnSpec::new("Committed GiB", 13),
];

const DISK_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Disk", 24),
    ColumnSpec::new("Virtual GiB", 11),
    ColumnSpec::new("Actual GiB", 10),
    ColumnSpec::new("Status", 8),
    ColumnSpec::new("Sparse", 6),
    ColumnSpec::new("Content", 10),
];

const DISK_PAGE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageInventory {
    pub domains: Vec<StorageDomain>,
    pub disks: Vec<Disk>,
}

pub async fn fetch_storage_inventory(
    source: &dyn DataSource,
) -> Result<StorageInventory, SourceError> {
    let (mut domains, mut disks) = futures::try_join!(
        list_typed::<StorageDomain>(source, None),
        list_typed::<Disk>(source, None),
    )?;
    domains.sort_by(|left, right| left.name.cmp(&right.name));
    disks.sort_by(|left, right| left.alias.cmp(&right.alias));
    Ok(StorageInventory { domains, disks })
}

pub fn disk_cells(disk: &Disk) -> Row {
    vec![
        disk.alias.clone(),
        format_gib(disk.provisioned_size),
        format_gib(disk.actual_size),
        disk.status.to_string(),
        yes_no(disk.sparse),
        opt(disk.content_type.as_deref()),
    ]
}

fn disk_rows(inventory: &StorageInventory, domain_id: &str) -> Vec<Row> {
    inventory
        .disks
        .iter()
        .filter(|disk| disk.storage_domain_ids.iter().any(|id| id == domain_id))
        .map(disk_cells)
        .collect()
}

pub struct StorageDomainsScreen {
    session: Session,
    poll: PollSession<StorageInventory>,
    view: MasterDetail<StorageInventory>,
}

impl StorageDomainsScreen {
    pub fn new(session: Session) -> Self {
        let linkage = Linkage::new().register(Dependent::new(
            "Disks",
            DISK_COLUMNS,
            Pager::paged(DISK_PAGE),
            disk_rows,
        ));
        Self {
            poll: session.inventory_poll("storage domains"),
            session,
            view: MasterDetail::new(linkage),
        }
    }
}

#[async_trait]
impl Screen for StorageDomainsScreen {
    fn title(&self) -> String {
        "Storage Domains".to_string()
    }

    fn help(&self) -> &'static str {
        "Up/Down: domain | n/p: disk page | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        let Some(inventory) = self.poll.snapshot() else {
            composer.heading("- Storage Domains");
            composer.text("Loading storage domains...");
            return;
        };
        composer.heading(format!("- Storage Domains ({})", inventory.domains.len()));
        composer.table(render_table(
            DOMAIN_COLUMNS,
            &inventory.domains,
            |domain| {
                let mut cells = domain_cells(domain);
                cells.push(format_gib(domain.committed));
                cells
            },
            self.view.master().highlight(),
        ));
        self.view.compose_dependents(composer);
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Back => Outcome::Back,
            other => {
                self.view.navigate(self.poll.snapshot(), other);
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
        if outcome == PollOutcome::Updated
            && let Some(inventory) = self.poll.snapshot()
        {
            let ids = inventory
                .domains
                .iter()
                .map(|domain| domain.id.clone())
                .collect();
            self.view.update(inventory, ids);
        }
    }

    fn status(&self) -> Option<String> {
        stale_status(&[self.poll.last_error()])
    }
}

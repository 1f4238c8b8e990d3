use crate::error::SourceError;
use crate::format::{format_gib, opt};
use crate::input::Action;
use crate::linkage::{Dependent, Linkage};
use crate::model::{Cluster, DataCenter, Network, ResourceKind, StorageDomain};
use crate::paging::Pager;
use crate::refresh::{PollOutcome, PollSession};
use crate::screen::{Command, Composer, Outcome, Screen};
use crate::screens::events::{EventScope, EventsScreen};
use crate::screens::{MasterDetail, stale_status};
use crate::session::Session;
use crate::source::{DataSource, ListFilter, list_typed};
use crate::table::{ColumnSpec, Row, render_table};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use tokio::time::Instant;

const DC_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Data Center", 20),
    ColumnSpec::new("Status", 12),
    ColumnSpec::new("Version", 8),
    ColumnSpec::new("Clusters", 8),
    ColumnSpec::new("Description", 24),
    ColumnSpec::new("Comment", 16),
];

const DOMAIN_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Storage Domain", 20),
    ColumnSpec::new("Type", 8),
    ColumnSpec::new("Status", 10),
    ColumnSpec::new("Free GiB", 9),
    ColumnSpec::new("Used GiB", 9),
    ColumnSpec::new("Total GiB", 9),
];

const NETWORK_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Network", 18),
    ColumnSpec::new("VLAN", 5),
    ColumnSpec::new("MTU", 5),
    ColumnSpec::new("Description", 28),
];

const CLUSTER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Cluster", 18),
    ColumnSpec::new("CPU Type", 24),
    ColumnSpec::new("Version", 8),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataCenterInventory {
    pub data_centers: Vec<DataCenter>,
    /// Storage domains attached to each data center, by data center id.
    pub domains: HashMap<String, Vec<StorageDomain>>,
    pub networks: Vec<Network>,
    pub clusters: Vec<Cluster>,
}

impl DataCenterInventory {
    fn clusters_in<'a>(&'a self, dc_id: &'a str) -> impl Iterator<Item = &'a Cluster> {
        self.clusters
            .iter()
            .filter(move |cluster| cluster.data_center_id.as_deref() == Some(dc_id))
    }
}

pub async fn fetch_data_center_inventory(
    source: &dyn DataSource,
) -> Result<DataCenterInventory, SourceError> {
    let (mut data_centers, networks, clusters) = futures::try_join!(
        list_typed::<DataCenter>(source, None),
        list_typed::<Network>(source, None),
        list_typed::<Cluster>(source, None),
    )?;
    data_centers.sort_by(|left, right| left.name.cmp(&right.name));

    let filters = data_centers
        .iter()
        .map(|dc| ListFilter::under(ResourceKind::DataCenter, dc.id.clone()))
        .collect::<Vec<_>>();
    let attached = join_all(
        filters
            .iter()
            .map(|filter| list_typed::<StorageDomain>(source, Some(filter))),
    )
    .await;
    let domains = data_centers
        .iter()
        .zip(attached)
        .map(|(dc, domains)| (dc.id.clone(), domains.unwrap_or_default()))
        .collect();

    Ok(DataCenterInventory {
        data_centers,
        domains,
        networks,
        clusters,
    })
}

pub fn domain_cells(domain: &StorageDomain) -> Row {
    vec![
        domain.name.clone(),
        opt(domain.domain_type.as_deref()),
        opt(domain.status.as_deref()),
        format_gib(domain.available),
        format_gib(domain.used),
        format_gib(domain.total()),
    ]
}

fn domain_rows(inventory: &DataCenterInventory, dc_id: &str) -> Vec<Row> {
    inventory
        .domains
        .get(dc_id)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(domain_cells)
        .collect()
}

fn network_rows(inventory: &DataCenterInventory, dc_id: &str) -> Vec<Row> {
    inventory
        .networks
        .iter()
        .filter(|network| network.data_center_id.as_deref() == Some(dc_id))
        .map(|network| {
            vec![
                network.name.clone(),
                opt(network.vlan),
                opt(network.mtu),
                opt(network.description.as_deref()),
            ]
        })
        .collect()
}

fn cluster_rows(inventory: &DataCenterInventory, dc_id: &str) -> Vec<Row> {
    inventory
        .clusters_in(dc_id)
        .map(|cluster| {
            vec![
                cluster.name.clone(),
                opt(cluster.cpu_type.as_deref()),
                opt(cluster.version.as_deref()),
            ]
        })
        .collect()
}

pub struct DataCentersScreen {
    session: Session,
    poll: PollSession<DataCenterInventory>,
    view: MasterDetail<DataCenterInventory>,
}

impl DataCentersScreen {
    pub fn new(session: Session) -> Self {
        let linkage = Linkage::new()
            .register(Dependent::new(
                "Storage domains",
                DOMAIN_COLUMNS,
                Pager::wraparound(),
                domain_rows,
            ))
            .register(Dependent::new(
                "Logical networks",
                NETWORK_COLUMNS,
                Pager::wraparound(),
                network_rows,
            ))
            .register(Dependent::new(
                "Clusters",
                CLUSTER_COLUMNS,
                Pager::wraparound(),
                cluster_rows,
            ));
        Self {
            poll: session.inventory_poll("data centers"),
            session,
            view: MasterDetail::new(linkage),
        }
    }

    fn selected(&self) -> Option<&DataCenter> {
        let id = self.view.selected_id()?;
        self.poll
            .snapshot()?
            .data_centers
            .iter()
            .find(|dc| dc.id == id)
    }
}

#[async_trait]
impl Screen for DataCentersScreen {
    fn title(&self) -> String {
        "Data Centers".to_string()
    }

    fn help(&self) -> &'static str {
        "Up/Down: data center | Enter: events | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        let Some(inventory) = self.poll.snapshot() else {
            composer.heading("- Data Centers");
            composer.text("Loading data centers...");
            return;
        };
        composer.heading(format!("- Data Centers ({})", inventory.data_centers.len()));
        composer.table(render_table(
            DC_COLUMNS,
            &inventory.data_centers,
            |dc| {
                vec![
                    dc.name.clone(),
                    opt(dc.status.as_deref()),
                    opt(dc.version.as_deref()),
                    inventory.clusters_in(&dc.id).count().to_string(),
                    opt(dc.description.as_deref()),
                    opt(dc.comment.as_deref()),
                ]
            },
            self.view.master().highlight(),
        ));
        self.view.compose_dependents(composer);
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Back => Outcome::Back,
            Action::Open => match self.selected() {
                Some(dc) => Outcome::Open(Box::new(EventsScreen::new(
                    self.session.clone(),
                    EventScope::DataCenter {
                        id: dc.id.clone(),
                        name: dc.name.clone(),
                    },
                ))),
                None => Outcome::None,
            },
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
            .run(now, || async move { fetch_data_center_inventory(source).await })
            .await;
        if outcome == PollOutcome::Updated
            && let Some(inventory) = self.poll.snapshot()
        {
            let ids = inventory
                .data_centers
                .iter()
                .map(|dc| dc.id.clone())
                .collect();
            self.view.update(inventory, ids);
        }
    }

    fn after_command(&mut self, _command: &Command, _failed: &[String]) {
        self.poll.force_due();
    }

    fn status(&self) -> Option<String> {
        stale_status(&[self.poll.last_error()])
    }
}

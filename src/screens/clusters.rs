use crate::error::SourceError;
use crate::format::{opt, yes_no};
use crate::input::Action;
use crate::linkage::{Dependent, Linkage};
use crate::model::{Cluster, DataCenter, Host, Network, ResourceKind, Vm};
use crate::paging::Pager;
use crate::refresh::{PollOutcome, PollSession};
use crate::screen::{Command, Composer, Outcome, Screen};
use crate::screens::events::{EventScope, EventsScreen};
use crate::screens::{MasterDetail, lookup, name_index, stale_status};
use crate::session::Session;
use crate::source::{DataSource, ListFilter, list_typed};
use crate::table::{ColumnSpec, Row, render_table};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use tokio::time::Instant;

const CLUSTER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Cluster", 18),
    ColumnSpec::new("Data Center", 16),
    ColumnSpec::new("CPU Type", 24),
    ColumnSpec::new("Version", 8),
    ColumnSpec::new("Hosts", 6),
    ColumnSpec::new("VMs", 5),
    ColumnSpec::new("Description", 24),
];

const NETWORK_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Network", 18),
    ColumnSpec::new("Status", 12),
    ColumnSpec::new("Required", 8),
    ColumnSpec::new("VLAN", 5),
    ColumnSpec::new("Usages", 16),
    ColumnSpec::new("Description", 24),
];

const HOST_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Host", 22),
    ColumnSpec::new("Status", 14),
    ColumnSpec::new("Address", 22),
];

const VM_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("VM", 22),
    ColumnSpec::new("Status", 12),
    ColumnSpec::new("Host", 18),
    ColumnSpec::new("IP", 16),
];

const VM_PAGE: usize = 7;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterInventory {
    pub clusters: Vec<Cluster>,
    pub data_centers: Vec<DataCenter>,
    pub hosts: Vec<Host>,
    pub vms: Vec<Vm>,
    /// Networks attached to each cluster, by cluster id.
    pub networks: HashMap<String, Vec<Network>>,
}

pub async fn fetch_cluster_inventory(
    source: &dyn DataSource,
) -> Result<ClusterInventory, SourceError> {
    let vm_filter = ListFilter::default().with_follow("nics.reporteddevices");
    let (mut clusters, data_centers, hosts, vms) = futures::try_join!(
        list_typed::<Cluster>(source, None),
        list_typed::<DataCenter>(source, None),
        list_typed::<Host>(source, None),
        list_typed::<Vm>(source, Some(&vm_filter)),
    )?;
    clusters.sort_by(|left, right| left.name.cmp(&right.name));

    let filters = clusters
        .iter()
        .map(|cluster| ListFilter::under(ResourceKind::Cluster, cluster.id.clone()))
        .collect::<Vec<_>>();
    let attached = join_all(
        filters
            .iter()
            .map(|filter| list_typed::<Network>(source, Some(filter))),
    )
    .await;
    let networks = clusters
        .iter()
        .zip(attached)
        .map(|(cluster, networks)| (cluster.id.clone(), networks.unwrap_or_default()))
        .collect();

    Ok(ClusterInventory {
        clusters,
        data_centers,
        hosts,
        vms,
        networks,
    })
}

fn network_rows(inventory: &ClusterInventory, cluster_id: &str) -> Vec<Row> {
    inventory
        .networks
        .get(cluster_id)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|network| {
            vec![
                network.name.clone(),
                opt(network.status.as_deref()),
                yes_no(network.required),
                opt(network.vlan),
                network.usages.join(", "),
                opt(network.description.as_deref()),
            ]
        })
        .collect()
}

fn host_rows(inventory: &ClusterInventory, cluster_id: &str) -> Vec<Row> {
    inventory
        .hosts
        .iter()
        .filter(|host| host.cluster_id.as_deref() == Some(cluster_id))
        .map(|host| {
            vec![
                host.name.clone(),
                host.status.as_str().to_string(),
                opt(host.address.as_deref()),
            ]
        })
        .collect()
}

fn vm_rows(inventory: &ClusterInventory, cluster_id: &str) -> Vec<Row> {
    let hosts = name_index(&inventory.hosts, |host| {
        (host.id.as_str(), host.name.as_str())
    });
    inventory
        .vms
        .iter()
        .filter(|vm| vm.cluster_id.as_deref() == Some(cluster_id))
        .map(|vm| {
            vec![
                vm.name.clone(),
                vm.status.as_str().to_string(),
                lookup(&hosts, vm.host_id.as_deref()),
                opt(vm.ipv4().first()),
            ]
        })
        .collect()
}

pub struct ClustersScreen {
    session: Session,
    poll: PollSession<ClusterInventory>,
    view: MasterDetail<ClusterInventory>,
}

impl ClustersScreen {
    pub fn new(session: Session) -> Self {
        let linkage = Linkage::new()
            .register(Dependent::new(
                "Logical networks",
                NETWORK_COLUMNS,
                Pager::wraparound(),
                network_rows,
            ))
            .register(Dependent::new(
                "Hosts",
                HOST_COLUMNS,
                Pager::wraparound(),
                host_rows,
            ))
            .register(Dependent::new(
                "Virtual machines",
                VM_COLUMNS,
                Pager::paged(VM_PAGE),
                vm_rows,
            ));
        Self {
            poll: session.inventory_poll("clusters"),
            session,
            view: MasterDetail::new(linkage),
        }
    }

    fn selected(&self) -> Option<&Cluster> {
        let id = self.view.selected_id()?;
        self.poll
            .snapshot()?
            .clusters
            .iter()
            .find(|cluster| cluster.id == id)
    }
}

#[async_trait]
impl Screen for ClustersScreen {
    fn title(&self) -> String {
        "Clusters".to_string()
    }

    fn help(&self) -> &'static str {
        "Up/Down: cluster | n/p: page | Enter: events | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        let Some(inventory) = self.poll.snapshot() else {
            composer.heading("- Clusters");
            composer.text("Loading clusters...");
            return;
        };
        let data_centers = name_index(&inventory.data_centers, |dc| {
            (dc.id.as_str(), dc.name.as_str())
        });
        composer.heading(format!("- Clusters ({})", inventory.clusters.len()));
        composer.table(render_table(
            CLUSTER_COLUMNS,
            &inventory.clusters,
            |cluster| {
                let id = Some(cluster.id.as_str());
                vec![
                    cluster.name.clone(),
                    lookup(&data_centers, cluster.data_center_id.as_deref()),
                    opt(cluster.cpu_type.as_deref()),
                    opt(cluster.version.as_deref()),
                    inventory
                        .hosts
                        .iter()
                        .filter(|host| host.cluster_id.as_deref() == id)
                        .count()
                        .to_string(),
                    inventory
                        .vms
                        .iter()
                        .filter(|vm| vm.cluster_id.as_deref() == id)
                        .count()
                        .to_string(),
                    opt(cluster.description.as_deref()),
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
                Some(cluster) => Outcome::Open(Box::new(EventsScreen::new(
                    self.session.clone(),
                    EventScope::Cluster {
                        id: cluster.id.clone(),
                        name: cluster.name.clone(),
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
            .run(now, || async move { fetch_cluster_inventory(source).await })
            .await;
        if outcome == PollOutcome::Updated
            && let Some(inventory) = self.poll.snapshot()
        {
            let ids = inventory
                .clusters
                .iter()
                .map(|cluster| cluster.id.clone())
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

#[cfg(test)]
mod tests {
    use super::ClustersScreen;
    use crate::input::Action;
    use crate::model::{Cluster, Network, Record, ResourceKind, VmStatus};
    use crate::screen::{Outcome, Screen};
    use crate::screens::tests::host;
    use crate::screens::vm_detail::tests::vm;
    use crate::session::test_session;
    use crate::source::fake::FakeSource;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn cluster(id: &str, name: &str) -> Cluster {
        Cluster {
            id: id.to_string(),
            name: name.to_string(),
            data_center_id: Some("dc1".to_string()),
            cpu_type: Some("Intel Skylake".to_string()),
            version: Some("4.7".to_string()),
            description: None,
        }
    }

    #[tokio::test]
    async fn dependents_and_events_follow_the_cluster() {
        let mut records = (0..9)
            .map(|index| vm(&format!("vm-{index}"), &format!("web-{index}"), VmStatus::Up))
            .map(Record::Vm)
            .collect::<Vec<_>>();
        records.push(Record::Cluster(cluster("c1", "prod")));
        records.push(Record::Cluster(cluster("c2", "dev")));
        records.push(Record::Host(host("h1", "host-a", "c1")));
        let source = FakeSource::new().with(records);
        source.set_children(
            ResourceKind::Cluster,
            "c1",
            ResourceKind::Network,
            vec![Record::Network(Network {
                id: "n1".to_string(),
                name: "ovirtmgmt".to_string(),
                data_center_id: Some("dc1".to_string()),
                description: None,
                usages: vec!["vm".to_string(), "management".to_string()],
                vlan: None,
                mtu: None,
                port_isolation: None,
                status: Some("operational".to_string()),
                required: Some(true),
            })],
        );

        let mut screen = ClustersScreen::new(test_session(Arc::new(source)));
        screen.tick(Instant::now()).await;
        assert_eq!(screen.selected().map(|c| c.name.as_str()), Some("dev"));
        assert!(screen.view.linkage().dependents()[2].rows().is_empty());

        screen.handle(&Action::Down);
        let dependents = screen.view.linkage().dependents();
        assert_eq!(dependents[0].rows()[0][4], "vm, management");
        assert_eq!(dependents[1].rows().len(), 1);
        assert_eq!(dependents[2].rows().len(), 9);
        assert_eq!(dependents[2].visible_rows().len(), 7);
        assert_eq!(dependents[2].rows()[0][2], "host-a");

        let Outcome::Open(events) = screen.handle(&Action::Open) else {
            panic!("Enter opens cluster events");
        };
        assert_eq!(events.title(), "Events (cluster prod)");
    }
}

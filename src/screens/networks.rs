use crate::error::{DashError, SourceError};
use crate::format::{opt, yes_no};
use crate::input::Action;
use crate::linkage::{Dependent, Linkage};
use crate::model::{DataCenter, Network, Vm, VnicProfile};
use crate::paging::Pager;
use crate::screen::{Busy, Command, Composer, Outcome, Screen};
use crate::screens::events::{EventScope, EventsScreen};
use crate::screens::{MasterDetail, lookup, name_index};
use crate::session::Session;
use crate::source::{DataSource, ListFilter, list_typed};
use crate::table::{ColumnSpec, Row, render_table};
use crate::worker::{BusyTask, poll_slot};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

const NETWORK_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Network", 18),
    ColumnSpec::new("Data Center", 14),
    ColumnSpec::new("VLAN", 5),
    ColumnSpec::new("MTU", 5),
    ColumnSpec::new("Port Isolation", 14),
    ColumnSpec::new("Usages", 14),
    ColumnSpec::new("Description", 24),
];

const PROFILE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("vNIC Profile", 18),
    ColumnSpec::new("Port Mirroring", 14),
    ColumnSpec::new("Pass-Through", 12),
    ColumnSpec::new("Description", 24),
];

const VM_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("VM", 20),
    ColumnSpec::new("Status", 12),
    ColumnSpec::new("NIC", 8),
    ColumnSpec::new("vNIC Profile", 16),
    ColumnSpec::new("IPv4", 24),
];

const VM_PAGE: usize = 5;

/// One VM NIC plugged into a vNIC profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUse {
    pub vm_name: String,
    pub vm_status: String,
    pub nic_name: String,
    pub profile_id: String,
    pub ipv4: Vec<String>,
}

/// Logical networks with their profiles and the VMs using them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkInventory {
    pub networks: Vec<Network>,
    pub profiles: Vec<VnicProfile>,
    pub data_centers: Vec<DataCenter>,
    pub uses: Vec<ProfileUse>,
}

impl NetworkInventory {
    fn profiles_of<'a>(&'a self, network_id: &'a str) -> impl Iterator<Item = &'a VnicProfile> {
        self.profiles
            .iter()
            .filter(move |profile| profile.network_id.as_deref() == Some(network_id))
    }
}

pub async fn fetch_network_inventory(
    source: &dyn DataSource,
) -> Result<NetworkInventory, SourceError> {
    let vm_filter = ListFilter::default().with_follow("nics.reporteddevices");
    let (mut networks, profiles, data_centers, vms) = futures::try_join!(
        list_typed::<Network>(source, None),
        list_typed::<VnicProfile>(source, None),
        list_typed::<DataCenter>(source, None),
        list_typed::<Vm>(source, Some(&vm_filter)),
    )?;
    networks.sort_by(|left, right| left.name.cmp(&right.name));

    let uses = vms
        .iter()
        .flat_map(|vm| {
            vm.nics.iter().filter_map(move |nic| {
                Some(ProfileUse {
                    vm_name: vm.name.clone(),
                    vm_status: vm.status.as_str().to_string(),
                    nic_name: nic.name.clone(),
                    profile_id: nic.vnic_profile_id.clone()?,
                    ipv4: nic.ipv4.clone(),
                })
            })
        })
        .collect();

    Ok(NetworkInventory {
        networks,
        profiles,
        data_centers,
        uses,
    })
}

fn profile_rows(inventory: &NetworkInventory, network_id: &str) -> Vec<Row> {
    inventory
        .profiles_of(network_id)
        .map(|profile| {
            vec![
                profile.name.clone(),
                yes_no(profile.port_mirroring),
                opt(profile.pass_through.as_deref()),
                opt(profile.description.as_deref()),
            ]
        })
        .collect()
}

fn vm_rows(inventory: &NetworkInventory, network_id: &str) -> Vec<Row> {
    let mut rows = Vec::new();
    for profile in inventory.profiles_of(network_id) {
        for used in inventory
            .uses
            .iter()
            .filter(|used| used.profile_id == profile.id)
        {
            rows.push(vec![
                used.vm_name.clone(),
                used.vm_status.clone(),
                used.nic_name.clone(),
                profile.name.clone(),
                used.ipv4.join(", "),
            ]);
        }
    }
    rows.sort_by(|left, right| left[0].cmp(&right[0]));
    rows
}

pub struct NetworksScreen {
    session: Session,
    inventory: Option<Arc<NetworkInventory>>,
    task: Option<BusyTask<NetworkInventory>>,
    view: MasterDetail<NetworkInventory>,
    status: Option<String>,
}

impl NetworksScreen {
    pub fn new(session: Session) -> Self {
        let linkage = Linkage::new()
            .register(Dependent::new(
                "vNIC profiles",
                PROFILE_COLUMNS,
                Pager::wraparound(),
                profile_rows,
            ))
            .register(Dependent::new(
                "VMs attached",
                VM_COLUMNS,
                Pager::paged(VM_PAGE),
                vm_rows,
            ));
        let mut screen = Self {
            session,
            inventory: None,
            task: None,
            view: MasterDetail::new(linkage),
            status: None,
        };
        match screen.session.caches().networks.get(&()) {
            Some(cached) => screen.install(cached),
            None => screen.load(),
        }
        screen
    }

    fn load(&mut self) {
        let source = self.session.source();
        self.task = Some(BusyTask::spawn("Loading network inventory", async move {
            fetch_network_inventory(source.as_ref()).await
        }));
    }

    fn install(&mut self, inventory: Arc<NetworkInventory>) {
        let ids = inventory
            .networks
            .iter()
            .map(|network| network.id.clone())
            .collect();
        self.view.update(&inventory, ids);
        self.inventory = Some(inventory);
    }

    fn selected(&self) -> Option<&Network> {
        let id = self.view.selected_id()?;
        self.inventory
            .as_ref()?
            .networks
            .iter()
            .find(|network| network.id == id)
    }
}

#[async_trait]
impl Screen for NetworksScreen {
    fn title(&self) -> String {
        "Networks".to_string()
    }

    fn help(&self) -> &'static str {
        "Up/Down: network | n/p: page | Enter: events | r: reload | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        let Some(inventory) = self.inventory.as_ref() else {
            composer.heading("Logical networks");
            if self.task.is_none() {
                composer.text("Network inventory unavailable; press r to retry.");
            }
            return;
        };
        let data_centers = name_index(&inventory.data_centers, |dc| {
            (dc.id.as_str(), dc.name.as_str())
        });
        composer.heading(format!("Logical networks ({})", inventory.networks.len()));
        composer.table(render_table(
            NETWORK_COLUMNS,
            &inventory.networks,
            |network| {
                vec![
                    network.name.clone(),
                    lookup(&data_centers, network.data_center_id.as_deref()),
                    opt(network.vlan),
                    opt(network.mtu),
                    yes_no(network.port_isolation),
                    network.usages.join(", "),
                    opt(network.description.as_deref()),
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
                Some(network) => Outcome::Open(Box::new(EventsScreen::new(
                    self.session.clone(),
                    EventScope::Network {
                        id: network.id.clone(),
                        name: network.name.clone(),
                    },
                ))),
                None => Outcome::None,
            },
            Action::Command('r') if self.task.is_none() => {
                self.session.caches().networks.invalidate(&());
                self.load();
                Outcome::None
            }
            other => {
                self.view.navigate(self.inventory.as_deref(), other);
                Outcome::None
            }
        }
    }

    async fn tick(&mut self, _now: Instant) {
        match poll_slot(&mut self.task) {
            Some(Ok(inventory)) => {
                let inventory = Arc::new(inventory);
                self.session
                    .caches()
                    .networks
                    .put((), Arc::clone(&inventory));
                self.install(inventory);
                self.status = None;
            }
            Some(Err(source)) => {
                let error = DashError::TransientFetch {
                    class: "network inventory",
                    source,
                };
                warn!("{error}");
                self.status = Some(error.to_string());
            }
            None => {}
        }
    }

    fn busy(&self, now: Instant) -> Option<Busy> {
        self.task.as_ref().map(|task| Busy {
            label: task.label().to_string(),
            glyph: task.spinner(now),
        })
    }

    fn after_command(&mut self, _command: &Command, failed: &[String]) {
        if failed.is_empty() && self.task.is_none() {
            self.load();
        }
    }

    fn status(&self) -> Option<String> {
        self.status.clone()
    }
}

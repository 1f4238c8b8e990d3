use crate::error::SourceError;
use crate::format::{PLACEHOLDER, format_gib, format_percent, opt, uptime_or_placeholder};
use crate::input::Action;
use crate::linkage::{Dependent, Linkage};
use crate::model::{Host, HostNic, Network, ResourceKind, Vm};
use crate::paging::Pager;
use crate::refresh::{PollOutcome, PollSession};
use crate::screen::{Command, Composer, Outcome, Screen};
use crate::screens::events::{EventScope, EventsScreen};
use crate::screens::{
    HostUsage, MasterDetail, fetch_host_usage, lookup, name_index, stale_status,
};
use crate::session::Session;
use crate::source::{DataSource, ListFilter, list_typed};
use crate::table::{ColumnSpec, Row, render_table};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use tokio::time::Instant;

const HOST_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("HE", 2),
    ColumnSpec::new("Host", 22),
    ColumnSpec::new("Status", 12),
    ColumnSpec::new("VMs", 4),
    ColumnSpec::new("Memory %", 9),
    ColumnSpec::new("CPU %", 7),
    ColumnSpec::new("Address", 22),
];

const NIC_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Device", 10),
    ColumnSpec::new("Network", 16),
    ColumnSpec::new("IP", 16),
    ColumnSpec::new("MAC", 17),
    ColumnSpec::new("Speed", 10),
    ColumnSpec::new("VLAN", 5),
];

const VM_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("VM", 22),
    ColumnSpec::new("Status", 12),
    ColumnSpec::new("CPU", 4),
    ColumnSpec::new("Mem GiB", 8),
    ColumnSpec::new("IP", 16),
];

const VM_PAGE: usize = 5;

/// VMs, host NICs and networks; changes slower than host statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostInventory {
    pub vms: Vec<Vm>,
    pub nics: HashMap<String, Vec<HostNic>>,
    pub networks: Vec<Network>,
}

/// Everything the host tables are derived from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostsView {
    pub usage: Vec<HostUsage>,
    pub inventory: HostInventory,
}

/// Where the hosted engine runs, relative to one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMarker {
    Runs,
    SameCluster,
    None,
}

impl EngineMarker {
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Runs => "▲",
            Self::SameCluster => "▼",
            Self::None => PLACEHOLDER,
        }
    }
}

impl HostsView {
    fn usage_of(&self, host_id: &str) -> Option<&HostUsage> {
        self.usage.iter().find(|usage| usage.host.id == host_id)
    }

    fn vms_on<'a>(&'a self, host_id: &'a str) -> impl Iterator<Item = &'a Vm> {
        self.inventory
            .vms
            .iter()
            .filter(move |vm| vm.host_id.as_deref() == Some(host_id))
    }

    pub fn engine_marker(&self, host_id: &str) -> EngineMarker {
        let Some(engine_host) = self
            .inventory
            .vms
            .iter()
            .find(|vm| vm.is_hosted_engine())
            .and_then(|vm| vm.host_id.as_deref())
        else {
            return EngineMarker::None;
        };
        if engine_host == host_id {
            return EngineMarker::Runs;
        }
        let cluster_of = |id: &str| {
            self.usage_of(id)
                .and_then(|usage| usage.host.cluster_id.clone())
        };
        match (cluster_of(engine_host), cluster_of(host_id)) {
            (Some(engine_cluster), Some(cluster)) if engine_cluster == cluster => {
                EngineMarker::SameCluster
            }
            _ => EngineMarker::None,
        }
    }

    /// CPUs assigned to the host's VMs and the host's own CPU count.
    pub fn cpu_allocation(&self, host_id: &str) -> (u32, Option<u32>) {
        let assigned: u32 = self
            .vms_on(host_id)
            .filter_map(|vm| vm.cpu.map(|cpu| cpu.total()))
            .sum();
        let total = self
            .usage_of(host_id)
            .and_then(|usage| usage.host.cpu.map(|cpu| cpu.total()));
        (assigned, total)
    }
}

pub async fn fetch_host_inventory(source: &dyn DataSource) -> Result<HostInventory, SourceError> {
    let vm_filter = ListFilter::default().with_follow("nics.reporteddevices");
    let (vms, networks, hosts) = futures::try_join!(
        list_typed::<Vm>(source, Some(&vm_filter)),
        list_typed::<Network>(source, None),
        list_typed::<Host>(source, None),
    )?;
    let filters = hosts
        .iter()
        .map(|host| ListFilter::under(ResourceKind::Host, host.id.clone()))
        .collect::<Vec<_>>();
    let nic_lists = join_all(
        filters
            .iter()
            .map(|filter| list_typed::<HostNic>(source, Some(filter))),
    )
    .await;
    let nics = hosts
        .into_iter()
        .zip(nic_lists)
        .map(|(host, nics)| (host.id, nics.unwrap_or_default()))
        .collect();
    Ok(HostInventory {
        vms,
        nics,
        networks,
    })
}

fn nic_rows(view: &HostsView, host_id: &str) -> Vec<Row> {
    let networks = name_index(&view.inventory.networks, |network| {
        (network.id.as_str(), network.name.as_str())
    });
    let mut nics = view
        .inventory
        .nics
        .get(host_id)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .collect::<Vec<_>>();
    nics.sort_by(|left, right| left.name.cmp(&right.name));
    nics.into_iter()
        .map(|nic| {
            vec![
                nic.name.clone(),
                lookup(&networks, nic.network_id.as_deref()),
                opt(nic.ip.as_deref()),
                opt(nic.mac.as_deref()),
                nic.speed
                    .map(|bits| format!("{} Mbps", bits / 1_000_000))
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
                opt(nic.vlan),
            ]
        })
        .collect()
}

fn vm_rows(view: &HostsView, host_id: &str) -> Vec<Row> {
    view.vms_on(host_id)
        .map(|vm| {
            vec![
                vm.name.clone(),
                vm.status.as_str().to_string(),
                opt(vm.cpu.map(|cpu| cpu.total())),
                format_gib(vm.memory),
                opt(vm.ipv4().first()),
            ]
        })
        .collect()
}

pub struct HostsScreen {
    session: Session,
    usage: PollSession<Vec<HostUsage>>,
    inventory: PollSession<HostInventory>,
    view: HostsView,
    table: MasterDetail<HostsView>,
}

impl HostsScreen {
    pub fn new(session: Session) -> Self {
        let linkage = Linkage::new()
            .register(Dependent::new(
                "Network interfaces",
                NIC_COLUMNS,
                Pager::wraparound(),
                nic_rows,
            ))
            .register(Dependent::new(
                "Virtual machines",
                VM_COLUMNS,
                Pager::paged(VM_PAGE),
                vm_rows,
            ));
        Self {
            usage: session.host_stats_poll("host statistics"),
            inventory: session.inventory_poll("host inventory"),
            session,
            view: HostsView::default(),
            table: MasterDetail::new(linkage),
        }
    }

    fn selected(&self) -> Option<&HostUsage> {
        self.view.usage_of(self.table.selected_id()?)
    }

    fn rebuild(&mut self) {
        self.view = HostsView {
            usage: self.usage.snapshot().cloned().unwrap_or_default(),
            inventory: self.inventory.snapshot().cloned().unwrap_or_default(),
        };
        let ids = self
            .view
            .usage
            .iter()
            .map(|usage| usage.host.id.clone())
            .collect();
        self.table.update(&self.view, ids);
    }

    fn compose_summary(&self, composer: &mut Composer, usage: &HostUsage) {
        let (assigned, total) = self.view.cpu_allocation(&usage.host.id);
        let to_bytes = |value: Option<f64>| value.map(|value| value as u64);
        composer.gap();
        composer.heading(format!("- {}", usage.host.name));
        composer.text(format!(
            "Uptime: {}",
            uptime_or_placeholder(usage.booted_at(), Utc::now())
        ));
        composer.text(format!(
            "Memory: {} / {} GiB ({})",
            format_gib(to_bytes(usage.memory_used())),
            format_gib(to_bytes(usage.memory_total()).or(usage.host.memory)),
            format_percent(usage.memory_percent())
        ));
        composer.text(format!("CPUs: {assigned} assigned / {} total", opt(total)));
    }
}

#[async_trait]
impl Screen for HostsScreen {
    fn title(&self) -> String {
        "Hosts".to_string()
    }

    fn help(&self) -> &'static str {
        "Up/Down: host | n/p: page | Enter: events | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        if self.usage.snapshot().is_none() {
            composer.heading("- Hosts");
            composer.text("Loading hosts...");
            return;
        }
        composer.heading(format!("- Hosts ({})", self.view.usage.len()));
        composer.table(render_table(
            HOST_COLUMNS,
            &self.view.usage,
            |usage| {
                vec![
                    self.view.engine_marker(&usage.host.id).glyph().to_string(),
                    usage.host.name.clone(),
                    usage.host.status.as_str().to_string(),
                    self.view.vms_on(&usage.host.id).count().to_string(),
                    format_percent(usage.memory_percent()),
                    format_percent(usage.cpu_percent()),
                    opt(usage.host.address.as_deref()),
                ]
            },
            self.table.master().highlight(),
        ));
        if let Some(usage) = self.selected() {
            self.compose_summary(composer, usage);
        }
        self.table.compose_dependents(composer);
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Back => Outcome::Back,
            Action::Open => match self.selected() {
                Some(usage) => Outcome::Open(Box::new(EventsScreen::new(
                    self.session.clone(),
                    EventScope::Host {
                        name: usage.host.name.clone(),
                    },
                ))),
                None => Outcome::None,
            },
            other => {
                self.table.navigate(Some(&self.view), other);
                Outcome::None
            }
        }
    }

    async fn tick(&mut self, now: Instant) {
        let handle = self.session.source();
        let source = handle.as_ref();
        let (usage, inventory) = tokio::join!(
            self.usage
                .run(now, || async move { fetch_host_usage(source).await }),
            self.inventory
                .run(now, || async move { fetch_host_inventory(source).await }),
        );
        if usage == PollOutcome::Updated || inventory == PollOutcome::Updated {
            self.rebuild();
        }
    }

    fn after_command(&mut self, _command: &Command, _failed: &[String]) {
        self.usage.force_due();
        self.inventory.force_due();
    }

    fn status(&self) -> Option<String> {
        stale_status(&[self.usage.last_error(), self.inventory.last_error()])
    }
}

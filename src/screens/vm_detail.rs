use crate::error::{DashError, SourceError};
use crate::format::{PLACEHOLDER, format_gib, opt, uptime_or_placeholder, yes_no};
use crate::input::Action;
use crate::model::{
    DiskAttachment, Event, Network, Nic, ReportedDevice, ResourceKind, StorageDomain, Vm,
    VnicProfile,
};
use crate::paging::Pager;
use crate::screen::{Busy, Command, Composer, Outcome, Screen};
use crate::screens::events::{EventScope, EventsScreen, event_cells, sort_newest_first};
use crate::screens::{lookup, name_index, section_title};
use crate::session::Session;
use crate::source::{DataSource, ListFilter, get_typed, list_typed};
use crate::table::{ColumnSpec, render_table};
use crate::worker::{BusyTask, poll_slot};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

const RECENT_EVENTS: u32 = 50;
const EVENTS_PAGE: usize = 8;

const NIC_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("NIC", 10),
    ColumnSpec::new("Network", 16),
    ColumnSpec::new("IPv4", 18),
    ColumnSpec::new("MAC", 17),
    ColumnSpec::new("Type", 8),
    ColumnSpec::new("Linked", 6),
];

const DISK_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Disk", 20),
    ColumnSpec::new("Size GiB", 8),
    ColumnSpec::new("Actual GiB", 10),
    ColumnSpec::new("Interface", 10),
    ColumnSpec::new("Boot", 4),
    ColumnSpec::new("Storage Domain", 18),
    ColumnSpec::new("Status", 7),
];

const EVENT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Time", 19),
    ColumnSpec::new("Severity", 8),
    ColumnSpec::new("Code", 6),
    ColumnSpec::new("Description", 60),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NicDetail {
    pub name: String,
    pub network: String,
    pub ipv4: Vec<String>,
    pub mac: Option<String>,
    pub interface: Option<String>,
    pub linked: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskDetail {
    pub alias: String,
    pub provisioned_size: Option<u64>,
    pub actual_size: Option<u64>,
    pub interface: Option<String>,
    pub bootable: Option<bool>,
    pub domain: String,
    pub status: String,
}

/// Everything the VM detail screen shows, fetched as one background job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmDetail {
    pub vm: Option<Vm>,
    pub nics: Vec<NicDetail>,
    pub disks: Vec<DiskDetail>,
    pub events: Vec<Event>,
}

pub async fn fetch_vm_detail(source: &dyn DataSource, id: &str) -> Result<VmDetail, SourceError> {
    let vm = get_typed::<Vm>(source, id).await?;
    let under_vm = ListFilter::under(ResourceKind::Vm, id);
    let attachments_filter = under_vm.clone().with_follow("disk");
    let events_filter = ListFilter::search(format!("vm.name={}", vm.name)).with_max(RECENT_EVENTS);

    let (nics, devices, attachments, profiles, networks, domains, mut events) = futures::try_join!(
        list_typed::<Nic>(source, Some(&under_vm)),
        list_typed::<ReportedDevice>(source, Some(&under_vm)),
        list_typed::<DiskAttachment>(source, Some(&attachments_filter)),
        list_typed::<VnicProfile>(source, None),
        list_typed::<Network>(source, None),
        list_typed::<StorageDomain>(source, None),
        list_typed::<Event>(source, Some(&events_filter)),
    )?;
    sort_newest_first(&mut events);

    Ok(VmDetail {
        nics: nic_details(&nics, &devices, &profiles, &networks),
        disks: disk_details(&attachments, &domains),
        events,
        vm: Some(vm),
    })
}

fn nic_details(
    nics: &[Nic],
    devices: &[ReportedDevice],
    profiles: &[VnicProfile],
    networks: &[Network],
) -> Vec<NicDetail> {
    let network_names =
        name_index(networks, |network| (network.id.as_str(), network.name.as_str()));
    let profile_networks = profiles
        .iter()
        .filter_map(|profile| Some((profile.id.as_str(), profile.network_id.as_deref()?)))
        .collect::<HashMap<_, _>>();

    nics.iter()
        .map(|nic| {
            let network = nic
                .vnic_profile_id
                .as_deref()
                .and_then(|profile| profile_networks.get(profile))
                .and_then(|network| network_names.get(*network))
                .cloned()
                .unwrap_or_else(|| PLACEHOLDER.to_string());
            let ipv4 = devices
                .iter()
                .filter(|device| {
                    device.mac.is_some() && device.mac.as_deref() == nic.mac.as_deref()
                })
                .flat_map(|device| device.ipv4.iter().cloned())
                .collect();
            NicDetail {
                name: nic.name.clone(),
                network,
                ipv4,
                mac: nic.mac.clone(),
                interface: nic.interface.clone(),
                linked: nic.linked,
            }
        })
        .collect()
}

fn disk_details(attachments: &[DiskAttachment], domains: &[StorageDomain]) -> Vec<DiskDetail> {
    let domain_names = name_index(domains, |domain| (domain.id.as_str(), domain.name.as_str()));
    attachments
        .iter()
        .map(|attachment| {
            let disk = attachment.disk.as_ref();
            DiskDetail {
                alias: disk
                    .map(|disk| disk.alias.clone())
                    .or_else(|| attachment.disk_id.clone())
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
                provisioned_size: disk.and_then(|disk| disk.provisioned_size),
                actual_size: disk.and_then(|disk| disk.actual_size),
                interface: attachment.interface.clone(),
                bootable: attachment.bootable,
                domain: lookup(
                    &domain_names,
                    disk.and_then(|disk| disk.storage_domain_ids.first())
                        .map(String::as_str),
                ),
                status: disk
                    .map(|disk| disk.status.to_string())
                    .unwrap_or_else(|| PLACEHOLDER.to_string()),
            }
        })
        .collect()
}

pub struct VmDetailScreen {
    session: Session,
    vm_id: String,
    vm_name: String,
    detail: Option<Arc<VmDetail>>,
    task: Option<BusyTask<VmDetail>>,
    events: Pager,
    status: Option<String>,
}

impl VmDetailScreen {
    pub fn new(session: Session, vm_id: impl Into<String>, vm_name: impl Into<String>) -> Self {
        let mut screen = Self {
            session,
            vm_id: vm_id.into(),
            vm_name: vm_name.into(),
            detail: None,
            task: None,
            events: Pager::paged(EVENTS_PAGE),
            status: None,
        };
        match screen.session.caches().vm_details.get(&screen.vm_id) {
            Some(cached) => screen.install(cached),
            None => screen.load(),
        }
        screen
    }

    fn load(&mut self) {
        let source = self.session.source();
        let id = self.vm_id.clone();
        self.task = Some(BusyTask::spawn(
            format!("Loading details for {}", self.vm_name),
            async move { fetch_vm_detail(source.as_ref(), &id).await },
        ));
    }

    fn install(&mut self, detail: Arc<VmDetail>) {
        self.events.reset(detail.events.len());
        self.detail = Some(detail);
    }

    fn summary(&self, composer: &mut Composer, vm: &Vm) {
        let cpu = vm
            .cpu
            .map(|cpu| {
                format!(
                    "{} ({} sockets x {} cores x {} threads)",
                    cpu.total(),
                    cpu.sockets,
                    cpu.cores,
                    cpu.threads
                )
            })
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        composer.text(format!("Status: {}", vm.status.as_str()));
        composer.text(format!(
            "Uptime: {}",
            uptime_or_placeholder(vm.start_time, Utc::now())
        ));
        composer.text(format!("OS: {}", opt(vm.os.as_deref())));
        composer.text(format!("Chipset: {}", opt(vm.chipset.as_deref())));
        composer.text(format!("Memory: {} GiB", format_gib(vm.memory)));
        composer.text(format!(
            "Guaranteed memory: {} GiB",
            format_gib(vm.guaranteed_memory)
        ));
        composer.text(format!("CPUs: {cpu}"));
        composer.text(format!("High availability: {}", yes_no(vm.high_availability)));
        if let Some(description) = vm.description.as_deref() {
            composer.text(format!("Description: {description}"));
        }
    }
}

#[async_trait]
impl Screen for VmDetailScreen {
    fn title(&self) -> String {
        format!("VM {}", self.vm_name)
    }

    fn help(&self) -> &'static str {
        "n/p: event page | Enter: event history | r: reload | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        composer.heading(format!("VM details: {}", self.vm_name));
        let Some(detail) = self.detail.as_ref() else {
            if self.task.is_none() {
                composer.text("Details unavailable; press r to retry.");
            }
            return;
        };
        if let Some(vm) = detail.vm.as_ref() {
            self.summary(composer, vm);
        }

        composer.gap();
        composer.heading(format!("- Network interfaces ({})", detail.nics.len()));
        composer.table(render_table(
            NIC_COLUMNS,
            &detail.nics,
            |nic| {
                vec![
                    nic.name.clone(),
                    nic.network.clone(),
                    nic.ipv4.join(", "),
                    opt(nic.mac.as_deref()),
                    opt(nic.interface.as_deref()),
                    yes_no(nic.linked),
                ]
            },
            None,
        ));

        composer.gap();
        composer.heading(format!("- Disks ({})", detail.disks.len()));
        composer.table(render_table(
            DISK_COLUMNS,
            &detail.disks,
            |disk| {
                vec![
                    disk.alias.clone(),
                    format_gib(disk.provisioned_size),
                    format_gib(disk.actual_size),
                    opt(disk.interface.as_deref()),
                    yes_no(disk.bootable),
                    disk.domain.clone(),
                    disk.status.clone(),
                ]
            },
            None,
        ));

        composer.gap();
        composer.heading(section_title("Recent events", &self.events));
        composer.table(render_table(
            EVENT_COLUMNS,
            &detail.events[self.events.visible_range()],
            event_cells,
            None,
        ));
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        match action {
            Action::Back => Outcome::Back,
            Action::Open => Outcome::Open(Box::new(EventsScreen::new(
                self.session.clone(),
                EventScope::Vm {
                    name: self.vm_name.clone(),
                },
            ))),
            Action::NextPage => {
                self.events.next_page();
                Outcome::None
            }
            Action::PrevPage => {
                self.events.prev_page();
                Outcome::None
            }
            Action::Command('r') if self.task.is_none() => {
                self.session.caches().vm_details.invalidate(&self.vm_id);
                self.load();
                Outcome::None
            }
            _ => Outcome::None,
        }
    }

    async fn tick(&mut self, _now: Instant) {
        match poll_slot(&mut self.task) {
            Some(Ok(detail)) => {
                let detail = Arc::new(detail);
                self.session
                    .caches()
                    .vm_details
                    .put(self.vm_id.clone(), Arc::clone(&detail));
                self.install(detail);
                self.status = None;
            }
            Some(Err(source)) => {
                let error = DashError::TransientFetch {
                    class: "vm details",
                    source,
                };
                warn!(vm = %self.vm_name, "{error}");
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

#[cfg(test)]
pub(crate) mod tests {
    use super::{VmDetailScreen, fetch_vm_detail};
    use crate::model::{
        CpuTopology, Disk, DiskAttachment, DiskStatus, Network, Nic, Record, ReportedDevice,
        ResourceKind, Severity, StorageDomain, Vm, VmStatus, VnicProfile,
    };
    use crate::screen::Screen;
    use crate::screens::events::tests::event;
    use crate::session::test_session;
    use crate::source::fake::FakeSource;
    use std::sync::Arc;
    use tokio::time::Instant;

    pub(crate) fn vm(id: &str, name: &str, status: VmStatus) -> Vm {
        Vm {
            id: id.to_string(),
            name: name.to_string(),
            status,
            host_id: Some("h1".to_string()),
            cluster_id: Some("c1".to_string()),
            start_time: None,
            memory: Some(4 * 1024 * 1024 * 1024),
            guaranteed_memory: None,
            cpu: Some(CpuTopology {
                sockets: 2,
                cores: 1,
                threads: 1,
            }),
            os: Some("rhel_9x64".to_string()),
            chipset: None,
            high_availability: Some(false),
            description: None,
            nics: Vec::new(),
        }
    }

    fn source() -> FakeSource {
        let source = FakeSource::new().with(vec![
            Record::Vm(vm("vm-1", "web-01", VmStatus::Up)),
            Record::VnicProfile(VnicProfile {
                id: "p1".to_string(),
                name: "ovirtmgmt".to_string(),
                network_id: Some("n1".to_string()),
                port_mirroring: None,
                pass_through: None,
                description: None,
            }),
            Record::Network(Network {
                id: "n1".to_string(),
                name: "ovirtmgmt".to_string(),
                data_center_id: None,
                description: None,
                usages: Vec::new(),
                vlan: None,
                mtu: None,
                port_isolation: None,
                status: None,
                required: None,
            }),
            Record::StorageDomain(StorageDomain {
                id: "sd1".to_string(),
                name: "data".to_string(),
                domain_type: None,
                status: None,
                available: None,
                used: None,
                committed: None,
                description: None,
            }),
            Record::Event(event("e1", 1, Severity::Normal, "VM web-01 started")),
        ]);
        source.set_children(
            ResourceKind::Vm,
            "vm-1",
            ResourceKind::Nic,
            vec![Record::Nic(Nic {
                id: "nic-1".to_string(),
                name: "nic1".to_string(),
                mac: Some("56:6f:00:00:00:01".to_string()),
                interface: Some("virtio".to_string()),
                linked: Some(true),
                plugged: Some(true),
                vnic_profile_id: Some("p1".to_string()),
            })],
        );
        source.set_children(
            ResourceKind::Vm,
            "vm-1",
            ResourceKind::ReportedDevice,
            vec![Record::ReportedDevice(ReportedDevice {
                id: "rd1".to_string(),
                name: "eth0".to_string(),
                mac: Some("56:6f:00:00:00:01".to_string()),
                ipv4: vec!["10.0.0.5".to_string()],
                ipv6: Vec::new(),
            })],
        );
        source.set_children(
            ResourceKind::Vm,
            "vm-1",
            ResourceKind::DiskAttachment,
            vec![Record::DiskAttachment(DiskAttachment {
                id: "da1".to_string(),
                disk_id: Some("d1".to_string()),
                bootable: Some(true),
                interface: Some("virtio_scsi".to_string()),
                active: Some(true),
                logical_name: None,
                disk: Some(Disk {
                    id: "d1".to_string(),
                    alias: "web-01_Disk1".to_string(),
                    provisioned_size: Some(20 * 1024 * 1024 * 1024),
                    actual_size: None,
                    status: DiskStatus::Ok,
                    storage_domain_ids: vec!["sd1".to_string()],
                    sparse: Some(true),
                    content_type: None,
                    description: None,
                }),
            })],
        );
        source
    }

    #[tokio::test]
    async fn detail_joins_nics_devices_and_disks() {
        let source = source();
        let detail = fetch_vm_detail(&source, "vm-1").await.unwrap();
        assert_eq!(detail.nics.len(), 1);
        assert_eq!(detail.nics[0].network, "ovirtmgmt");
        assert_eq!(detail.nics[0].ipv4, vec!["10.0.0.5".to_string()]);
        assert_eq!(detail.disks[0].domain, "data");
        assert_eq!(detail.disks[0].status, "ok");
        assert_eq!(detail.events.len(), 1);
    }

    #[tokio::test]
    async fn screen_loads_once_and_reuses_cache() {
        let source = Arc::new(source());
        let session = test_session(Arc::clone(&source));
        let mut screen = VmDetailScreen::new(session.clone(), "vm-1", "web-01");
        assert!(screen.busy(Instant::now()).is_some());
        for _ in 0..50 {
            tokio::task::yield_now().await;
            screen.tick(Instant::now()).await;
            if screen.busy(Instant::now()).is_none() {
                break;
            }
        }
        assert!(screen.detail.is_some());
        assert!(session.caches().vm_details.get(&"vm-1".to_string()).is_some());

        let again = VmDetailScreen::new(session, "vm-1", "web-01");
        assert!(again.busy(Instant::now()).is_none());
        assert!(again.detail.is_some());
    }
}

use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Vm,
    Host,
    Cluster,
    DataCenter,
    Network,
    VnicProfile,
    StorageDomain,
    Disk,
    DiskAttachment,
    Nic,
    HostNic,
    ReportedDevice,
    User,
    Event,
}

impl ResourceKind {
    pub fn title(self) -> &'static str {
        match self {
            Self::Vm => "VM",
            Self::Host => "Host",
            Self::Cluster => "Cluster",
            Self::DataCenter => "Data Center",
            Self::Network => "Network",
            Self::VnicProfile => "vNIC Profile",
            Self::StorageDomain => "Storage Domain",
            Self::Disk => "Disk",
            Self::DiskAttachment => "Disk Attachment",
            Self::Nic => "NIC",
            Self::HostNic => "Host NIC",
            Self::ReportedDevice => "Reported Device",
            Self::User => "User",
            Self::Event => "Event",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum VmStatus {
    Up,
    Down,
    PoweringUp,
    PoweringDown,
    RebootInProgress,
    WaitForLaunch,
    MigratingFrom,
    MigratingTo,
    Paused,
    Suspended,
    SavingState,
    RestoringState,
    ImageLocked,
    NotResponding,
    Unknown,
}

impl VmStatus {
    pub fn from_api(value: &str) -> Self {
        match value {
            "up" => Self::Up,
            "down" => Self::Down,
            "powering_up" => Self::PoweringUp,
            "powering_down" => Self::PoweringDown,
            "reboot_in_progress" => Self::RebootInProgress,
            "wait_for_launch" => Self::WaitForLaunch,
            "migrating" | "migrating_from" => Self::MigratingFrom,
            "migrating_to" => Self::MigratingTo,
            "paused" => Self::Paused,
            "suspended" => Self::Suspended,
            "saving_state" => Self::SavingState,
            "restoring_state" => Self::RestoringState,
            "image_locked" => Self::ImageLocked,
            "not_responding" => Self::NotResponding,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::PoweringUp => "powering_up",
            Self::PoweringDown => "powering_down",
            Self::RebootInProgress => "reboot_in_progress",
            Self::WaitForLaunch => "wait_for_launch",
            Self::MigratingFrom => "migrating",
            Self::MigratingTo => "migrating_to",
            Self::Paused => "paused",
            Self::Suspended => "suspended",
            Self::SavingState => "saving_state",
            Self::RestoringState => "restoring_state",
            Self::ImageLocked => "image_locked",
            Self::NotResponding => "not_responding",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Up
                | Self::PoweringUp
                | Self::RebootInProgress
                | Self::MigratingFrom
                | Self::MigratingTo
        )
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum HostStatus {
    Up,
    Down,
    Maintenance,
    PreparingForMaintenance,
    NonOperational,
    NonResponsive,
    Installing,
    Connecting,
    Initializing,
    Reboot,
    Error,
    Unknown,
}

impl HostStatus {
    pub fn from_api(value: &str) -> Self {
        match value {
            "up" => Self::Up,
            "down" => Self::Down,
            "maintenance" => Self::Maintenance,
            "preparing_for_maintenance" => Self::PreparingForMaintenance,
            "non_operational" => Self::NonOperational,
            "non_responsive" => Self::NonResponsive,
            "installing" | "install_failed" => Self::Installing,
            "connecting" => Self::Connecting,
            "initializing" => Self::Initializing,
            "reboot" => Self::Reboot,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Maintenance => "maintenance",
            Self::PreparingForMaintenance => "preparing_for_maintenance",
            Self::NonOperational => "non_operational",
            Self::NonResponsive => "non_responsive",
            Self::Installing => "installing",
            Self::Connecting => "connecting",
            Self::Initializing => "initializing",
            Self::Reboot => "reboot",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DiskStatus {
    Ok,
    Locked,
    Illegal,
    Unknown,
}

impl DiskStatus {
    pub const ALL: [Self; 4] = [Self::Ok, Self::Locked, Self::Illegal, Self::Unknown];

    pub fn from_api(value: &str) -> Self {
        match value {
            "ok" => Self::Ok,
            "locked" => Self::Locked,
            "illegal" => Self::Illegal,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Locked => "locked",
            Self::Illegal => "illegal",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for DiskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Normal,
    Warning,
    Error,
    Alert,
    Unknown,
}

impl Severity {
    pub const ALL: [Self; 5] = [
        Self::Normal,
        Self::Warning,
        Self::Error,
        Self::Alert,
        Self::Unknown,
    ];

    pub fn from_api(value: &str) -> Self {
        match value {
            "normal" => Self::Normal,
            "warning" => Self::Warning,
            "error" => Self::Error,
            "alert" => Self::Alert,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Alert => "alert",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct CpuTopology {
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
}

impl CpuTopology {
    pub fn total(self) -> u32 {
        self.sockets.max(1) * self.cores.max(1) * self.threads.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VmNicSummary {
    pub name: String,
    pub vnic_profile_id: Option<String>,
    pub ipv4: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vm {
    pub id: String,
    pub name: String,
    pub status: VmStatus,
    pub host_id: Option<String>,
    pub cluster_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub memory: Option<u64>,
    pub guaranteed_memory: Option<u64>,
    pub cpu: Option<CpuTopology>,
    pub os: Option<String>,
    pub chipset: Option<String>,
    pub high_availability: Option<bool>,
    pub description: Option<String>,
    /// Populated only when the listing followed `nics.reporteddevices`.
    pub nics: Vec<VmNicSummary>,
}

impl Vm {
    pub fn ipv4(&self) -> Vec<&str> {
        self.nics
            .iter()
            .flat_map(|nic| nic.ipv4.iter().map(String::as_str))
            .collect()
    }

    pub fn is_hosted_engine(&self) -> bool {
        self.name == "HostedEngine"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub id: String,
    pub name: String,
    pub status: HostStatus,
    pub address: Option<String>,
    pub cluster_id: Option<String>,
    pub cpu: Option<CpuTopology>,
    pub memory: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub data_center_id: Option<String>,
    pub cpu_type: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataCenter {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub data_center_id: Option<String>,
    pub description: Option<String>,
    pub usages: Vec<String>,
    pub vlan: Option<u32>,
    pub mtu: Option<u32>,
    pub port_isolation: Option<bool>,
    /// Cluster attachment state; only set when listed under a cluster.
    pub status: Option<String>,
    pub required: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VnicProfile {
    pub id: String,
    pub name: String,
    pub network_id: Option<String>,
    pub port_mirroring: Option<bool>,
    pub pass_through: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageDomain {
    pub id: String,
    pub name: String,
    pub domain_type: Option<String>,
    pub status: Option<String>,
    pub available: Option<u64>,
    pub used: Option<u64>,
    pub committed: Option<u64>,
    pub description: Option<String>,
}

impl StorageDomain {
    pub fn total(&self) -> Option<u64> {
        Some(self.available? + self.used?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    pub id: String,
    pub alias: String,
    pub provisioned_size: Option<u64>,
    pub actual_size: Option<u64>,
    pub status: DiskStatus,
    pub storage_domain_ids: Vec<String>,
    pub sparse: Option<bool>,
    pub content_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskAttachment {
    pub id: String,
    pub disk_id: Option<String>,
    pub bootable: Option<bool>,
    pub interface: Option<String>,
    pub active: Option<bool>,
    pub logical_name: Option<String>,
    /// Present when the listing followed `disk`.
    pub disk: Option<Disk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nic {
    pub id: String,
    pub name: String,
    pub mac: Option<String>,
    pub interface: Option<String>,
    pub linked: Option<bool>,
    pub plugged: Option<bool>,
    pub vnic_profile_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostNic {
    pub id: String,
    pub name: String,
    pub mac: Option<String>,
    pub ip: Option<String>,
    /// Link speed in bits per second.
    pub speed: Option<u64>,
    pub vlan: Option<u32>,
    pub network_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportedDevice {
    pub id: String,
    pub name: String,
    pub mac: Option<String>,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub user_name: String,
    pub principal: Option<String>,
    pub domain: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
}

impl User {
    pub fn is_internal(&self) -> bool {
        self.domain
            .as_deref()
            .is_some_and(|domain| domain.contains("internal"))
            || self.user_name.ends_with("@internal")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub time: Option<DateTime<Utc>>,
    pub severity: Severity,
    pub code: Option<u32>,
    pub description: String,
    pub vm_id: Option<String>,
    pub host_id: Option<String>,
    pub cluster_id: Option<String>,
    pub data_center_id: Option<String>,
}

/// Any record a data source may return.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Vm(Vm),
    Host(Host),
    Cluster(Cluster),
    DataCenter(DataCenter),
    Network(Network),
    VnicProfile(VnicProfile),
    StorageDomain(StorageDomain),
    Disk(Disk),
    DiskAttachment(DiskAttachment),
    Nic(Nic),
    HostNic(HostNic),
    ReportedDevice(ReportedDevice),
    User(User),
    Event(Event),
}

impl Record {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Vm(_) => ResourceKind::Vm,
            Self::Host(_) => ResourceKind::Host,
            Self::Cluster(_) => ResourceKind::Cluster,
            Self::DataCenter(_) => ResourceKind::DataCenter,
            Self::Network(_) => ResourceKind::Network,
            Self::VnicProfile(_) => ResourceKind::VnicProfile,
            Self::StorageDomain(_) => ResourceKind::StorageDomain,
            Self::Disk(_) => ResourceKind::Disk,
            Self::DiskAttachment(_) => ResourceKind::DiskAttachment,
            Self::Nic(_) => ResourceKind::Nic,
            Self::HostNic(_) => ResourceKind::HostNic,
            Self::ReportedDevice(_) => ResourceKind::ReportedDevice,
            Self::User(_) => ResourceKind::User,
            Self::Event(_) => ResourceKind::Event,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Vm(record) => &record.id,
            Self::Host(record) => &record.id,
            Self::Cluster(record) => &record.id,
            Self::DataCenter(record) => &record.id,
            Self::Network(record) => &record.id,
            Self::VnicProfile(record) => &record.id,
            Self::StorageDomain(record) => &record.id,
            Self::Disk(record) => &record.id,
            Self::DiskAttachment(record) => &record.id,
            Self::Nic(record) => &record.id,
            Self::HostNic(record) => &record.id,
            Self::ReportedDevice(record) => &record.id,
            Self::User(record) => &record.id,
            Self::Event(record) => &record.id,
        }
    }
}

/// Typed view over [`Record`] for one resource kind.
pub trait TypedRecord: Sized {
    const KIND: ResourceKind;

    fn from_record(record: Record) -> Option<Self>;
}

macro_rules! typed_record {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl TypedRecord for $variant {
                const KIND: ResourceKind = ResourceKind::$variant;

                fn from_record(record: Record) -> Option<Self> {
                    match record {
                        Record::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )+
    };
}

typed_record!(
    Vm,
    Host,
    Cluster,
    DataCenter,
    Network,
    VnicProfile,
    StorageDomain,
    Disk,
    DiskAttachment,
    Nic,
    HostNic,
    ReportedDevice,
    User,
    Event,
);

#[cfg(test)]
mod tests {
    use super::{CpuTopology, Record, ResourceKind, Severity, TypedRecord, User, VmStatus};

    #[test]
    fn unknown_api_values_map_to_unknown_variants() {
        assert_eq!(VmStatus::from_api("up"), VmStatus::Up);
        assert_eq!(VmStatus::from_api("migrating"), VmStatus::MigratingFrom);
        assert_eq!(VmStatus::from_api("frobnicating"), VmStatus::Unknown);
        assert_eq!(Severity::from_api(""), Severity::Unknown);
    }

    #[test]
    fn typed_record_extracts_matching_variant_only() {
        let user = User {
            id: "u1".to_string(),
            name: "admin".to_string(),
            user_name: "admin@internal".to_string(),
            principal: None,
            domain: Some("internal-authz".to_string()),
            email: None,
            department: None,
        };
        let record = Record::User(user.clone());
        assert_eq!(record.kind(), ResourceKind::User);
        assert_eq!(record.id(), "u1");
        assert_eq!(User::from_record(record), Some(user.clone()));
        assert!(user.is_internal());
        assert_eq!(
            super::Vm::from_record(Record::User(user)),
            None::<super::Vm>
        );
    }

    #[test]
    fn cpu_topology_total_treats_missing_counts_as_one() {
        let topology = CpuTopology {
            sockets: 2,
            cores: 4,
            threads: 0,
        };
        assert_eq!(topology.total(), 8);
    }
}

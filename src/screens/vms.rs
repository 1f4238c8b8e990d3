use crate::error::SourceError;
use crate::filter::Searchable;
use crate::format::{format_gib, format_percent, opt, uptime_or_placeholder};
use crate::input::Action;
use crate::model::{Cluster, DataCenter, Vm, VmStatus};
use crate::modal::Modal;
use crate::paging::Pager;
use crate::refresh::{PollOutcome, PollSession};
use crate::screen::{Command, Composer, Outcome, Screen, Target, TextPurpose};
use crate::screens::vm_detail::VmDetailScreen;
use crate::screens::{
    FilteredList, HostUsage, fetch_host_usage, filter_outcome, filtered_title, lookup,
    name_index, section_title, stale_status,
};
use crate::session::Session;
use crate::source::{DataSource, ListFilter, Verb, list_typed};
use crate::table::{ColumnSpec, render_table};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use tokio::time::Instant;
use tracing::debug;

const VM_PAGE: usize = 20;
const HOST_PAGE: usize = 10;

const VM_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("", 3),
    ColumnSpec::new("Name", 22),
    ColumnSpec::new("Status", 26),
    ColumnSpec::new("Uptime", 12),
    ColumnSpec::new("CPU", 4),
    ColumnSpec::new("Mem GiB", 8),
    ColumnSpec::new("Host", 16),
    ColumnSpec::new("Cluster", 14),
    ColumnSpec::new("IP", 16),
];

const HOST_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("Host", 24),
    ColumnSpec::new("CPU %", 8),
    ColumnSpec::new("Memory %", 9),
    ColumnSpec::new("Data Center", 18),
    ColumnSpec::new("Cluster", 18),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmCategory {
    Running,
    Stopped,
    Other,
}

impl VmCategory {
    pub const ALL: [Self; 3] = [Self::Running, Self::Stopped, Self::Other];
}

impl Display for VmCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Other => "other",
        })
    }
}

impl Searchable for Vm {
    type Category = VmCategory;

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str(), self.status.as_str()];
        fields.extend(self.ipv4());
        fields
    }

    fn in_category(&self, category: VmCategory) -> bool {
        match category {
            VmCategory::Running => self.status.is_running(),
            VmCategory::Stopped => self.status == VmStatus::Down,
            VmCategory::Other => !self.status.is_running() && self.status != VmStatus::Down,
        }
    }
}

/// Clusters and data centers, for naming hosts and VMs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    pub clusters: Vec<Cluster>,
    pub data_centers: Vec<DataCenter>,
}

pub async fn fetch_vms(source: &dyn DataSource) -> Result<Vec<Vm>, SourceError> {
    let filter = ListFilter::default().with_follow("nics.reporteddevices");
    let mut vms = list_typed::<Vm>(source, Some(&filter)).await?;
    vms.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(vms)
}

pub async fn fetch_placement(source: &dyn DataSource) -> Result<Placement, SourceError> {
    let (clusters, data_centers) = futures::try_join!(
        list_typed::<Cluster>(source, None),
        list_typed::<DataCenter>(source, None),
    )?;
    Ok(Placement {
        clusters,
        data_centers,
    })
}

pub fn can_start(status: VmStatus) -> bool {
    matches!(status, VmStatus::Down | VmStatus::Suspended)
}

pub fn can_stop(status: VmStatus) -> bool {
    matches!(
        status,
        VmStatus::Up | VmStatus::PoweringUp | VmStatus::Suspended
    )
}

pub fn can_restart(status: VmStatus) -> bool {
    status == VmStatus::Up
}

/// A start stays pending while the engine reports the VM as launching.
fn still_starting(status: VmStatus) -> bool {
    matches!(status, VmStatus::WaitForLaunch | VmStatus::PoweringUp)
}

fn mark_cell(marked: bool) -> String {
    if marked { "[x]" } else { "[ ]" }.to_string()
}

fn vm_id(vm: &Vm) -> &str {
    &vm.id
}

pub struct VmsScreen {
    session: Session,
    vms: PollSession<Vec<Vm>>,
    hosts: PollSession<Vec<HostUsage>>,
    placement: PollSession<Placement>,
    table: FilteredList<Vm>,
    host_pager: Pager,
    /// Whether the selected VM's host is on the visible host page.
    host_focus: bool,
    marks: HashSet<String>,
    pending_starts: HashSet<String>,
}

impl VmsScreen {
    pub fn new(session: Session) -> Self {
        Self {
            vms: session.vm_status_poll("vm status"),
            hosts: session.host_stats_poll("host statistics"),
            placement: session.inventory_poll("inventory"),
            session,
            table: FilteredList::new(Pager::paged(VM_PAGE), vm_id),
            host_pager: Pager::paged(HOST_PAGE),
            host_focus: false,
            marks: HashSet::new(),
            pending_starts: HashSet::new(),
        }
    }

    fn data(&self) -> &[Vm] {
        self.vms.snapshot().map(Vec::as_slice).unwrap_or_default()
    }

    fn host_data(&self) -> &[HostUsage] {
        self.hosts.snapshot().map(Vec::as_slice).unwrap_or_default()
    }

    fn selected(&self) -> Option<&Vm> {
        self.table.selected(self.data())
    }

    /// Marked VMs the filter shows, in table order, or the cursor VM when
    /// none of them is marked.
    fn targets(&self) -> Vec<&Vm> {
        let marked = self
            .table
            .filtered(self.data())
            .into_iter()
            .filter(|vm| self.marks.contains(&vm.id))
            .collect::<Vec<_>>();
        if marked.is_empty() {
            return self.selected().into_iter().collect();
        }
        marked
    }

    fn toggle_mark(&mut self) {
        let Some(id) = self.selected().map(|vm| vm.id.clone()) else {
            return;
        };
        if !self.marks.remove(&id) {
            self.marks.insert(id);
        }
    }

    fn power(&self, verb: Verb, eligible: fn(VmStatus) -> bool) -> Outcome {
        let targets = self
            .targets()
            .into_iter()
            .filter(|vm| eligible(vm.status))
            .map(|vm| Target::new(vm.id.clone(), vm.name.clone()))
            .collect::<Vec<_>>();
        if targets.is_empty() {
            return Outcome::Status(format!("No selected VM can {}", verb.as_str()));
        }
        let command = Command::Power { verb, targets };
        match verb {
            Verb::Start => Outcome::Run(command),
            _ => Outcome::Modal(Modal::confirm(command)),
        }
    }

    fn migrate(&self) -> Outcome {
        let targets = self.targets();
        let vm = match targets.as_slice() {
            [] => return Outcome::None,
            [vm] => *vm,
            _ => {
                return Outcome::Status(format!(
                    "Migrate takes one VM; {} are marked",
                    targets.len()
                ));
            }
        };
        if vm.status == VmStatus::Down {
            return Outcome::Modal(Modal::notice(
                "Migrate",
                format!("VM is Down: {} cannot be migrated", vm.name),
            ));
        }
        let hosts = self
            .host_data()
            .iter()
            .filter(|usage| {
                usage.host.cluster_id.is_some()
                    && usage.host.cluster_id == vm.cluster_id
                    && Some(usage.host.id.as_str()) != vm.host_id.as_deref()
            })
            .map(|usage| Target::new(usage.host.id.clone(), usage.host.name.clone()))
            .collect::<Vec<_>>();
        if hosts.is_empty() {
            return Outcome::Modal(Modal::notice(
                "Migrate",
                format!("No other host in the cluster of {}", vm.name),
            ));
        }
        Outcome::Modal(Modal::migrate_picker(
            Target::new(vm.id.clone(), vm.name.clone()),
            hosts,
        ))
    }

    fn after_vm_refresh(&mut self) {
        let Some(vms) = self.vms.snapshot() else {
            return;
        };
        let present = vms.iter().map(|vm| vm.id.as_str()).collect::<HashSet<_>>();
        self.marks.retain(|id| present.contains(id.as_str()));
        self.pending_starts.retain(|id| {
            vms.iter()
                .find(|vm| &vm.id == id)
                .is_some_and(|vm| still_starting(vm.status))
        });
        self.table.refresh(vms);
        self.follow_host();
    }

    /// Moves the host table to the page holding the selected VM's host.
    fn follow_host(&mut self) {
        let host_id = self.selected().and_then(|vm| vm.host_id.clone());
        let hosts = self.hosts.snapshot().map(Vec::as_slice).unwrap_or_default();
        self.host_pager.set_len(hosts.len());
        let index = host_id
            .and_then(|id| hosts.iter().position(|usage| usage.host.id == id));
        self.host_focus = index.is_some();
        if let Some(index) = index {
            self.host_pager.select_index(index);
        }
    }

    fn status_cell(&self, vm: &Vm) -> String {
        if self.pending_starts.contains(&vm.id) {
            format!("{} (starting...)", vm.status.as_str())
        } else {
            vm.status.as_str().to_string()
        }
    }

    fn compose_vms(&self, composer: &mut Composer) {
        let placement = self.placement.snapshot();
        let clusters = placement
            .map(|p| name_index(&p.clusters, |c| (c.id.as_str(), c.name.as_str())))
            .unwrap_or_default();
        let hosts = name_index(self.host_data(), |usage| {
            (usage.host.id.as_str(), usage.host.name.as_str())
        });
        let now = Utc::now();
        let visible = self.table.visible(self.data());
        composer.heading(filtered_title(
            "- VM LIST",
            self.table.pager().len(),
            self.data().len(),
            self.table.committed(),
            self.table.pager(),
        ));
        composer.table(render_table(
            VM_COLUMNS,
            &visible,
            |vm| {
                let ips = vm.ipv4();
                vec![
                    mark_cell(self.marks.contains(&vm.id)),
                    vm.name.clone(),
                    self.status_cell(vm),
                    uptime_or_placeholder(vm.start_time, now),
                    opt(vm.cpu.map(|cpu| cpu.total())),
                    format_gib(vm.memory),
                    lookup(&hosts, vm.host_id.as_deref()),
                    lookup(&clusters, vm.cluster_id.as_deref()),
                    opt(ips.first()),
                ]
            },
            self.table.highlight(),
        ));
    }

    fn compose_hosts(&self, composer: &mut Composer) {
        let placement = self.placement.snapshot();
        let clusters = placement.map(|p| p.clusters.as_slice()).unwrap_or_default();
        let data_centers = placement
            .map(|p| name_index(&p.data_centers, |dc| (dc.id.as_str(), dc.name.as_str())))
            .unwrap_or_default();
        let hosts = self.host_data();
        let visible = hosts.get(self.host_pager.visible_range()).unwrap_or_default();
        composer.gap();
        composer.heading(section_title("HOST RESOURCE USAGE", &self.host_pager));
        composer.table(render_table(
            HOST_COLUMNS,
            visible,
            |usage| {
                let cluster = clusters
                    .iter()
                    .find(|cluster| Some(&cluster.id) == usage.host.cluster_id.as_ref());
                vec![
                    usage.host.name.clone(),
                    format_percent(usage.cpu_percent()),
                    format_percent(usage.memory_percent()),
                    lookup(
                        &data_centers,
                        cluster.and_then(|cluster| cluster.data_center_id.as_deref()),
                    ),
                    opt(cluster.map(|cluster| cluster.name.as_str())),
                ]
            },
            if self.host_focus {
                self.host_pager.cursor()
            } else {
                None
            },
        ));
    }
}

#[async_trait]
impl Screen for VmsScreen {
    fn title(&self) -> String {
        "Virtual Machines".to_string()
    }

    fn help(&self) -> &'static str {
        "n/p: page | Space: mark | s: start | d: stop | r: restart | m: migrate | c: category | Tab: search | Enter: details | Esc: back"
    }

    fn compose(&self, composer: &mut Composer) {
        if self.vms.snapshot().is_none() {
            composer.heading("- VM LIST");
            composer.text("Loading virtual machines...");
            return;
        }
        self.compose_vms(composer);
        self.compose_hosts(composer);
    }

    fn handle(&mut self, action: &Action) -> Outcome {
        let outcome = match action {
            Action::Back => Outcome::Back,
            Action::ToggleMark => {
                self.toggle_mark();
                Outcome::None
            }
            Action::Open => match self.selected() {
                Some(vm) => Outcome::Open(Box::new(VmDetailScreen::new(
                    self.session.clone(),
                    vm.id.clone(),
                    vm.name.clone(),
                ))),
                None => Outcome::None,
            },
            Action::Command('s') => self.power(Verb::Start, can_start),
            Action::Command('d') => self.power(Verb::Stop, can_stop),
            Action::Command('r') => self.power(Verb::Reboot, can_restart),
            Action::Command('m') => self.migrate(),
            Action::Command('c') => {
                let vms = self.vms.snapshot().map(Vec::as_slice).unwrap_or_default();
                filter_outcome(self.table.cycle_category(&VmCategory::ALL, vms), "VMs")
            }
            other => {
                self.table.navigate(other);
                Outcome::None
            }
        };
        self.follow_host();
        outcome
    }

    async fn tick(&mut self, now: Instant) {
        let handle = self.session.source();
        let source = handle.as_ref();
        let (vms, hosts, _) = tokio::join!(
            self.vms.run(now, || async move { fetch_vms(source).await }),
            self.hosts
                .run(now, || async move { fetch_host_usage(source).await }),
            self.placement
                .run(now, || async move { fetch_placement(source).await }),
        );
        if vms == PollOutcome::Updated {
            self.after_vm_refresh();
        } else if hosts == PollOutcome::Updated {
            self.follow_host();
        }
    }

    fn search_text(&self) -> Option<String> {
        Some(self.table.committed().text.clone())
    }

    fn commit_text(&mut self, purpose: TextPurpose, text: &str) -> Outcome {
        match purpose {
            TextPurpose::Search => {
                let vms = self.vms.snapshot().map(Vec::as_slice).unwrap_or_default();
                let outcome = filter_outcome(self.table.search(vms, text), "VMs");
                self.follow_host();
                outcome
            }
            TextPurpose::NewUser => Outcome::None,
        }
    }

    fn after_command(&mut self, command: &Command, failed: &[String]) {
        self.marks.clear();
        if let Command::Power {
            verb: Verb::Start,
            targets,
        } = command
        {
            let started = targets
                .iter()
                .filter(|target| !failed.contains(&target.id))
                .map(|target| target.id.clone())
                .collect::<Vec<_>>();
            debug!(count = started.len(), "tracking pending starts");
            self.pending_starts.extend(started);
        }
        self.vms.force_due();
        self.hosts.force_due();
    }

    fn status(&self) -> Option<String> {
        stale_status(&[
            self.vms.last_error(),
            self.hosts.last_error(),
            self.placement.last_error(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::{VmsScreen, can_restart, can_start, can_stop};
    use crate::app::run_command;
    use crate::input::Action;
    use crate::modal::Modal;
    use crate::model::{Record, ResourceKind, VmNicSummary, VmStatus};
    use crate::screen::{Command, Outcome, Screen, Target, TextPurpose};
    use crate::screens::tests::host;
    use crate::screens::vm_detail::tests::vm;
    use crate::session::test_session;
    use crate::source::Verb;
    use crate::source::fake::FakeSource;
    use std::sync::Arc;
    use tokio::time::{Duration, Instant};

    fn source() -> FakeSource {
        let mut web = vm("vm-1", "web-01", VmStatus::Up);
        web.nics = vec![VmNicSummary {
            name: "nic1".to_string(),
            vnic_profile_id: None,
            ipv4: vec!["10.0.0.5".to_string()],
        }];
        let mut db = vm("vm-2", "db-01", VmStatus::Down);
        db.host_id = None;
        let source = FakeSource::new().with(vec![
            Record::Vm(web),
            Record::Vm(db),
            Record::Vm(vm("vm-3", "app-01", VmStatus::Suspended)),
            Record::Host(host("h1", "host-a", "c1")),
            Record::Host(host("h2", "host-b", "c1")),
            Record::Host(host("h3", "host-c", "c2")),
        ]);
        source.set_statistics("h1", &[("memory.total", 100.0), ("memory.used", 40.0)]);
        source
    }

    async fn loaded(source: Arc<FakeSource>) -> VmsScreen {
        let mut screen = VmsScreen::new(test_session(source));
        screen.tick(Instant::now()).await;
        screen
    }

    fn names(screen: &VmsScreen) -> Vec<String> {
        screen
            .table
            .visible(screen.data())
            .iter()
            .map(|vm| vm.name.clone())
            .collect()
    }

    #[test]
    fn power_rules_follow_vm_status() {
        assert!(can_start(VmStatus::Down));
        assert!(can_start(VmStatus::Suspended));
        assert!(!can_start(VmStatus::Up));
        assert!(can_stop(VmStatus::PoweringUp));
        assert!(!can_stop(VmStatus::Down));
        assert!(can_restart(VmStatus::Up));
        assert!(!can_restart(VmStatus::Suspended));
    }

    #[tokio::test]
    async fn vms_are_sorted_and_host_of_cursor_is_highlighted() {
        let screen = loaded(Arc::new(source())).await;
        assert_eq!(names(&screen), vec!["app-01", "db-01", "web-01"]);
        assert!(screen.host_focus);
        assert_eq!(screen.host_pager.selected_index(), Some(0));
        assert_eq!(screen.host_data()[0].memory_percent(), Some(40.0));
    }

    #[tokio::test]
    async fn start_skips_ineligible_marked_vms_without_confirmation() {
        let mut screen = loaded(Arc::new(source())).await;
        screen.handle(&Action::ToggleMark);
        screen.handle(&Action::Down);
        screen.handle(&Action::ToggleMark);
        screen.handle(&Action::Down);
        screen.handle(&Action::ToggleMark);

        let Outcome::Run(command) = screen.handle(&Action::Command('s')) else {
            panic!("start runs without a confirmation");
        };
        assert_eq!(
            command,
            Command::Power {
                verb: Verb::Start,
                targets: vec![Target::new("vm-3", "app-01"), Target::new("vm-2", "db-01")],
            }
        );
    }

    #[tokio::test]
    async fn stop_asks_for_confirmation_and_reports_nothing_eligible() {
        let mut screen = loaded(Arc::new(source())).await;
        screen.handle(&Action::Down);
        assert!(matches!(
            screen.handle(&Action::Command('d')),
            Outcome::Status(message) if message == "No selected VM can stop"
        ));
        screen.handle(&Action::Down);
        let Outcome::Modal(Modal::Confirm(confirm)) = screen.handle(&Action::Command('r')) else {
            panic!("restart asks first");
        };
        assert!(!confirm.yes_selected);
        assert_eq!(confirm.command.target_label(), "web-01");
    }

    #[tokio::test]
    async fn migrate_offers_other_hosts_of_the_same_cluster() {
        let mut screen = loaded(Arc::new(source())).await;
        screen.handle(&Action::Down);
        assert!(matches!(
            screen.handle(&Action::Command('m')),
            Outcome::Modal(Modal::Notice { message, .. }) if message.starts_with("VM is Down")
        ));

        screen.handle(&Action::Down);
        let Outcome::Modal(Modal::Picker(picker)) = screen.handle(&Action::Command('m')) else {
            panic!("migrate opens the host picker");
        };
        assert_eq!(picker.choices, vec![Target::new("h2", "host-b")]);
    }

    #[tokio::test]
    async fn marks_drop_vanished_vms_and_pending_start_is_annotated() {
        let source = Arc::new(source());
        let mut screen = loaded(Arc::clone(&source)).await;
        screen.handle(&Action::Down);
        screen.handle(&Action::ToggleMark);
        assert_eq!(screen.marks.len(), 1);

        let command = Command::Power {
            verb: Verb::Start,
            targets: vec![Target::new("vm-3", "app-01")],
        };
        screen.after_command(&command, &[]);
        assert!(screen.marks.is_empty());
        screen.handle(&Action::ToggleMark);

        source.set(vec![
            Record::Vm(vm("vm-3", "app-01", VmStatus::WaitForLaunch)),
            Record::Vm(vm("vm-1", "web-01", VmStatus::Up)),
        ]);
        screen.tick(Instant::now() + Duration::from_secs(5)).await;
        assert!(screen.marks.is_empty());
        let app = screen.data()[0].clone();
        assert_eq!(screen.status_cell(&app), "wait_for_launch (starting...)");

        source.set(vec![Record::Vm(vm("vm-3", "app-01", VmStatus::Up))]);
        screen.tick(Instant::now() + Duration::from_secs(10)).await;
        let app = screen.data()[0].clone();
        assert_eq!(screen.status_cell(&app), "up");
    }

    #[tokio::test]
    async fn partial_start_failure_keeps_the_marker_on_started_vms() {
        let source = Arc::new(source());
        let mut screen = loaded(Arc::clone(&source)).await;
        screen.handle(&Action::ToggleMark);
        screen.handle(&Action::Down);
        screen.handle(&Action::ToggleMark);
        let Outcome::Run(command) = screen.handle(&Action::Command('s')) else {
            panic!("start runs without a confirmation");
        };

        source.fail_actions_on("vm-2", "storage unavailable");
        let failures = run_command(source.as_ref(), &command, Duration::from_secs(1)).await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].error.to_string().contains("db-01"));
        let failed = failures
            .into_iter()
            .map(|failure| failure.target_id)
            .collect::<Vec<_>>();
        screen.after_command(&command, &failed);

        assert!(screen.pending_starts.contains("vm-3"));
        assert!(!screen.pending_starts.contains("vm-2"));
        assert!(screen.marks.is_empty());
    }

    #[tokio::test]
    async fn hidden_marks_are_not_acted_on() {
        let mut screen = loaded(Arc::new(source())).await;
        screen.handle(&Action::ToggleMark);
        screen.handle(&Action::Down);
        screen.handle(&Action::Down);
        screen.handle(&Action::ToggleMark);
        assert_eq!(screen.marks.len(), 2);

        screen.commit_text(TextPurpose::Search, "web");
        let Outcome::Modal(Modal::Confirm(confirm)) = screen.handle(&Action::Command('d')) else {
            panic!("stop asks first");
        };
        assert_eq!(
            confirm.command,
            Command::Power {
                verb: Verb::Stop,
                targets: vec![Target::new("vm-1", "web-01")],
            }
        );
    }

    #[tokio::test]
    async fn migrate_refuses_several_marked_vms() {
        let mut screen = loaded(Arc::new(source())).await;
        screen.handle(&Action::ToggleMark);
        screen.handle(&Action::Down);
        screen.handle(&Action::Down);
        screen.handle(&Action::ToggleMark);
        assert!(matches!(
            screen.handle(&Action::Command('m')),
            Outcome::Status(message) if message == "Migrate takes one VM; 2 are marked"
        ));
    }

    #[tokio::test]
    async fn failing_poll_keeps_rows_and_reports_staleness() {
        let source = Arc::new(source());
        let mut screen = loaded(Arc::clone(&source)).await;
        source.fail_lists(ResourceKind::Vm, 1);
        screen.tick(Instant::now() + Duration::from_secs(5)).await;
        assert_eq!(names(&screen).len(), 3);
        assert!(
            screen
                .status()
                .is_some_and(|status| status.ends_with("(showing cached data)"))
        );
    }

    #[tokio::test]
    async fn search_by_ip_narrows_the_list() {
        let mut screen = loaded(Arc::new(source())).await;
        assert!(matches!(
            screen.commit_text(TextPurpose::Search, "10.0.0"),
            Outcome::Status(message) if message == "1 VMs"
        ));
        assert_eq!(names(&screen), vec!["web-01"]);
        assert!(matches!(
            screen.commit_text(TextPurpose::Search, "nothing-like-this"),
            Outcome::Modal(_)
        ));
        assert_eq!(names(&screen), vec!["web-01"]);
    }
}

pub mod clusters;
pub mod data_centers;
pub mod disks;
pub mod events;
pub mod hosts;
pub mod menu;
pub mod networks;
pub mod storage_domains;
pub mod users;
pub mod vm_detail;
pub mod vms;

use crate::error::{DashError, SourceError};
use crate::filter::{FilterPipeline, FilterState, Searchable};
use crate::format::PLACEHOLDER;
use crate::input::Action;
use crate::linkage::{Linkage, MasterList};
use crate::modal::Modal;
use crate::model::{Host, ResourceKind};
use crate::paging::{PagePolicy, Pager};
use crate::screen::{Composer, Outcome};
use crate::source::{DataSource, Statistics, list_typed};
use crate::table::{Row, render_table};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;

/// A host together with its latest statistics sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HostUsage {
    pub host: Host,
    pub stats: Statistics,
}

impl HostUsage {
    pub fn memory_total(&self) -> Option<f64> {
        self.stats.get("memory.total").copied()
    }

    pub fn memory_used(&self) -> Option<f64> {
        self.stats.get("memory.used").copied()
    }

    pub fn memory_percent(&self) -> Option<f64> {
        crate::format::percent(self.memory_used()?, self.memory_total()?)
    }

    /// Busy share of the CPUs: 100 minus idle, or the load average when idle is absent.
    pub fn cpu_percent(&self) -> Option<f64> {
        if let Some(idle) = self.stats.get("cpu.current.idle") {
            return Some((100.0 - idle).clamp(0.0, 100.0));
        }
        self.stats
            .iter()
            .find(|(name, _)| name.starts_with("cpu.load.avg"))
            .map(|(_, value)| *value)
    }

    pub fn booted_at(&self) -> Option<DateTime<Utc>> {
        let seconds = *self.stats.get("boot.time")?;
        DateTime::from_timestamp(seconds as i64, 0)
    }
}

/// Lists hosts and samples each one's statistics concurrently.
///
/// A host whose statistics call fails is kept with an empty sample.
pub async fn fetch_host_usage(source: &dyn DataSource) -> Result<Vec<HostUsage>, SourceError> {
    let hosts = list_typed::<Host>(source, None).await?;
    let samples = join_all(
        hosts
            .iter()
            .map(|host| source.statistics(ResourceKind::Host, &host.id)),
    )
    .await;
    Ok(hosts
        .into_iter()
        .zip(samples)
        .map(|(host, stats)| HostUsage {
            host,
            stats: stats.unwrap_or_default(),
        })
        .collect())
}

/// Maps ids to display names.
pub fn name_index<T>(items: &[T], key: impl Fn(&T) -> (&str, &str)) -> HashMap<String, String> {
    items
        .iter()
        .map(|item| {
            let (id, name) = key(item);
            (id.to_string(), name.to_string())
        })
        .collect()
}

pub fn lookup(index: &HashMap<String, String>, id: Option<&str>) -> String {
    id.and_then(|id| index.get(id))
        .cloned()
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Status line for a screen whose polls are failing.
pub fn stale_status(errors: &[Option<&str>]) -> Option<String> {
    errors
        .iter()
        .flatten()
        .next()
        .map(|error| format!("{error} (showing cached data)"))
}

pub fn section_title(title: &str, pager: &Pager) -> String {
    match pager.policy() {
        PagePolicy::Wraparound => format!("- {title} ({})", pager.len()),
        PagePolicy::Clamped | PagePolicy::Cyclic => format!(
            "- {title} ({}/{}) {}",
            pager.visible_len(),
            pager.len(),
            pager.page_label()
        ),
    }
}

/// A searchable, paged table over a snapshot the screen owns.
///
/// The cursor is pinned by record id; the filtered index list is rebuilt
/// whenever the data or the committed filter changes.
pub struct FilteredList<T: Searchable> {
    pipeline: FilterPipeline<T>,
    list: MasterList,
    indices: Vec<usize>,
    version: u64,
    key: fn(&T) -> &str,
}

impl<T: Searchable> FilteredList<T> {
    pub fn new(pager: Pager, key: fn(&T) -> &str) -> Self {
        Self {
            pipeline: FilterPipeline::new(),
            list: MasterList::new(pager),
            indices: Vec::new(),
            version: 0,
            key,
        }
    }

    pub fn pager(&self) -> &Pager {
        self.list.pager()
    }

    pub fn committed(&self) -> &FilterState<T::Category> {
        self.pipeline.committed()
    }

    pub fn highlight(&self) -> Option<usize> {
        self.list.highlight()
    }

    /// Takes new data; the cursor stays on the record it was on.
    pub fn refresh(&mut self, data: &[T]) {
        self.version += 1;
        self.indices = self.pipeline.apply(data, self.version).to_vec();
        let ids = self.ids(data);
        self.list.replace_ids(ids);
    }

    /// Commits new search text and returns to the first row.
    pub fn search(&mut self, data: &[T], text: &str) -> Result<usize, DashError> {
        let candidate = self.pipeline.committed().with_text(text);
        let count = self.pipeline.try_commit(candidate, data, self.version)?;
        self.reset(data);
        Ok(count)
    }

    pub fn cycle_category(&mut self, all: &[T::Category], data: &[T]) -> Result<usize, DashError> {
        let count = self.pipeline.cycle_category(all, data, self.version)?;
        self.reset(data);
        Ok(count)
    }

    pub fn visible<'a>(&self, data: &'a [T]) -> Vec<&'a T> {
        let range = self.list.pager().visible_range();
        self.indices
            .get(range)
            .unwrap_or_default()
            .iter()
            .filter_map(|index| data.get(*index))
            .collect()
    }

    /// Every row the committed filter keeps, across all pages.
    pub fn filtered<'a>(&self, data: &'a [T]) -> Vec<&'a T> {
        self.indices
            .iter()
            .filter_map(|index| data.get(*index))
            .collect()
    }

    pub fn selected<'a>(&self, data: &'a [T]) -> Option<&'a T> {
        let position = self.list.selected_index()?;
        data.get(*self.indices.get(position)?)
    }

    /// Up/Down move the cursor, `n`/`p` page.
    pub fn navigate(&mut self, action: &Action) -> bool {
        match action {
            Action::Up => self.list.move_cursor(-1),
            Action::Down => self.list.move_cursor(1),
            Action::NextPage => self.list.next_page(),
            Action::PrevPage => self.list.prev_page(),
            _ => false,
        }
    }

    fn reset(&mut self, data: &[T]) {
        self.indices = self.pipeline.apply(data, self.version).to_vec();
        let ids = self.ids(data);
        self.list.reset_ids(ids);
    }

    fn ids(&self, data: &[T]) -> Vec<String> {
        self.indices
            .iter()
            .filter_map(|index| data.get(*index))
            .map(|record| (self.key)(record).to_string())
            .collect()
    }
}

/// Heading text for a filtered table: count, filter and page.
pub fn filtered_title<C: Copy + std::fmt::Display>(
    title: &str,
    shown: usize,
    total: usize,
    filter: &FilterState<C>,
    pager: &Pager,
) -> String {
    let mut out = format!("{title} ({shown}/{total})");
    if filter.is_active() {
        out.push_str(&format!(" filter: {}", filter.describe()));
    }
    out.push_str(&format!("  {}", pager.page_label()));
    out
}

/// Turns a filter commit into the screen's reply: a status line on success,
/// a notice when the guard rejects it.
pub fn filter_outcome(result: Result<usize, DashError>, noun: &str) -> Outcome {
    match result {
        Ok(count) => Outcome::Status(format!("{count} {noun}")),
        Err(error) => Outcome::Modal(Modal::notice("Filter", error.to_string())),
    }
}

/// A wraparound master table plus the tables linked to its selection.
pub struct MasterDetail<S> {
    master: MasterList,
    linkage: Linkage<S>,
}

impl<S> MasterDetail<S> {
    pub fn new(linkage: Linkage<S>) -> Self {
        Self {
            master: MasterList::new(Pager::wraparound()),
            linkage,
        }
    }

    pub fn master(&self) -> &MasterList {
        &self.master
    }

    pub fn linkage(&self) -> &Linkage<S> {
        &self.linkage
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.master.selected_id()
    }

    /// Takes a fresh snapshot: the cursor stays on its entity and the
    /// dependents follow whatever ends up selected.
    pub fn update(&mut self, snapshot: &S, ids: Vec<String>) {
        self.master.replace_ids(ids);
        self.linkage.sync(snapshot, self.master.selected_id());
    }

    /// Up/Down move the master cursor; `n`/`p` page the dependents.
    pub fn navigate(&mut self, snapshot: Option<&S>, action: &Action) -> bool {
        match action {
            Action::Up | Action::Down => {
                let delta = if *action == Action::Up { -1 } else { 1 };
                let moved = self.master.move_cursor(delta);
                if let Some(snapshot) = snapshot {
                    self.linkage.sync(snapshot, self.master.selected_id());
                }
                moved
            }
            Action::NextPage | Action::PrevPage => {
                let mut changed = false;
                for index in 0..self.linkage.dependents().len() {
                    if let Some(dependent) = self.linkage.dependent_mut(index) {
                        changed |= if *action == Action::NextPage {
                            dependent.next_page()
                        } else {
                            dependent.prev_page()
                        };
                    }
                }
                changed
            }
            _ => false,
        }
    }

    pub fn compose_dependents(&self, composer: &mut Composer) {
        for dependent in self.linkage.dependents() {
            composer.gap();
            composer.heading(section_title(dependent.title(), dependent.pager()));
            composer.table(render_table(
                dependent.columns(),
                dependent.visible_rows(),
                Row::clone,
                None,
            ));
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{FilteredList, HostUsage, MasterDetail, fetch_host_usage, stale_status};
    use crate::input::Action;
    use crate::linkage::{Dependent, Linkage};
    use crate::model::{Host, HostStatus, Record, Vm, VmStatus};
    use crate::screens::vm_detail::tests::vm;
    use crate::paging::Pager;
    use crate::source::fake::FakeSource;
    use crate::table::{ColumnSpec, Row};

    pub(crate) fn host(id: &str, name: &str, cluster: &str) -> Host {
        Host {
            id: id.to_string(),
            name: name.to_string(),
            status: HostStatus::Up,
            address: None,
            cluster_id: Some(cluster.to_string()),
            cpu: None,
            memory: None,
        }
    }

    #[tokio::test]
    async fn host_usage_keeps_hosts_without_statistics() {
        let source = FakeSource::new().with(vec![
            Record::Host(host("h1", "host-a", "c1")),
            Record::Host(host("h2", "host-b", "c1")),
        ]);
        source.set_statistics(
            "h1",
            &[
                ("memory.total", 200.0),
                ("memory.used", 50.0),
                ("cpu.current.idle", 90.0),
            ],
        );

        let usage = fetch_host_usage(&source).await.unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].memory_percent(), Some(25.0));
        assert_eq!(usage[0].cpu_percent(), Some(10.0));
        assert_eq!(usage[1].memory_percent(), None);
    }

    #[test]
    fn cpu_falls_back_to_load_average() {
        let usage = HostUsage {
            host: host("h1", "host-a", "c1"),
            stats: [("cpu.load.avg.5m".to_string(), 3.5)].into_iter().collect(),
        };
        assert_eq!(usage.cpu_percent(), Some(3.5));
    }

    #[test]
    fn stale_status_reports_first_error() {
        assert_eq!(stale_status(&[None, None]), None);
        assert_eq!(
            stale_status(&[None, Some("hosts refresh failed: boom")]).as_deref(),
            Some("hosts refresh failed: boom (showing cached data)")
        );
    }

    const COLUMNS: &[ColumnSpec] = &[ColumnSpec::new("Item", 8)];

    fn items(snapshot: &Vec<(&'static str, usize)>, id: &str) -> Vec<Row> {
        let count = snapshot
            .iter()
            .find(|(key, _)| *key == id)
            .map(|(_, count)| *count)
            .unwrap_or(0);
        (0..count).map(|index| vec![format!("{id}-{index}")]).collect()
    }

    #[test]
    fn moving_the_master_resets_dependent_pages() {
        let snapshot = vec![("a", 9), ("b", 4)];
        let mut view = MasterDetail::new(Linkage::new().register(Dependent::new(
            "Items",
            COLUMNS,
            Pager::paged(3),
            items,
        )));
        view.update(&snapshot, vec!["a".to_string(), "b".to_string()]);
        assert!(view.navigate(Some(&snapshot), &Action::NextPage));
        assert_eq!(view.linkage().dependents()[0].pager().page(), 1);

        assert!(view.navigate(Some(&snapshot), &Action::Down));
        assert_eq!(view.selected_id(), Some("b"));
        let dependent = &view.linkage().dependents()[0];
        assert_eq!(dependent.pager().page(), 0);
        assert_eq!(dependent.rows().len(), 4);
        assert_eq!(dependent.visible_rows()[0], vec!["b-0".to_string()]);
    }

    fn vm_key(vm: &Vm) -> &str {
        &vm.id
    }

    #[test]
    fn filtered_cursor_follows_its_record_and_rejects_empty_searches() {
        let mut data = vec![
            vm("1", "alpha", VmStatus::Up),
            vm("2", "bravo", VmStatus::Down),
            vm("3", "charlie", VmStatus::Up),
        ];
        let mut list = FilteredList::new(Pager::paged(2), vm_key);
        list.refresh(&data);
        list.navigate(&Action::Down);
        assert_eq!(list.selected(&data).map(|vm| vm.name.as_str()), Some("bravo"));

        data.insert(0, vm("0", "aardvark", VmStatus::Up));
        list.refresh(&data);
        assert_eq!(list.selected(&data).map(|vm| vm.name.as_str()), Some("bravo"));
        assert_eq!(list.pager().page(), 1);

        assert!(list.search(&data, "zzz").is_err());
        assert_eq!(list.pager().len(), 4);
        assert_eq!(list.selected(&data).map(|vm| vm.name.as_str()), Some("bravo"));

        assert_eq!(list.search(&data, "ar").unwrap(), 2);
        let names = list
            .visible(&data)
            .iter()
            .map(|vm| vm.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["aardvark", "charlie"]);
        assert_eq!(list.selected(&data).map(|vm| vm.name.as_str()), Some("aardvark"));
    }
}

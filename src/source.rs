use crate::error::SourceError;
use crate::model::{Record, ResourceKind, TypedRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

pub type Statistics = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ListFilter {
    /// Engine search expression, e.g. `vm.name=web-01`.
    pub search: Option<String>,
    /// Lists the sub-collection of this parent instead of the top level.
    pub parent: Option<(ResourceKind, String)>,
    pub max: Option<u32>,
    /// Nested links to inline, e.g. `nics.reporteddevices`.
    pub follow: Option<String>,
}

impl ListFilter {
    pub fn search(expression: impl Into<String>) -> Self {
        Self {
            search: Some(expression.into()),
            ..Self::default()
        }
    }

    pub fn under(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            parent: Some((kind, id.into())),
            ..Self::default()
        }
    }

    pub fn with_max(mut self, max: u32) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_follow(mut self, follow: impl Into<String>) -> Self {
        self.follow = Some(follow.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Start,
    Stop,
    Shutdown,
    Reboot,
    Migrate,
    Provision,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
            Self::Reboot => "reboot",
            Self::Migrate => "migrate",
            Self::Provision => "provision",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Shutdown => "Shutdown",
            Self::Reboot => "Restart",
            Self::Migrate => "Migrate",
            Self::Provision => "Add user",
        }
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionParams {
    pub target_host_id: Option<String>,
    pub force: bool,
    pub user_name: Option<String>,
    pub domain: Option<String>,
}

/// Boundary between the dashboard and whatever serves the inventory.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, SourceError>;

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Record, SourceError>;

    async fn action(
        &self,
        kind: ResourceKind,
        id: &str,
        verb: Verb,
        params: ActionParams,
    ) -> Result<(), SourceError>;

    async fn statistics(&self, kind: ResourceKind, id: &str) -> Result<Statistics, SourceError>;
}

/// Lists `T::KIND` and keeps only records of that type.
pub async fn list_typed<T: TypedRecord>(
    source: &dyn DataSource,
    filter: Option<&ListFilter>,
) -> Result<Vec<T>, SourceError> {
    let records = source.list(T::KIND, filter).await?;
    Ok(records.into_iter().filter_map(T::from_record).collect())
}

pub async fn get_typed<T: TypedRecord>(
    source: &dyn DataSource,
    id: &str,
) -> Result<T, SourceError> {
    let record = source.get(T::KIND, id).await?;
    T::from_record(record).ok_or_else(|| SourceError::NotFound {
        kind: T::KIND,
        id: id.to_string(),
    })
}

#[cfg(test)]
pub mod fake {
    use super::{ActionParams, DataSource, ListFilter, Statistics, Verb};
    use crate::error::SourceError;
    use crate::model::{Record, ResourceKind};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, sleep};

    /// Scripted in-memory source for screen and app tests.
    #[derive(Default)]
    pub struct FakeSource {
        records: Mutex<HashMap<ResourceKind, Vec<Record>>>,
        children: Mutex<HashMap<(ResourceKind, String, ResourceKind), Vec<Record>>>,
        statistics: Mutex<HashMap<String, Statistics>>,
        failing_lists: Mutex<HashMap<ResourceKind, usize>>,
        failing_actions: Mutex<Option<String>>,
        failing_targets: Mutex<HashMap<String, String>>,
        actions: Mutex<Vec<(ResourceKind, String, Verb, ActionParams)>>,
        list_calls: AtomicUsize,
        read_delay: Mutex<Option<Duration>>,
    }

    impl FakeSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(self, records: Vec<Record>) -> Self {
            self.set(records);
            self
        }

        /// Replaces every record of the kinds present in `records`.
        pub fn set(&self, records: Vec<Record>) {
            let mut guard = self.records.lock().unwrap();
            let mut grouped: HashMap<ResourceKind, Vec<Record>> = HashMap::new();
            for record in records {
                grouped.entry(record.kind()).or_default().push(record);
            }
            for (kind, records) in grouped {
                guard.insert(kind, records);
            }
        }

        pub fn clear(&self, kind: ResourceKind) {
            self.records.lock().unwrap().remove(&kind);
        }

        pub fn set_children(
            &self,
            parent: ResourceKind,
            parent_id: &str,
            kind: ResourceKind,
            records: Vec<Record>,
        ) {
            self.children
                .lock()
                .unwrap()
                .insert((parent, parent_id.to_string(), kind), records);
        }

        pub fn set_statistics(&self, id: &str, values: &[(&str, f64)]) {
            let stats = values
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect();
            self.statistics.lock().unwrap().insert(id.to_string(), stats);
        }

        pub fn fail_lists(&self, kind: ResourceKind, times: usize) {
            self.failing_lists.lock().unwrap().insert(kind, times);
        }

        pub fn fail_actions(&self, detail: &str) {
            *self.failing_actions.lock().unwrap() = Some(detail.to_string());
        }

        /// Makes every `list` and `statistics` call wait `delay` first.
        pub fn stall_reads(&self, delay: Duration) {
            *self.read_delay.lock().unwrap() = Some(delay);
        }

        async fn read_pause(&self) {
            let delay = *self.read_delay.lock().unwrap();
            if let Some(delay) = delay {
                sleep(delay).await;
            }
        }

        /// Fails actions on one target id only.
        pub fn fail_actions_on(&self, id: &str, detail: &str) {
            self.failing_targets
                .lock()
                .unwrap()
                .insert(id.to_string(), detail.to_string());
        }

        pub fn actions(&self) -> Vec<(ResourceKind, String, Verb, ActionParams)> {
            self.actions.lock().unwrap().clone()
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSource for FakeSource {
        async fn list(
            &self,
            kind: ResourceKind,
            filter: Option<&ListFilter>,
        ) -> Result<Vec<Record>, SourceError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.read_pause().await;
            {
                let mut failing = self.failing_lists.lock().unwrap();
                if let Some(remaining) = failing.get_mut(&kind)
                    && *remaining > 0
                {
                    *remaining -= 1;
                    return Err(SourceError::Transport {
                        endpoint: format!("{kind}"),
                        message: "connection reset".to_string(),
                    });
                }
            }
            if let Some((parent, parent_id)) = filter.and_then(|filter| filter.parent.clone()) {
                return Ok(self
                    .children
                    .lock()
                    .unwrap()
                    .get(&(parent, parent_id, kind))
                    .cloned()
                    .unwrap_or_default());
            }
            let mut records = self
                .records
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .unwrap_or_default();
            if let Some(max) = filter.and_then(|filter| filter.max) {
                records.truncate(max as usize);
            }
            Ok(records)
        }

        async fn get(&self, kind: ResourceKind, id: &str) -> Result<Record, SourceError> {
            self.records
                .lock()
                .unwrap()
                .get(&kind)
                .and_then(|records| records.iter().find(|record| record.id() == id).cloned())
                .ok_or_else(|| SourceError::NotFound {
                    kind,
                    id: id.to_string(),
                })
        }

        async fn action(
            &self,
            kind: ResourceKind,
            id: &str,
            verb: Verb,
            params: ActionParams,
        ) -> Result<(), SourceError> {
            self.actions
                .lock()
                .unwrap()
                .push((kind, id.to_string(), verb, params));
            let failure = self
                .failing_actions
                .lock()
                .unwrap()
                .clone()
                .or_else(|| self.failing_targets.lock().unwrap().get(id).cloned());
            if let Some(detail) = failure {
                return Err(SourceError::Remote {
                    endpoint: format!("{kind}/{id}/{verb}"),
                    status: 409,
                    detail,
                });
            }
            Ok(())
        }

        async fn statistics(
            &self,
            kind: ResourceKind,
            id: &str,
        ) -> Result<Statistics, SourceError> {
            self.read_pause().await;
            self.statistics
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| SourceError::NotFound {
                    kind,
                    id: id.to_string(),
                })
        }
    }
}

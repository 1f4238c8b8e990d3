// REST data source for oVirt-compatible engines (JSON representation, API v4).

use crate::error::SourceError;
use crate::model::{
    Cluster, CpuTopology, DataCenter, Disk, DiskAttachment, DiskStatus, Event, Host, HostNic,
    HostStatus, Network, Nic, Record, ReportedDevice, ResourceKind, Severity, StorageDomain, User,
    Vm, VmNicSummary, VmStatus, VnicProfile,
};
use crate::source::{ActionParams, DataSource, ListFilter, Statistics, Verb};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters for [`EngineClient::connect`].
#[derive(Clone)]
pub struct EngineCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
    pub insecure: bool,
}

impl std::fmt::Debug for EngineCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

pub struct EngineClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
}

impl EngineClient {
    pub fn connect(credentials: &EngineCredentials) -> Result<Self, SourceError> {
        let base_url = normalize_base_url(&credentials.url)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("Version", HeaderValue::from_static("4"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(credentials.insecure)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| SourceError::Transport {
                endpoint: base_url.to_string(),
                message: error.to_string(),
            })?;

        Ok(Self {
            http,
            base_url,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches the API root and returns the product name and version.
    pub async fn probe(&self) -> Result<String, SourceError> {
        let body = self.get_json("", &[]).await?;
        let product = &body["product_info"];
        let name = text(product, "name").unwrap_or_else(|| "engine".to_string());
        Ok(match text(&product["version"], "full_version") {
            Some(version) => format!("{name} {version}"),
            None => name,
        })
    }

    fn url(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|error| SourceError::Transport {
                endpoint: path.to_string(),
                message: error.to_string(),
            })
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, SourceError> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .query(params)
            .send()
            .await
            .map_err(|error| transport(path, &error))?;
        decode(path, response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SourceError> {
        let url = self.url(path)?;
        debug!("POST {url}");
        let response = self
            .http
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await
            .map_err(|error| transport(path, &error))?;
        decode(path, response).await
    }
}

#[async_trait]
impl DataSource for EngineClient {
    async fn list(
        &self,
        kind: ResourceKind,
        filter: Option<&ListFilter>,
    ) -> Result<Vec<Record>, SourceError> {
        let path = collection_path(kind, filter)?;
        let mut params = Vec::new();
        if let Some(filter) = filter {
            if let Some(search) = &filter.search {
                params.push(("search", search.clone()));
            }
            if let Some(max) = filter.max {
                params.push(("max", max.to_string()));
            }
            if let Some(follow) = &filter.follow {
                params.push(("follow", follow.clone()));
            }
        }

        let body = self.get_json(&path, &params).await?;
        Ok(parse_collection(kind, &body))
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Record, SourceError> {
        let segment = top_level_segment(kind).ok_or(SourceError::Unsupported {
            kind,
            operation: "get",
        })?;
        let path = format!("{segment}/{id}");
        let body = self.get_json(&path, &[]).await?;
        parse_record(kind, &body).ok_or_else(|| SourceError::Decode {
            endpoint: path,
            message: "record without id".to_string(),
        })
    }

    async fn action(
        &self,
        kind: ResourceKind,
        id: &str,
        verb: Verb,
        params: ActionParams,
    ) -> Result<(), SourceError> {
        let (path, body) = action_request(kind, id, verb, &params)?;
        debug!(%verb, target = id, "engine action");
        self.post_json(&path, &body).await.map(|_| ())
    }

    async fn statistics(&self, kind: ResourceKind, id: &str) -> Result<Statistics, SourceError> {
        let segment = match kind {
            ResourceKind::Host | ResourceKind::Vm => top_level_segment(kind),
            _ => None,
        }
        .ok_or(SourceError::Unsupported {
            kind,
            operation: "statistics",
        })?;
        let body = self
            .get_json(&format!("{segment}/{id}/statistics"), &[])
            .await?;
        Ok(parse_statistics(&body))
    }
}

fn normalize_base_url(raw: &str) -> Result<Url, SourceError> {
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(&format!("{trimmed}/")).map_err(|error| SourceError::Transport {
        endpoint: raw.to_string(),
        message: format!("invalid engine URL: {error}"),
    })
}

/// Host and port to probe before talking HTTP.
pub fn engine_socket(url: &str) -> Option<(String, u16)> {
    let url = Url::parse(url.trim()).ok()?;
    let host = url.host_str()?.to_string();
    Some((host, url.port_or_known_default().unwrap_or(443)))
}

fn transport(path: &str, error: &reqwest::Error) -> SourceError {
    SourceError::Transport {
        endpoint: display_path(path),
        message: error.to_string(),
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "api".to_string()
    } else {
        path.to_string()
    }
}

async fn decode(path: &str, response: reqwest::Response) -> Result<Value, SourceError> {
    let status = response.status();
    let raw = response
        .text()
        .await
        .map_err(|error| transport(path, &error))?;

    if status.is_success() {
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&raw).map_err(|error| SourceError::Decode {
            endpoint: display_path(path),
            message: error.to_string(),
        });
    }

    Err(remote_error(path, status, &raw))
}

fn remote_error(path: &str, status: StatusCode, raw: &str) -> SourceError {
    let detail = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|body| fault_detail(&body))
        .unwrap_or_else(|| {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('<') {
                status.to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });
    SourceError::Remote {
        endpoint: display_path(path),
        status: status.as_u16(),
        detail,
    }
}

fn fault_detail(body: &Value) -> Option<String> {
    let fault = if body.get("fault").is_some() {
        &body["fault"]
    } else {
        body
    };
    match (text(fault, "reason"), text(fault, "detail")) {
        (Some(reason), Some(detail)) => Some(format!("{reason} {detail}")),
        (Some(reason), None) => Some(reason),
        (None, Some(detail)) => Some(detail),
        (None, None) => None,
    }
}

fn top_level_segment(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Vm => Some("vms"),
        ResourceKind::Host => Some("hosts"),
        ResourceKind::Cluster => Some("clusters"),
        ResourceKind::DataCenter => Some("datacenters"),
        ResourceKind::Network => Some("networks"),
        ResourceKind::VnicProfile => Some("vnicprofiles"),
        ResourceKind::StorageDomain => Some("storagedomains"),
        ResourceKind::Disk => Some("disks"),
        ResourceKind::User => Some("users"),
        ResourceKind::Event => Some("events"),
        ResourceKind::DiskAttachment
        | ResourceKind::Nic
        | ResourceKind::HostNic
        | ResourceKind::ReportedDevice => None,
    }
}

fn child_segment(parent: ResourceKind, kind: ResourceKind) -> Option<&'static str> {
    match (parent, kind) {
        (ResourceKind::Vm, ResourceKind::DiskAttachment) => Some("diskattachments"),
        (ResourceKind::Vm, ResourceKind::Nic) => Some("nics"),
        (ResourceKind::Vm, ResourceKind::ReportedDevice) => Some("reporteddevices"),
        (ResourceKind::Host, ResourceKind::HostNic) => Some("nics"),
        (ResourceKind::Cluster, ResourceKind::Network) => Some("networks"),
        (ResourceKind::DataCenter, ResourceKind::StorageDomain) => Some("storagedomains"),
        (ResourceKind::DataCenter, ResourceKind::Network) => Some("networks"),
        (ResourceKind::DataCenter, ResourceKind::Cluster) => Some("clusters"),
        (ResourceKind::Network, ResourceKind::VnicProfile) => Some("vnicprofiles"),
        (ResourceKind::StorageDomain, ResourceKind::Disk) => Some("disks"),
        _ => None,
    }
}

fn collection_path(kind: ResourceKind, filter: Option<&ListFilter>) -> Result<String, SourceError> {
    if let Some((parent, parent_id)) = filter.and_then(|filter| filter.parent.as_ref()) {
        let parent_segment = top_level_segment(*parent);
        let child = child_segment(*parent, kind);
        return match (parent_segment, child) {
            (Some(parent_segment), Some(child)) => {
                Ok(format!("{parent_segment}/{parent_id}/{child}"))
            }
            _ => Err(SourceError::Unsupported {
                kind,
                operation: "list under this parent",
            }),
        };
    }

    top_level_segment(kind)
        .map(str::to_string)
        .ok_or(SourceError::Unsupported {
            kind,
            operation: "list without a parent",
        })
}

fn collection_key(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Vm => "vm",
        ResourceKind::Host => "host",
        ResourceKind::Cluster => "cluster",
        ResourceKind::DataCenter => "data_center",
        ResourceKind::Network => "network",
        ResourceKind::VnicProfile => "vnic_profile",
        ResourceKind::StorageDomain => "storage_domain",
        ResourceKind::Disk => "disk",
        ResourceKind::DiskAttachment => "disk_attachment",
        ResourceKind::Nic => "nic",
        ResourceKind::HostNic => "host_nic",
        ResourceKind::ReportedDevice => "reported_device",
        ResourceKind::User => "user",
        ResourceKind::Event => "event",
    }
}

fn action_request(
    kind: ResourceKind,
    id: &str,
    verb: Verb,
    params: &ActionParams,
) -> Result<(String, Value), SourceError> {
    let unsupported = SourceError::Unsupported {
        kind,
        operation: verb.as_str(),
    };
    match (kind, verb) {
        (ResourceKind::User, Verb::Provision) => {
            let user_name = params.user_name.clone().ok_or(unsupported)?;
            let domain = params
                .domain
                .clone()
                .unwrap_or_else(|| "internal-authz".to_string());
            Ok((
                "users".to_string(),
                json!({
                    "user_name": user_name,
                    "domain": { "name": domain },
                }),
            ))
        }
        (ResourceKind::Vm, Verb::Migrate) => {
            let host = params.target_host_id.clone().ok_or(unsupported)?;
            Ok((format!("vms/{id}/migrate"), json!({ "host": { "id": host } })))
        }
        (ResourceKind::Vm | ResourceKind::Host, Verb::Provision | Verb::Migrate) => {
            Err(unsupported)
        }
        (ResourceKind::Vm, Verb::Stop | Verb::Shutdown) if params.force => Ok((
            format!("vms/{id}/{verb}"),
            json!({ "force": true }),
        )),
        (ResourceKind::Vm, _) => Ok((format!("vms/{id}/{verb}"), json!({}))),
        _ => Err(unsupported),
    }
}

// Value helpers. The engine sends most scalars as JSON strings.

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn number(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn flag(value: &Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    let millis = match value.get(key)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }?;
    DateTime::from_timestamp_millis(millis)
}

fn link_id(value: &Value, key: &str) -> Option<String> {
    text(value.get(key)?, "id")
}

fn items<'a>(value: &'a Value, outer: &str, inner: &str) -> &'a [Value] {
    value
        .get(outer)
        .and_then(|outer| outer.get(inner))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn topology(value: &Value) -> Option<CpuTopology> {
    let topology = value.get("cpu")?.get("topology")?;
    Some(CpuTopology {
        sockets: number(topology, "sockets").unwrap_or(1) as u32,
        cores: number(topology, "cores").unwrap_or(1) as u32,
        threads: number(topology, "threads").unwrap_or(1) as u32,
    })
}

fn version(value: &Value) -> Option<String> {
    let version = value.get("version")?;
    match (text(version, "major"), text(version, "minor")) {
        (Some(major), Some(minor)) => Some(format!("{major}.{minor}")),
        (Some(major), None) => Some(major),
        _ => text(version, "full_version"),
    }
}

fn ipv4_addresses(device: &Value) -> Vec<String> {
    addresses(device, "v4")
}

fn addresses(device: &Value, family: &str) -> Vec<String> {
    items(device, "ips", "ip")
        .iter()
        .filter(|ip| text(ip, "version").is_none_or(|version| version == family))
        .filter_map(|ip| text(ip, "address"))
        .filter(|address| (family == "v4") != address.contains(':'))
        .collect()
}

pub fn parse_collection(kind: ResourceKind, body: &Value) -> Vec<Record> {
    body.get(collection_key(kind))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| parse_record(kind, entry))
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_record(kind: ResourceKind, value: &Value) -> Option<Record> {
    let id = text(value, "id")?;
    let name = text(value, "name").unwrap_or_default();
    let record = match kind {
        ResourceKind::Vm => Record::Vm(Vm {
            id,
            name,
            status: VmStatus::from_api(&text(value, "status").unwrap_or_default()),
            host_id: link_id(value, "host"),
            cluster_id: link_id(value, "cluster"),
            start_time: timestamp(value, "start_time"),
            memory: number(value, "memory"),
            guaranteed_memory: value
                .get("memory_policy")
                .and_then(|policy| number(policy, "guaranteed")),
            cpu: topology(value),
            os: value.get("os").and_then(|os| text(os, "type")),
            chipset: text(value, "custom_emulated_machine")
                .or_else(|| value.get("bios").and_then(|bios| text(bios, "type"))),
            high_availability: value
                .get("high_availability")
                .and_then(|ha| flag(ha, "enabled")),
            description: text(value, "description"),
            nics: items(value, "nics", "nic")
                .iter()
                .map(|nic| VmNicSummary {
                    name: text(nic, "name").unwrap_or_default(),
                    vnic_profile_id: link_id(nic, "vnic_profile"),
                    ipv4: items(nic, "reported_devices", "reported_device")
                        .iter()
                        .flat_map(ipv4_addresses)
                        .collect(),
                })
                .collect(),
        }),
        ResourceKind::Host => Record::Host(Host {
            id,
            name,
            status: HostStatus::from_api(&text(value, "status").unwrap_or_default()),
            address: text(value, "address"),
            cluster_id: link_id(value, "cluster"),
            cpu: topology(value),
            memory: number(value, "memory"),
        }),
        ResourceKind::Cluster => Record::Cluster(Cluster {
            id,
            name,
            data_center_id: link_id(value, "data_center"),
            cpu_type: value.get("cpu").and_then(|cpu| text(cpu, "type")),
            version: version(value),
            description: text(value, "description"),
        }),
        ResourceKind::DataCenter => Record::DataCenter(DataCenter {
            id,
            name,
            status: text(value, "status"),
            version: version(value),
            description: text(value, "description"),
            comment: text(value, "comment"),
        }),
        ResourceKind::Network => Record::Network(Network {
            id,
            name,
            data_center_id: link_id(value, "data_center"),
            description: text(value, "description"),
            usages: items(value, "usages", "usage")
                .iter()
                .filter_map(|usage| usage.as_str().map(str::to_string))
                .collect(),
            vlan: value
                .get("vlan")
                .and_then(|vlan| number(vlan, "id"))
                .map(|id| id as u32),
            mtu: number(value, "mtu").map(|mtu| mtu as u32),
            port_isolation: flag(value, "port_isolation"),
            status: text(value, "status"),
            required: flag(value, "required"),
        }),
        ResourceKind::VnicProfile => Record::VnicProfile(VnicProfile {
            id,
            name,
            network_id: link_id(value, "network"),
            port_mirroring: flag(value, "port_mirroring"),
            pass_through: value
                .get("pass_through")
                .and_then(|pass_through| text(pass_through, "mode")),
            description: text(value, "description"),
        }),
        ResourceKind::StorageDomain => Record::StorageDomain(StorageDomain {
            id,
            name,
            domain_type: text(value, "type"),
            status: text(value, "status").or_else(|| text(value, "external_status")),
            available: number(value, "available"),
            used: number(value, "used"),
            committed: number(value, "committed"),
            description: text(value, "description"),
        }),
        ResourceKind::Disk => Record::Disk(parse_disk(id, value)),
        ResourceKind::DiskAttachment => Record::DiskAttachment(DiskAttachment {
            disk_id: link_id(value, "disk"),
            bootable: flag(value, "bootable"),
            interface: text(value, "interface"),
            active: flag(value, "active"),
            logical_name: text(value, "logical_name"),
            disk: value.get("disk").and_then(|disk| {
                let disk_id = text(disk, "id")?;
                disk.get("alias")
                    .or_else(|| disk.get("name"))
                    .map(|_| parse_disk(disk_id, disk))
            }),
            id,
        }),
        ResourceKind::Nic => Record::Nic(Nic {
            id,
            name,
            mac: value.get("mac").and_then(|mac| text(mac, "address")),
            interface: text(value, "interface"),
            linked: flag(value, "linked"),
            plugged: flag(value, "plugged"),
            vnic_profile_id: link_id(value, "vnic_profile"),
        }),
        ResourceKind::HostNic => Record::HostNic(HostNic {
            id,
            name,
            mac: value.get("mac").and_then(|mac| text(mac, "address")),
            ip: value.get("ip").and_then(|ip| text(ip, "address")),
            speed: number(value, "speed"),
            vlan: value
                .get("vlan")
                .and_then(|vlan| number(vlan, "id"))
                .map(|id| id as u32),
            network_id: link_id(value, "network"),
            status: text(value, "status"),
        }),
        ResourceKind::ReportedDevice => Record::ReportedDevice(ReportedDevice {
            id,
            name,
            mac: value.get("mac").and_then(|mac| text(mac, "address")),
            ipv4: ipv4_addresses(value),
            ipv6: addresses(value, "v6"),
        }),
        ResourceKind::User => Record::User(User {
            id,
            user_name: text(value, "user_name").unwrap_or_else(|| name.clone()),
            name,
            principal: text(value, "principal"),
            domain: value.get("domain").and_then(|domain| text(domain, "name")),
            email: text(value, "email"),
            department: text(value, "department"),
        }),
        ResourceKind::Event => Record::Event(Event {
            id,
            time: timestamp(value, "time"),
            severity: Severity::from_api(&text(value, "severity").unwrap_or_default()),
            code: number(value, "code").map(|code| code as u32),
            description: text(value, "description").unwrap_or_default(),
            vm_id: link_id(value, "vm"),
            host_id: link_id(value, "host"),
            cluster_id: link_id(value, "cluster"),
            data_center_id: link_id(value, "data_center"),
        }),
    };
    Some(record)
}

fn parse_disk(id: String, value: &Value) -> Disk {
    Disk {
        id,
        alias: text(value, "alias")
            .or_else(|| text(value, "name"))
            .unwrap_or_default(),
        provisioned_size: number(value, "provisioned_size"),
        actual_size: number(value, "actual_size"),
        status: DiskStatus::from_api(&text(value, "status").unwrap_or_default()),
        storage_domain_ids: items(value, "storage_domains", "storage_domain")
            .iter()
            .filter_map(|domain| text(domain, "id"))
            .collect(),
        sparse: flag(value, "sparse"),
        content_type: text(value, "content_type"),
        description: text(value, "description"),
    }
}

pub fn parse_statistics(body: &Value) -> Statistics {
    body.get("statistic")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = text(entry, "name")?;
                    let datum = items(entry, "values", "value")
                        .first()
                        .and_then(|value| value.get("datum"))
                        .and_then(float)?;
                    Some((name, datum))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{
        action_request, collection_path, engine_socket, fault_detail, normalize_base_url,
        parse_collection, parse_record, parse_statistics, remote_error,
    };
    use crate::error::SourceError;
    use crate::model::{DiskStatus, Record, ResourceKind, Severity, VmStatus};
    use crate::source::{ActionParams, ListFilter, Verb};
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn vm_collection_tolerates_string_numbers_and_follows_nics() {
        let body = json!({
            "vm": [{
                "id": "vm-1",
                "name": "web-01",
                "status": "up",
                "host": { "id": "h1", "href": "/ovirt-engine/api/hosts/h1" },
                "cluster": { "id": "c1" },
                "start_time": 1_700_000_000_000u64,
                "memory": "4294967296",
                "memory_policy": { "guaranteed": 2147483648u64 },
                "cpu": { "topology": { "sockets": "2", "cores": "2", "threads": "1" } },
                "os": { "type": "rhel_9x64" },
                "bios": { "type": "q35_ovmf" },
                "high_availability": { "enabled": "true" },
                "nics": { "nic": [{
                    "name": "nic1",
                    "vnic_profile": { "id": "p1" },
                    "reported_devices": { "reported_device": [{
                        "ips": { "ip": [
                            { "address": "10.0.0.5", "version": "v4" },
                            { "address": "fe80::1", "version": "v6" }
                        ]}
                    }]}
                }]}
            }, { "name": "no id is skipped" }]
        });

        let records = parse_collection(ResourceKind::Vm, &body);
        assert_eq!(records.len(), 1);
        let Record::Vm(vm) = &records[0] else {
            panic!("expected a vm");
        };
        assert_eq!(vm.status, VmStatus::Up);
        assert_eq!(vm.host_id.as_deref(), Some("h1"));
        assert_eq!(vm.memory, Some(4_294_967_296));
        assert_eq!(vm.guaranteed_memory, Some(2_147_483_648));
        assert_eq!(vm.cpu.map(|cpu| cpu.total()), Some(4));
        assert_eq!(vm.chipset.as_deref(), Some("q35_ovmf"));
        assert_eq!(vm.high_availability, Some(true));
        assert_eq!(vm.ipv4(), vec!["10.0.0.5"]);
        assert!(vm.start_time.is_some());
    }

    #[test]
    fn empty_collection_body_is_empty_list() {
        assert!(parse_collection(ResourceKind::Event, &json!({})).is_empty());
    }

    #[test]
    fn event_and_disk_fields_parse() {
        let event = parse_record(
            ResourceKind::Event,
            &json!({
                "id": "900",
                "time": "1700000000000",
                "severity": "warning",
                "code": "9000",
                "description": "Host h1 is not responding",
                "host": { "id": "h1" }
            }),
        );
        let Some(Record::Event(event)) = event else {
            panic!("expected an event");
        };
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.code, Some(9000));
        assert_eq!(event.host_id.as_deref(), Some("h1"));

        let disk = parse_record(
            ResourceKind::Disk,
            &json!({
                "id": "d1",
                "alias": "web-01_Disk1",
                "provisioned_size": "10737418240",
                "status": "ok",
                "storage_domains": { "storage_domain": [{ "id": "sd1" }] },
                "sparse": "true"
            }),
        );
        let Some(Record::Disk(disk)) = disk else {
            panic!("expected a disk");
        };
        assert_eq!(disk.status, DiskStatus::Ok);
        assert_eq!(disk.storage_domain_ids, vec!["sd1"]);
        assert_eq!(disk.sparse, Some(true));
    }

    #[test]
    fn statistics_read_first_datum() {
        let stats = parse_statistics(&json!({
            "statistic": [
                { "name": "memory.total", "values": { "value": [{ "datum": "1.6E10" }] } },
                { "name": "memory.used", "values": { "value": [{ "datum": 8.0e9 }] } },
                { "name": "broken", "values": {} }
            ]
        }));
        assert_eq!(stats.get("memory.total"), Some(&1.6e10));
        assert_eq!(stats.get("memory.used"), Some(&8.0e9));
        assert!(!stats.contains_key("broken"));
    }

    #[test]
    fn sub_collections_need_a_known_parent() {
        let filter = ListFilter::under(ResourceKind::Vm, "vm-1");
        assert_eq!(
            collection_path(ResourceKind::DiskAttachment, Some(&filter)).unwrap(),
            "vms/vm-1/diskattachments"
        );
        let filter = ListFilter::under(ResourceKind::Host, "h1");
        assert_eq!(
            collection_path(ResourceKind::HostNic, Some(&filter)).unwrap(),
            "hosts/h1/nics"
        );
        assert!(matches!(
            collection_path(ResourceKind::Nic, None),
            Err(SourceError::Unsupported { .. })
        ));
    }

    #[test]
    fn actions_build_engine_requests() {
        let (path, body) = action_request(
            ResourceKind::Vm,
            "vm-1",
            Verb::Migrate,
            &ActionParams {
                target_host_id: Some("h2".to_string()),
                ..ActionParams::default()
            },
        )
        .unwrap();
        assert_eq!(path, "vms/vm-1/migrate");
        assert_eq!(body, json!({ "host": { "id": "h2" } }));

        let (path, body) =
            action_request(ResourceKind::Vm, "vm-1", Verb::Reboot, &ActionParams::default())
                .unwrap();
        assert_eq!(path, "vms/vm-1/reboot");
        assert_eq!(body, json!({}));

        let (path, body) = action_request(
            ResourceKind::User,
            "",
            Verb::Provision,
            &ActionParams {
                user_name: Some("alice".to_string()),
                domain: Some("corp-authz".to_string()),
                ..ActionParams::default()
            },
        )
        .unwrap();
        assert_eq!(path, "users");
        assert_eq!(body["domain"]["name"], "corp-authz");

        assert!(
            action_request(ResourceKind::Vm, "vm-1", Verb::Migrate, &ActionParams::default())
                .is_err()
        );
    }

    #[test]
    fn fault_bodies_become_remote_errors() {
        let body = json!({
            "fault": { "reason": "Operation Failed", "detail": "[Cannot stop VM.]" }
        });
        assert_eq!(
            fault_detail(&body).as_deref(),
            Some("Operation Failed [Cannot stop VM.]")
        );

        let error = remote_error("vms/vm-1/stop", StatusCode::CONFLICT, &body.to_string());
        assert!(matches!(error, SourceError::Remote { status: 409, .. }));
        assert!(error.to_string().contains("Cannot stop VM"));

        let error = remote_error("", StatusCode::UNAUTHORIZED, "<html>nope</html>");
        assert!(error.is_unauthorized());
    }

    #[test]
    fn base_url_and_socket() {
        assert_eq!(
            normalize_base_url("https://engine.lab/ovirt-engine/api/")
                .unwrap()
                .join("vms")
                .unwrap()
                .as_str(),
            "https://engine.lab/ovirt-engine/api/vms"
        );
        assert_eq!(
            engine_socket("https://engine.lab/ovirt-engine/api"),
            Some(("engine.lab".to_string(), 443))
        );
        assert_eq!(
            engine_socket("http://10.0.0.2:8080/api"),
            Some(("10.0.0.2".to_string(), 8080))
        );
        assert_eq!(engine_socket("not a url"), None);
    }
}

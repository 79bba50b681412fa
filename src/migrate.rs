use std::hash::Hash;
use std::io::Write;

use indexmap::IndexMap;

use crate::ec2::{ResourceTag, TagApi, TagUpdate, TaggedResource};
use crate::error::Result;

pub const OLD_PREFIX: &str = "spot-autoscaler/";
pub const NEW_PREFIX: &str = "spotscaler/";

/// Filter pattern for every value carrying the old prefix.
pub const OLD_PREFIX_PATTERN: &str = "spot-autoscaler/*";

pub const MANAGED_BY: &str = "ManagedBy";
pub const REQUESTED_BY: &str = "RequestedBy";
pub const OLD_STATUS: &str = "spot-autoscaler:Status";
pub const NEW_STATUS: &str = "spotscaler:Status";
pub const PROPAGATE_MANAGED_BY: &str = "propagate:ManagedBy";

pub const EXECUTE_HINT: &str = "To update tags, pass -x";

/// Swaps a leading `spot-autoscaler/` for `spotscaler/`.
///
/// Anything that does not start with the old prefix comes back untouched,
/// even if the prefix appears later in the string.
pub fn rewrite_prefix(value: &str) -> String {
    match value.strip_prefix(OLD_PREFIX) {
        Some(rest) => format!("{}{}", NEW_PREFIX, rest),
        None => value.to_string(),
    }
}

/// Insertion-ordered buckets of resource ids keyed by their tag values.
#[derive(Debug)]
pub struct Groups<K> {
    buckets: IndexMap<K, Vec<String>>,
}

impl<K: Eq + Hash> Groups<K> {
    pub fn new() -> Self {
        Self {
            buckets: IndexMap::new(),
        }
    }

    /// Appends `id` to the bucket for `key`, creating an empty bucket on first sight.
    pub fn push(&mut self, key: K, id: String) {
        self.buckets.entry(key).or_default().push(id);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn into_buckets(self) -> impl Iterator<Item = (K, Vec<String>)> {
        self.buckets.into_iter()
    }
}

impl<K: Eq + Hash> Default for Groups<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three raw tag values that decide which spot requests share an update.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpotRequestKey {
    pub requested_by: String,
    pub status: String,
    pub propagate_managed_by: String,
}

impl SpotRequestKey {
    pub fn from_resource(resource: &TaggedResource) -> Result<Self> {
        Ok(Self {
            requested_by: resource.require_tag(REQUESTED_BY)?.to_string(),
            status: resource.require_tag(OLD_STATUS)?.to_string(),
            propagate_managed_by: resource.require_tag(PROPAGATE_MANAGED_BY)?.to_string(),
        })
    }

    pub fn renamed_tags(&self) -> Vec<ResourceTag> {
        vec![
            ResourceTag::new(REQUESTED_BY, rewrite_prefix(&self.requested_by)),
            ResourceTag::new(NEW_STATUS, self.status.clone()),
            ResourceTag::new(PROPAGATE_MANAGED_BY, rewrite_prefix(&self.propagate_managed_by)),
        ]
    }
}

pub fn group_instances(instances: &[TaggedResource]) -> Result<Groups<String>> {
    let mut groups = Groups::new();
    for instance in instances {
        let managed_by = instance.require_tag(MANAGED_BY)?;
        groups.push(managed_by.to_string(), instance.id.clone());
    }
    Ok(groups)
}

pub fn group_spot_requests(requests: &[TaggedResource]) -> Result<Groups<SpotRequestKey>> {
    let mut groups = Groups::new();
    for request in requests {
        groups.push(SpotRequestKey::from_resource(request)?, request.id.clone());
    }
    Ok(groups)
}

/// One CreateTags request per distinct `ManagedBy` value.
pub fn plan_instance_updates(instances: &[TaggedResource]) -> Result<Vec<TagUpdate>> {
    Ok(group_instances(instances)?
        .into_buckets()
        .map(|(before, resources)| TagUpdate {
            resources,
            tags: vec![ResourceTag::new(MANAGED_BY, rewrite_prefix(&before))],
        })
        .collect())
}

/// One CreateTags request per distinct tag triple.
pub fn plan_spot_request_updates(requests: &[TaggedResource]) -> Result<Vec<TagUpdate>> {
    Ok(group_spot_requests(requests)?
        .into_buckets()
        .map(|(key, resources)| TagUpdate {
            resources,
            tags: key.renamed_tags(),
        })
        .collect())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub groups: usize,
    pub writes: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub instances: PassReport,
    pub spot_requests: PassReport,
}

/// Runs both migration passes against `api`, printing every planned update to `out`.
///
/// Writes are issued only when `execute` is set. The first failed write aborts
/// the run; updates already applied stay applied.
pub struct Migrator<'a, A: TagApi> {
    api: &'a A,
    execute: bool,
}

impl<'a, A: TagApi> Migrator<'a, A> {
    pub fn new(api: &'a A, execute: bool) -> Self {
        Self { api, execute }
    }

    pub async fn run<W: Write>(&self, out: &mut W) -> Result<Report> {
        let instances = self
            .api
            .describe_instances(MANAGED_BY, OLD_PREFIX_PATTERN)
            .await?;
        log::info!(
            "found {} instances tagged {}",
            instances.len(),
            OLD_PREFIX_PATTERN
        );
        let instance_pass = self.apply(plan_instance_updates(&instances)?, out).await?;

        let requests = self
            .api
            .describe_spot_instance_requests(REQUESTED_BY, OLD_PREFIX_PATTERN)
            .await?;
        log::info!(
            "found {} spot requests tagged {}",
            requests.len(),
            OLD_PREFIX_PATTERN
        );
        let request_pass = self.apply(plan_spot_request_updates(&requests)?, out).await?;

        if !self.execute {
            writeln!(out, "{}", EXECUTE_HINT)?;
        }

        Ok(Report {
            instances: instance_pass,
            spot_requests: request_pass,
        })
    }

    async fn apply<W: Write>(&self, updates: Vec<TagUpdate>, out: &mut W) -> Result<PassReport> {
        let mut report = PassReport {
            groups: updates.len(),
            writes: 0,
        };
        log::info!("planned {} tag updates", report.groups);

        for update in &updates {
            writeln!(out, "{}", serde_json::to_string(update)?)?;
            if self.execute {
                log::info!("tagging {} resources", update.resources.len());
                self.api.create_tags(update).await?;
                report.writes += 1;
            }
        }

        Ok(report)
    }
}

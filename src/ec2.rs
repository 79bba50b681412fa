use std::future::Future;

use async_trait::async_trait;
use aws_sdk_ec2::types::{Filter, Tag};
use aws_sdk_ec2::Client as Ec2Client;
use serde::Serialize;

use crate::error::{Error, Result};

/// A single key/value tag as sent to or read from EC2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceTag {
    pub key: String,
    pub value: String,
}

impl ResourceTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An instance or spot request id together with the tags it carried when queried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedResource {
    pub id: String,
    pub tags: Vec<ResourceTag>,
}

impl TaggedResource {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    pub fn require_tag(&self, key: &str) -> Result<&str> {
        self.tag(key).ok_or_else(|| Error::missing_tag(&self.id, key))
    }
}

/// One CreateTags request: every listed resource receives every listed tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUpdate {
    pub resources: Vec<String>,
    pub tags: Vec<ResourceTag>,
}

/// The slice of the EC2 API the migration talks to.
///
/// Queries take a tag key and a value pattern; the pattern is passed through
/// to EC2's `tag:<key>` filter, so `*` wildcards are expanded server side.
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn describe_instances(&self, key: &str, pattern: &str) -> Result<Vec<TaggedResource>>;

    async fn describe_spot_instance_requests(
        &self,
        key: &str,
        pattern: &str,
    ) -> Result<Vec<TaggedResource>>;

    /// Upserts tags. Tags not named in the update are left in place.
    async fn create_tags(&self, update: &TagUpdate) -> Result<()>;
}

pub struct Ec2TagApi {
    client: Ec2Client,
}

impl Ec2TagApi {
    pub fn new(client: Ec2Client) -> Self {
        Self { client }
    }
}

fn tag_filter(key: &str, pattern: &str) -> Filter {
    Filter::builder()
        .name(format!("tag:{}", key))
        .values(pattern)
        .build()
}

fn convert_tags(tags: &[Tag]) -> Vec<ResourceTag> {
    tags.iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(key), Some(value)) => Some(ResourceTag::new(key, value)),
            (Some(key), None) => Some(ResourceTag::new(key, "")),
            _ => None,
        })
        .collect()
}

/// One response from a paginated describe call.
struct Page {
    resources: Vec<TaggedResource>,
    next_token: Option<String>,
}

/// Calls `fetch_page` with each `NextToken` in turn, starting from none, until
/// a page comes back without a token or with an empty one.
async fn collect_pages<F, Fut>(
    operation: &str,
    mut fetch_page: F,
) -> Result<Vec<TaggedResource>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page>>,
{
    let mut resources = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let page = fetch_page(next_token.take()).await?;
        log::debug!("{} page returned {} resources", operation, page.resources.len());
        resources.extend(page.resources);

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(resources)
}

#[async_trait]
impl TagApi for Ec2TagApi {
    async fn describe_instances(&self, key: &str, pattern: &str) -> Result<Vec<TaggedResource>> {
        let client = &self.client;
        collect_pages("DescribeInstances", move |next_token| {
            let request = client
                .describe_instances()
                .filters(tag_filter(key, pattern))
                .set_next_token(next_token);
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| Error::provider("DescribeInstances", e))?;

                let resources = resp
                    .reservations()
                    .iter()
                    .flat_map(|res| res.instances())
                    .filter_map(|inst| {
                        inst.instance_id().map(|id| TaggedResource {
                            id: id.to_string(),
                            tags: convert_tags(inst.tags()),
                        })
                    })
                    .collect();

                Ok::<_, Error>(Page {
                    resources,
                    next_token: resp.next_token().map(str::to_string),
                })
            }
        })
        .await
    }

    async fn describe_spot_instance_requests(
        &self,
        key: &str,
        pattern: &str,
    ) -> Result<Vec<TaggedResource>> {
        let client = &self.client;
        collect_pages("DescribeSpotInstanceRequests", move |next_token| {
            let request = client
                .describe_spot_instance_requests()
                .filters(tag_filter(key, pattern))
                .set_next_token(next_token);
            async move {
                let resp = request
                    .send()
                    .await
                    .map_err(|e| Error::provider("DescribeSpotInstanceRequests", e))?;

                let resources = resp
                    .spot_instance_requests()
                    .iter()
                    .filter_map(|sir| {
                        sir.spot_instance_request_id().map(|id| TaggedResource {
                            id: id.to_string(),
                            tags: convert_tags(sir.tags()),
                        })
                    })
                    .collect();

                Ok::<_, Error>(Page {
                    resources,
                    next_token: resp.next_token().map(str::to_string),
                })
            }
        })
        .await
    }

    async fn create_tags(&self, update: &TagUpdate) -> Result<()> {
        let tags = update
            .tags
            .iter()
            .map(|t| Tag::builder().key(&t.key).value(&t.value).build())
            .collect();

        self.client
            .create_tags()
            .set_resources(Some(update.resources.clone()))
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| Error::provider("CreateTags", e))?;
        Ok(())
    }
}

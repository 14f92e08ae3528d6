use serde_json::Value;
use std::{fmt, str::FromStr};

use crate::{
    client::ApiClient,
    error::{Error, Result},
};

/// Resource
///
/// The incubator collections the admin dashboard manages. Each maps to
/// `/api/{segment}` on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Startups,
    Mentors,
    Events,
    Trainings,
    Resources,
    Participants,
    Notes,
    Stats,
}

impl Resource {
    pub const ALL: [Resource; 8] = [
        Resource::Startups,
        Resource::Mentors,
        Resource::Events,
        Resource::Trainings,
        Resource::Resources,
        Resource::Participants,
        Resource::Notes,
        Resource::Stats,
    ];

    pub fn segment(&self) -> &'static str {
        match self {
            Resource::Startups => "startups",
            Resource::Mentors => "mentors",
            Resource::Events => "events",
            Resource::Trainings => "trainings",
            Resource::Resources => "resources",
            Resource::Participants => "participants",
            Resource::Notes => "notes",
            Resource::Stats => "stats",
        }
    }

    /// Stats are computed by the backend and cannot be written.
    pub fn is_writable(&self) -> bool {
        !matches!(self, Resource::Stats)
    }

    pub fn collection_path(&self) -> String {
        format!("/api/{}", self.segment())
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("/api/{}/{}", self.segment(), id)
    }
}

impl FromStr for Resource {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        Resource::ALL
            .into_iter()
            .find(|resource| resource.segment() == raw)
            .ok_or_else(|| Error::UnknownResource(raw.to_string()))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// ResourceApi
///
/// CRUD over the incubator collections. Payloads stay as JSON: the console forwards
/// them and the backend owns their schema.
#[derive(Clone)]
pub struct ResourceApi {
    client: ApiClient,
}

impl ResourceApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, resource: Resource) -> Result<Value> {
        let data = self
            .client
            .get(&resource.collection_path())
            .send_envelope::<Value>()
            .await?;
        Ok(data.unwrap_or_else(|| Value::Array(Vec::new())))
    }

    pub async fn fetch(&self, resource: Resource, id: &str) -> Result<Value> {
        let data = self
            .client
            .get(&resource.item_path(id))
            .send_envelope::<Value>()
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    pub async fn create(&self, resource: Resource, body: &Value) -> Result<Value> {
        ensure_writable(resource)?;
        let data = self
            .client
            .post(&resource.collection_path())
            .json(body)
            .send_envelope::<Value>()
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    pub async fn update(&self, resource: Resource, id: &str, body: &Value) -> Result<Value> {
        ensure_writable(resource)?;
        let data = self
            .client
            .put(&resource.item_path(id))
            .json(body)
            .send_envelope::<Value>()
            .await?;
        Ok(data.unwrap_or(Value::Null))
    }

    pub async fn remove(&self, resource: Resource, id: &str) -> Result<()> {
        ensure_writable(resource)?;
        self.client
            .delete(&resource.item_path(id))
            .send_envelope::<Value>()
            .await?;
        Ok(())
    }
}

fn ensure_writable(resource: Resource) -> Result<()> {
    if resource.is_writable() {
        Ok(())
    } else {
        Err(Error::ReadOnly(resource.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_round_trip_through_from_str() {
        for resource in Resource::ALL {
            assert_eq!(resource.segment().parse::<Resource>().unwrap(), resource);
        }
        assert!("founders".parse::<Resource>().is_err());
    }

    #[test]
    fn paths_are_rooted_under_api() {
        assert_eq!(Resource::Mentors.collection_path(), "/api/mentors");
        assert_eq!(Resource::Events.item_path("42"), "/api/events/42");
    }
}

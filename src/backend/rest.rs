//! Client for the hosted backend's REST row API and realtime event stream.

use color_eyre::{eyre::eyre, Result};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use super::{Backend, Change, ChangeKind, Scope, Subscription};
use crate::identity::Identity;
use crate::model::{Entity, Placement};

/// Realtime payload as sent by the backend's change stream.
#[derive(Debug, Deserialize)]
struct ChangeMessage {
  #[serde(rename = "eventType")]
  event_type: String,
  #[serde(default)]
  new: Option<Value>,
  #[serde(default)]
  old: Option<Value>,
}

impl ChangeMessage {
  fn into_change<T: Entity>(self) -> Result<Change<T>> {
    let (kind, row) = match self.event_type.as_str() {
      "INSERT" => (ChangeKind::Insert, self.new),
      "UPDATE" => (ChangeKind::Update, self.new),
      "DELETE" => (ChangeKind::Delete, self.old),
      other => return Err(eyre!("Unknown change type {}", other)),
    };
    let row = row.ok_or_else(|| eyre!("{} change without a row", self.event_type))?;
    Change::from_row(kind, row).map_err(|e| eyre!("Failed to parse {} change: {}", T::label(), e))
  }
}

/// REST backend client
#[derive(Clone)]
pub struct RestBackend {
  http: reqwest::Client,
  base: Url,
  api_key: String,
}

impl RestBackend {
  /// Create a client for the project at `url`, authenticated as the holder of
  /// `access_token`. Without a token requests are anonymous and carry the API
  /// key as bearer.
  pub fn new(url: &str, api_key: &str, access_token: Option<&str>) -> Result<Self> {
    let base = Url::parse(url).map_err(|e| eyre!("Invalid backend URL {}: {}", url, e))?;

    let mut headers = HeaderMap::new();
    headers.insert(
      "apikey",
      HeaderValue::from_str(api_key).map_err(|e| eyre!("Invalid API key: {}", e))?,
    );
    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", access_token.unwrap_or(api_key)))
      .map_err(|e| eyre!("Invalid access token: {}", e))?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      api_key: api_key.to_string(),
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }

  fn table_url(&self, table: &str) -> Result<Url> {
    self.endpoint(&format!("rest/v1/{}", table))
  }

  fn order<T: Entity>() -> String {
    match T::placement() {
      Placement::Prepend => "created_at.desc".to_string(),
      Placement::Append => "created_at.asc".to_string(),
    }
  }
}

impl Backend for RestBackend {
  async fn select<T: Entity>(&self, scope: &Scope) -> Result<Vec<T>> {
    let mut query = scope.filters();
    query.push(("select".to_string(), "*".to_string()));
    query.push(("order".to_string(), Self::order::<T>()));

    let rows: Vec<T> = self
      .http
      .get(self.table_url(T::table())?)
      .query(&query)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to fetch {}: {}", scope.description(), e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {}: {}", T::table(), e))?;

    Ok(rows)
  }

  async fn insert<T: Entity>(&self, row: Value) -> Result<T> {
    let rows: Vec<T> = self
      .http
      .post(self.table_url(T::table())?)
      .header("Prefer", "return=representation")
      .json(&row)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to create {}: {}", T::label(), e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse created {}: {}", T::label(), e))?;

    rows
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("Backend returned no {} after insert", T::label()))
  }

  async fn update<T: Entity>(&self, id: &str, patch: &T::Patch) -> Result<()> {
    self
      .http
      .patch(self.table_url(T::table())?)
      .query(&[("id", format!("eq.{}", id))])
      .json(patch)
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to update {} {}: {}", T::label(), id, e))?;

    Ok(())
  }

  async fn delete<T: Entity>(&self, id: &str) -> Result<()> {
    self
      .http
      .delete(self.table_url(T::table())?)
      .query(&[("id", format!("eq.{}", id))])
      .send()
      .await
      .and_then(|r| r.error_for_status())
      .map_err(|e| eyre!("Failed to delete {} {}: {}", T::label(), id, e))?;

    Ok(())
  }

  fn subscribe<T: Entity>(&self, scope: &Scope) -> Result<Subscription<T>> {
    let url = self.endpoint(&format!("realtime/v1/changes/{}", scope.table))?;
    let mut query = scope.filters();
    query.push(("channel".to_string(), scope.channel()));

    let request = self
      .http
      .get(url)
      .query(&query)
      .header(ACCEPT, "text/event-stream");
    let description = scope.description();
    let (tx, rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
      let response = match request.send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
          warn!(scope = %description, error = %e, "realtime subscription failed");
          return;
        }
      };
      debug!(scope = %description, "realtime subscription open");

      let mut events = Box::pin(response.bytes_stream().eventsource());
      while let Some(event) = events.next().await {
        let event = match event {
          Ok(event) => event,
          Err(e) => {
            warn!(scope = %description, error = %e, "realtime stream error");
            break;
          }
        };
        if event.data.trim().is_empty() {
          continue;
        }

        let change = serde_json::from_str::<ChangeMessage>(&event.data)
          .map_err(|e| eyre!("Malformed change message: {}", e))
          .and_then(ChangeMessage::into_change::<T>);
        match change {
          Ok(change) => {
            if tx.send(change).is_err() {
              break;
            }
          }
          Err(e) => debug!(scope = %description, error = %e, "skipping change"),
        }
      }
      debug!(scope = %description, "realtime subscription closed");
    });

    Ok(Subscription::new(rx, task))
  }

  fn authenticate(self: &Arc<Self>, identity: &Identity) -> Result<Arc<Self>> {
    Self::new(self.base.as_str(), &self.api_key, identity.access_token()).map(Arc::new)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Task;
  use serde_json::json;

  #[test]
  fn test_change_message_parsing() {
    let message: ChangeMessage = serde_json::from_value(json!({
      "eventType": "DELETE",
      "new": {},
      "old": { "id": "t-1" },
    }))
    .unwrap();
    assert_eq!(
      message.into_change::<Task>().unwrap(),
      Change::Delete { id: "t-1".into() }
    );

    let unknown: ChangeMessage =
      serde_json::from_value(json!({ "eventType": "TRUNCATE" })).unwrap();
    assert!(unknown.into_change::<Task>().is_err());
  }

  #[test]
  fn test_endpoints_join_base() {
    let backend = RestBackend::new("https://example.test/", "anon", Some("token")).unwrap();
    assert_eq!(
      backend.table_url("tasks").unwrap().as_str(),
      "https://example.test/rest/v1/tasks"
    );
    assert_eq!(RestBackend::order::<Task>(), "created_at.desc");
  }

  #[test]
  fn test_rejects_invalid_url() {
    assert!(RestBackend::new("not a url", "anon", None).is_err());
  }
}

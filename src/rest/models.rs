use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonManifest {
  pub id: &'static str,
  pub version: &'static str,
  pub name: &'static str,
  pub description: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
  pub catalogs: Vec<serde_json::Value>,
  pub resources: Vec<&'static str>,
  pub types: Vec<&'static str>,
  pub id_prefixes: Vec<&'static str>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamEntry {
  pub url: String,
  pub title: String,
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct StreamsResponse {
  pub streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
  pub target_url: Option<String>,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
  pub status: u16,
  pub status_text: String,
  pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugRequest {
  pub target_url: Option<String>,
  /// Host used for the first-hop referer; defaults to the target's origin.
  pub source_domain: Option<String>,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
  pub target_url: Option<String>,
  /// Host of the embedding site; sent as the first hop's referer.
  pub source_domain: Option<String>,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
  pub master_url: String,
  pub source_domain: String,
  pub filename: Option<String>,
}

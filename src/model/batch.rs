use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// JSON batch payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub requests: Vec<SubRequest>,
}

/// One request inside a batch payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRequest {
    pub id: String,
    /// Requests sharing a group form one change set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomicity_group: Option<String>,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl SubRequest {
    pub fn is_read(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub responses: Vec<BatchResponseItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponseItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atomicity_group: Option<String>,
    pub status: u16,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// A top-level unit of a batch: either an independent request or a change set
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    Operation(SubRequest),
    ChangeSet {
        group: String,
        requests: Vec<SubRequest>,
    },
}

/// Group consecutive requests sharing an atomicity group into change sets,
/// keeping the order the requests were received in.
pub fn group_batch_items(requests: Vec<SubRequest>) -> Vec<BatchItem> {
    let mut items: Vec<BatchItem> = Vec::new();
    for request in requests {
        match request.atomicity_group.clone() {
            None => items.push(BatchItem::Operation(request)),
            Some(group) => match items.last_mut() {
                Some(BatchItem::ChangeSet {
                    group: current,
                    requests,
                }) if *current == group => requests.push(request),
                _ => items.push(BatchItem::ChangeSet {
                    group,
                    requests: vec![request],
                }),
            },
        }
    }
    items
}

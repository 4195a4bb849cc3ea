use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Visibility of a Hop channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Clients need a token with access to the channel.
    #[default]
    Private,
    /// Anyone can subscribe, only the project can publish.
    Public,
    /// Anyone can subscribe and publish.
    Unprotected,
}

/// Channel snapshot carried by INIT and AVAILABLE events and returned by
/// [`LeapClient::subscribe`](crate::LeapClient::subscribe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel id.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub id: String,

    /// Channel visibility.
    #[serde(rename = "type", default, deserialize_with = "crate::models::de::null_as_default")]
    pub channel_type: ChannelType,

    /// Arbitrary state attached to the channel.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub state: HashMap<String, JsonValue>,

    /// Capability bit flags.
    #[serde(default, deserialize_with = "crate::models::de::null_as_default")]
    pub capabilities: u64,

    /// Creation timestamp as sent by the server (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

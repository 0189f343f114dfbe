// Delivery scopes

use crate::models::ResourceId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A named delivery scope. `Global` subscribers receive every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Global,
    SystemMetrics,
    ContainerMetrics,
    ContainerStatus,
    Errors,
    /// Stream metrics, status changes and task errors of one container.
    Container(ResourceId),
    ContainerLogs(ResourceId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic {0:?}")]
pub struct UnknownTopic(pub String);

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Global => f.write_str("global"),
            Topic::SystemMetrics => f.write_str("system:metrics"),
            Topic::ContainerMetrics => f.write_str("containers:metrics"),
            Topic::ContainerStatus => f.write_str("containers:status"),
            Topic::Errors => f.write_str("errors"),
            Topic::Container(id) => write!(f, "container:{id}"),
            Topic::ContainerLogs(id) => write!(f, "container:{id}:logs"),
        }
    }
}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        let topic = match key {
            "global" => Topic::Global,
            "system:metrics" => Topic::SystemMetrics,
            "containers:metrics" => Topic::ContainerMetrics,
            "containers:status" => Topic::ContainerStatus,
            "errors" => Topic::Errors,
            _ => {
                let rest = key
                    .strip_prefix("container:")
                    .ok_or_else(|| UnknownTopic(s.to_string()))?;
                let (id, logs) = match rest.strip_suffix(":logs") {
                    Some(id) => (id, true),
                    None => (rest, false),
                };
                if id.is_empty() || id.contains(':') {
                    return Err(UnknownTopic(s.to_string()));
                }
                if logs {
                    Topic::ContainerLogs(id.to_string())
                } else {
                    Topic::Container(id.to_string())
                }
            }
        };
        Ok(topic)
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_back_to_the_same_topic() {
        for topic in [
            Topic::Global,
            Topic::SystemMetrics,
            Topic::ContainerMetrics,
            Topic::ContainerStatus,
            Topic::Errors,
            Topic::Container("abc123".into()),
            Topic::ContainerLogs("abc123".into()),
        ] {
            assert_eq!(topic.to_string().parse::<Topic>(), Ok(topic));
        }
    }

    #[test]
    fn rejects_unknown_and_empty_scopes() {
        assert!("metrics".parse::<Topic>().is_err());
        assert!("container:".parse::<Topic>().is_err());
        assert!("container::logs".parse::<Topic>().is_err());
        assert!("container:a:b".parse::<Topic>().is_err());
    }

    #[test]
    fn serializes_as_key_string() {
        let json = serde_json::to_string(&Topic::ContainerLogs("c1".into())).unwrap();
        assert_eq!(json, "\"container:c1:logs\"");
        let back: Topic = serde_json::from_str("\" containers:status \"").unwrap();
        assert_eq!(back, Topic::ContainerStatus);
    }
}

//! ARM resource IDs
//!
//! Formatting and parsing of the IDs the provider stores as state keys.
//! Segment keys are matched case-insensitively, as ARM does.

use super::error::{ProviderError, ProviderResult};
use std::fmt;

/// Key/value segments of an ARM ID, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdSegments {
    segments: Vec<(String, String)>,
}

impl ResourceIdSegments {
    /// Split `/k1/v1/k2/v2/...` into pairs
    pub fn parse(kind: &'static str, input: &str) -> ProviderResult<Self> {
        let invalid = |reason: &str| ProviderError::InvalidId {
            kind,
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input
            .strip_prefix('/')
            .ok_or_else(|| invalid("ID must start with '/'"))?;
        let parts: Vec<&str> = trimmed.trim_end_matches('/').split('/').collect();

        if parts.len() % 2 != 0 {
            return Err(invalid("number of segments is not even"));
        }

        let mut segments = Vec::with_capacity(parts.len() / 2);
        for pair in parts.chunks(2) {
            let (key, value) = (pair[0], pair[1]);
            if key.is_empty() || value.is_empty() {
                return Err(invalid("empty segment"));
            }
            segments.push((key.to_string(), value.to_string()));
        }

        Ok(Self { segments })
    }

    /// Value of the first segment whose key matches `key` (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, kind: &'static str, input: &str, key: &str) -> ProviderResult<String> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidId {
                kind,
                input: input.to_string(),
                reason: format!("missing segment {:?}", key),
            })
    }

    fn require_provider(&self, kind: &'static str, input: &str, namespace: &str) -> ProviderResult<()> {
        match self.get("providers") {
            Some(ns) if ns.eq_ignore_ascii_case(namespace) => Ok(()),
            _ => Err(ProviderError::InvalidId {
                kind,
                input: input.to_string(),
                reason: format!("expected provider namespace {:?}", namespace),
            }),
        }
    }
}

/// `/subscriptions/{s}/resourceGroups/{rg}/providers/Microsoft.Network/networkSecurityGroups/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSecurityGroupId {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

impl NetworkSecurityGroupId {
    const KIND: &'static str = "Network Security Group";

    pub fn new(subscription_id: &str, resource_group: &str, name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            name: name.to_string(),
        }
    }

    pub fn parse(input: &str) -> ProviderResult<Self> {
        let segments = ResourceIdSegments::parse(Self::KIND, input)?;
        segments.require_provider(Self::KIND, input, "Microsoft.Network")?;

        Ok(Self {
            subscription_id: segments.require(Self::KIND, input, "subscriptions")?,
            resource_group: segments.require(Self::KIND, input, "resourceGroups")?,
            name: segments.require(Self::KIND, input, "networkSecurityGroups")?,
        })
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NetworkSecurityGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/networkSecurityGroups/{}",
            self.subscription_id, self.resource_group, self.name
        )
    }
}

/// `/subscriptions/{s}/resourceGroups/{rg}/providers/Microsoft.Network/dnszones/{zone}/TXT/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecordId {
    pub subscription_id: String,
    pub resource_group: String,
    pub dnszone_name: String,
    pub txt_name: String,
}

impl TxtRecordId {
    const KIND: &'static str = "DNS TXT Record";

    pub fn new(subscription_id: &str, resource_group: &str, zone: &str, name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            dnszone_name: zone.to_string(),
            txt_name: name.to_string(),
        }
    }

    pub fn parse(input: &str) -> ProviderResult<Self> {
        let segments = ResourceIdSegments::parse(Self::KIND, input)?;
        segments.require_provider(Self::KIND, input, "Microsoft.Network")?;

        Ok(Self {
            subscription_id: segments.require(Self::KIND, input, "subscriptions")?,
            resource_group: segments.require(Self::KIND, input, "resourceGroups")?,
            dnszone_name: segments.require(Self::KIND, input, "dnszones")?,
            txt_name: segments.require(Self::KIND, input, "TXT")?,
        })
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TxtRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnszones/{}/TXT/{}",
            self.subscription_id, self.resource_group, self.dnszone_name, self.txt_name
        )
    }
}

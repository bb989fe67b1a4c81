use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SharesLevel {
    Low,
    Normal,
    High,
    Custom,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct SharesInfo {
    pub level: SharesLevel,
    pub shares: Option<i32>,
}
impl SharesInfo {
    /// Custom shares win over a predefined level.
    pub fn from_params(shares: Option<i32>, level: Option<SharesLevel>) -> Option<Self> {
        match (shares, level) {
            (Some(shares), _) => Some(Self {
                level: SharesLevel::Custom,
                shares: Some(shares),
            }),
            (None, Some(level)) => Some(Self {
                level,
                shares: None,
            }),
            (None, None) => None,
        }
    }
}

/// Cpu, memory and network adapter allocation.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct ResourceAllocationInfo {
    pub reservation: Option<i64>,
    pub limit: Option<i64>,
    pub shares: Option<SharesInfo>,
}
impl ResourceAllocationInfo {
    pub fn custom_shares(&self) -> Option<i32> {
        self.shares
            .as_ref()
            .filter(|e| e.level == SharesLevel::Custom)
            .and_then(|e| e.shares)
    }
    pub fn shares_level(&self) -> Option<SharesLevel> {
        self.shares.as_ref().map(|e| e.level)
    }
    pub fn is_empty(&self) -> bool {
        self.reservation.is_none() && self.limit.is_none() && self.shares.is_none()
    }
}

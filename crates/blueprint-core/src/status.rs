//! Status enum families for instances, resources, links, and children.
//!
//! Each element carries a coarse `*Status` (what the host sees in overview
//! listings) alongside a `*PreciseStatus` (what the deployer state machine is
//! actually doing right now). The coarse status is always derivable from the
//! precise one; keeping both lets hosts subscribe to either granularity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Deploying,
    Deployed,
    DeployFailed,
    Destroying,
    Destroyed,
    DestroyFailed,
    RollingBack,
    RolledBack,
    RollbackFailed,
    /// A `Deploy`/`Destroy` call against this instance was rejected outright
    /// because the instance was already mid-operation (spec §4.7, §8 seed
    /// test #7) - distinct from `*Failed`, which marks an operation that was
    /// attempted and failed.
    InstanceStatusUpdateFailed,
}

impl InstanceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstanceStatus::Deployed
                | InstanceStatus::DeployFailed
                | InstanceStatus::Destroyed
                | InstanceStatus::DestroyFailed
                | InstanceStatus::RolledBack
                | InstanceStatus::RollbackFailed
                | InstanceStatus::InstanceStatusUpdateFailed
        )
    }

    pub fn is_mid_operation(self) -> bool {
        !self.is_terminal()
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            InstanceStatus::DeployFailed
                | InstanceStatus::DestroyFailed
                | InstanceStatus::RollbackFailed
                | InstanceStatus::InstanceStatusUpdateFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Creating,
    Deployed,
    Updating,
    Destroying,
    Destroyed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourcePreciseStatus {
    AwaitingDependencies,
    Deploying,
    ConfigComplete,
    Stabilising,
    Deployed,
    DeployFailed,
    Destroying,
    Destroyed,
    DestroyFailed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl ResourcePreciseStatus {
    pub fn coarse(self) -> ResourceStatus {
        use ResourcePreciseStatus::*;
        match self {
            AwaitingDependencies | Deploying | ConfigComplete | Stabilising => {
                ResourceStatus::Creating
            }
            Deployed | RolledBack => ResourceStatus::Deployed,
            DeployFailed | RollbackFailed => ResourceStatus::Failed,
            Destroying | RollingBack => ResourceStatus::Destroying,
            Destroyed => ResourceStatus::Destroyed,
            DestroyFailed => ResourceStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        use ResourcePreciseStatus::*;
        matches!(
            self,
            Deployed | DeployFailed | Destroyed | DestroyFailed | RolledBack | RollbackFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Creating,
    Deployed,
    Updating,
    Destroying,
    Destroyed,
    Failed,
}

/// The link deployer runs a three-stage state machine: resource A's side of
/// the link, then resource B's side, then the intermediary resources the
/// link introduces (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPreciseStatus {
    AwaitingResources,
    UpdatingResourceA,
    UpdatingResourceB,
    UpdatingIntermediaries,
    Deployed,
    DeployFailed,
    Destroying,
    Destroyed,
    DestroyFailed,
}

impl LinkPreciseStatus {
    pub fn coarse(self) -> LinkStatus {
        use LinkPreciseStatus::*;
        match self {
            AwaitingResources | UpdatingResourceA | UpdatingResourceB | UpdatingIntermediaries => {
                LinkStatus::Creating
            }
            Deployed => LinkStatus::Deployed,
            DeployFailed => LinkStatus::Failed,
            Destroying => LinkStatus::Destroying,
            Destroyed => LinkStatus::Destroyed,
            DestroyFailed => LinkStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        use LinkPreciseStatus::*;
        matches!(self, Deployed | DeployFailed | Destroyed | DestroyFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildStatus {
    Deploying,
    Deployed,
    Failed,
    Destroying,
    Destroyed,
}

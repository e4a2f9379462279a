//! Translation between process environment variables and typed configuration.
//!
//! This is the only module that knows environment variable names. Launchers
//! receive [`ClusterTopology`] and [`TransportConfig`] values and hand
//! `(name, value)` pairs to the child process.

use crate::error::{LaunchError, LaunchResult};
use serde::{Deserialize, Serialize};

/// Node layout of the job as seen by the distributed launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Number of nodes (`WORLD_SIZE`).
    pub nnodes: u32,
    /// Rank of this node (`RANK`).
    pub node_rank: u32,
    pub master_addr: String,
    pub master_port: u16,
    /// GPUs per node (`NUM_GPUS`), when the scheduler provides it.
    pub gpus_per_node: Option<u32>,
    /// Whether `WORLD_SIZE` was provided; single-node runs omit rendezvous flags.
    pub multi_node: bool,
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self {
            nnodes: 1,
            node_rank: 0,
            master_addr: "127.0.0.1".to_string(),
            master_port: 29500,
            gpus_per_node: None,
            multi_node: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: Option<String>) -> LaunchResult<Option<T>> {
    raw.map(|value| {
        value.trim().parse::<T>().map_err(|_| {
            LaunchError::InvalidConfig(format!(
                "{name} must be a non-negative integer, got {value:?}"
            ))
        })
    })
    .transpose()
}

impl ClusterTopology {
    /// Read the topology through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> LaunchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let nnodes = parse_var::<u32>("WORLD_SIZE", lookup("WORLD_SIZE"))?;
        let topology = Self {
            multi_node: nnodes.is_some(),
            nnodes: nnodes.unwrap_or(defaults.nnodes).max(1),
            node_rank: parse_var("RANK", lookup("RANK"))?.unwrap_or(defaults.node_rank),
            master_addr: lookup("MASTER_ADDR").unwrap_or(defaults.master_addr),
            master_port: parse_var("MASTER_PORT", lookup("MASTER_PORT"))?
                .unwrap_or(defaults.master_port),
            gpus_per_node: parse_var("NUM_GPUS", lookup("NUM_GPUS"))?,
        };
        topology.validate()?;
        Ok(topology)
    }

    pub fn from_process_env() -> LaunchResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn validate(&self) -> LaunchResult<()> {
        if self.node_rank >= self.nnodes {
            return Err(LaunchError::InvalidConfig(format!(
                "RANK {} is out of range for WORLD_SIZE {}",
                self.node_rank, self.nnodes
            )));
        }
        if self.master_addr.trim().is_empty() {
            return Err(LaunchError::InvalidConfig("MASTER_ADDR is empty".to_string()));
        }
        Ok(())
    }
}

/// Network transport settings exported to the child (EFA libfabric + NCCL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub fi_provider: Option<String>,
    pub fi_efa_tx_min_credits: Option<u32>,
    pub nccl_debug: Option<String>,
    pub nccl_tree_threshold: Option<u64>,
    pub nccl_socket_ifname: Option<String>,
    pub omp_num_threads: Option<u32>,
    pub rdmav_fork_safe: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            fi_provider: Some("efa".to_string()),
            fi_efa_tx_min_credits: Some(64),
            nccl_debug: Some("INFO".to_string()),
            nccl_tree_threshold: Some(0),
            nccl_socket_ifname: None,
            omp_num_threads: Some(1),
            rdmav_fork_safe: true,
        }
    }
}

impl TransportConfig {
    /// Apply values already present in the environment on top of `self`.
    pub fn with_overrides<F>(mut self, lookup: F) -> LaunchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FI_PROVIDER") {
            self.fi_provider = Some(v);
        }
        if let Some(v) = parse_var("FI_EFA_TX_MIN_CREDITS", lookup("FI_EFA_TX_MIN_CREDITS"))? {
            self.fi_efa_tx_min_credits = Some(v);
        }
        if let Some(v) = lookup("NCCL_DEBUG") {
            self.nccl_debug = Some(v);
        }
        if let Some(v) = parse_var("NCCL_TREE_THRESHOLD", lookup("NCCL_TREE_THRESHOLD"))? {
            self.nccl_tree_threshold = Some(v);
        }
        if let Some(v) = lookup("NCCL_SOCKET_IFNAME") {
            self.nccl_socket_ifname = Some(v);
        }
        if let Some(v) = parse_var("OMP_NUM_THREADS", lookup("OMP_NUM_THREADS"))? {
            self.omp_num_threads = Some(v);
        }
        if let Some(v) = lookup("RDMAV_FORK_SAFE") {
            self.rdmav_fork_safe = v.trim() == "1";
        }
        Ok(self)
    }

    pub fn with_process_overrides(self) -> LaunchResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Variables to set on the child process.
    #[must_use]
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                vars.push((name.to_string(), value));
            }
        };
        push("FI_PROVIDER", self.fi_provider.clone());
        push("FI_EFA_TX_MIN_CREDITS", self.fi_efa_tx_min_credits.map(|v| v.to_string()));
        push("NCCL_DEBUG", self.nccl_debug.clone());
        push("NCCL_TREE_THRESHOLD", self.nccl_tree_threshold.map(|v| v.to_string()));
        push("NCCL_SOCKET_IFNAME", self.nccl_socket_ifname.clone());
        push("OMP_NUM_THREADS", self.omp_num_threads.map(|v| v.to_string()));
        if self.rdmav_fork_safe {
            push("RDMAV_FORK_SAFE", Some("1".to_string()));
        }
        vars
    }
}

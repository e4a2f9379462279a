use crate::command::{CommandBuilder, FlagSchema, LaunchCommand};
use crate::env::ClusterTopology;
use crate::error::LaunchResult;
use serde::{Deserialize, Serialize};

static DISTRIBUTED_LAUNCH: FlagSchema = FlagSchema {
    program: "torch.distributed.launch",
    flags: &["nproc_per_node", "nnodes", "node_rank", "master_addr", "master_port"],
    overrides: &[],
};

/// Interpreter and launcher module used to start training programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub python: String,
    pub launcher_module: String,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            launcher_module: "torch.distributed.launch".to_string(),
        }
    }
}

impl Interpreter {
    /// `python -m <launcher> --nproc_per_node=N [rendezvous flags] <script>`
    pub fn distributed(
        &self,
        nproc_per_node: u32,
        topology: &ClusterTopology,
        script: &str,
    ) -> LaunchResult<LaunchCommand> {
        let multi = topology.multi_node;
        let launcher_args = CommandBuilder::new(&DISTRIBUTED_LAUNCH)
            .value("nproc_per_node", nproc_per_node)
            .value_if(multi, "nnodes", topology.nnodes)
            .value_if(multi, "node_rank", topology.node_rank)
            .value_if(multi, "master_addr", &topology.master_addr)
            .value_if(multi, "master_port", topology.master_port)
            .build()?;

        Ok(LaunchCommand::new(&self.python)
            .args(["-m", self.launcher_module.as_str()])
            .args(launcher_args)
            .args([script]))
    }

    /// `python <script>` without the distributed launcher.
    #[must_use]
    pub fn direct(&self, script: &str) -> LaunchCommand {
        LaunchCommand::new(&self.python).args([script])
    }
}

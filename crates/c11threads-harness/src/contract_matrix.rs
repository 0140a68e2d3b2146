//! Machine-readable rendering of the mutex transition contract.

use c11threads_core::mutex::{MtxKind, MutexContractOp, MutexContractState, mutex_contract_transition};
use serde::Serialize;

/// One `(kind, state, op)` cell of the contract.
#[derive(Debug, Clone, Serialize)]
pub struct ContractCell {
    pub kind: &'static str,
    pub raw_kind: i32,
    pub state: &'static str,
    pub op: &'static str,
    pub next: &'static str,
    pub status: &'static str,
    pub code: i32,
    pub blocks: bool,
    pub undefined: bool,
}

/// Full contract table for every valid mutex type.
#[derive(Debug, Clone, Serialize)]
pub struct ContractMatrix {
    pub schema_version: u32,
    pub kinds: usize,
    pub states: usize,
    pub ops: usize,
    pub cells: Vec<ContractCell>,
}

impl ContractMatrix {
    #[must_use]
    pub fn build() -> Self {
        let mut cells =
            Vec::with_capacity(MtxKind::ALL.len() * MutexContractState::ALL.len() * MutexContractOp::ALL.len());
        for kind in MtxKind::ALL {
            for state in MutexContractState::ALL {
                for op in MutexContractOp::ALL {
                    let out = mutex_contract_transition(kind.raw(), state, op);
                    cells.push(ContractCell {
                        kind: kind.name(),
                        raw_kind: kind.raw(),
                        state: state.name(),
                        op: op.name(),
                        next: out.next.name(),
                        status: out.status.as_str(),
                        code: out.status.code(),
                        blocks: out.blocks,
                        undefined: out.undefined,
                    });
                }
            }
        }
        Self {
            schema_version: 1,
            kinds: MtxKind::ALL.len(),
            states: MutexContractState::ALL.len(),
            ops: MutexContractOp::ALL.len(),
            cells,
        }
    }

    /// Cells whose op may suspend the caller.
    pub fn blocking_cells(&self) -> impl Iterator<Item = &ContractCell> {
        self.cells.iter().filter(|c| c.blocks)
    }

    /// Cells the host leaves undefined.
    pub fn undefined_cells(&self) -> impl Iterator<Item = &ContractCell> {
        self.cells.iter().filter(|c| c.undefined)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

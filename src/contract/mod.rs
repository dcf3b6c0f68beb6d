mod model;
mod parser;
mod validate;

pub use model::{
    BackoffKind, Contract, GateScope, GateSpec, GateStage, MAX_ID_LEN, Phase, RetryPolicy, Task,
    is_valid_identifier,
};
pub use parser::{ContractFormat, ContractParser};

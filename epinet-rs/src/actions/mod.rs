mod condition;
mod operation;
mod queue;

pub use condition::{Condition, EvalContext, Operand};
pub use operation::{
    EdgeNumericTarget, ExecContext, FactorTarget, Metadata, Operation, StateChangeEvent,
};
pub use queue::{Action, ActionQueue, CurrentActions, RemoteAction};

//! Problem model: variables, bound events, and the quadratic constraint body.

mod cons;
mod events;
mod vars;

pub use cons::{PresolveOutcome, QuadConstraint};
pub use events::{BoundEvent, BoundKind, BoundObserver, EventBuffer};
pub use vars::{Tightening, VarId, VarPool, VarStatus, VarType, VariableStore};

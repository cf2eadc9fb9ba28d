//! Local transformations over the hyperion mid-level IR.
//!
//! The crate answers three questions about a [`hymir::module::Module`]:
//! whether an instruction can be deleted, whether a value can escape the
//! function that produces it, and in which order functions should be visited
//! so that callees come before callers. It also provides the small mutation
//! helpers built on those answers: recursive dead code deletion, use
//! subgraph erasure and call-site redirection to a specialized function.
//!
//! Nothing here keeps state between calls. Facts about primitive operations
//! are supplied by the caller through a [`purity::PurityOracle`].
pub mod call_graph;
pub mod dead_code;
pub mod erase;
pub mod escape;
pub mod purity;
pub mod specialize;
#[cfg(any(test, feature = "test-utils"))]
pub mod tests_utils;

pub use call_graph::{BottomUpOrder, CallGraph, bottom_up_call_graph_order};
pub use dead_code::{
    is_instruction_trivially_dead, recursively_delete_trivially_dead_instruction,
    recursively_delete_trivially_dead_instructions,
};
pub use erase::{erase_instruction_and_uses, erase_uses_of_instruction};
pub use escape::can_value_escape;
pub use purity::{PurityOracle, PurityTable};
pub use specialize::replace_with_specialized_function;

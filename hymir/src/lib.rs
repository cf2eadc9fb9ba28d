//! Mid-level instruction graph for hyperion.
//!
//! The graph is made of functions, basic blocks and single-result
//! instructions stored in arenas owned by a [`module::Module`]. Each def-use
//! edge is visible from both ends: as an operand slot on the user, and as a
//! [`value::Use`] on the referenced value. The module is the only place where
//! either view can change, so the two never disagree.
//!
//! ```
//! use hymir::{builder::Builder, module::Module, types::FnSignature};
//!
//! let mut module = Module::new();
//! let f = module.add_function("f", FnSignature::default()).unwrap();
//! let entry = module.append_block(f);
//!
//! let mut builder = Builder::at_end(&mut module, entry);
//! let one = builder.create_integer_literal(1);
//! builder.create_return(one.into());
//!
//! assert_eq!(module.uses(one.into()).len(), 1);
//! module.verify().unwrap();
//! ```
pub mod builder;
pub mod instructions;
pub mod module;
pub mod types;
pub mod utils;
pub mod value;

pub use value::{ArgId, BlockId, FuncId, InstrId, Location, Use, Value};

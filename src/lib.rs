//! Reverse-mode automatic differentiation over scalar values.
//!
//! Operators on [`TapeTerm`]s compute their value eagerly and append a
//! [`Record`] to the [`Tape`]. [`Tape::grad`] replays the records backwards
//! and accumulates the gradient of the terminal at every node.
//!
//! ```
//! use tapegrad::Tape;
//!
//! let tape = Tape::new();
//! let x = tape.term("x", 2.);
//! let y = tape.term("y", 5.);
//! let f = x.ln()? + x * y - y.sin();
//! let grads = f.backprop()?;
//! assert!((grads.wrt(&x)? - 5.5).abs() < 1e-12);
//! # Ok::<(), tapegrad::error::Error>(())
//! ```

mod dot;
pub mod error;
mod grad;
mod op;
pub mod tape;
mod term;

pub use dot::DotBuilder;
pub use grad::Gradients;
pub use op::{CustomFn, Op};
pub use tape::{NodeId, Record, Tape};
pub use term::{Operand, TapeTerm};

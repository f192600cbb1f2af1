//! Resolve - component tree to intermediate layout nodes.
//!
//! The resolver walks a component tree depth-first with an explicit work
//! stack, producing an arena of [`LayoutNode`]s:
//!
//! ```text
//! Component tree                    ResolvedTree (arena)
//! ─────────────                     ────────────────────
//! Card (inline) ─render─▶ Column    [0] Column  {Card, Column}  children [1, 2]
//!                          ├─ Text  [1] Text    {Text}
//!                          └─ Lazy  [2] Holder  {Lazy}         (deferred)
//! ```
//!
//! Each step checks a [`CancellationToken`]. An interrupted resolve returns
//! its remaining work list as a [`ResolveStateContext`] that can be resumed
//! on another thread and produces the same tree as an uninterrupted run.
//!
//! Components that need their parent's size specs become nested tree
//! holders; layout resolves them once constraints are known.

mod cancel;
mod measured_cache;
mod node;
mod resolver;

pub use cancel::*;
pub use measured_cache::*;
pub use node::*;
pub use resolver::*;

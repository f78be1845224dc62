//! Background processing: the dispatch loop and its per-delivery tasks.

pub mod delivery_task;
pub mod dispatch_loop;

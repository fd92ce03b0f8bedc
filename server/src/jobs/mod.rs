pub mod anchor_worker;
pub mod expiry_sweep;

pub use anchor_worker::{run_anchor_worker, AnchorQueue, AnchorWorkerConfig};
pub use expiry_sweep::{run_expiry_sweep_worker, sweep_once, SweepConfig};

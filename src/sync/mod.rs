pub mod connectivity;
pub mod engine;
pub mod perf;
pub mod remote;

pub use connectivity::{Connectivity, ConnectivityFlag};
pub use engine::{spawn_replay_loop, SyncEngine, SyncOutcome};
pub use remote::{send_intent, HttpProgressStore, ProgressStore};

pub mod edges;
pub mod epochs;
pub mod layout;
pub mod rng;
pub mod signals;

pub use edges::{
    apply_connections, build_edges, prune_edges, EdgeSet, MAX_EDGES_PER_SIGNAL, MIN_EDGE_WEIGHT,
};
pub use epochs::{assign_epoch, assign_epochs, summarize_epochs, FALLBACK_EPOCH};
pub use layout::{compute_layout, COORDINATE_DECIMALS};
pub use rng::Mulberry32;
pub use signals::{calculate_signals, shared, TEMPORAL_WINDOW_DAYS};

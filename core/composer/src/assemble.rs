use lifegraph_indexing::EdgeSet;
use lifegraph_schemas::{CanonicalRecord, EpochSummary, GraphDocument};

/// Build the graph document. Nodes are ordered by id; edges keep the
/// (source, target) order produced by the edge builder.
pub fn assemble_graph(
    mut nodes: Vec<CanonicalRecord>,
    edges: &EdgeSet,
    epochs: Vec<EpochSummary>,
) -> GraphDocument {
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    GraphDocument {
        nodes,
        edges: edges.edges.clone(),
        epochs,
    }
}

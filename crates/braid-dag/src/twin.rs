use braid_core::error::ConsensusError;
use braid_core::types::{VertexId, Weight};
use braid_core::vertex::Vertex;
use braid_crypto::resolve;

/// How a twin differs from the transaction it copies.
#[derive(Debug, Clone, Default)]
pub struct TwinOptions {
    /// New parents. When absent the two parents are swapped.
    pub parents: Option<[VertexId; 2]>,
    /// New declared weight. When absent the original weight is kept.
    pub weight: Option<Weight>,
}

/// Build a twin of `tx`: same inputs, outputs and tokens, different parents
/// or weight, mined again so it is a valid vertex with a new id.
///
/// Used by operators to rescue a transaction stuck behind a conflict: the
/// twin carries fresh weight that can win the conflict set.
pub fn make_twin(tx: &Vertex, opts: &TwinOptions) -> Result<Vertex, ConsensusError> {
    let Vertex::Transaction(original) = tx else {
        return Err(ConsensusError::InvalidParents("only transactions have twins".into()));
    };
    let mut twin = original.clone();

    match opts.parents {
        Some(parents) => twin.parents = parents.to_vec(),
        None => twin.parents.reverse(),
    }
    if let Some(weight) = opts.weight {
        twin.weight = weight;
    }
    if twin.parents.len() == 2 && twin.parents[0] == twin.parents[1] {
        return Err(ConsensusError::InvalidParents("twin parents must differ".into()));
    }

    let mut twin = Vertex::Transaction(twin);
    twin.set_nonce(0);
    resolve(&mut twin);
    if twin.id() == original.id {
        // Swapping identical parent lists, or an unchanged parent set.
        return Err(ConsensusError::InvalidParents(
            "twin would be identical to the original".into(),
        ));
    }
    Ok(twin)
}

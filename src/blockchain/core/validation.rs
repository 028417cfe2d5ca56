use crate::blockchain::core::chain::Block;
use crate::error::ChainError;

/// Walks every adjacent pair and reports the first block whose `previous_hash`
/// does not match the freshly computed hash of its predecessor, or whose index
/// does not follow its predecessor's.
///
/// Empty and single-block sequences pass the linkage walk: there is no minimum
/// length and the first block's contents are not inspected. Every chain must
/// still leave room for a successor, so a tip at `u64::MAX` is rejected.
pub fn check_chain(chain: &[Block]) -> Result<(), ChainError> {
    for (position, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        if previous.index.checked_add(1) != Some(current.index) {
            return Err(ChainError::InvalidBlockIndex {
                position: position + 1,
                index: current.index,
            });
        }
        let expected = previous.compute_hash();
        if current.previous_hash != expected {
            return Err(ChainError::InvalidBlockLinkage {
                index: current.index,
                expected,
                found: current.previous_hash.clone(),
            });
        }
    }
    if let Some(tip) = chain.last() {
        if tip.index.checked_add(1).is_none() {
            return Err(ChainError::InvalidBlockIndex {
                position: chain.len() - 1,
                index: tip.index,
            });
        }
    }
    Ok(())
}

/// `true` if every block links to the recomputed hash of the one before it and
/// the indices run consecutively.
pub fn validate_chain(chain: &[Block]) -> bool {
    check_chain(chain).is_ok()
}

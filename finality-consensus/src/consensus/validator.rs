//! Stateless checks applied to votes before they may move a round forward.

use tracing::warn;

use finality_common::{auth::verify_with_key, Block, ConsensusVote, Receipts};

use crate::error::{ConsensusError, Result};

/// The vote must reference `hash(hash(block))`.
pub fn check_vote_digest(block: &Block, vote: &ConsensusVote) -> Result<()> {
    let expected = block.digest();
    if expected != vote.digest {
        return Err(ConsensusError::DigestMismatch { expected, got: vote.digest });
    }
    Ok(())
}

/// The signature must verify over the digest under the key carried by the
/// vote.
pub fn check_vote_signature(vote: &ConsensusVote) -> Result<()> {
    match verify_with_key(vote.signing_bytes(), &vote.signature, &vote.public_key) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ConsensusError::SignatureInvalid(format!(
            "{} vote for #{} does not verify",
            vote.phase, vote.seq_no
        ))),
        Err(e) => {
            warn!("error occurs when verify signature, err:{}", e);
            Err(ConsensusError::SignatureInvalid(e.to_string()))
        }
    }
}

/// Locally computed receipts must aggregate to the block's declared root.
pub fn check_receipts(block: &Block, receipts: &Receipts) -> Result<()> {
    let computed = receipts.root();
    if computed != block.receipts_root {
        return Err(ConsensusError::ReceiptMismatch { declared: block.receipts_root, computed });
    }
    Ok(())
}

/// Digest then signature, as applied when a phase reaches quorum.
pub fn check_vote(block: &Block, vote: &ConsensusVote) -> Result<()> {
    check_vote_digest(block, vote)?;
    check_vote_signature(vote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finality_common::{
        auth::{Authenticator, Ed25519Authenticator},
        Hash, Receipt, ReceiptStatus, VotePhase,
    };

    fn receipts() -> Receipts {
        Receipts::new(vec![Receipt {
            tx_hash: finality_common::crypto::sha256(b"tx"),
            status: ReceiptStatus::Success,
            gas_used: 7,
        }])
    }

    fn block() -> Block {
        Block::with_receipts(4, Hash::ZERO, "bp-1", 100, vec![b"tx".to_vec()], &receipts())
    }

    fn signed_vote(auth: &Ed25519Authenticator, digest: Hash) -> ConsensusVote {
        let signature = auth.sign(digest.as_bytes()).unwrap();
        ConsensusVote::new(VotePhase::PreCommit, 4, digest, auth.public_key(), signature)
    }

    #[test]
    fn test_matching_vote_passes() {
        let auth = Ed25519Authenticator::generate();
        let b = block();
        assert!(check_vote(&b, &signed_vote(&auth, b.digest())).is_ok());
    }

    #[test]
    fn test_wrong_digest_with_valid_signature_is_digest_mismatch() {
        let auth = Ed25519Authenticator::generate();
        let b = block();
        // signing the plain block hash instead of the double hash
        let vote = signed_vote(&auth, b.hash());
        assert!(check_vote_signature(&vote).is_ok());
        assert!(matches!(check_vote(&b, &vote), Err(ConsensusError::DigestMismatch { .. })));
    }

    #[test]
    fn test_bad_signature_with_matching_digest_is_rejected() {
        let auth = Ed25519Authenticator::generate();
        let other = Ed25519Authenticator::generate();
        let b = block();
        let mut vote = signed_vote(&auth, b.digest());
        vote.signature = other.sign(b.digest().as_bytes()).unwrap();
        assert!(check_vote_digest(&b, &vote).is_ok());
        assert!(matches!(check_vote(&b, &vote), Err(ConsensusError::SignatureInvalid(_))));
    }

    #[test]
    fn test_malformed_key_is_signature_invalid() {
        let auth = Ed25519Authenticator::generate();
        let b = block();
        let mut vote = signed_vote(&auth, b.digest());
        vote.public_key = vec![1, 2, 3];
        assert!(matches!(check_vote_signature(&vote), Err(ConsensusError::SignatureInvalid(_))));
    }

    #[test]
    fn test_receipts_against_root() {
        let b = block();
        assert!(check_receipts(&b, &receipts()).is_ok());
        assert!(matches!(
            check_receipts(&b, &Receipts::default()),
            Err(ConsensusError::ReceiptMismatch { .. })
        ));
    }
}

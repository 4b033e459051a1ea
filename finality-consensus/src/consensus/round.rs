use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use libp2p::PeerId;

use finality_common::{Block, ConsensusVote, Hash, VotePhase};

use crate::{
    config::QuorumPolicy,
    error::{ConsensusError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    CollectingPreCommit,
    CollectingCommit,
    Finalized,
    Failed,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundStatus::CollectingPreCommit => "collecting PRE_COMMIT",
            RoundStatus::CollectingCommit => "collecting COMMIT",
            RoundStatus::Finalized => "finalized",
            RoundStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyOutcome {
    Added(usize),
    Duplicate,
    /// The voter already voted for this other digest.
    Conflict(Hash),
}

/// Votes of one phase, grouped by the digest they reference.
#[derive(Debug, Default, Clone)]
pub struct VoteTally {
    // Digest -> voters
    voters: HashMap<Hash, HashSet<PeerId>>,
    // Voter -> digest
    by_voter: HashMap<PeerId, Hash>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a BP at most once per phase.
    pub fn add(&mut self, voter: PeerId, digest: Hash) -> TallyOutcome {
        if let Some(existing) = self.by_voter.get(&voter) {
            if *existing == digest {
                return TallyOutcome::Duplicate;
            }
            return TallyOutcome::Conflict(*existing);
        }
        self.by_voter.insert(voter, digest);
        let voters = self.voters.entry(digest).or_default();
        voters.insert(voter);
        TallyOutcome::Added(voters.len())
    }

    pub fn count(&self, digest: &Hash) -> usize {
        self.voters.get(digest).map(HashSet::len).unwrap_or(0)
    }

    /// Digest with the most votes.
    pub fn leading(&self) -> Option<(Hash, usize)> {
        self.voters
            .iter()
            .map(|(digest, voters)| (*digest, voters.len()))
            .max_by_key(|(_, n)| *n)
    }

    /// Drops every vote not referencing `keep`; returns how many went.
    pub fn retain_digest(&mut self, keep: &Hash) -> usize {
        let before = self.by_voter.len();
        self.voters.retain(|digest, _| digest == keep);
        self.by_voter.retain(|_, digest| digest == keep);
        before - self.by_voter.len()
    }

    pub fn total(&self) -> usize {
        self.by_voter.len()
    }
}

/// Result of feeding one vote into a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Counted(usize),
    Duplicate,
    /// PRE_COMMIT arriving after the round moved to COMMIT.
    Late,
    /// COMMIT arriving before this node reached PRE_COMMIT quorum.
    Buffered,
    /// Tally just went over the threshold and this caller owns the transition.
    Quorum,
}

/// Point-in-time view of a round, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSnapshot {
    pub seq_no: u64,
    pub status: RoundStatus,
    pub round_size: usize,
    pub threshold: usize,
    pub pre_commit_votes: usize,
    pub commit_votes: usize,
}

/// Voting state of one sequence number.
///
/// Created when the sequence number advances and dropped once it finalizes.
/// Tallies only grow while the round lives.
#[derive(Debug)]
pub struct RoundState {
    seq_no: u64,
    status: RoundStatus,
    round_size: usize,
    threshold: usize,
    pre_commits: VoteTally,
    commits: VoteTally,
    // locally pending block, once known
    candidate: Option<Arc<Block>>,
    // block that reached PRE_COMMIT quorum
    locked: Option<Arc<Block>>,
    early_commits: Vec<(PeerId, ConsensusVote)>,
    own_pre_commit: bool,
    transition_in_flight: bool,
}

impl RoundState {
    pub fn new(seq_no: u64, round_size: usize, policy: &QuorumPolicy) -> Self {
        Self {
            seq_no,
            status: RoundStatus::CollectingPreCommit,
            round_size,
            threshold: policy.threshold(round_size),
            pre_commits: VoteTally::new(),
            commits: VoteTally::new(),
            candidate: None,
            locked: None,
            early_commits: Vec::new(),
            own_pre_commit: false,
            transition_in_flight: false,
        }
    }

    pub fn seq_no(&self) -> u64 {
        self.seq_no
    }

    pub fn status(&self) -> RoundStatus {
        self.status
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn round_size(&self) -> usize {
        self.round_size
    }

    pub fn candidate(&self) -> Option<Arc<Block>> {
        self.candidate.clone()
    }

    pub fn locked(&self) -> Option<Arc<Block>> {
        self.locked.clone()
    }

    pub fn expected_digest(&self) -> Option<Hash> {
        self.candidate.as_ref().map(|b| b.digest())
    }

    pub fn pre_commit_votes(&self) -> usize {
        match self.expected_digest() {
            Some(digest) => self.pre_commits.count(&digest),
            None => self.pre_commits.leading().map(|(_, n)| n).unwrap_or(0),
        }
    }

    pub fn commit_votes(&self) -> usize {
        self.locked
            .as_ref()
            .map(|b| self.commits.count(&b.digest()))
            .unwrap_or(0)
    }

    pub fn buffered_commits(&self) -> usize {
        self.early_commits.len()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.status, RoundStatus::Finalized | RoundStatus::Failed)
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ConsensusError::RoundClosed { seq_no: self.seq_no, status: self.status });
        }
        Ok(())
    }

    pub fn has_own_pre_commit(&self) -> bool {
        self.own_pre_commit
    }

    pub fn mark_own_pre_commit(&mut self) {
        self.own_pre_commit = true;
    }

    /// Records the local block for this sequence number. PRE_COMMIT votes for
    /// any other digest can no longer count and are dropped; the number dropped
    /// is returned.
    pub fn set_candidate(&mut self, block: Arc<Block>) -> usize {
        if let Some(existing) = &self.candidate {
            if existing.hash() == block.hash() {
                return 0;
            }
        }
        let digest = block.digest();
        self.candidate = Some(block);
        self.early_commits.retain(|(_, v)| v.digest == digest);
        self.pre_commits.retain_digest(&digest)
    }

    /// True when the local block already has a PRE_COMMIT supermajority and
    /// nobody is working on the transition.
    pub fn quorum_on_candidate(&self) -> bool {
        self.status == RoundStatus::CollectingPreCommit
            && !self.transition_in_flight
            && self
                .expected_digest()
                .map(|d| self.pre_commits.count(&d) > self.threshold)
                .unwrap_or(false)
    }

    pub fn claim_transition(&mut self) -> bool {
        if self.transition_in_flight {
            return false;
        }
        self.transition_in_flight = true;
        true
    }

    pub fn release_transition(&mut self) {
        self.transition_in_flight = false;
    }

    pub fn record_pre_commit(&mut self, voter: PeerId, vote: &ConsensusVote) -> Result<Step> {
        self.ensure_open()?;
        if self.status == RoundStatus::CollectingCommit {
            return Ok(Step::Late);
        }
        if let Some(expected) = self.expected_digest() {
            if vote.digest != expected {
                return Err(ConsensusError::DigestMismatch { expected, got: vote.digest });
            }
        }

        match self.pre_commits.add(voter, vote.digest) {
            TallyOutcome::Duplicate => Ok(Step::Duplicate),
            TallyOutcome::Conflict(first) => Err(ConsensusError::Equivocation {
                peer: voter,
                phase: VotePhase::PreCommit,
                first,
                second: vote.digest,
            }),
            TallyOutcome::Added(n) if n > self.threshold && self.claim_transition() => Ok(Step::Quorum),
            TallyOutcome::Added(n) => Ok(Step::Counted(n)),
        }
    }

    /// Moves to COMMIT collection on `block` and hands back the COMMIT votes
    /// that arrived early, for replay.
    pub fn lock(&mut self, block: Arc<Block>) -> Vec<(PeerId, ConsensusVote)> {
        self.status = RoundStatus::CollectingCommit;
        self.locked = Some(block);
        self.transition_in_flight = false;
        std::mem::take(&mut self.early_commits)
    }

    pub fn record_commit(&mut self, voter: PeerId, vote: &ConsensusVote) -> Result<Step> {
        self.ensure_open()?;

        let locked = match (&self.status, &self.locked) {
            (RoundStatus::CollectingCommit, Some(block)) => block.digest(),
            _ => {
                if self.early_commits.iter().any(|(p, _)| *p == voter) {
                    return Ok(Step::Duplicate);
                }
                if self.early_commits.len() >= self.round_size {
                    return Ok(Step::Late);
                }
                self.early_commits.push((voter, vote.clone()));
                return Ok(Step::Buffered);
            }
        };

        if vote.digest != locked {
            return Err(ConsensusError::DigestMismatch { expected: locked, got: vote.digest });
        }

        match self.commits.add(voter, vote.digest) {
            TallyOutcome::Duplicate => Ok(Step::Duplicate),
            TallyOutcome::Conflict(first) => Err(ConsensusError::Equivocation {
                peer: voter,
                phase: VotePhase::Commit,
                first,
                second: vote.digest,
            }),
            TallyOutcome::Added(n) if n > self.threshold && self.claim_transition() => Ok(Step::Quorum),
            TallyOutcome::Added(n) => Ok(Step::Counted(n)),
        }
    }

    /// Marks the round final and returns the block to commit.
    pub fn finalize(&mut self) -> Option<Arc<Block>> {
        self.status = RoundStatus::Finalized;
        self.transition_in_flight = false;
        self.locked.clone()
    }

    pub fn fail(&mut self) {
        if self.status != RoundStatus::Finalized {
            self.status = RoundStatus::Failed;
        }
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            seq_no: self.seq_no,
            status: self.status,
            round_size: self.round_size,
            threshold: self.threshold,
            pre_commit_votes: self.pre_commit_votes(),
            commit_votes: self.commit_votes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finality_common::auth::{Authenticator, Ed25519Authenticator};
    use finality_common::BpInfo;

    fn peer(seed: u8) -> PeerId {
        let key = Ed25519Authenticator::from_bytes(&[seed; 32]).unwrap().public_key();
        BpInfo::from_public_key(key).unwrap().peer_id
    }

    fn block(seq_no: u64, proposer: &str) -> Arc<Block> {
        Arc::new(Block {
            seq_no,
            parent_hash: Hash::ZERO,
            proposer: proposer.into(),
            timestamp: 0,
            transactions: vec![],
            receipts_root: Hash::ZERO,
        })
    }

    fn vote(phase: VotePhase, digest: Hash) -> ConsensusVote {
        ConsensusVote::new(phase, 10, digest, vec![], vec![])
    }

    #[test]
    fn test_tally_counts_each_voter_once() {
        let mut tally = VoteTally::new();
        let d = Hash([1; 32]);
        assert_eq!(tally.add(peer(1), d), TallyOutcome::Added(1));
        assert_eq!(tally.add(peer(1), d), TallyOutcome::Duplicate);
        assert_eq!(tally.add(peer(1), Hash([2; 32])), TallyOutcome::Conflict(d));
        assert_eq!(tally.add(peer(2), d), TallyOutcome::Added(2));
        assert_eq!(tally.count(&d), 2);
        assert_eq!(tally.total(), 2);
    }

    #[test]
    fn test_retain_digest_drops_minority() {
        let mut tally = VoteTally::new();
        let good = Hash([1; 32]);
        let bad = Hash([2; 32]);
        tally.add(peer(1), good);
        tally.add(peer(2), bad);
        tally.add(peer(3), good);
        assert_eq!(tally.leading(), Some((good, 2)));
        assert_eq!(tally.retain_digest(&good), 1);
        assert_eq!(tally.total(), 2);
        // the dropped voter may vote again
        assert_eq!(tally.add(peer(2), good), TallyOutcome::Added(3));
    }

    #[test]
    fn test_quorum_needs_strictly_more_than_threshold() {
        let mut round = RoundState::new(10, 7, &QuorumPolicy::default());
        let digest = block(10, "bp").digest();
        for i in 1..=4 {
            let step = round.record_pre_commit(peer(i), &vote(VotePhase::PreCommit, digest)).unwrap();
            assert_eq!(step, Step::Counted(i as usize));
        }
        let step = round.record_pre_commit(peer(5), &vote(VotePhase::PreCommit, digest)).unwrap();
        assert_eq!(step, Step::Quorum);

        // a sixth vote does not claim the transition twice
        let step = round.record_pre_commit(peer(6), &vote(VotePhase::PreCommit, digest)).unwrap();
        assert_eq!(step, Step::Counted(6));
    }

    #[test]
    fn test_commits_buffer_until_locked() {
        let mut round = RoundState::new(10, 4, &QuorumPolicy::default());
        let b = block(10, "bp");
        let step = round.record_commit(peer(1), &vote(VotePhase::Commit, b.digest())).unwrap();
        assert_eq!(step, Step::Buffered);
        assert_eq!(round.commit_votes(), 0);
        assert_eq!(round.buffered_commits(), 1);

        let early = round.lock(b.clone());
        assert_eq!(early.len(), 1);
        assert_eq!(round.status(), RoundStatus::CollectingCommit);

        let step = round.record_commit(peer(1), &vote(VotePhase::Commit, b.digest())).unwrap();
        assert_eq!(step, Step::Counted(1));
        assert_eq!(round.commit_votes(), 1);
    }

    #[test]
    fn test_commit_for_other_digest_is_rejected_once_locked() {
        let mut round = RoundState::new(10, 4, &QuorumPolicy::default());
        round.lock(block(10, "bp-a"));
        let other = block(10, "bp-b").digest();
        let err = round.record_commit(peer(1), &vote(VotePhase::Commit, other)).unwrap_err();
        assert!(matches!(err, ConsensusError::DigestMismatch { .. }));
    }

    #[test]
    fn test_candidate_rejects_and_purges_other_digests() {
        let mut round = RoundState::new(10, 7, &QuorumPolicy::default());
        let local = block(10, "bp-a");
        let other = block(10, "bp-b");
        round.record_pre_commit(peer(1), &vote(VotePhase::PreCommit, other.digest())).unwrap();
        round.record_pre_commit(peer(2), &vote(VotePhase::PreCommit, local.digest())).unwrap();

        assert_eq!(round.set_candidate(local.clone()), 1);
        assert_eq!(round.pre_commit_votes(), 1);
        let err = round
            .record_pre_commit(peer(3), &vote(VotePhase::PreCommit, other.digest()))
            .unwrap_err();
        assert!(matches!(err, ConsensusError::DigestMismatch { .. }));
    }

    #[test]
    fn test_closed_round_rejects_everything() {
        let mut round = RoundState::new(3, 4, &QuorumPolicy::default());
        round.fail();
        assert_eq!(round.status(), RoundStatus::Failed);
        let err = round.record_pre_commit(peer(1), &vote(VotePhase::PreCommit, Hash::ZERO)).unwrap_err();
        assert!(matches!(err, ConsensusError::RoundClosed { seq_no: 3, status: RoundStatus::Failed }));
    }
}

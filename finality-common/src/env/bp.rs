use libp2p::{identity, PeerId};

use crate::auth::AuthError;

/// A member of the block-producer committee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpInfo {
    pub peer_id: PeerId,
    /// Raw ed25519 public key used to sign votes.
    pub public_key: Vec<u8>,
}

impl BpInfo {
    pub fn new(peer_id: PeerId, public_key: Vec<u8>) -> Self {
        Self { peer_id, public_key }
    }

    /// Derives the peer identity from the BP's ed25519 key, the same way the
    /// transport authenticates the peer.
    pub fn from_public_key(public_key: Vec<u8>) -> Result<Self, AuthError> {
        let key = identity::ed25519::PublicKey::try_from_bytes(&public_key)
            .map_err(|e| AuthError::InvalidPublicKey(e.to_string()))?;
        let peer_id = identity::PublicKey::from(key).to_peer_id();
        Ok(Self { peer_id, public_key })
    }
}

/// Ordered BP committee for the current round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BpSet {
    bps: Vec<BpInfo>,
}

impl BpSet {
    /// Builds a set, keeping the first entry for a repeated peer.
    pub fn new(bps: Vec<BpInfo>) -> Self {
        let mut unique: Vec<BpInfo> = Vec::with_capacity(bps.len());
        for bp in bps {
            if !unique.iter().any(|b| b.peer_id == bp.peer_id) {
                unique.push(bp);
            }
        }
        Self { bps: unique }
    }

    pub fn len(&self) -> usize {
        self.bps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bps.is_empty()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.bps.iter().any(|bp| &bp.peer_id == peer)
    }

    pub fn public_key_of(&self, peer: &PeerId) -> Option<&[u8]> {
        self.bps
            .iter()
            .find(|bp| &bp.peer_id == peer)
            .map(|bp| bp.public_key.as_slice())
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.bps.iter().map(|bp| bp.peer_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BpInfo> {
        self.bps.iter()
    }
}

impl FromIterator<BpInfo> for BpSet {
    fn from_iter<T: IntoIterator<Item = BpInfo>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Authenticator, Ed25519Authenticator};

    #[test]
    fn test_peer_id_derived_from_key() {
        let auth = Ed25519Authenticator::from_bytes(&[3u8; 32]).unwrap();
        let a = BpInfo::from_public_key(auth.public_key()).unwrap();
        let b = BpInfo::from_public_key(auth.public_key()).unwrap();
        assert_eq!(a.peer_id, b.peer_id);
        assert!(BpInfo::from_public_key(vec![0u8; 5]).is_err());
    }

    #[test]
    fn test_membership_and_keys() {
        let keys: Vec<_> = (1..=3u8)
            .map(|i| Ed25519Authenticator::from_bytes(&[i; 32]).unwrap())
            .collect();
        let set: BpSet = keys
            .iter()
            .map(|k| BpInfo::from_public_key(k.public_key()).unwrap())
            .collect();

        assert_eq!(set.len(), 3);
        let first = set.peer_ids()[0];
        assert!(set.contains(&first));
        assert_eq!(set.public_key_of(&first), Some(keys[0].public_key().as_slice()));

        let outsider = BpInfo::from_public_key(
            Ed25519Authenticator::from_bytes(&[42u8; 32]).unwrap().public_key(),
        )
        .unwrap();
        assert!(!set.contains(&outsider.peer_id));
    }

    #[test]
    fn test_duplicates_collapse() {
        let key = Ed25519Authenticator::from_bytes(&[5u8; 32]).unwrap().public_key();
        let bp = BpInfo::from_public_key(key).unwrap();
        let set = BpSet::new(vec![bp.clone(), bp]);
        assert_eq!(set.len(), 1);
    }
}

//! Stake proofs, delegations and session identities.
//!
//! A proof declares control over a staked output set and grants its owner
//! voting weight proportional to the staked amount. Signature verification
//! lives in the node's crypto layer; here a proof is the validated claim:
//! identity, precedence sequence, the staked outputs' id and maturity
//! height, and the amount.

use std::{fmt, sync::Arc};

use sha2::{Digest, Sha256};

use crate::{
    amount::{amount_to_score, Amount},
    types::{ItemId, ProofId},
};

/// Serialized proof length: sequence + stake id + amount + stake height.
const PROOF_PAYLOAD_LEN: usize = 8 + 32 + 8 + 4;

/// A stake declaration granting voting weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    id: ProofId,
    sequence: u64,
    stake_id: ItemId,
    stake: Amount,
    stake_height: u32,
}

/// Shared handle to an immutable proof.
pub type ProofRef = Arc<Proof>;

impl Proof {
    /// Builds a proof; the id is derived from the payload so equal claims
    /// collide and conflicting claims differ.
    #[must_use]
    pub fn new(sequence: u64, stake_id: ItemId, stake: Amount, stake_height: u32) -> Self {
        let payload = Self::payload(sequence, stake_id, stake, stake_height);
        let id = ItemId::new(Sha256::digest(payload).into());
        Self { id, sequence, stake_id, stake, stake_height }
    }

    fn payload(
        sequence: u64,
        stake_id: ItemId,
        stake: Amount,
        stake_height: u32,
    ) -> [u8; PROOF_PAYLOAD_LEN] {
        let mut buf = [0u8; PROOF_PAYLOAD_LEN];
        buf[..8].copy_from_slice(&sequence.to_le_bytes());
        buf[8..40].copy_from_slice(stake_id.as_bytes());
        buf[40..48].copy_from_slice(&stake.base_units().to_le_bytes());
        buf[48..].copy_from_slice(&stake_height.to_le_bytes());
        buf
    }

    /// Parses the canonical hex payload used by the `local_proof`
    /// configuration option.
    ///
    /// # Errors
    ///
    /// Returns a message when the input is not a well-formed payload.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let raw = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
        let buf: [u8; PROOF_PAYLOAD_LEN] = raw
            .try_into()
            .map_err(|_| format!("expected {PROOF_PAYLOAD_LEN} bytes"))?;

        let sequence = u64::from_le_bytes(buf[..8].try_into().expect("fixed slice"));
        let stake_id = ItemId::new(buf[8..40].try_into().expect("fixed slice"));
        let units = i64::from_le_bytes(buf[40..48].try_into().expect("fixed slice"));
        if units < 0 {
            return Err("stake amount must not be negative".to_string());
        }
        let stake_height = u32::from_le_bytes(buf[48..].try_into().expect("fixed slice"));

        Ok(Self::new(sequence, stake_id, Amount::from_base_units(units), stake_height))
    }

    /// Canonical hex payload, the inverse of [`Proof::from_hex`].
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(Self::payload(self.sequence, self.stake_id, self.stake, self.stake_height))
    }

    #[must_use]
    pub fn id(&self) -> ProofId {
        self.id
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Identity of the staked output set; two proofs over the same stake
    /// conflict.
    #[must_use]
    pub fn stake_id(&self) -> ItemId {
        self.stake_id
    }

    #[must_use]
    pub fn stake(&self) -> Amount {
        self.stake
    }

    /// Height at which the staked outputs were confirmed.
    #[must_use]
    pub fn stake_height(&self) -> u32 {
        self.stake_height
    }

    /// Voting weight derived from the staked amount.
    #[must_use]
    pub fn score(&self) -> u64 {
        amount_to_score(self.stake)
    }

    /// Precedence between conflicting proofs: higher sequence wins, lower
    /// id breaks ties.
    #[must_use]
    pub fn has_precedence_over(&self, other: &Proof) -> bool {
        (self.sequence, std::cmp::Reverse(self.id)) >
            (other.sequence, std::cmp::Reverse(other.id))
    }
}

/// Compressed-key-sized public identity, displayed as hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PubKey([u8; 33]);

impl PubKey {
    #[must_use]
    pub const fn new(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Per-process session identity used when answering polls and in hellos.
#[derive(Debug, Clone)]
pub struct SessionKey {
    secret: [u8; 32],
}

impl SessionKey {
    /// Generates a fresh random session key.
    #[must_use]
    pub fn generate() -> Self {
        Self { secret: rand::random() }
    }

    /// The public identity announced to peers. Derivation is a stand-in
    /// for the node's key scheme; only stability and uniqueness matter to
    /// the engine.
    #[must_use]
    pub fn pub_key(&self) -> PubKey {
        let digest: [u8; 32] = Sha256::digest(self.secret).into();
        let mut bytes = [0u8; 33];
        bytes[0] = 0x02;
        bytes[1..].copy_from_slice(&digest);
        PubKey::new(bytes)
    }
}

/// Grants a session key the authority to speak for a stake proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    proof_id: ProofId,
    session_key: PubKey,
}

impl Delegation {
    #[must_use]
    pub const fn new(proof_id: ProofId, session_key: PubKey) -> Self {
        Self { proof_id, session_key }
    }

    #[must_use]
    pub fn proof_id(&self) -> ProofId {
        self.proof_id
    }

    #[must_use]
    pub fn session_key(&self) -> PubKey {
        self.session_key
    }
}

use crate::*;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use digest::Digest;
use sha2::{Sha256, Sha512};
use thiserror::Error;

/// Which statement a disjunctive proof encodes
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Yes,
    No,
}

impl Branch {
    /// The vote value folded into `y`
    pub fn value(self) -> Scalar {
        match self {
            Branch::Yes => Scalar::one(),
            Branch::No => Scalar::zero(),
        }
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Branch::Yes => write!(f, "yes"),
            Branch::No => write!(f, "no"),
        }
    }
}

/// Schnorr proof of knowledge of `x` for `xG`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KnowledgeProof {
    /// Commitment `vG`
    #[serde(with = "PointHex")]
    pub v_g: RistrettoPoint,

    /// Response `r = v - c*x`
    #[serde(with = "ScalarHex")]
    pub r: Scalar,
}

/// A 1-of-2 (CDS) proof that `y` encodes either 0 or 1 under the voter's
/// reconstructed key, without revealing which.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DisjunctiveProof {
    #[serde(with = "ScalarHex")]
    pub d1: Scalar,
    #[serde(with = "ScalarHex")]
    pub d2: Scalar,
    #[serde(with = "ScalarHex")]
    pub r1: Scalar,
    #[serde(with = "ScalarHex")]
    pub r2: Scalar,

    /// The blinded vote `x*yG + v*G`
    #[serde(with = "PointHex")]
    pub y: RistrettoPoint,
    #[serde(with = "PointHex")]
    pub a1: RistrettoPoint,
    #[serde(with = "PointHex")]
    pub b1: RistrettoPoint,
    #[serde(with = "PointHex")]
    pub a2: RistrettoPoint,
    #[serde(with = "PointHex")]
    pub b2: RistrettoPoint,
}

impl DisjunctiveProof {
    /// The four proof scalars in ledger order `[d1, d2, r1, r2]`
    pub fn params(&self) -> [Scalar; 4] {
        [self.d1, self.d2, self.r1, self.r2]
    }
}

/// Public keys a disjunctive proof is bound to
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
pub struct ProofKeys {
    /// Signing voter's voting key
    #[serde(with = "PointHex")]
    pub x_g: RistrettoPoint,

    /// Reconstructed key of the slot being voted for
    #[serde(with = "PointHex")]
    pub y_g: RistrettoPoint,
}

/// SHA-256 commitment to a disjunctive proof
pub type CommitmentHash = [u8; 32];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CryptoError {
    #[error("openvote crypto: secret scalar does not match the supplied voting key")]
    KeyMismatch,

    #[error("openvote crypto: reconstructed key is the identity point")]
    DegenerateKey,
}

/// Zero-knowledge proof capability.
///
/// Implementations must be deterministic given their inputs apart from any
/// randomness they draw internally, and must never transmit secret scalars.
#[async_trait::async_trait]
pub trait CryptoService: Send + Sync {
    async fn create_knowledge_proof(
        &self,
        x: &Scalar,
        v: &Scalar,
        x_g: &RistrettoPoint,
    ) -> Result<KnowledgeProof, CryptoError>;

    async fn verify_knowledge_proof(&self, x_g: &RistrettoPoint, proof: &KnowledgeProof) -> bool;

    /// Build a 1-of-2 proof for `branch`.
    ///
    /// `w` blinds the real branch; `r` and `d` are the simulated branch's
    /// response and challenge. The Fiat-Shamir challenge is bound to `index`.
    #[allow(clippy::too_many_arguments)]
    async fn create_disjunctive_proof(
        &self,
        keys: &ProofKeys,
        w: &Scalar,
        r: &Scalar,
        d: &Scalar,
        x: &Scalar,
        branch: Branch,
        index: u64,
    ) -> Result<DisjunctiveProof, CryptoError>;

    async fn verify_disjunctive_proof(
        &self,
        proof: &DisjunctiveProof,
        keys: &ProofKeys,
        index: u64,
    ) -> bool;

    async fn commitment_hash(&self, proof: &DisjunctiveProof, keys: &ProofKeys) -> CommitmentHash;
}

/// In-process proofs over the Ristretto group
#[derive(Default, Clone, Copy, Debug)]
pub struct LocalCrypto;

#[async_trait::async_trait]
impl CryptoService for LocalCrypto {
    async fn create_knowledge_proof(
        &self,
        x: &Scalar,
        v: &Scalar,
        x_g: &RistrettoPoint,
    ) -> Result<KnowledgeProof, CryptoError> {
        schnorr_prove(x, v, x_g)
    }

    async fn verify_knowledge_proof(&self, x_g: &RistrettoPoint, proof: &KnowledgeProof) -> bool {
        schnorr_verify(x_g, proof)
    }

    async fn create_disjunctive_proof(
        &self,
        keys: &ProofKeys,
        w: &Scalar,
        r: &Scalar,
        d: &Scalar,
        x: &Scalar,
        branch: Branch,
        index: u64,
    ) -> Result<DisjunctiveProof, CryptoError> {
        disjunctive_prove(keys, w, r, d, x, branch, index)
    }

    async fn verify_disjunctive_proof(
        &self,
        proof: &DisjunctiveProof,
        keys: &ProofKeys,
        index: u64,
    ) -> bool {
        disjunctive_verify(proof, keys, index)
    }

    async fn commitment_hash(&self, proof: &DisjunctiveProof, keys: &ProofKeys) -> CommitmentHash {
        commitment_hash(proof, keys)
    }
}

/// `x*G`
pub fn public_point(x: &Scalar) -> RistrettoPoint {
    &RISTRETTO_BASEPOINT_TABLE * x
}

fn challenge(points: &[&RistrettoPoint], index: Option<u64>) -> Scalar {
    let mut hasher = Sha512::new();
    if let Some(index) = index {
        hasher.update(&index.to_le_bytes());
    }
    for point in points {
        hasher.update(point.compress().as_bytes());
    }
    Scalar::from_hash(hasher)
}

pub(crate) fn schnorr_prove(
    x: &Scalar,
    v: &Scalar,
    x_g: &RistrettoPoint,
) -> Result<KnowledgeProof, CryptoError> {
    if &public_point(x) != x_g {
        return Err(CryptoError::KeyMismatch);
    }
    let v_g = public_point(v);
    let c = challenge(&[&RISTRETTO_BASEPOINT_POINT, x_g, &v_g], None);
    Ok(KnowledgeProof { v_g, r: v - c * x })
}

pub(crate) fn schnorr_verify(x_g: &RistrettoPoint, proof: &KnowledgeProof) -> bool {
    if x_g == &RistrettoPoint::identity() {
        return false;
    }
    let c = challenge(&[&RISTRETTO_BASEPOINT_POINT, x_g, &proof.v_g], None);
    proof.v_g == public_point(&proof.r) + x_g * c
}

fn disjunctive_challenge(
    keys: &ProofKeys,
    y: &RistrettoPoint,
    a1: &RistrettoPoint,
    b1: &RistrettoPoint,
    a2: &RistrettoPoint,
    b2: &RistrettoPoint,
    index: u64,
) -> Scalar {
    challenge(&[&keys.x_g, &keys.y_g, y, a1, b1, a2, b2], Some(index))
}

pub(crate) fn disjunctive_prove(
    keys: &ProofKeys,
    w: &Scalar,
    r: &Scalar,
    d: &Scalar,
    x: &Scalar,
    branch: Branch,
    index: u64,
) -> Result<DisjunctiveProof, CryptoError> {
    if public_point(x) != keys.x_g {
        return Err(CryptoError::KeyMismatch);
    }
    if keys.y_g == RistrettoPoint::identity() {
        return Err(CryptoError::DegenerateKey);
    }

    let g = RISTRETTO_BASEPOINT_POINT;
    let y = keys.y_g * x + public_point(&branch.value());

    let proof = match branch {
        Branch::Yes => {
            // Simulate the "0" branch, prove the "1" branch
            let (r1, d1) = (*r, *d);
            let a1 = public_point(&r1) + keys.x_g * d1;
            let b1 = keys.y_g * r1 + y * d1;
            let a2 = public_point(w);
            let b2 = keys.y_g * w;

            let c = disjunctive_challenge(keys, &y, &a1, &b1, &a2, &b2, index);
            let d2 = c - d1;
            let r2 = w - x * d2;
            DisjunctiveProof {
                d1,
                d2,
                r1,
                r2,
                y,
                a1,
                b1,
                a2,
                b2,
            }
        }
        Branch::No => {
            // Simulate the "1" branch, prove the "0" branch
            let (r2, d2) = (*r, *d);
            let a1 = public_point(w);
            let b1 = keys.y_g * w;
            let a2 = public_point(&r2) + keys.x_g * d2;
            let b2 = keys.y_g * r2 + (y - g) * d2;

            let c = disjunctive_challenge(keys, &y, &a1, &b1, &a2, &b2, index);
            let d1 = c - d2;
            let r1 = w - x * d1;
            DisjunctiveProof {
                d1,
                d2,
                r1,
                r2,
                y,
                a1,
                b1,
                a2,
                b2,
            }
        }
    };

    Ok(proof)
}

/// Both branches are checked by the same equations, so the verifier learns
/// nothing about which one was real.
pub(crate) fn disjunctive_verify(proof: &DisjunctiveProof, keys: &ProofKeys, index: u64) -> bool {
    let g = RISTRETTO_BASEPOINT_POINT;
    let c = disjunctive_challenge(
        keys, &proof.y, &proof.a1, &proof.b1, &proof.a2, &proof.b2, index,
    );

    c == proof.d1 + proof.d2
        && proof.a1 == public_point(&proof.r1) + keys.x_g * proof.d1
        && proof.b1 == keys.y_g * proof.r1 + proof.y * proof.d1
        && proof.a2 == public_point(&proof.r2) + keys.x_g * proof.d2
        && proof.b2 == keys.y_g * proof.r2 + (proof.y - g) * proof.d2
}

pub(crate) fn commitment_hash(proof: &DisjunctiveProof, keys: &ProofKeys) -> CommitmentHash {
    let mut hasher = Sha256::new();
    for param in proof.params().iter() {
        hasher.update(param.as_bytes());
    }
    for point in [
        &keys.x_g, &keys.y_g, &proof.y, &proof.a1, &proof.b1, &proof.a2, &proof.b2,
    ]
    .iter()
    {
        hasher.update(point.compress().as_bytes());
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Reconstructed key for each slot: `Y_i = sum(X_j, j < i) - sum(X_j, j > i)`
pub fn reconstructed_keys(keys: &[RistrettoPoint]) -> Vec<RistrettoPoint> {
    let total: RistrettoPoint = keys.iter().sum();
    let mut before = RistrettoPoint::identity();
    let mut reconstructed = Vec::with_capacity(keys.len());
    for key in keys {
        let after = total - before - key;
        reconstructed.push(before - after);
        before += key;
    }
    reconstructed
}

/// Recover `k` from `k*G` for `k` in `0..=max`
pub fn count_yes_votes(sum: &RistrettoPoint, max: u64) -> Option<u64> {
    let g = RISTRETTO_BASEPOINT_POINT;
    let mut acc = RistrettoPoint::identity();
    for k in 0..=max {
        if &acc == sum {
            return Some(k);
        }
        acc += g;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_for(x: &Scalar, y_g: RistrettoPoint) -> ProofKeys {
        ProofKeys {
            x_g: public_point(x),
            y_g,
        }
    }

    #[tokio::test]
    async fn knowledge_proof() {
        let crypto = LocalCrypto;
        let x = random_scalar();
        let v = random_scalar();
        let x_g = public_point(&x);

        let proof = crypto.create_knowledge_proof(&x, &v, &x_g).await.unwrap();
        assert!(crypto.verify_knowledge_proof(&x_g, &proof).await);

        // A tampered voting key must not verify
        let tampered = x_g + RISTRETTO_BASEPOINT_POINT;
        assert!(!crypto.verify_knowledge_proof(&tampered, &proof).await);

        // A secret that doesn't match the key is refused up front
        let other = random_scalar();
        assert_eq!(
            crypto.create_knowledge_proof(&other, &v, &x_g).await,
            Err(CryptoError::KeyMismatch)
        );
    }

    #[tokio::test]
    async fn disjunctive_proof_both_branches() {
        let crypto = LocalCrypto;
        let x = random_scalar();
        let y_g = public_point(&random_scalar());
        let keys = keys_for(&x, y_g);
        let (w, r, d) = (random_scalar(), random_scalar(), random_scalar());

        for branch in [Branch::Yes, Branch::No].iter() {
            let proof = crypto
                .create_disjunctive_proof(&keys, &w, &r, &d, &x, *branch, 3)
                .await
                .unwrap();
            assert!(crypto.verify_disjunctive_proof(&proof, &keys, 3).await);

            // Bound to the voter index
            assert!(!crypto.verify_disjunctive_proof(&proof, &keys, 4).await);

            // Bound to the reconstructed key
            let other = keys_for(&x, y_g + RISTRETTO_BASEPOINT_POINT);
            assert!(!crypto.verify_disjunctive_proof(&proof, &other, 3).await);

            let expected_y = y_g * x + public_point(&branch.value());
            assert_eq!(proof.y, expected_y);
        }
    }

    #[tokio::test]
    async fn tampered_disjunctive_proof() {
        let crypto = LocalCrypto;
        let x = random_scalar();
        let keys = keys_for(&x, public_point(&random_scalar()));
        let (w, r, d) = (random_scalar(), random_scalar(), random_scalar());

        let mut proof = crypto
            .create_disjunctive_proof(&keys, &w, &r, &d, &x, Branch::No, 0)
            .await
            .unwrap();
        let hash = crypto.commitment_hash(&proof, &keys).await;

        proof.y += RISTRETTO_BASEPOINT_POINT;
        assert!(!crypto.verify_disjunctive_proof(&proof, &keys, 0).await);
        assert_ne!(crypto.commitment_hash(&proof, &keys).await, hash);
    }

    #[test]
    fn self_tally_cancels() {
        // Five voters, three vote yes
        let secrets: Vec<Scalar> = (0..5).map(|_| random_scalar()).collect();
        let keys: Vec<RistrettoPoint> = secrets.iter().map(public_point).collect();
        let reconstructed = reconstructed_keys(&keys);

        let votes = [1u64, 0, 1, 1, 0];
        let sum: RistrettoPoint = secrets
            .iter()
            .zip(reconstructed.iter())
            .zip(votes.iter())
            .map(|((x, y_g), v)| y_g * x + public_point(&Scalar::from(*v)))
            .sum();

        assert_eq!(count_yes_votes(&sum, 5), Some(3));
        assert_eq!(count_yes_votes(&sum, 2), None);
    }
}

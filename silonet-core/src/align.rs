//! Private alignment of record sets across parties.
//!
//! Parties hold overlapping records under shared identifiers (the first column of every row)
//! and want the rows they have in common, without any party learning which of its other
//! records the peers do not hold. Alignment runs a Diffie-Hellman double masking: every party
//! blinds the digests of its identifiers with a secret factor and the blinded sets are passed
//! through every other party's factor as well. Blinding commutes, so equal identifiers meet in
//! the same group element, while unmatched digests stay hidden behind at least one foreign
//! factor.
//!
//! [`intersect`] reveals only the local party's rows, restricted to identifiers every party
//! holds. The order of the returned rows follows the identifier digests, not the input order,
//! and carries no meaning. Within one party's set, duplicate identifiers collapse to their
//! first row.
//!
//! ```
//! use silonet_core::{align, dataset::Dataset, validation::PsiProtocol, PartyId};
//!
//! let bank = Dataset::from_rows(vec![vec![17., 1000.], vec![42., 2000.]]).unwrap();
//! let insurer = Dataset::from_rows(vec![vec![42., 3.], vec![65., 1.]]).unwrap();
//!
//! let aligned = align::intersect(
//!     &[(PartyId(0), bank), (PartyId(1), insurer)],
//!     PartyId(0),
//!     PsiProtocol::EcdhPsi,
//! )
//! .unwrap();
//! // only the bank's row for the shared identifier 42 is revealed to the bank
//! assert_eq!(aligned.as_slice(), &[42., 2000.]);
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{
    crypto::{BlindedPoint, BlindingError, BlindingFactor, ByteObject, RecordDigest},
    dataset::Dataset,
    validation::PsiProtocol,
    PartyId,
};

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors related to the alignment of record sets.
pub enum AlignmentError {
    /// The protocol has no implementation in this build.
    #[error("the PSI protocol {0} is not available")]
    Unsupported(PsiProtocol),

    /// The parties declared different protocols.
    #[error("the parties do not agree on the PSI protocol")]
    ProtocolMismatch,

    /// A party without a staged dataset was addressed.
    #[error("the party {0} holds no staged dataset")]
    MissingParty(PartyId),

    /// A peer could not be reached.
    #[error("a peer became unavailable during the alignment exchange")]
    PeerUnavailable,

    /// A peer did not answer in time.
    #[error("the alignment exchange timed out")]
    Timeout,

    /// A record digest could not be blinded.
    #[error(transparent)]
    Blinding(#[from] BlindingError),
}

/// One party's state in the alignment exchange: its secret blinding factor.
#[derive(Debug)]
pub struct Aligner {
    factor: BlindingFactor,
}

impl Aligner {
    /// Creates an aligner with a fresh random blinding factor.
    pub fn generate() -> Self {
        Self {
            factor: BlindingFactor::generate(),
        }
    }

    /// Creates an aligner from an existing blinding factor.
    pub fn from_factor(factor: BlindingFactor) -> Self {
        Self { factor }
    }

    /// Applies this aligner's factor on top of the given, possibly already blinded points.
    ///
    /// # Errors
    /// Fails if any point is of low order.
    pub fn blind_points(
        &self,
        points: &[BlindedPoint],
    ) -> Result<Vec<BlindedPoint>, BlindingError> {
        points.iter().map(|point| self.factor.blind(point)).collect()
    }
}

/// Checks that every party declared the same PSI protocol and returns it.
///
/// # Errors
/// Fails with [`AlignmentError::ProtocolMismatch`] if the declarations differ or if there is
/// no declaration at all.
pub fn agree_protocol(
    declared: impl IntoIterator<Item = PsiProtocol>,
) -> Result<PsiProtocol, AlignmentError> {
    let mut declared = declared.into_iter();
    let first = declared.next().ok_or(AlignmentError::ProtocolMismatch)?;
    if declared.all(|protocol| protocol == first) {
        Ok(first)
    } else {
        Err(AlignmentError::ProtocolMismatch)
    }
}

/// Digests the record identifiers of a dataset, in row order.
///
/// The digest is taken over the canonical little-endian bit pattern of the identifier, so
/// `-0.0` and `0.0` are distinct identifiers. Duplicates collapse to their first row.
fn digest_records(dataset: &Dataset) -> Vec<(usize, RecordDigest)> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for (idx, row) in dataset.iter_rows().enumerate() {
        let digest = RecordDigest::digest(&row[0].to_bits().to_le_bytes());
        if seen.insert(digest) {
            records.push((idx, digest));
        }
    }
    records
}

/// Intersects the record sets of the given parties and reveals the matching rows of the local
/// party.
///
/// The returned dataset holds the local party's rows whose identifier every party holds,
/// ordered by identifier digest. An empty intersection yields a zero-row dataset with the
/// local column count, not an error.
///
/// # Errors
/// Fails if the protocol is not available, if the local party holds no staged dataset, or if
/// a record digest cannot be blinded.
pub fn intersect(
    datasets: &[(PartyId, Dataset)],
    local_party: PartyId,
    protocol: PsiProtocol,
) -> Result<Dataset, AlignmentError> {
    if protocol != PsiProtocol::EcdhPsi {
        return Err(AlignmentError::Unsupported(protocol));
    }
    let local_idx = datasets
        .iter()
        .position(|(party, _)| *party == local_party)
        .ok_or(AlignmentError::MissingParty(local_party))?;

    let aligners = datasets
        .iter()
        .map(|_| Aligner::generate())
        .collect::<Vec<_>>();
    let mut blinded = Vec::with_capacity(datasets.len());
    for (_, dataset) in datasets {
        let records = digest_records(dataset);
        let mut points = records
            .iter()
            .map(|(_, digest)| BlindedPoint::from_digest(digest))
            .collect::<Vec<_>>();
        // commutativity makes the application order of the factors irrelevant
        for aligner in &aligners {
            points = aligner.blind_points(&points)?;
        }
        blinded.push((records, points));
    }

    let peer_sets = blinded
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != local_idx)
        .map(|(_, (_, points))| points.iter().cloned().collect::<HashSet<_>>())
        .collect::<Vec<_>>();
    let (local_records, local_points) = &blinded[local_idx];
    let mut matched = local_records
        .iter()
        .zip(local_points)
        .filter(|(_, point)| peer_sets.iter().all(|set| set.contains(point)))
        .map(|((row, digest), _)| (*digest, *row))
        .collect::<Vec<_>>();
    matched.sort_by_key(|(digest, _)| *digest);

    let indices = matched.into_iter().map(|(_, row)| row).collect::<Vec<_>>();
    Ok(datasets[local_idx].1.select_rows(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: &[[f64; 2]]) -> Dataset {
        Dataset::from_rows(rows.iter().map(|row| row.to_vec()).collect())
            // safe unwrap: the rows are rectangular
            .unwrap()
    }

    fn contains_row(dataset: &Dataset, row: &[f64]) -> bool {
        dataset.iter_rows().any(|candidate| candidate == row)
    }

    #[test]
    fn test_intersection_matches_common_identifiers() {
        let left = dataset(&[[1., 10.], [2., 20.], [3., 30.]]);
        let right = dataset(&[[2., -1.], [3., -1.], [4., -1.]]);
        let aligned = intersect(
            &[(PartyId(0), left), (PartyId(1), right)],
            PartyId(0),
            PsiProtocol::EcdhPsi,
        )
        .unwrap();

        assert_eq!(aligned.shape(), (2, 2));
        // the local party's payloads survive, the peer's never appear
        assert!(contains_row(&aligned, &[2., 20.]));
        assert!(contains_row(&aligned, &[3., 30.]));
    }

    #[test]
    fn test_intersection_is_idempotent() {
        let left = dataset(&[[5., 1.], [7., 2.], [9., 3.]]);
        let right = dataset(&[[9., 0.], [5., 0.]]);
        let parties = [(PartyId(0), left), (PartyId(1), right.clone())];

        let aligned = intersect(&parties, PartyId(0), PsiProtocol::EcdhPsi).unwrap();
        let realigned = intersect(
            &[(PartyId(0), aligned.clone()), (PartyId(1), right)],
            PartyId(0),
            PsiProtocol::EcdhPsi,
        )
        .unwrap();
        assert_eq!(aligned, realigned);
    }

    #[test]
    fn test_disjoint_identifiers_yield_zero_rows() {
        let left = dataset(&[[1., 10.], [2., 20.]]);
        let right = dataset(&[[3., 30.], [4., 40.]]);
        let aligned = intersect(
            &[(PartyId(0), left), (PartyId(1), right)],
            PartyId(0),
            PsiProtocol::EcdhPsi,
        )
        .unwrap();
        assert_eq!(aligned.shape(), (0, 2));
    }

    #[test]
    fn test_duplicate_identifiers_collapse_to_the_first_row() {
        let left = dataset(&[[2., 1.], [2., 2.], [3., 3.]]);
        let right = dataset(&[[2., 0.]]);
        let aligned = intersect(
            &[(PartyId(0), left), (PartyId(1), right)],
            PartyId(0),
            PsiProtocol::EcdhPsi,
        )
        .unwrap();

        // the output row count stays bounded by the smallest input
        assert_eq!(aligned.shape(), (1, 2));
        assert!(contains_row(&aligned, &[2., 1.]));
    }

    #[test]
    fn test_three_parties() {
        let a = dataset(&[[1., 1.], [2., 1.], [3., 1.]]);
        let b = dataset(&[[2., 2.], [3., 2.], [4., 2.]]);
        let c = dataset(&[[3., 3.], [5., 3.]]);
        let aligned = intersect(
            &[(PartyId(0), a), (PartyId(1), b), (PartyId(2), c)],
            PartyId(1),
            PsiProtocol::EcdhPsi,
        )
        .unwrap();
        assert_eq!(aligned.as_slice(), &[3., 2.]);
    }

    #[test]
    fn test_unsupported_protocol() {
        let left = dataset(&[[1., 10.]]);
        assert_eq!(
            intersect(&[(PartyId(0), left)], PartyId(0), PsiProtocol::KkrtPsi),
            Err(AlignmentError::Unsupported(PsiProtocol::KkrtPsi)),
        );
    }

    #[test]
    fn test_missing_local_party() {
        let left = dataset(&[[1., 10.]]);
        assert_eq!(
            intersect(&[(PartyId(0), left)], PartyId(9), PsiProtocol::EcdhPsi),
            Err(AlignmentError::MissingParty(PartyId(9))),
        );
    }

    #[test]
    fn test_agree_protocol() {
        assert_eq!(
            agree_protocol(vec![PsiProtocol::EcdhPsi, PsiProtocol::EcdhPsi]),
            Ok(PsiProtocol::EcdhPsi),
        );
        assert_eq!(
            agree_protocol(vec![PsiProtocol::EcdhPsi, PsiProtocol::KkrtPsi]),
            Err(AlignmentError::ProtocolMismatch),
        );
        assert_eq!(agree_protocol(vec![]), Err(AlignmentError::ProtocolMismatch));
    }
}

use crate::storage::{DatasetAdd, ProjectStorage, StagedDataset};
use silonet_core::{
    cipher::{CipherSuite, Encryptor},
    testutils,
    PartyId,
    ProjectName,
};

/// Encrypts a small test dataset on behalf of the given party and attaches the default
/// privacy settings.
pub fn staged_dataset(party: u32) -> StagedDataset {
    let keys = testutils::coordinator_keys();
    let dataset = testutils::dataset(4, 3);
    StagedDataset {
        settings: testutils::settings(),
        dataset: Encryptor::new(CipherSuite::default()).encrypt(
            &dataset,
            PartyId(party),
            &keys.public,
        ),
    }
}

/// Stages one dataset per party and returns the staging results.
pub async fn stage_datasets(
    store: &mut impl ProjectStorage,
    project: &ProjectName,
    parties: &[u32],
) -> Vec<DatasetAdd> {
    let mut results = Vec::new();
    for party in parties {
        let dataset = staged_dataset(*party);
        let res = store
            .add_staged_dataset(project, PartyId(*party), &dataset)
            .await;
        assert!(res.is_ok());
        results.push(res.unwrap())
    }

    results
}

pub mod utils;

use crate::storage::{memory, CheckpointStorage, ProjectStorage, Store};

pub async fn init_store() -> Store<memory::ProjectStore, memory::CheckpointStore> {
    Store::new(memory::ProjectStore::new(), memory::CheckpointStore::new())
}

mod project_storage {
    use super::{utils::*, *};
    use crate::{
        state_machine::tests::utils::{coordinator_state, project, round_event},
        storage::{DatasetAddError, Storage},
    };
    use silonet_core::PartyId;

    #[tokio::test]
    async fn test_set_and_get_coordinator_state() {
        let mut store = init_store().await;

        let set_state = coordinator_state();
        store.set_coordinator_state(&set_state).await.unwrap();

        let get_state = store
            .coordinator_state(&set_state.project)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(set_state, get_state)
    }

    #[tokio::test]
    async fn test_get_coordinator_state_empty() {
        let mut store = init_store().await;

        let get_state = store.coordinator_state(&project()).await.unwrap();

        assert_eq!(None, get_state)
    }

    #[tokio::test]
    async fn test_stage_dataset_once_per_party() {
        let mut store = init_store().await;
        let project = project();

        let results = stage_datasets(&mut store, &project, &[1]).await;
        assert!(results[0].is_ok());

        // a second dataset of the same party must be turned away
        let dataset = staged_dataset(1);
        let result = store
            .add_staged_dataset(&project, PartyId(1), &dataset)
            .await
            .unwrap();
        assert!(matches!(
            result.into_inner().unwrap_err(),
            DatasetAddError::AlreadyStaged
        ));

        assert_eq!(store.staged_count(&project).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_staged_datasets_sorted_by_party() {
        let mut store = init_store().await;
        let project = project();

        stage_datasets(&mut store, &project, &[2, 0, 1]).await;

        let datasets = store.staged_datasets(&project).await.unwrap();
        let parties: Vec<PartyId> = datasets.iter().map(|(party, _)| *party).collect();
        assert_eq!(parties, vec![PartyId(0), PartyId(1), PartyId(2)]);
    }

    #[tokio::test]
    async fn test_delete_staged_datasets() {
        let mut store = init_store().await;
        let project = project();

        stage_datasets(&mut store, &project, &[0, 1]).await;
        assert_eq!(store.staged_count(&project).await.unwrap(), 2);

        store.delete_staged_datasets(&project).await.unwrap();

        assert_eq!(store.staged_count(&project).await.unwrap(), 0);
        assert!(store.staged_datasets(&project).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_events_keep_insertion_order() {
        let mut store = init_store().await;
        let project = project();

        let first = round_event(1, "round started");
        let second = round_event(1, "round completed");
        store.append_round_event(&project, &first).await.unwrap();
        store.append_round_event(&project, &second).await.unwrap();

        let events = store.round_events(&project).await.unwrap();
        assert_eq!(events, vec![first, second]);
    }

    #[tokio::test]
    async fn test_delete_project_data() {
        let mut store = init_store().await;

        let state = coordinator_state();
        let project = state.project.clone();
        store.set_coordinator_state(&state).await.unwrap();
        stage_datasets(&mut store, &project, &[0]).await;
        store
            .append_round_event(&project, &round_event(1, "round started"))
            .await
            .unwrap();

        store.delete_project_data(&project).await.unwrap();

        assert_eq!(store.coordinator_state(&project).await.unwrap(), None);
        assert_eq!(store.staged_count(&project).await.unwrap(), 0);
        assert!(store.round_events(&project).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_is_ready() {
        let mut store = init_store().await;
        assert!(Storage::is_ready(&mut store).await.is_ok());
    }
}

mod checkpoint_storage {
    use super::*;
    use crate::state_machine::tests::utils::project;
    use silonet_core::{model::TaskType, testutils};

    #[tokio::test]
    async fn test_set_and_get_model() {
        let mut store = init_store().await;
        let project = project();

        assert_eq!(store.model(&project).await.unwrap(), None);

        let model = testutils::model(TaskType::FraudDetection);
        store.set_model(&project, &model).await.unwrap();

        assert_eq!(store.model(&project).await.unwrap(), Some(model));
    }

    #[tokio::test]
    async fn test_single_checkpoint_slot() {
        let mut store = init_store().await;
        let project = project();

        assert_eq!(store.checkpoint(&project).await.unwrap(), None);

        let mut model = testutils::model(TaskType::FraudDetection);
        let first = model.checkpoint();
        store.set_checkpoint(&project, &first).await.unwrap();
        assert_eq!(store.checkpoint(&project).await.unwrap(), Some(first));

        // a later checkpoint overwrites the slot
        model.forget_point(&[1., 2., 3.]);
        let second = model.checkpoint();
        store.set_checkpoint(&project, &second).await.unwrap();
        assert_eq!(store.checkpoint(&project).await.unwrap(), Some(second));
    }
}

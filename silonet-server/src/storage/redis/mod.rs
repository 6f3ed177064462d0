//! A Redis backed [`ProjectStorage`] and [`CheckpointStorage`].
//!
//! # Redis Data Model
//!
//!```text
//! {
//!     // Coordinator state of a project
//!     "state:<project>": "...", // bincode encoded string
//!     // Staged datasets of a project
//!     "staged:<project>": { // hash
//!         "<party_id_1>": StagedDataset_1, // bincode encoded string
//!         "<party_id_2>": StagedDataset_2
//!     },
//!     // Round event log of a project
//!     "events:<project>": [ // list
//!         RoundEventRecord_1, // bincode encoded string
//!         RoundEventRecord_2
//!     ],
//!     // Current model of a project
//!     "model:<project>": "...", // bincode encoded string
//!     // Checkpoint slot of a project
//!     "checkpoints/<project>_checkpoint": "..." // bincode encoded string
//! }
//! ```

mod impls;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, IntoConnectionInfo};
pub use redis::{RedisError, RedisResult};
use tracing::debug;

use self::impls::{CheckpointWrite, ModelArtifactWrite};
use crate::{
    state_machine::{coordinator::CoordinatorState, events::RoundEventRecord},
    storage::{
        CheckpointStorage,
        DatasetAdd,
        ProjectStorage,
        StagedDataset,
        Storage,
        StorageError,
        StorageResult,
    },
};
use silonet_core::{
    model::{Checkpoint, ModelArtifact},
    PartyId,
    ProjectName,
};

#[derive(Clone)]
pub struct Client {
    connection: ConnectionManager,
}

#[cfg(test)]
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redis client").finish()
    }
}

fn to_storage_err(e: RedisError) -> StorageError {
    anyhow::anyhow!(e)
}

fn state_key(project: &ProjectName) -> String {
    format!("state:{}", project)
}

fn staged_key(project: &ProjectName) -> String {
    format!("staged:{}", project)
}

fn events_key(project: &ProjectName) -> String {
    format!("events:{}", project)
}

fn model_key(project: &ProjectName) -> String {
    format!("model:{}", project)
}

impl Client {
    /// Creates a new Redis client.
    ///
    /// `url` to which Redis instance the client should connect to.
    /// The URL format is `redis://[<username>][:<passwd>@]<hostname>[:port][/<db>]`.
    ///
    /// The [`Client`] uses a [`redis::aio::ConnectionManager`] that automatically reconnects
    /// if the connection is dropped.
    pub async fn new<T: IntoConnectionInfo>(url: T) -> Result<Self, RedisError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_tokio_connection_manager().await?;
        Ok(Self { connection })
    }

    async fn ping(&mut self) -> StorageResult<()> {
        // https://redis.io/commands/ping
        // > Returns PONG if no argument is provided.
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.connection)
            .await
            .map(|_| ())
            .map_err(to_storage_err)
    }
}

#[async_trait]
impl ProjectStorage for Client {
    /// See [`ProjectStorage::set_coordinator_state`].
    async fn set_coordinator_state(&mut self, state: &CoordinatorState) -> StorageResult<()> {
        debug!("set coordinator state of project {}", state.project);
        // https://redis.io/commands/set
        // > Set key to hold the string value. If key already holds a value,
        //   it is overwritten, regardless of its type.
        // Possible return value in our case:
        // > Simple string reply: OK if SET was executed correctly.
        self.connection
            .set(state_key(&state.project), state)
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::coordinator_state`].
    async fn coordinator_state(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Option<CoordinatorState>> {
        // https://redis.io/commands/get
        // > Get the value of key. If the key does not exist the special value nil is returned.
        //   An error is returned if the value stored at key is not a string, because GET only
        //   handles string values.
        // > Return value
        //   Bulk string reply: the value of key, or nil when key does not exist.
        self.connection
            .get(state_key(project))
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::add_staged_dataset`].
    async fn add_staged_dataset(
        &mut self,
        project: &ProjectName,
        party: PartyId,
        dataset: &StagedDataset,
    ) -> StorageResult<DatasetAdd> {
        debug!("stage dataset of party {} for project {}", party, project);
        // https://redis.io/commands/hsetnx
        // > If field already exists, this operation has no effect.
        // > Return value
        //   Integer reply, specifically:
        //   1 if field is a new field in the hash and value was set.
        //   0 if field already exists in the hash and no operation was performed.
        self.connection
            .hset_nx(staged_key(project), u32::from(party), dataset)
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::staged_datasets`].
    async fn staged_datasets(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Vec<(PartyId, StagedDataset)>> {
        debug!("get staged datasets of project {}", project);
        // https://redis.io/commands/hgetall
        // > Return value
        //   Array reply: list of fields and their values stored in the hash, or an empty
        //   list when key does not exist.
        let reply: Vec<(u32, StagedDataset)> = self
            .connection
            .hgetall(staged_key(project))
            .await
            .map_err(to_storage_err)?;

        let mut datasets: Vec<(PartyId, StagedDataset)> = reply
            .into_iter()
            .map(|(party, dataset)| (PartyId::from(party), dataset))
            .collect();
        // the hash field order is unspecified
        datasets.sort_by_key(|(party, _)| *party);

        Ok(datasets)
    }

    /// See [`ProjectStorage::staged_count`].
    async fn staged_count(&mut self, project: &ProjectName) -> StorageResult<u64> {
        // https://redis.io/commands/hlen
        // > Return value
        //   Integer reply: number of fields in the hash, or 0 when key does not exist.
        self.connection
            .hlen(staged_key(project))
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::delete_staged_datasets`].
    async fn delete_staged_datasets(&mut self, project: &ProjectName) -> StorageResult<()> {
        debug!("flush staged datasets of project {}", project);
        // https://redis.io/commands/del
        // > Return value:
        //   The number of keys that were removed.
        //
        // Returns `0` if the key does not exist.
        // We ignore the return value because we are not interested in it.
        self.connection
            .del(staged_key(project))
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::append_round_event`].
    async fn append_round_event(
        &mut self,
        project: &ProjectName,
        event: &RoundEventRecord,
    ) -> StorageResult<()> {
        // https://redis.io/commands/rpush
        // > Insert all the specified values at the tail of the list stored at key. If key does
        //   not exist, it is created as empty list before performing the push operation.
        // > Return value
        //   Integer reply: the length of the list after the push operation.
        self.connection
            .rpush(events_key(project), event)
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::round_events`].
    async fn round_events(
        &mut self,
        project: &ProjectName,
    ) -> StorageResult<Vec<RoundEventRecord>> {
        debug!("get round events of project {}", project);
        // https://redis.io/commands/lrange
        // > Return value
        //   Array reply: list of elements in the specified range, or an empty list when key
        //   does not exist.
        self.connection
            .lrange(events_key(project), 0, -1)
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::delete_project_data`].
    ///
    /// # Note
    /// This method is **not** an atomic operation.
    async fn delete_project_data(&mut self, project: &ProjectName) -> StorageResult<()> {
        debug!("flush all data of project {}", project);
        let mut pipe = redis::pipe();
        pipe.del(state_key(project)).ignore();
        pipe.del(staged_key(project)).ignore();
        pipe.del(events_key(project)).ignore();
        pipe.atomic()
            .query_async(&mut self.connection)
            .await
            .map_err(to_storage_err)
    }

    /// See [`ProjectStorage::is_ready`].
    async fn is_ready(&mut self) -> StorageResult<()> {
        self.ping().await
    }
}

#[async_trait]
impl CheckpointStorage for Client {
    /// See [`CheckpointStorage::set_model`].
    async fn set_model(
        &mut self,
        project: &ProjectName,
        model: &ModelArtifact,
    ) -> StorageResult<()> {
        debug!("set model of project {}", project);
        // https://redis.io/commands/set
        // > Set key to hold the string value. If key already holds a value,
        //   it is overwritten, regardless of its type.
        self.connection
            .set(model_key(project), ModelArtifactWrite::from(model))
            .await
            .map_err(to_storage_err)
    }

    /// See [`CheckpointStorage::model`].
    async fn model(&mut self, project: &ProjectName) -> StorageResult<Option<ModelArtifact>> {
        // https://redis.io/commands/get
        // > Return value
        //   Bulk string reply: the value of key, or nil when key does not exist.
        let reply: Option<impls::ModelArtifactRead> = self
            .connection
            .get(model_key(project))
            .await
            .map_err(to_storage_err)?;
        Ok(reply.map(|model| model.into()))
    }

    /// See [`CheckpointStorage::set_checkpoint`].
    async fn set_checkpoint(
        &mut self,
        project: &ProjectName,
        checkpoint: &Checkpoint,
    ) -> StorageResult<()> {
        debug!("save checkpoint of project {}", project);
        // https://redis.io/commands/set
        // > Set key to hold the string value. If key already holds a value,
        //   it is overwritten, regardless of its type.
        self.connection
            .set(
                Self::checkpoint_key(project),
                CheckpointWrite::from(checkpoint),
            )
            .await
            .map_err(to_storage_err)
    }

    /// See [`CheckpointStorage::checkpoint`].
    async fn checkpoint(&mut self, project: &ProjectName) -> StorageResult<Option<Checkpoint>> {
        // https://redis.io/commands/get
        // > Return value
        //   Bulk string reply: the value of key, or nil when key does not exist.
        let reply: Option<impls::CheckpointRead> = self
            .connection
            .get(Self::checkpoint_key(project))
            .await
            .map_err(to_storage_err)?;
        Ok(reply.map(|checkpoint| checkpoint.into()))
    }

    /// See [`CheckpointStorage::is_ready`].
    async fn is_ready(&mut self) -> StorageResult<()> {
        self.ping().await
    }
}

#[async_trait]
impl Storage for Client {
    /// See [`Storage::is_ready`].
    async fn is_ready(&mut self) -> StorageResult<()> {
        self.ping().await
    }
}

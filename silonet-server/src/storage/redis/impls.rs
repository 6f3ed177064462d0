use std::convert::TryFrom;

use derive_more::{From, Into};
use paste::paste;
use redis::{ErrorKind, FromRedisValue, RedisError, RedisResult, RedisWrite, ToRedisArgs, Value};
use serde::{Deserialize, Serialize};

use crate::{
    state_machine::{coordinator::CoordinatorState, events::RoundEventRecord},
    storage::{DatasetAdd, DatasetAddError, StagedDataset},
};
use silonet_core::model::{Checkpoint, ModelArtifact};

fn redis_type_error(desc: &'static str, details: Option<String>) -> RedisError {
    if let Some(details) = details {
        RedisError::from((ErrorKind::TypeError, desc, details))
    } else {
        RedisError::from((ErrorKind::TypeError, desc))
    }
}

/// Implements [`FromRedisValue`] and [`ToRedisArgs`] through bincode for a
/// type that is [`Serialize`] + [`Deserialize`].
///
/// # Panics
///
/// `write_redis_args` panics if bincode cannot serialize the value. The cases
/// where that happens:
/// - https://github.com/servo/bincode/issues/293
/// - https://github.com/servo/bincode/issues/255
/// - https://github.com/servo/bincode/issues/130#issuecomment-284641263
macro_rules! impl_bincode_redis_traits {
    ($ty: ty) => {
        impl FromRedisValue for $ty {
            fn from_redis_value(v: &Value) -> RedisResult<$ty> {
                match *v {
                    Value::Data(ref bytes) => bincode::deserialize(bytes).map_err(|e| {
                        redis_type_error(
                            concat!("Invalid ", stringify!($ty)),
                            Some(e.to_string()),
                        )
                    }),
                    _ => Err(redis_type_error(
                        concat!("Response not ", stringify!($ty), " compatible"),
                        None,
                    )),
                }
            }
        }

        impl ToRedisArgs for $ty {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                let data = bincode::serialize(self).unwrap();
                data.write_redis_args(out)
            }
        }

        impl<'a> ToRedisArgs for &'a $ty {
            fn write_redis_args<W>(&self, out: &mut W)
            where
                W: ?Sized + RedisWrite,
            {
                (*self).write_redis_args(out)
            }
        }
    };
}

// These serialize without panicking: every sequence carries its length and
// none of the enums involved are untagged.
impl_bincode_redis_traits!(CoordinatorState);
impl_bincode_redis_traits!(StagedDataset);
impl_bincode_redis_traits!(RoundEventRecord);

/// Implements the bincode Redis traits for `silonet-core` types.
///
/// The Redis traits and the core types both live in other crates, so the orphan
/// rule forces newtypes. Each type gets a pair: a `Read` newtype that owns the
/// value it was decoded into, and a `Write` newtype that borrows, so that the
/// [`Client`] methods can take references.
///
/// [`Client`]: crate::storage::redis::Client
macro_rules! impl_bincode_read_write {
    ($ty: ty) => {
        paste! {
            #[derive(From, Into, Serialize, Deserialize)]
            pub(crate) struct [<$ty Read>]($ty);

            impl_bincode_redis_traits!([<$ty Read>]);

            #[derive(From, Serialize)]
            pub(crate) struct [<$ty Write>]<'a>(&'a $ty);

            impl ToRedisArgs for [<$ty Write>]<'_> {
                fn write_redis_args<W>(&self, out: &mut W)
                where
                    W: ?Sized + RedisWrite,
                {
                    let data = bincode::serialize(self).unwrap();
                    data.write_redis_args(out)
                }
            }

            impl<'a> ToRedisArgs for &'a [<$ty Write>]<'a> {
                fn write_redis_args<W>(&self, out: &mut W)
                where
                    W: ?Sized + RedisWrite,
                {
                    (*self).write_redis_args(out)
                }
            }
        }
    };
}

impl_bincode_read_write!(ModelArtifact);
impl_bincode_read_write!(Checkpoint);

impl FromRedisValue for DatasetAdd {
    fn from_redis_value(v: &Value) -> RedisResult<DatasetAdd> {
        match *v {
            Value::Int(1) => Ok(DatasetAdd(Ok(()))),
            Value::Int(error_code) => {
                let error = DatasetAddError::try_from(error_code).map_err(|_| {
                    redis_type_error(
                        "Response status not valid integer",
                        Some(format!("Response was {:?}", v)),
                    )
                })?;
                Ok(DatasetAdd(Err(error)))
            }
            _ => Err(redis_type_error(
                "Response status not valid integer",
                Some(format!("Response was {:?}", v)),
            )),
        }
    }
}

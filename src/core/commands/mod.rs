// src/core/commands/mod.rs

//! Typed command wrappers.
//!
//! Every server command is a pure mapping to a `Command` plus a reply type;
//! the builders live in the category modules and the extension traits below
//! send them through any `Executor`.

use crate::core::ClientError;
use crate::core::client::SpinelClient;
use crate::core::cluster::ClusterClient;
use crate::core::command::Command;
use crate::core::protocol::FromResp;
use bytes::Bytes;
use futures::future::BoxFuture;

pub mod connection;
pub mod strings;

pub use strings::{BitFieldArgs, BitFieldOp, BitOp, BitType, OverflowBehavior, SetArgs};

/// Anything that can send a `Command` and decode its reply.
pub trait Executor: Send + Sync {
    fn dispatch<T: FromResp + Send + 'static>(
        &self,
        command: Command,
    ) -> BoxFuture<'static, Result<T, ClientError>>;
}

impl Executor for SpinelClient {
    fn dispatch<T: FromResp + Send + 'static>(
        &self,
        command: Command,
    ) -> BoxFuture<'static, Result<T, ClientError>> {
        Box::pin(self.send::<T>(command))
    }
}

impl Executor for ClusterClient {
    fn dispatch<T: FromResp + Send + 'static>(
        &self,
        command: Command,
    ) -> BoxFuture<'static, Result<T, ClientError>> {
        let cluster = self.clone();
        Box::pin(async move { cluster.execute::<T>(command).await })
    }
}

type Reply<T> = BoxFuture<'static, Result<T, ClientError>>;

/// Connection-level commands.
pub trait ConnectionCommands: Executor {
    fn ping(&self) -> Reply<String> {
        self.dispatch(connection::ping())
    }

    fn echo(&self, message: impl AsRef<[u8]>) -> Reply<Bytes> {
        self.dispatch(connection::echo(message))
    }

    /// Returns the number of subscribers that received the message.
    fn publish(&self, channel: impl AsRef<[u8]>, message: impl AsRef<[u8]>) -> Reply<i64> {
        self.dispatch(connection::publish(channel, message))
    }
}

impl<E: Executor> ConnectionCommands for E {}

/// String and bit commands.
pub trait StringCommands: Executor {
    fn append(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Reply<i64> {
        self.dispatch(strings::append(key, value))
    }

    fn bitcount(&self, key: impl AsRef<[u8]>) -> Reply<i64> {
        self.dispatch(strings::bitcount(key))
    }

    fn bitcount_range(&self, key: impl AsRef<[u8]>, start: i64, end: i64) -> Reply<i64> {
        self.dispatch(strings::bitcount_range(key, start, end))
    }

    /// One entry per GET/SET/INCRBY sub-operation; `None` where `OVERFLOW FAIL` applied.
    fn bitfield(&self, key: impl AsRef<[u8]>, args: &BitFieldArgs) -> Reply<Vec<Option<i64>>> {
        self.dispatch(strings::bitfield(key, args))
    }

    fn bitpos(&self, key: impl AsRef<[u8]>, bit: bool) -> Reply<i64> {
        self.dispatch(strings::bitpos(key, bit))
    }

    fn bitpos_range(&self, key: impl AsRef<[u8]>, bit: bool, start: i64, end: i64) -> Reply<i64> {
        self.dispatch(strings::bitpos_range(key, bit, start, end))
    }

    fn bitop<K: AsRef<[u8]>>(&self, op: BitOp, destination: K, sources: &[K]) -> Reply<i64> {
        self.dispatch(strings::bitop(op, destination, sources))
    }

    fn decr(&self, key: impl AsRef<[u8]>) -> Reply<i64> {
        self.dispatch(strings::decr(key))
    }

    fn decrby(&self, key: impl AsRef<[u8]>, amount: i64) -> Reply<i64> {
        self.dispatch(strings::decrby(key, amount))
    }

    fn get(&self, key: impl AsRef<[u8]>) -> Reply<Option<Bytes>> {
        self.dispatch(strings::get(key))
    }

    fn getbit(&self, key: impl AsRef<[u8]>, offset: u64) -> Reply<i64> {
        self.dispatch(strings::getbit(key, offset))
    }

    fn getrange(&self, key: impl AsRef<[u8]>, start: i64, end: i64) -> Reply<Bytes> {
        self.dispatch(strings::getrange(key, start, end))
    }

    fn getset(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Reply<Option<Bytes>> {
        self.dispatch(strings::getset(key, value))
    }

    fn incr(&self, key: impl AsRef<[u8]>) -> Reply<i64> {
        self.dispatch(strings::incr(key))
    }

    fn incrby(&self, key: impl AsRef<[u8]>, amount: i64) -> Reply<i64> {
        self.dispatch(strings::incrby(key, amount))
    }

    fn incrbyfloat(&self, key: impl AsRef<[u8]>, amount: f64) -> Reply<f64> {
        self.dispatch(strings::incrbyfloat(key, amount))
    }

    fn mget<K: AsRef<[u8]>>(&self, keys: &[K]) -> Reply<Vec<Option<Bytes>>> {
        self.dispatch(strings::mget(keys))
    }

    fn mset<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, pairs: &[(K, V)]) -> Reply<()> {
        self.dispatch(strings::mset(pairs))
    }

    /// `true` if every key was set, `false` if none was because one already existed.
    fn msetnx<K: AsRef<[u8]>, V: AsRef<[u8]>>(&self, pairs: &[(K, V)]) -> Reply<bool> {
        self.dispatch(strings::msetnx(pairs))
    }

    fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Reply<()> {
        self.dispatch(strings::set(key, value))
    }

    /// `false` when an `NX`/`XX` condition prevented the write.
    fn set_with(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>, args: &SetArgs) -> Reply<bool> {
        self.dispatch(strings::set_with(key, value, args))
    }

    /// Returns the previous bit value.
    fn setbit(&self, key: impl AsRef<[u8]>, offset: u64, bit: bool) -> Reply<i64> {
        self.dispatch(strings::setbit(key, offset, bit))
    }

    fn setex(&self, key: impl AsRef<[u8]>, seconds: u64, value: impl AsRef<[u8]>) -> Reply<()> {
        self.dispatch(strings::setex(key, seconds, value))
    }

    fn psetex(&self, key: impl AsRef<[u8]>, milliseconds: u64, value: impl AsRef<[u8]>) -> Reply<()> {
        self.dispatch(strings::psetex(key, milliseconds, value))
    }

    fn setnx(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Reply<bool> {
        self.dispatch(strings::setnx(key, value))
    }

    /// Returns the length of the string after the write.
    fn setrange(&self, key: impl AsRef<[u8]>, offset: u64, value: impl AsRef<[u8]>) -> Reply<i64> {
        self.dispatch(strings::setrange(key, offset, value))
    }

    fn strlen(&self, key: impl AsRef<[u8]>) -> Reply<i64> {
        self.dispatch(strings::strlen(key))
    }
}

impl<E: Executor> StringCommands for E {}

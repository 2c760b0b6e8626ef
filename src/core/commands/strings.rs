// src/core/commands/strings.rs

//! Builders for the string and bit command family.

use crate::core::ClientError;
use crate::core::command::Command;

pub fn append(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Command {
    Command::new("APPEND").key(key).arg(value)
}

pub fn bitcount(key: impl AsRef<[u8]>) -> Command {
    Command::new("BITCOUNT").key(key)
}

pub fn bitcount_range(key: impl AsRef<[u8]>, start: i64, end: i64) -> Command {
    bitcount(key).arg_int(start).arg_int(end)
}

pub fn bitfield(key: impl AsRef<[u8]>, args: &BitFieldArgs) -> Command {
    args.append_to(Command::new("BITFIELD").key(key))
}

pub fn bitpos(key: impl AsRef<[u8]>, bit: bool) -> Command {
    Command::new("BITPOS").key(key).arg_int(bit as i64)
}

pub fn bitpos_range(key: impl AsRef<[u8]>, bit: bool, start: i64, end: i64) -> Command {
    bitpos(key, bit).arg_int(start).arg_int(end)
}

/// The operation applied by `BITOP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    /// Takes exactly one source key.
    Not,
}

impl BitOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BitOp::And => "AND",
            BitOp::Or => "OR",
            BitOp::Xor => "XOR",
            BitOp::Not => "NOT",
        }
    }
}

pub fn bitop<K: AsRef<[u8]>>(op: BitOp, destination: K, sources: &[K]) -> Command {
    Command::new("BITOP")
        .arg(op.as_str())
        .key(destination)
        .args(sources)
}

pub fn decr(key: impl AsRef<[u8]>) -> Command {
    Command::new("DECR").key(key)
}

pub fn decrby(key: impl AsRef<[u8]>, amount: i64) -> Command {
    Command::new("DECRBY").key(key).arg_int(amount)
}

pub fn get(key: impl AsRef<[u8]>) -> Command {
    Command::new("GET").key(key)
}

pub fn getbit(key: impl AsRef<[u8]>, offset: u64) -> Command {
    Command::new("GETBIT").key(key).arg(offset.to_string())
}

pub fn getrange(key: impl AsRef<[u8]>, start: i64, end: i64) -> Command {
    Command::new("GETRANGE").key(key).arg_int(start).arg_int(end)
}

pub fn getset(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Command {
    Command::new("GETSET").key(key).arg(value)
}

pub fn incr(key: impl AsRef<[u8]>) -> Command {
    Command::new("INCR").key(key)
}

pub fn incrby(key: impl AsRef<[u8]>, amount: i64) -> Command {
    Command::new("INCRBY").key(key).arg_int(amount)
}

pub fn incrbyfloat(key: impl AsRef<[u8]>, amount: f64) -> Command {
    Command::new("INCRBYFLOAT").key(key).arg_float(amount)
}

pub fn mget<K: AsRef<[u8]>>(keys: &[K]) -> Command {
    keys.iter().fold(Command::new("MGET"), |cmd, k| cmd.key(k))
}

pub fn mset<K: AsRef<[u8]>, V: AsRef<[u8]>>(pairs: &[(K, V)]) -> Command {
    pairs
        .iter()
        .fold(Command::new("MSET"), |cmd, (k, v)| cmd.key(k).arg(v))
}

pub fn msetnx<K: AsRef<[u8]>, V: AsRef<[u8]>>(pairs: &[(K, V)]) -> Command {
    pairs
        .iter()
        .fold(Command::new("MSETNX"), |cmd, (k, v)| cmd.key(k).arg(v))
}

pub fn set(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Command {
    Command::new("SET").key(key).arg(value)
}

pub fn set_with(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>, args: &SetArgs) -> Command {
    args.append_to(set(key, value))
}

pub fn setbit(key: impl AsRef<[u8]>, offset: u64, bit: bool) -> Command {
    Command::new("SETBIT")
        .key(key)
        .arg(offset.to_string())
        .arg_int(bit as i64)
}

pub fn setex(key: impl AsRef<[u8]>, seconds: u64, value: impl AsRef<[u8]>) -> Command {
    Command::new("SETEX")
        .key(key)
        .arg(seconds.to_string())
        .arg(value)
}

pub fn psetex(key: impl AsRef<[u8]>, milliseconds: u64, value: impl AsRef<[u8]>) -> Command {
    Command::new("PSETEX")
        .key(key)
        .arg(milliseconds.to_string())
        .arg(value)
}

pub fn setnx(key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Command {
    Command::new("SETNX").key(key).arg(value)
}

pub fn setrange(key: impl AsRef<[u8]>, offset: u64, value: impl AsRef<[u8]>) -> Command {
    Command::new("SETRANGE")
        .key(key)
        .arg(offset.to_string())
        .arg(value)
}

pub fn strlen(key: impl AsRef<[u8]>) -> Command {
    Command::new("STRLEN").key(key)
}

/// Options for `SET`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetArgs {
    ex: Option<u64>,
    px: Option<u64>,
    nx: bool,
    xx: bool,
}

impl SetArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire after `seconds`. Replaces any `px`.
    pub fn ex(mut self, seconds: u64) -> Self {
        self.ex = Some(seconds);
        self.px = None;
        self
    }

    /// Expire after `milliseconds`. Replaces any `ex`.
    pub fn px(mut self, milliseconds: u64) -> Self {
        self.px = Some(milliseconds);
        self.ex = None;
        self
    }

    /// Only set if the key does not exist.
    pub fn nx(mut self) -> Self {
        self.nx = true;
        self.xx = false;
        self
    }

    /// Only set if the key already exists.
    pub fn xx(mut self) -> Self {
        self.xx = true;
        self.nx = false;
        self
    }

    fn append_to(&self, mut cmd: Command) -> Command {
        if let Some(ex) = self.ex {
            cmd = cmd.arg("EX").arg(ex.to_string());
        }
        if let Some(px) = self.px {
            cmd = cmd.arg("PX").arg(px.to_string());
        }
        if self.nx {
            cmd = cmd.arg("NX");
        }
        if self.xx {
            cmd = cmd.arg("XX");
        }
        cmd
    }
}

/// The integer type addressed by a `BITFIELD` sub-operation, e.g. `i8` or `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitType {
    is_signed: bool,
    bits: u8,
}

impl BitType {
    /// Signed integers of 1 to 64 bits.
    pub fn signed(bits: u8) -> Result<Self, ClientError> {
        if bits == 0 || bits > 64 {
            return Err(ClientError::Encoding(format!("invalid signed bitfield width {bits}")));
        }
        Ok(Self {
            is_signed: true,
            bits,
        })
    }

    /// Unsigned integers of 1 to 63 bits.
    pub fn unsigned(bits: u8) -> Result<Self, ClientError> {
        if bits == 0 || bits > 63 {
            return Err(ClientError::Encoding(format!("invalid unsigned bitfield width {bits}")));
        }
        Ok(Self {
            is_signed: false,
            bits,
        })
    }

    fn encode(self) -> String {
        format!("{}{}", if self.is_signed { 'i' } else { 'u' }, self.bits)
    }
}

/// Defines the overflow handling strategy for subsequent `SET`/`INCRBY` sub-operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowBehavior {
    Wrap,
    Sat,
    Fail,
}

/// A single `BITFIELD` sub-operation. Offsets are in bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitFieldOp {
    Get(BitType, u64),
    Set(BitType, u64, i64),
    IncrBy(BitType, u64, i64),
    Overflow(OverflowBehavior),
}

/// The sub-operations of one `BITFIELD` call, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitFieldArgs {
    ops: Vec<BitFieldOp>,
}

impl BitFieldArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(mut self, ty: BitType, offset: u64) -> Self {
        self.ops.push(BitFieldOp::Get(ty, offset));
        self
    }

    pub fn set(mut self, ty: BitType, offset: u64, value: i64) -> Self {
        self.ops.push(BitFieldOp::Set(ty, offset, value));
        self
    }

    pub fn incrby(mut self, ty: BitType, offset: u64, increment: i64) -> Self {
        self.ops.push(BitFieldOp::IncrBy(ty, offset, increment));
        self
    }

    pub fn overflow(mut self, behavior: OverflowBehavior) -> Self {
        self.ops.push(BitFieldOp::Overflow(behavior));
        self
    }

    pub fn ops(&self) -> &[BitFieldOp] {
        &self.ops
    }

    fn append_to(&self, mut cmd: Command) -> Command {
        for op in &self.ops {
            cmd = match op {
                BitFieldOp::Get(ty, offset) => {
                    cmd.arg("GET").arg(ty.encode()).arg(offset.to_string())
                }
                BitFieldOp::Set(ty, offset, value) => cmd
                    .arg("SET")
                    .arg(ty.encode())
                    .arg(offset.to_string())
                    .arg_int(*value),
                BitFieldOp::IncrBy(ty, offset, increment) => cmd
                    .arg("INCRBY")
                    .arg(ty.encode())
                    .arg(offset.to_string())
                    .arg_int(*increment),
                BitFieldOp::Overflow(behavior) => cmd.arg("OVERFLOW").arg(match behavior {
                    OverflowBehavior::Wrap => "WRAP",
                    OverflowBehavior::Sat => "SAT",
                    OverflowBehavior::Fail => "FAIL",
                }),
            };
        }
        cmd
    }
}

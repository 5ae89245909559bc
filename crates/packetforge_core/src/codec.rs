//! # Codec Traits
//!
//! The contracts generated code fulfils for every declared type.
//!
//! - [`NetCodec`]: encode into / decode from a value stream
//! - [`NetHash`]: the stable 32-bit hash used by generated `Hash` impls
//! - [`NetType`]: static descriptor of the declared type

use crate::error::ProtocolResult;
use crate::math::{Vec2, Vec3};
use crate::stream::{PacketReader, PacketWriter};

/// Multiplier of the polynomial hash accumulation.
pub const HASH_MULTIPLIER: i32 = 397;

/// Folds one property hash into an accumulated hash.
///
/// `hash * 397 ^ value`, wrapping. Order matters.
#[inline]
#[must_use]
pub const fn combine_hash(hash: i32, value: i32) -> i32 {
    hash.wrapping_mul(HASH_MULTIPLIER) ^ value
}

/// Encode/decode pair of one type.
///
/// Generated for every declared type unless it is marked `manual_codec`,
/// in which case the owning crate implements it by hand.
pub trait NetCodec {
    /// Writes every serializable property, in declared order.
    fn encode(&self, writer: &mut PacketWriter);

    /// Reads every serializable property, in declared order, into `self`.
    ///
    /// `self` is a fresh prototype; excluded properties keep their value.
    ///
    /// # Errors
    ///
    /// Returns an error when the stream is short or holds invalid values.
    fn decode(&mut self, reader: &mut PacketReader<'_>) -> ProtocolResult<()>;
}

/// Static descriptor of a declared type.
pub trait NetType {
    /// Fully-qualified display name (`module::Name`).
    const TYPE_NAME: &'static str;
    /// Serializable properties, in declared order.
    const FIELDS: &'static [&'static str];
    /// Properties opted out of encode/decode.
    const EXCLUDED_FIELDS: &'static [&'static str];
    /// True when encode/decode are hand-written.
    const MANUAL_CODEC: bool;
}

/// Stable, platform-independent 32-bit hash.
///
/// Unlike [`std::hash::Hash`] with a random state, the value is identical
/// across processes, which keeps generated hash codes comparable.
pub trait NetHash {
    /// Returns the hash of the value.
    fn net_hash(&self) -> i32;
}

macro_rules! impl_net_hash_widen {
    ($($ty:ty),*) => {
        $(
            impl NetHash for $ty {
                #[inline]
                fn net_hash(&self) -> i32 {
                    i32::from(*self)
                }
            }
        )*
    };
}

impl_net_hash_widen!(bool, u8, i8, u16, i16, i32);

impl NetHash for u32 {
    #[inline]
    fn net_hash(&self) -> i32 {
        i32::from_ne_bytes(self.to_ne_bytes())
    }
}

impl NetHash for char {
    #[inline]
    fn net_hash(&self) -> i32 {
        u32::from(*self).net_hash()
    }
}

impl NetHash for u64 {
    #[inline]
    fn net_hash(&self) -> i32 {
        ((*self ^ (*self >> 32)) as u32).net_hash()
    }
}

impl NetHash for i64 {
    #[inline]
    fn net_hash(&self) -> i32 {
        u64::from_ne_bytes(self.to_ne_bytes()).net_hash()
    }
}

impl NetHash for u128 {
    #[inline]
    fn net_hash(&self) -> i32 {
        ((*self ^ (*self >> 64)) as u64).net_hash()
    }
}

impl NetHash for i128 {
    #[inline]
    fn net_hash(&self) -> i32 {
        u128::from_ne_bytes(self.to_ne_bytes()).net_hash()
    }
}

impl NetHash for f32 {
    fn net_hash(&self) -> i32 {
        // -0.0 == 0.0 and all NaNs hash alike
        if *self == 0.0 {
            0
        } else if self.is_nan() {
            f32::NAN.to_bits().net_hash()
        } else {
            self.to_bits().net_hash()
        }
    }
}

impl NetHash for f64 {
    fn net_hash(&self) -> i32 {
        if *self == 0.0 {
            0
        } else if self.is_nan() {
            f64::NAN.to_bits().net_hash()
        } else {
            self.to_bits().net_hash()
        }
    }
}

/// 32-bit FNV-1a over raw bytes.
fn fnv1a(bytes: &[u8]) -> i32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash.net_hash()
}

impl NetHash for str {
    #[inline]
    fn net_hash(&self) -> i32 {
        fnv1a(self.as_bytes())
    }
}

impl NetHash for String {
    #[inline]
    fn net_hash(&self) -> i32 {
        self.as_str().net_hash()
    }
}

impl NetHash for [u8] {
    #[inline]
    fn net_hash(&self) -> i32 {
        fnv1a(self)
    }
}

impl NetHash for Vec<u8> {
    #[inline]
    fn net_hash(&self) -> i32 {
        self.as_slice().net_hash()
    }
}

impl NetHash for Vec2 {
    fn net_hash(&self) -> i32 {
        combine_hash(self.x.net_hash(), self.y.net_hash())
    }
}

impl NetHash for Vec3 {
    fn net_hash(&self) -> i32 {
        combine_hash(
            combine_hash(self.x.net_hash(), self.y.net_hash()),
            self.z.net_hash(),
        )
    }
}

impl<T: NetHash> NetHash for Option<T> {
    #[inline]
    fn net_hash(&self) -> i32 {
        self.as_ref().map_or(0, NetHash::net_hash)
    }
}

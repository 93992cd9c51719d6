//! Description of the generic type [`Prefix`] and the two address-family
//! implementations, [`Ipv4Prefix`] and [`Ipv6Prefix`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use either::Either;
use ipnet::{Ipv4Net, Ipv6Net};
use num_traits::{CheckedShl, CheckedShr, PrimInt, Unsigned, Zero};
use thiserror::Error;

/// Trait for the keys stored in a tag tree.
///
/// A prefix is a left-aligned bit string: the most significant `prefix_len()`
/// bits are meaningful, everything to the right of them is zero. The trie
/// consumes a prefix from the left as it descends, so the operations here are
/// expressed in terms of leading bits.
pub trait Prefix: Sized + Clone {
    /// How the bits are represented. This must be one of `u8`, `u16`, `u32`,
    /// `u64`, or `u128`.
    type R: Unsigned + PrimInt + Zero + CheckedShl + CheckedShr;

    /// Get the raw representation of the bits. All bit positions at or to the
    /// right of `prefix_len` must be zero.
    fn repr(&self) -> Self::R;

    /// The number of meaningful leading bits.
    fn prefix_len(&self) -> u8;

    /// Create a new prefix from the representation and the prefix length,
    /// masking out any bits beyond `len`.
    fn from_repr_len(repr: Self::R, len: u8) -> Self;

    /// The width of the key in bits (32 for IPv4, 128 for IPv6).
    fn max_len() -> u8 {
        Self::R::zero().count_zeros() as u8
    }

    /// Create a prefix that matches everything.
    fn zero() -> Self {
        Self::from_repr_len(Self::R::zero(), 0)
    }

    /// The number of common leading bits of `self` and `other`, capped at the
    /// shorter of the two prefix lengths.
    ///
    /// This is the hottest operation of the trie and compiles down to a
    /// leading-zero count of the xor of the two representations.
    fn match_count(&self, other: &Self) -> u8 {
        let limit = self.prefix_len().min(other.prefix_len());
        let matches = (self.repr() ^ other.repr()).leading_zeros() as u8;
        matches.min(limit)
    }

    /// Whether the most significant bit is set. Meaningless for zero-length
    /// prefixes (which always report `false`).
    fn is_left_bit_set(&self) -> bool {
        self.repr().leading_zeros() == 0
    }

    /// Remove the first `count` bits, shortening the prefix. `count` must not
    /// exceed `prefix_len`.
    fn shift_left(&mut self, count: u8) {
        debug_assert!(count <= self.prefix_len());
        let repr = self
            .repr()
            .checked_shl(count as u32)
            .unwrap_or_else(Self::R::zero);
        *self = Self::from_repr_len(repr, self.prefix_len() - count);
    }

    /// Concatenate `right` onto the end of `self`. The combined length must
    /// not exceed the key width.
    fn merge(&self, right: &Self) -> Self {
        debug_assert!(self.prefix_len() as u16 + right.prefix_len() as u16 <= Self::max_len() as u16);
        let tail = right
            .repr()
            .checked_shr(self.prefix_len() as u32)
            .unwrap_or_else(Self::R::zero);
        Self::from_repr_len(self.repr() | tail, self.prefix_len() + right.prefix_len())
    }

    /// Check if `self` covers `other`, i.e. `other` starts with all of
    /// `self`'s bits. A prefix covers itself.
    fn contains(&self, other: &Self) -> bool {
        self.prefix_len() <= other.prefix_len() && self.match_count(other) == self.prefix_len()
    }
}

pub(crate) fn mask_from_prefix_len<R>(len: u8) -> R
where
    R: PrimInt + Zero,
{
    if len as u32 == R::zero().count_zeros() {
        !R::zero()
    } else if len == 0 {
        R::zero()
    } else {
        !((!R::zero()) >> len as usize)
    }
}

/// Error constructing or parsing a prefix. The tree itself never sees an
/// invalid key; every failure is surfaced here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrefixError {
    /// The prefix length does not fit the address family.
    #[error("prefix length {len} exceeds the maximum of {max} bits")]
    Length { len: u8, max: u8 },
    /// A byte buffer of the wrong size was handed to a factory.
    #[error("expected a 4- or 16-byte address buffer, got {0} bytes")]
    ByteCount(usize),
    /// A 16-byte buffer was handed to the IPv4 factory, but it does not hold
    /// an IPv4-mapped address.
    #[error("16-byte buffer does not hold an IPv4-mapped address")]
    NotIpv4Mapped,
    /// The CIDR string could not be parsed.
    #[error("invalid CIDR: {0}")]
    Cidr(#[from] ipnet::AddrParseError),
    /// The plain address string could not be parsed.
    #[error("invalid IP address: {0}")]
    Addr(#[from] std::net::AddrParseError),
}

/// An IPv4 prefix: up to 32 leading bits of an address.
///
/// ```
/// # use tag_trie::*;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let p: Ipv4Prefix = "192.168.0.0/16".parse()?;
/// assert_eq!(p.prefix_len(), 16);
/// assert_eq!(p.repr(), 0xc0a8_0000);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Prefix {
    repr: u32,
    len: u8,
}

impl Ipv4Prefix {
    /// Create a prefix from the raw bits and the prefix length. Bits beyond
    /// `len` are masked out.
    pub fn new(repr: u32, len: u8) -> Result<Self, PrefixError> {
        if len > 32 {
            return Err(PrefixError::Length { len, max: 32 });
        }
        Ok(Self::from_repr_len(repr, len))
    }

    /// Create a prefix from a big-endian byte buffer.
    ///
    /// Accepts a 4-byte IPv4 address with `len <= 32`, or a 16-byte
    /// IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) with `len` in `[96, 128]`,
    /// which yields the embedded IPv4 prefix with length `len - 96`.
    pub fn from_bytes(bytes: &[u8], len: u8) -> Result<Self, PrefixError> {
        match bytes.len() {
            4 => Self::new(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), len),
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                let Some(v4) = Ipv6Addr::from(octets).to_ipv4_mapped() else {
                    return Err(PrefixError::NotIpv4Mapped);
                };
                if !(96..=128).contains(&len) {
                    return Err(PrefixError::Length { len, max: 128 });
                }
                Self::new(u32::from(v4), len - 96)
            }
            n => Err(PrefixError::ByteCount(n)),
        }
    }
}

impl Prefix for Ipv4Prefix {
    type R = u32;

    fn repr(&self) -> u32 {
        self.repr
    }

    fn prefix_len(&self) -> u8 {
        self.len
    }

    fn from_repr_len(repr: u32, len: u8) -> Self {
        debug_assert!(len <= 32);
        Self {
            repr: repr & mask_from_prefix_len::<u32>(len),
            len,
        }
    }
}

impl From<Ipv4Net> for Ipv4Prefix {
    fn from(net: Ipv4Net) -> Self {
        Self {
            repr: net.network().into(),
            len: net.prefix_len(),
        }
    }
}

impl From<Ipv4Addr> for Ipv4Prefix {
    fn from(addr: Ipv4Addr) -> Self {
        Self {
            repr: addr.into(),
            len: 32,
        }
    }
}

impl From<Ipv4Prefix> for Ipv4Net {
    fn from(prefix: Ipv4Prefix) -> Self {
        Ipv4Net::new(prefix.repr.into(), prefix.len).unwrap()
    }
}

impl FromStr for Ipv4Prefix {
    type Err = PrefixError;

    /// Parse `a.b.c.d/L` CIDR notation. A bare address gets the full host
    /// length of 32.
    fn from_str(s: &str) -> Result<Self, PrefixError> {
        if s.contains('/') {
            Ok(s.parse::<Ipv4Net>()?.into())
        } else {
            Ok(s.parse::<Ipv4Addr>()?.into())
        }
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ipv4Net::from(*self).fmt(f)
    }
}

impl fmt::Debug for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An IPv6 prefix: up to 128 leading bits of an address.
///
/// The 128 bits live in a single `u128`, so the matching and shifting
/// arithmetic is the same as for [`Ipv4Prefix`], just wider.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Prefix {
    repr: u128,
    len: u8,
}

impl Ipv6Prefix {
    /// Create a prefix from the raw bits and the prefix length. Bits beyond
    /// `len` are masked out.
    pub fn new(repr: u128, len: u8) -> Result<Self, PrefixError> {
        if len > 128 {
            return Err(PrefixError::Length { len, max: 128 });
        }
        Ok(Self::from_repr_len(repr, len))
    }

    /// Create a prefix from a 16-byte big-endian buffer.
    pub fn from_bytes(bytes: &[u8], len: u8) -> Result<Self, PrefixError> {
        if bytes.len() != 16 {
            return Err(PrefixError::ByteCount(bytes.len()));
        }
        let mut octets = [0u8; 16];
        octets.copy_from_slice(bytes);
        Self::new(u128::from_be_bytes(octets), len)
    }
}

impl Prefix for Ipv6Prefix {
    type R = u128;

    fn repr(&self) -> u128 {
        self.repr
    }

    fn prefix_len(&self) -> u8 {
        self.len
    }

    fn from_repr_len(repr: u128, len: u8) -> Self {
        debug_assert!(len <= 128);
        Self {
            repr: repr & mask_from_prefix_len::<u128>(len),
            len,
        }
    }
}

impl From<Ipv6Net> for Ipv6Prefix {
    fn from(net: Ipv6Net) -> Self {
        Self {
            repr: net.network().into(),
            len: net.prefix_len(),
        }
    }
}

impl From<Ipv6Addr> for Ipv6Prefix {
    fn from(addr: Ipv6Addr) -> Self {
        Self {
            repr: addr.into(),
            len: 128,
        }
    }
}

impl From<Ipv6Prefix> for Ipv6Net {
    fn from(prefix: Ipv6Prefix) -> Self {
        Ipv6Net::new(prefix.repr.into(), prefix.len).unwrap()
    }
}

impl FromStr for Ipv6Prefix {
    type Err = PrefixError;

    /// Parse `h:h:...:h/L` CIDR notation. A bare address gets the full host
    /// length of 128.
    fn from_str(s: &str) -> Result<Self, PrefixError> {
        if s.contains('/') {
            Ok(s.parse::<Ipv6Net>()?.into())
        } else {
            Ok(s.parse::<Ipv6Addr>()?.into())
        }
    }
}

impl fmt::Display for Ipv6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ipv6Net::from(*self).fmt(f)
    }
}

impl fmt::Debug for Ipv6Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Parse a string into a prefix of whichever family it belongs to. IPv4 is
/// tried first, so an IPv4-mapped IPv6 string (`::ffff:a.b.c.d/L`) comes back
/// as an IPv6 prefix.
///
/// ```
/// # use tag_trie::*;
/// use either::Either;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// assert!(matches!(parse_prefix("10.0.0.0/8")?, Either::Left(_)));
/// assert!(matches!(parse_prefix("2001:db8::/32")?, Either::Right(_)));
/// # Ok(())
/// # }
/// ```
pub fn parse_prefix(s: &str) -> Result<Either<Ipv4Prefix, Ipv6Prefix>, PrefixError> {
    if let Ok(v4) = s.parse::<Ipv4Prefix>() {
        return Ok(Either::Left(v4));
    }
    s.parse::<Ipv6Prefix>().map(Either::Right)
}

/// Build a full-length (host) prefix from an address of either family.
pub fn prefix_from_ip(ip: IpAddr) -> Either<Ipv4Prefix, Ipv6Prefix> {
    match ip {
        IpAddr::V4(addr) => Either::Left(addr.into()),
        IpAddr::V6(addr) => Either::Right(addr.into()),
    }
}

//! The three register types holding one party's share of a value.

use std::ops::{Add, AddAssign, BitAnd, BitAndAssign, BitXor, BitXorAssign, Mul, MulAssign, Neg,
    Sub, SubAssign};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::value::{mask_bits, NBits, Value, VALUE_BITS};

/// A register holding an additive share of a value: the secret is
/// `(a0 + a1) mod 2^64`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegAS {
    pub ashare: Value,
}

/// A register holding an XOR share of a value: the secret is `x0 ^ x1`.
///
/// For `RegXS`, `+` and `-` are both XOR and scalar `*` is AND, so that
/// generic cell code can treat additive and XOR fields uniformly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegXS {
    pub xshare: Value,
}

/// A register holding a share of a single bit: the secret is `b0 ^ b1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegBS {
    pub bshare: bool,
}

impl RegAS {
    pub fn from_share(s: Value) -> Self {
        RegAS { ashare: s }
    }

    #[inline]
    pub fn share(&self) -> Value {
        self.ashare
    }

    #[inline]
    pub fn set(&mut self, s: Value) {
        self.ashare = s;
    }

    /// Set this side's share to a random value `nbits` bits long.
    pub fn randomize(&mut self, nbits: NBits) {
        self.ashare = OsRng.next_u64() & mask_bits(nbits);
    }
}

impl RegXS {
    pub fn from_share(s: Value) -> Self {
        RegXS { xshare: s }
    }

    #[inline]
    pub fn share(&self) -> Value {
        self.xshare
    }

    #[inline]
    pub fn set(&mut self, s: Value) {
        self.xshare = s;
    }

    /// Set this side's share to a random value `nbits` bits long.
    pub fn randomize(&mut self, nbits: NBits) {
        self.xshare = OsRng.next_u64() & mask_bits(nbits);
    }

    /// Extract a bit share of bit `bitnum` of the XOR-shared register.
    #[inline]
    pub fn bit(&self, bitnum: NBits) -> RegBS {
        RegBS {
            bshare: (self.xshare >> bitnum) & 1 == 1,
        }
    }
}

impl RegBS {
    pub fn from_share(s: bool) -> Self {
        RegBS { bshare: s }
    }

    #[inline]
    pub fn share(&self) -> bool {
        self.bshare
    }

    #[inline]
    pub fn set(&mut self, s: bool) {
        self.bshare = s;
    }

    /// Set this side's share to a random bit.
    pub fn randomize(&mut self) {
        self.bshare = OsRng.next_u32() & 1 == 1;
    }
}

/// A bit share sign-extends to an XOR share of the all-ones or all-zeros
/// word, not of the word with value 1. This is what ORAM reads of
/// XOR-shared fields rely on.
impl From<RegBS> for RegXS {
    fn from(b: RegBS) -> RegXS {
        RegXS {
            xshare: if b.bshare { !0 } else { 0 },
        }
    }
}

impl AddAssign for RegAS {
    fn add_assign(&mut self, rhs: RegAS) {
        self.ashare = self.ashare.wrapping_add(rhs.ashare);
    }
}

impl Add for RegAS {
    type Output = RegAS;
    fn add(mut self, rhs: RegAS) -> RegAS {
        self += rhs;
        self
    }
}

impl SubAssign for RegAS {
    fn sub_assign(&mut self, rhs: RegAS) {
        self.ashare = self.ashare.wrapping_sub(rhs.ashare);
    }
}

impl Sub for RegAS {
    type Output = RegAS;
    fn sub(mut self, rhs: RegAS) -> RegAS {
        self -= rhs;
        self
    }
}

impl Neg for RegAS {
    type Output = RegAS;
    fn neg(self) -> RegAS {
        RegAS {
            ashare: self.ashare.wrapping_neg(),
        }
    }
}

impl MulAssign<Value> for RegAS {
    fn mul_assign(&mut self, rhs: Value) {
        self.ashare = self.ashare.wrapping_mul(rhs);
    }
}

impl Mul<Value> for RegAS {
    type Output = RegAS;
    fn mul(mut self, rhs: Value) -> RegAS {
        self *= rhs;
        self
    }
}

impl BitAndAssign<Value> for RegAS {
    fn bitand_assign(&mut self, mask: Value) {
        self.ashare &= mask;
    }
}

impl BitAnd<Value> for RegAS {
    type Output = RegAS;
    fn bitand(mut self, mask: Value) -> RegAS {
        self &= mask;
        self
    }
}

impl AddAssign for RegXS {
    fn add_assign(&mut self, rhs: RegXS) {
        self.xshare ^= rhs.xshare;
    }
}

impl Add for RegXS {
    type Output = RegXS;
    fn add(mut self, rhs: RegXS) -> RegXS {
        self += rhs;
        self
    }
}

impl SubAssign for RegXS {
    fn sub_assign(&mut self, rhs: RegXS) {
        self.xshare ^= rhs.xshare;
    }
}

impl Sub for RegXS {
    type Output = RegXS;
    fn sub(mut self, rhs: RegXS) -> RegXS {
        self -= rhs;
        self
    }
}

impl Neg for RegXS {
    type Output = RegXS;
    fn neg(self) -> RegXS {
        self
    }
}

impl MulAssign<Value> for RegXS {
    fn mul_assign(&mut self, rhs: Value) {
        self.xshare &= rhs;
    }
}

impl Mul<Value> for RegXS {
    type Output = RegXS;
    fn mul(mut self, rhs: Value) -> RegXS {
        self *= rhs;
        self
    }
}

impl BitXorAssign for RegXS {
    fn bitxor_assign(&mut self, rhs: RegXS) {
        self.xshare ^= rhs.xshare;
    }
}

impl BitXor for RegXS {
    type Output = RegXS;
    fn bitxor(mut self, rhs: RegXS) -> RegXS {
        self ^= rhs;
        self
    }
}

impl BitAndAssign<Value> for RegXS {
    fn bitand_assign(&mut self, mask: Value) {
        self.xshare &= mask;
    }
}

impl BitAnd<Value> for RegXS {
    type Output = RegXS;
    fn bitand(mut self, mask: Value) -> RegXS {
        self &= mask;
        self
    }
}

impl BitXorAssign for RegBS {
    fn bitxor_assign(&mut self, rhs: RegBS) {
        self.bshare ^= rhs.bshare;
    }
}

impl BitXor for RegBS {
    type Output = RegBS;
    fn bitxor(mut self, rhs: RegBS) -> RegBS {
        self ^= rhs;
        self
    }
}

/// Reconstruct the cleartext from the two parties' additive shares. For
/// testing and for published values only.
pub fn combine_as(a: &RegAS, b: &RegAS, nbits: NBits) -> Value {
    a.ashare.wrapping_add(b.ashare) & mask_bits(nbits)
}

/// Reconstruct the cleartext from the two parties' XOR shares.
pub fn combine_xs(a: &RegXS, b: &RegXS, nbits: NBits) -> Value {
    (a.xshare ^ b.xshare) & mask_bits(nbits)
}

/// Reconstruct the cleartext bit from the two parties' bit shares.
pub fn combine_bs(a: &RegBS, b: &RegBS) -> bool {
    a.bshare ^ b.bshare
}

/// Split a cleartext into a fresh pair of additive shares.
pub fn split_as(v: Value) -> (RegAS, RegAS) {
    let r = OsRng.next_u64();
    (RegAS::from_share(r), RegAS::from_share(v.wrapping_sub(r)))
}

/// Split a cleartext into a fresh pair of XOR shares.
pub fn split_xs(v: Value) -> (RegXS, RegXS) {
    let r = OsRng.next_u64();
    (RegXS::from_share(r), RegXS::from_share(v ^ r))
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn additive_combines(v: u64, r: u64) {
            let a = RegAS::from_share(r);
            let b = RegAS::from_share(v.wrapping_sub(r));
            prop_assert_eq!(combine_as(&a, &b, VALUE_BITS), v);
        }

        #[test]
        fn xor_add_and_sub_agree(x: u64, y: u64) {
            let a = RegXS::from_share(x);
            let b = RegXS::from_share(y);
            prop_assert_eq!(a + b, a - b);
        }

        #[test]
        fn split_roundtrip(v: u64) {
            let (a0, a1) = split_as(v);
            prop_assert_eq!(combine_as(&a0, &a1, VALUE_BITS), v);
            let (x0, x1) = split_xs(v);
            prop_assert_eq!(combine_xs(&x0, &x1, VALUE_BITS), v);
        }
    }

    #[test]
    fn bit_extend_is_all_ones() {
        let b = RegBS::from_share(true);
        assert_eq!(RegXS::from(b).xshare, !0);
        let b = RegBS::from_share(false);
        assert_eq!(RegXS::from(b).xshare, 0);
    }

    #[test]
    fn bit_extraction() {
        let x = RegXS::from_share(0b1010);
        assert!(!x.bit(0).bshare);
        assert!(x.bit(1).bshare);
        assert!(!x.bit(2).bshare);
        assert!(x.bit(3).bshare);
    }
}

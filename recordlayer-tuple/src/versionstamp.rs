/// A 10-byte transaction-order value assigned by the KV store at commit,
/// plus a 2-byte user version distinguishing multiple versionstamps written
/// within the same transaction (`spec.md` §3, §4.1: "Versionstamps are 12
/// bytes (10 txn + 2 user)").
///
/// An "incomplete" versionstamp (the transaction portion not yet known) is
/// represented with the txn bytes all `0xff`; the KV layer fills them in at
/// commit time (see `recordlayer-kv`'s `atomic_op` versionstamped-key
/// mutation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Versionstamp {
    txn: [u8; 10],
    user: u16,
}

impl Versionstamp {
    pub const INCOMPLETE_TXN: [u8; 10] = [0xff; 10];

    pub fn new(txn: [u8; 10], user: u16) -> Self { Self { txn, user } }

    pub fn incomplete(user: u16) -> Self { Self { txn: Self::INCOMPLETE_TXN, user } }

    pub fn is_incomplete(&self) -> bool { self.txn == Self::INCOMPLETE_TXN }

    pub fn txn_bytes(&self) -> [u8; 10] { self.txn }

    pub fn user_version(&self) -> u16 { self.user }

    pub fn to_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..10].copy_from_slice(&self.txn);
        out[10..].copy_from_slice(&self.user.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut txn = [0u8; 10];
        txn.copy_from_slice(&bytes[..10]);
        let user = u16::from_be_bytes([bytes[10], bytes[11]]);
        Self { txn, user }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let vs = Versionstamp::new([1, 2, 3, 4, 5, 6, 7, 8, 9, 10], 42);
        let bytes = vs.to_bytes();
        assert_eq!(Versionstamp::from_bytes(&bytes), vs);
    }

    #[test]
    fn order_matches_byte_order() {
        let a = Versionstamp::new([0; 10], 0);
        let mut b_txn = [0u8; 10];
        b_txn[9] = 1;
        let b = Versionstamp::new(b_txn, 0);
        assert!(a < b);
        assert!(a.to_bytes() < b.to_bytes());
    }

    #[test]
    fn incomplete_sorts_last() {
        let complete = Versionstamp::new([0; 10], 0);
        let incomplete = Versionstamp::incomplete(0);
        assert!(complete < incomplete);
        assert!(incomplete.is_incomplete());
    }
}

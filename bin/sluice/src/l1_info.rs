//! L1 origin decoding from the L1 info deposit.
//!
//! Every L2 block starts with a system deposit calling the L1 block contract
//! with the attributes of the block's L1 origin.

use alloy::primitives::B256;
use sluice_batcher::BlockId;

/// `setL1BlockValues` selector, ABI encoded arguments.
const BEDROCK_SELECTOR: [u8; 4] = [0x01, 0x5d, 0x8e, 0xb9];
/// `setL1BlockValuesEcotone` selector, packed arguments.
const ECOTONE_SELECTOR: [u8; 4] = [0x44, 0x0a, 0x5e, 0x20];
/// `setL1BlockValuesIsthmus` selector, packed arguments.
const ISTHMUS_SELECTOR: [u8; 4] = [0x09, 0x89, 0x99, 0xbe];
/// `setL1BlockValuesJovian` selector, packed arguments.
const JOVIAN_SELECTOR: [u8; 4] = [0x3d, 0xb6, 0xbe, 0x2b];

const BEDROCK_LEN: usize = 4 + 32 * 8;
/// Later packed layouts append fields to the Ecotone one.
const ECOTONE_LEN: usize = 164;

/// L1 origin and epoch position carried by an L1 info deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct L1Info {
    pub(crate) origin: BlockId,
    pub(crate) sequence_number: u64,
}

impl L1Info {
    /// Decodes the calldata of an L1 info deposit.
    pub(crate) fn decode(calldata: &[u8]) -> Result<Self, String> {
        let Some(selector) = calldata.get(..4) else {
            return Err(format!("L1 info calldata too short: {} bytes", calldata.len()));
        };
        match selector {
            s if s == BEDROCK_SELECTOR => {
                if calldata.len() != BEDROCK_LEN {
                    return Err(format!(
                        "bedrock L1 info calldata has {} bytes, expected {BEDROCK_LEN}",
                        calldata.len()
                    ));
                }
                Ok(Self {
                    origin: BlockId::new(
                        B256::from_slice(&calldata[100..132]),
                        be_u64(&calldata[28..36]),
                    ),
                    sequence_number: be_u64(&calldata[156..164]),
                })
            }
            s if s == ECOTONE_SELECTOR || s == ISTHMUS_SELECTOR || s == JOVIAN_SELECTOR => {
                if calldata.len() < ECOTONE_LEN {
                    return Err(format!(
                        "packed L1 info calldata has {} bytes, expected at least {ECOTONE_LEN}",
                        calldata.len()
                    ));
                }
                Ok(Self {
                    origin: BlockId::new(
                        B256::from_slice(&calldata[100..132]),
                        be_u64(&calldata[28..36]),
                    ),
                    sequence_number: be_u64(&calldata[12..20]),
                })
            }
            s => Err(format!("unknown L1 info selector 0x{}", alloy::primitives::hex::encode(s))),
        }
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use rstest::rstest;

    use super::*;

    /// Packed Ecotone calldata for the given origin and sequence number.
    pub(crate) fn ecotone_calldata(origin: BlockId, sequence_number: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(ECOTONE_LEN);
        data.extend_from_slice(&ECOTONE_SELECTOR);
        data.extend_from_slice(&1368u32.to_be_bytes());
        data.extend_from_slice(&810_949u32.to_be_bytes());
        data.extend_from_slice(&sequence_number.to_be_bytes());
        data.extend_from_slice(&1_700_000_000u64.to_be_bytes());
        data.extend_from_slice(&origin.number.to_be_bytes());
        data.extend_from_slice(&[0x11; 32]);
        data.extend_from_slice(&[0x22; 32]);
        data.extend_from_slice(origin.hash.as_slice());
        data.extend_from_slice(&[0x33; 32]);
        data
    }

    fn bedrock_calldata(origin: BlockId, sequence_number: u64) -> Vec<u8> {
        let word = |v: u64| {
            let mut w = [0u8; 32];
            w[24..].copy_from_slice(&v.to_be_bytes());
            w
        };
        let mut data = BEDROCK_SELECTOR.to_vec();
        data.extend_from_slice(&word(origin.number));
        data.extend_from_slice(&word(1_700_000_000));
        data.extend_from_slice(&word(7));
        data.extend_from_slice(origin.hash.as_slice());
        data.extend_from_slice(&word(sequence_number));
        data.extend_from_slice(&[0x44; 32 * 3]);
        data
    }

    fn origin() -> BlockId {
        BlockId::new(B256::repeat_byte(0xab), 19_000_123)
    }

    #[test]
    fn decodes_ecotone() {
        let info = L1Info::decode(&ecotone_calldata(origin(), 4)).unwrap();
        assert_eq!(info, L1Info { origin: origin(), sequence_number: 4 });
    }

    #[rstest]
    #[case(ISTHMUS_SELECTOR, 12, "isthmus operator fee")]
    #[case(JOVIAN_SELECTOR, 14, "jovian DA footprint")]
    fn decodes_extended_packed(
        #[case] selector: [u8; 4],
        #[case] extra: usize,
        #[case] _description: &str,
    ) {
        let mut data = ecotone_calldata(origin(), 2);
        data[..4].copy_from_slice(&selector);
        data.extend(std::iter::repeat_n(0u8, extra));
        let info = L1Info::decode(&data).unwrap();
        assert_eq!(info, L1Info { origin: origin(), sequence_number: 2 });
    }

    #[test]
    fn decodes_bedrock() {
        let info = L1Info::decode(&bedrock_calldata(origin(), 9)).unwrap();
        assert_eq!(info, L1Info { origin: origin(), sequence_number: 9 });
    }

    #[rstest]
    #[case(vec![], "empty")]
    #[case(vec![0x44, 0x0a], "truncated selector")]
    #[case(ecotone_calldata(origin(), 0)[..100].to_vec(), "truncated ecotone")]
    #[case(vec![0xde, 0xad, 0xbe, 0xef, 0x00], "unknown selector")]
    #[case(bedrock_calldata(origin(), 0)[..164].to_vec(), "truncated bedrock")]
    fn rejects_malformed(#[case] data: Vec<u8>, #[case] _description: &str) {
        assert!(L1Info::decode(&data).is_err());
    }
}

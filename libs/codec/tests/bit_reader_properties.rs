//! Bit Reader and Clock Property Tests
//!
//! Properties that must hold for every bit width, byte order and cursor offset, and for
//! timestamp reconstruction over arbitrary (last, raw) pairs.

mod common;

use common::BitWriter;
use ctf_codec::{BitReader, ClockState};
use ctf_types::ByteOrder;
use proptest::prelude::*;

fn byte_order() -> impl Strategy<Value = ByteOrder> {
    prop_oneof![Just(ByteOrder::BigEndian), Just(ByteOrder::LittleEndian)]
}

fn mask(length: u8) -> u64 {
    if length == 64 {
        u64::MAX
    } else {
        (1u64 << length) - 1
    }
}

proptest! {
    #[test]
    fn unsigned_round_trip(
        length in 1u8..=64,
        raw in any::<u64>(),
        order in byte_order(),
        lead in 0u8..16,
    ) {
        let value = raw & mask(length);
        let mut writer = BitWriter::new();
        writer.write(0, lead, order).write(value, length, order).write(0b101, 3, order);
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        reader.skip(u64::from(lead)).unwrap();
        prop_assert_eq!(reader.read_unsigned_int(length, order).unwrap(), value);
        prop_assert_eq!(reader.position(), u64::from(lead) + u64::from(length));
        prop_assert_eq!(reader.read_unsigned_int(3, order).unwrap(), 0b101);
    }

    #[test]
    fn signed_values_sign_extend(length in 2u8..=64, raw in any::<u64>(), order in byte_order()) {
        let pattern = raw & mask(length);
        let mut writer = BitWriter::new();
        writer.write(pattern, length, order);
        let bytes = writer.into_bytes();

        let value = BitReader::new(&bytes).read_signed_int(length, order).unwrap();
        let negative = pattern >> (length - 1) == 1;
        prop_assert_eq!(value < 0, negative);
        prop_assert_eq!((value as u64) & mask(length), pattern);
    }

    #[test]
    fn reads_never_pass_the_limit(limit in 0u64..64, length in 1u8..=64) {
        let bytes = [0xFFu8; 8];
        let mut reader = BitReader::with_limit(&bytes, limit);
        let result = reader.read_unsigned_int(length, ByteOrder::LittleEndian);
        prop_assert_eq!(result.is_ok(), u64::from(length) <= limit);
        prop_assert!(reader.position() <= limit);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10_000))]

    #[test]
    fn truncated_clock_never_goes_backwards(last in 0u64..u64::MAX / 2, raw in 0u64..(1 << 27)) {
        let mut clock = ClockState::new(last);
        let ts = clock.update(raw, 27);
        prop_assert!(ts >= last);
        prop_assert!(ts - last < 1 << 27);
        prop_assert_eq!(ts & ((1 << 27) - 1), raw);
    }

    #[test]
    fn clock_is_monotonic_over_full_range(
        last in any::<u64>(),
        raw in any::<u64>(),
        bits in 1u8..64,
    ) {
        let mut clock = ClockState::new(last);
        prop_assert!(clock.update(raw, bits) >= last);
    }
}

#[test]
fn eight_bit_negative_is_value_minus_256() {
    for pattern in 0x80u8..=0xFF {
        let bytes = [pattern];
        let value = BitReader::new(&bytes)
            .read_signed_int(8, ByteOrder::BigEndian)
            .unwrap();
        assert_eq!(value, i64::from(pattern) - 256);
    }
}

#[test]
fn align_from_three_bits() {
    let bytes = [0u8; 4];
    let mut reader = BitReader::new(&bytes);
    reader.skip(3).unwrap();
    reader.align(8).unwrap();
    assert_eq!(reader.position(), 8);
    reader.align(8).unwrap();
    assert_eq!(reader.position(), 8);
}

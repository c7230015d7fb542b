use test_strategy::proptest;

use super::*;

#[test]
fn test_decode_card_read() {
    // Read one card from CRA in alpha mode into 0o1000, 10 words.
    let w: Word = (10 << 40) | (10 << 30) | D23_WORD_COUNT | D24_READ | 0o1000;
    let iod = IoDescriptor::decode(w);
    assert_eq!(iod.designate, 10);
    assert_eq!(iod.word_count, 10);
    assert!(iod.read);
    assert!(iod.word_count_enabled);
    assert!(!iod.memory_inhibit);
    assert!(!iod.reverse);
    assert_eq!(iod.mode, TransferMode::Alpha);
    assert_eq!(iod.control, 0);
    assert_eq!(iod.address, 0o1000);
    assert_eq!(iod.encode(), w);
}

#[test]
fn test_control_bits() {
    let w: Word = 0o377 << 15;
    let iod = IoDescriptor::decode(w);
    assert_eq!(iod.control, 0o377);
    assert_eq!(iod.address, 0);
    assert_eq!(iod.encode(), w);
}

#[test]
fn test_error_mask_alignment() {
    assert!(ResultFlags::from_error_mask(0x40).address_error);
    assert!(ResultFlags::from_error_mask(0x01).busy);
    assert!(ResultFlags::from_error_mask(0x04).not_ready);
    assert_eq!(ResultFlags::from_error_mask(0x10).bits(), D28_DEVICE_ERROR_2);
    // Bits above D26 are not part of the mask.
    assert!(ResultFlags::from_error_mask(0x80).is_clear());
}

#[test]
fn test_result_replaces_control_field() {
    let iod = IoDescriptor {
        designate: 22,
        word_count: 17,
        memory_inhibit: false,
        mode: TransferMode::Alpha,
        reverse: false,
        word_count_enabled: true,
        read: false,
        control: 0o177,
        address: 0o2000,
    };
    let result = ResultDescriptor {
        iod,
        flags: ResultFlags {
            not_ready: true,
            ..ResultFlags::default()
        },
    };
    let w = result.encode();
    assert_eq!(w & (0o377 << 15), D30_NOT_READY);
    let back = ResultDescriptor::decode(w);
    assert_eq!(back.iod.designate, 22);
    assert_eq!(back.iod.word_count, 17);
    assert_eq!(back.iod.address, 0o2000);
    assert!(back.flags.not_ready);
}

#[test]
fn test_flags_display() {
    assert_eq!(ResultFlags::default().to_string(), "ok");
    let f = ResultFlags {
        busy: true,
        address_error: true,
        ..ResultFlags::default()
    };
    assert_eq!(f.to_string(), "address-error,busy");
}

#[proptest]
fn result_flags_round_trip(flags: ResultFlags) {
    assert_eq!(ResultFlags::from_bits(flags.bits()), flags);
    assert_eq!(ResultFlags::from_error_mask(flags.error_mask()), flags);
}

#[proptest]
fn result_descriptor_round_trip(iod: IoDescriptor, flags: ResultFlags) {
    let rd = ResultDescriptor { iod, flags };
    let back = ResultDescriptor::decode(rd.encode());
    assert_eq!(back.flags, flags);
    assert_eq!(back.iod.address, iod.address);
    assert_eq!(back.iod.designate, iod.designate);
    assert_eq!(back.iod.word_count, iod.word_count);
}

#[proptest]
fn descriptor_round_trip(iod: IoDescriptor) {
    assert_eq!(IoDescriptor::decode(iod.encode()), iod);
}

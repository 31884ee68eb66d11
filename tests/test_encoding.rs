// tests/test_encoding.rs — Site id packing used by the assignment raster.

use cone_stipple::id::{decode_id, decode_raster, encode_id, ID_SPACE};

#[test]
fn every_id_round_trips() {
    for id in 0..ID_SPACE {
        let rgba = encode_id(id);
        assert_eq!(decode_id(rgba), id, "id {id} encoded as {rgba:?}");
    }
}

#[test]
fn channels_are_little_endian_bytes() {
    assert_eq!(encode_id(0), [0, 0, 0, 255]);
    assert_eq!(encode_id(1), [1, 0, 0, 255]);
    assert_eq!(encode_id(256), [0, 1, 0, 255]);
    assert_eq!(encode_id(65536), [0, 0, 1, 255]);
    assert_eq!(encode_id(65535), [255, 255, 0, 255]);
}

#[test]
fn alpha_is_ignored_on_decode() {
    assert_eq!(decode_id([7, 1, 0, 0]), 263);
    assert_eq!(decode_id([7, 1, 0, 255]), 263);
}

#[test]
fn raster_decodes_row_major() {
    let ids = [0u32, 1, 300, 65534];
    let bytes: Vec<u8> = ids.iter().flat_map(|&i| encode_id(i)).collect();
    assert_eq!(decode_raster(&bytes), ids);
}

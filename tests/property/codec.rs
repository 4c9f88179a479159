//! Round-trip properties of the hex, varint, pkt-line, and chunked codecs.

use proptest::prelude::*;

use mirror_rs::chunked::decode_response;
use mirror_rs::object_id::ObjectId;
use mirror_rs::pkt_line::{put_data_line, put_flush, Frame, Frames};
use mirror_rs::varint::read_size;

fn encode_size(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

proptest! {
    #[test]
    fn hex_decode_inverts_encode(bytes in prop::array::uniform20(any::<u8>())) {
        let id = ObjectId::from_bytes(bytes);
        let hex = id.to_hex();
        prop_assert_eq!(ObjectId::from_hex(hex.as_bytes()).unwrap(), id);
    }

    #[test]
    fn hex_encode_inverts_decode(hex in "[0-9a-fA-F]{40}") {
        let id = ObjectId::from_hex(hex.as_bytes()).unwrap();
        prop_assert_eq!(id.to_hex(), hex.to_lowercase());
    }

    #[test]
    fn size_varint_round_trips(value in any::<u64>()) {
        let encoded = encode_size(value);
        let mut pos = 0;
        prop_assert_eq!(read_size(&encoded, &mut pos).unwrap(), value);
        prop_assert_eq!(pos, encoded.len());
    }

    #[test]
    fn pkt_line_frames_round_trip(
        payloads in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 0..200),
            0..12,
        )
    ) {
        let mut buf = Vec::new();
        for payload in &payloads {
            put_data_line(&mut buf, payload);
        }
        put_flush(&mut buf);

        let mut decoded = Vec::new();
        let mut saw_flush = false;
        for frame in Frames::new(&buf) {
            match frame.unwrap() {
                Frame::Data(payload) => decoded.push(payload.to_vec()),
                Frame::Flush => saw_flush = true,
                Frame::Delim => {}
            }
        }
        prop_assert!(saw_flush);
        prop_assert_eq!(decoded, payloads);
    }

    #[test]
    fn chunked_decode_is_split_invariant(
        body in prop::collection::vec(any::<u8>(), 0..600),
        chunk in 1usize..128,
    ) {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n");
        for piece in body.chunks(chunk) {
            raw.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
            raw.extend_from_slice(piece);
            raw.extend_from_slice(b"\r\n");
        }
        raw.extend_from_slice(b"0\r\n\r\n");

        prop_assert_eq!(decode_response(&raw).unwrap(), body);
    }
}
